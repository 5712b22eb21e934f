use log::{error, info};
use std::env;
use std::io;
use std::process;

use rax_ftp_lite::{Client, ClientConfig, Context, Dialer, FtpError, Result, logging};

fn main() {
    // Initialize logging
    logging::init();

    let config_path = env::var("RAX_FTP_CONFIG").ok();
    let config = match ClientConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            print_usage();
            process::exit(1);
        }
    };
    info!("{}", config);

    let commands: Vec<String> = env::args().skip(1).collect();
    if let Err(e) = run(&config, &commands) {
        error!("Session failed: {}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(config: &ClientConfig, commands: &[String]) -> Result<()> {
    let dialer = Dialer::from(config);
    let mut client = Client::dial_with(
        &command_context(config),
        &config.server.network,
        &config.address(),
        &dialer,
    )?;
    println!("{}", client.welcome());

    client.login(
        &command_context(config),
        &config.credentials.user,
        &config.credentials.password,
    )?;

    for command in commands {
        run_command(&mut client, &command_context(config), command)?;
    }

    client.quit(&command_context(config))
}

/// Data commands go through a passive transfer, everything else is sent as is
fn run_command(client: &mut Client, ctx: &Context, command: &str) -> Result<()> {
    let verb = command
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();

    let (reply, mut data) = match verb.as_str() {
        "LIST" | "NLST" | "MLSD" => client.text(ctx, command)?,
        "RETR" => client.binary(ctx, command)?,
        _ => {
            println!("{}", client.execute(ctx, command)?);
            return Ok(());
        }
    };

    println!("{}", reply);
    io::copy(&mut data, &mut io::stdout().lock())
        .map_err(|e| FtpError::from_io_cancellation(&e).unwrap_or(FtpError::Io(e)))?;
    data.close()
}

fn command_context(config: &ClientConfig) -> Context {
    match config.command_timeout() {
        Some(timeout) => Context::background().with_timeout(timeout).0,
        None => Context::background(),
    }
}

fn print_usage() {
    println!("RAX FTP Lite");
    println!("Usage: rax-ftp [COMMAND]...   e.g. rax-ftp PWD \"LIST /pub\" \"RETR readme.txt\"");
    println!("Environment Variables:");
    println!("  RAX_FTP_CONFIG=./config.toml");
    println!("  RAX_FTP_SERVER__HOST=127.0.0.1");
    println!("  RAX_FTP_SERVER__PORT=2121");
    println!("  RAX_FTP_SERVER__NETWORK=tcp");
    println!("  RAX_FTP_CREDENTIALS__USER=anonymous");
    println!("  RAX_FTP_CREDENTIALS__PASSWORD=anonymous@");
    println!("  RUST_LOG=info");
}
