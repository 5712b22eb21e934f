use config::{Config, ConfigBuilder, Environment, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::time::Duration;

use crate::connection::{Dialer, Network};
use crate::error::{FtpError, Result};

/// Configuration for the RAX FTP client
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Socket and operation timeouts
    pub timeouts: TimeoutConfig,

    /// Login credentials
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// FTP server hostname or IP address
    pub host: String,

    /// FTP server control port
    pub port: u16,

    /// "tcp", "tcp4" or "tcp6"
    pub network: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds (0 = none)
    pub connect_secs: u64,

    /// Socket read/write timeout in seconds (0 = none)
    pub io_secs: u64,

    /// Deadline for each command, transfer included, in seconds (0 = none)
    pub command_secs: u64,
}

#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"[hidden]")
            .finish()
    }
}

impl ClientConfig {
    /// Load configuration from defaults, an optional TOML file and
    /// `RAX_FTP_*` environment variables (e.g. `RAX_FTP_SERVER__HOST`)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let file = match config_path {
            Some(path) => File::with_name(path),
            None => File::with_name("config").required(false),
        };

        let settings = Self::defaults()?
            .add_source(file)
            .add_source(
                Environment::with_prefix("RAX_FTP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Self::finish(settings)
    }

    /// Load configuration from TOML text layered over the defaults
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let settings = Self::defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;

        Self::finish(settings)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        Ok(Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 2121_i64)?
            .set_default("server.network", "tcp")?
            .set_default("timeouts.connect_secs", 5_i64)?
            .set_default("timeouts.io_secs", 30_i64)?
            .set_default("timeouts.command_secs", 0_i64)?
            .set_default("credentials.user", "anonymous")?
            .set_default("credentials.password", "anonymous@")?)
    }

    fn finish(settings: Config) -> Result<Self> {
        let config: ClientConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// "host:port" of the control endpoint, bracketing IPv6 literals
    pub fn address(&self) -> String {
        if self.server.host.contains(':') && !self.server.host.starts_with('[') {
            format!("[{}]:{}", self.server.host, self.server.port)
        } else {
            format!("{}:{}", self.server.host, self.server.port)
        }
    }

    /// Per-command deadline, if configured
    pub fn command_timeout(&self) -> Option<Duration> {
        seconds(self.timeouts.command_secs)
    }

    /// Validate the basic configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(FtpError::Config("Host cannot be empty".to_string()));
        }

        if self.server.port == 0 {
            return Err(FtpError::Config("Port cannot be 0".to_string()));
        }

        Network::parse(&self.server.network)
            .map_err(|e| FtpError::Config(e.to_string()))?;

        if self.credentials.user.is_empty() {
            return Err(FtpError::Config("User cannot be empty".to_string()));
        }

        Ok(())
    }
}

impl From<&ClientConfig> for Dialer {
    fn from(config: &ClientConfig) -> Self {
        Dialer {
            connect_timeout: seconds(config.timeouts.connect_secs),
            io_timeout: seconds(config.timeouts.io_secs),
        }
    }
}

fn seconds(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl std::fmt::Display for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RAX FTP Config - Server: {} ({}), User: {}, Timeouts: connect {}s, io {}s, command {}s",
            self.address(),
            self.server.network,
            self.credentials.user,
            self.timeouts.connect_secs,
            self.timeouts.io_secs,
            self.timeouts.command_secs
        )
    }
}
