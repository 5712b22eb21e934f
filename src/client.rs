use log::{info, warn};
use std::net::{SocketAddr, TcpStream};

use crate::connection::{CommandConnection, DataStream, Dialer, TransferType};
use crate::context::Context;
use crate::error::{FtpError, Result};
use crate::responses::Reply;
use crate::responses::status_codes::USER_NAME_OKAY_NEED_PASSWORD;

/// Passive-mode FTP client over a single control connection.
///
/// One connection carries one command at a time and at most one open data
/// connection; every operation takes `&mut self` (and a [`DataStream`]
/// keeps the client borrowed) so this holds by construction.
pub struct Client {
    connection: CommandConnection,
    dialer: Dialer,
    welcome: Reply,
}

impl Client {
    /// Connect to an FTP server and read its welcome reply.
    ///
    /// `network` must be "tcp", "tcp4" or "tcp6".
    pub fn dial(ctx: &Context, network: &str, address: &str) -> Result<Self> {
        Self::dial_with(ctx, network, address, &Dialer::default())
    }

    /// Like [`dial`](Self::dial), with explicit socket timeouts that also
    /// apply to data connections
    pub fn dial_with(ctx: &Context, network: &str, address: &str, dialer: &Dialer) -> Result<Self> {
        info!("Connecting to {} ({})", address, network);
        let stream = dialer.dial(ctx, network, address)?;
        Self::start(ctx, stream, dialer.clone())
    }

    /// Create a client from an established control connection and read
    /// the welcome reply
    pub fn from_stream(ctx: &Context, stream: TcpStream) -> Result<Self> {
        Self::start(ctx, stream, Dialer::default())
    }

    fn start(ctx: &Context, stream: TcpStream, dialer: Dialer) -> Result<Self> {
        let connection = CommandConnection::new(stream)?;
        let welcome = connection.read_reply(ctx)?;
        info!("Server greeting: {}", welcome);

        Ok(Self {
            connection,
            dialer,
            welcome,
        })
    }

    /// The reply the server greeted the connection with
    pub fn welcome(&self) -> &Reply {
        &self.welcome
    }

    /// Address of the server's control endpoint
    pub fn peer_addr(&self) -> SocketAddr {
        self.connection.peer_addr()
    }

    /// Authenticate with USER, followed by PASS when the server asks for it
    pub fn login(&mut self, ctx: &Context, username: &str, password: &str) -> Result<()> {
        let mut reply = self
            .connection
            .send_command(ctx, &format!("USER {}", username))?;

        if reply.code() == USER_NAME_OKAY_NEED_PASSWORD {
            reply = self
                .connection
                .send_command(ctx, &format!("PASS {}", password))?;
        }

        if !reply.is_positive_complete() {
            warn!("Login as '{}' refused: {}", username, reply);
            return Err(FtpError::Rejected(reply));
        }

        info!("Logged in as '{}'", username);
        Ok(())
    }

    /// Send a command and return the server's reply, whatever its code
    pub fn execute(&mut self, ctx: &Context, command: &str) -> Result<Reply> {
        self.connection.send_command(ctx, command)
    }

    /// Send a transfer command with a new passive data connection in ASCII mode
    pub fn text(&mut self, ctx: &Context, command: &str) -> Result<(Reply, DataStream<'_>)> {
        self.connection
            .transfer(ctx, &self.dialer, command, TransferType::Ascii)
    }

    /// Send a transfer command with a new passive data connection in image mode
    pub fn binary(&mut self, ctx: &Context, command: &str) -> Result<(Reply, DataStream<'_>)> {
        self.connection
            .transfer(ctx, &self.dialer, command, TransferType::Image)
    }

    /// Send QUIT and close the connection.
    ///
    /// If `ctx` fires before the server answers, the connection is closed
    /// anyway and the outcome of that close is returned.
    pub fn quit(self, ctx: &Context) -> Result<()> {
        match self.connection.send_command(ctx, "QUIT") {
            Ok(reply) => info!("Server said goodbye: {}", reply),
            Err(e) if e.is_cancellation() => {
                warn!("QUIT interrupted ({}), closing connection", e)
            }
            Err(e) => return Err(e),
        }
        self.connection.close()
    }

    /// Close the control connection without saying goodbye
    pub fn close(self) -> Result<()> {
        self.connection.close()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("peer", &self.connection.peer_addr())
            .field("welcome", &self.welcome)
            .finish()
    }
}
