//! TCP connection establishment for control and data channels

use log::{debug, info};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::context::Context;
use crate::error::{FtpError, Result};

/// Address family selected by a network name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    /// "tcp": IPv4 or IPv6
    Tcp,
    /// "tcp4": IPv4 only
    Tcp4,
    /// "tcp6": IPv6 only
    Tcp6,
}

impl Network {
    /// Parse a network name. Only stream-oriented TCP networks are accepted.
    pub fn parse(network: &str) -> Result<Self> {
        match network {
            "tcp" => Ok(Network::Tcp),
            "tcp4" => Ok(Network::Tcp4),
            "tcp6" => Ok(Network::Tcp6),
            other => Err(FtpError::UnsupportedNetwork(other.to_string())),
        }
    }

    fn admits(&self, addr: &SocketAddr) -> bool {
        match self {
            Network::Tcp => true,
            Network::Tcp4 => addr.is_ipv4(),
            Network::Tcp6 => addr.is_ipv6(),
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Tcp => write!(f, "tcp"),
            Network::Tcp4 => write!(f, "tcp4"),
            Network::Tcp6 => write!(f, "tcp6"),
        }
    }
}

/// Socket options applied to every connection the client opens
#[derive(Debug, Clone, Default)]
pub struct Dialer {
    /// Upper bound for establishing a connection
    pub connect_timeout: Option<Duration>,

    /// Read/write timeout set on the connected socket
    pub io_timeout: Option<Duration>,
}

impl Dialer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = Some(timeout);
        self
    }

    /// Resolve `address` and connect to the first candidate of the
    /// requested family that accepts
    pub fn dial(&self, ctx: &Context, network: &str, address: &str) -> Result<TcpStream> {
        let network = Network::parse(network)?;
        let address = address.to_string();
        let dialer = self.bounded_by(ctx);

        ctx.run(move || {
            let candidates: Vec<SocketAddr> = address
                .to_socket_addrs()
                .map_err(|e| FtpError::InvalidAddress(format!("{}: {}", address, e)))?
                .filter(|addr| network.admits(addr))
                .collect();

            if candidates.is_empty() {
                return Err(FtpError::InvalidAddress(format!(
                    "no {} address found for {}",
                    network, address
                )));
            }

            let mut last_error = None;
            for addr in candidates {
                match dialer.connect(addr) {
                    Ok(stream) => return Ok(stream),
                    Err(e) => {
                        debug!("Connection attempt to {} failed: {}", addr, e);
                        last_error = Some(e);
                    }
                }
            }
            Err(last_error.unwrap_or_else(|| {
                FtpError::InvalidAddress(format!("no address to dial for {}", address))
            }))
        })?
    }

    /// Connect to a known socket address
    pub fn dial_addr(&self, ctx: &Context, addr: SocketAddr) -> Result<TcpStream> {
        let dialer = self.bounded_by(ctx);
        ctx.run(move || dialer.connect(addr))?
    }

    /// Copy of this dialer whose connect timeout also respects the
    /// context's deadline
    fn bounded_by(&self, ctx: &Context) -> Dialer {
        let connect_timeout = match (self.connect_timeout, ctx.remaining()) {
            (Some(own), Some(left)) => Some(own.min(left)),
            (own, left) => own.or(left),
        };
        Dialer {
            connect_timeout: connect_timeout.filter(|t| !t.is_zero()),
            io_timeout: self.io_timeout.filter(|t| !t.is_zero()),
        }
    }

    fn connect(&self, addr: SocketAddr) -> Result<TcpStream> {
        let stream = match self.connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout)?,
            None => TcpStream::connect(addr)?,
        };

        stream.set_read_timeout(self.io_timeout)?;
        stream.set_write_timeout(self.io_timeout)?;

        info!("Connected to {}", addr);
        Ok(stream)
    }
}
