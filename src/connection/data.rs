//! Data connection management for FTP transfers
//!
//! A transfer opens a passive data connection, sends the transfer command
//! and hands back a [`DataStream`]. Closing the stream reads the reply the
//! server sends once the data connection is gone, keeping the control
//! connection in step.

use log::{debug, info, warn};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};

use super::{CommandConnection, Dialer};
use crate::context::Context;
use crate::error::{FtpError, Result};
use crate::responses::Reply;

/// Representation type requested with `TYPE` before a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
    /// `TYPE A`: text, line endings converted by the server
    Ascii,
    /// `TYPE I`: raw bytes
    Image,
}

impl TransferType {
    /// Argument of the TYPE command
    pub fn type_code(&self) -> &'static str {
        match self {
            TransferType::Ascii => "A",
            TransferType::Image => "I",
        }
    }
}

impl std::fmt::Display for TransferType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferType::Ascii => write!(f, "ASCII"),
            TransferType::Image => write!(f, "binary"),
        }
    }
}

impl CommandConnection {
    /// Set the representation type, open a passive data connection and
    /// send `command` over the control connection.
    ///
    /// The command must be accepted with a positive reply; a 1xx
    /// "opening data connection" is the usual answer.
    pub fn transfer(
        &self,
        ctx: &Context,
        dialer: &Dialer,
        command: &str,
        transfer_type: TransferType,
    ) -> Result<(Reply, DataStream<'_>)> {
        let reply = self.send_command(ctx, &format!("TYPE {}", transfer_type.type_code()))?;
        if !reply.is_positive_complete() {
            return Err(FtpError::Rejected(reply));
        }

        let addr = self.obtain_passive_address(ctx)?;
        let stream = dialer.dial_addr(ctx, addr)?;
        info!("Passive data connection to {} established", addr);

        let reply = match self.send_command(ctx, command) {
            Ok(reply) if reply.is_positive() => reply,
            Ok(reply) => {
                discard(stream);
                return Err(FtpError::Rejected(reply));
            }
            Err(e) => {
                discard(stream);
                return Err(e);
            }
        };

        debug!("{} transfer started: {}", transfer_type, reply);
        Ok((
            reply,
            DataStream {
                stream: Some(stream),
                control: self,
                ctx: ctx.clone(),
            },
        ))
    }
}

/// Shut down a data connection that will not be handed out
fn discard(stream: TcpStream) {
    if let Err(e) = stream.shutdown(Shutdown::Both) {
        debug!("Data connection shutdown failed: {}", e);
    }
    debug!("Data connection closed before transfer");
}

/// Open data connection of a transfer in progress.
///
/// Reads and writes go straight to the data socket, but fail with the
/// cancellation error once the transfer's context has fired. The stream
/// borrows the client, so no other command can be sent until it is closed.
pub struct DataStream<'a> {
    stream: Option<TcpStream>,
    control: &'a CommandConnection,
    ctx: Context,
}

impl DataStream<'_> {
    /// Address of the server end of the data connection
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream()?.peer_addr()
    }

    /// Close the data connection and read the transfer's final reply,
    /// which must be a completion reply
    pub fn close(mut self) -> Result<()> {
        self.finish()
    }

    fn stream(&self) -> io::Result<&TcpStream> {
        self.stream
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "data connection closed"))
    }

    fn stream_mut(&mut self) -> io::Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "data connection closed"))
    }

    fn finish(&mut self) -> Result<()> {
        let Some(stream) = self.stream.take() else {
            return Ok(());
        };

        // The final reply is read even when shutdown fails, otherwise it
        // would be taken for the reply to the next command
        let shutdown = match stream.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e),
            _ => Ok(()),
        };
        drop(stream);
        debug!("Data connection closed, waiting for transfer reply");

        let reply = self.control.read_final_reply(&self.ctx)?;
        if !reply.is_positive_complete() {
            warn!("Transfer finished with {}", reply);
            return Err(FtpError::Rejected(reply));
        }
        shutdown?;

        info!("Transfer complete: {}", reply);
        Ok(())
    }
}

impl Read for DataStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.ctx.check()?;
        self.stream_mut()?.read(buf)
    }
}

impl Write for DataStream<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.ctx.check()?;
        self.stream_mut()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.ctx.check()?;
        self.stream_mut()?.flush()
    }
}

impl Drop for DataStream<'_> {
    fn drop(&mut self) {
        if self.stream.is_some() {
            if let Err(e) = self.finish() {
                warn!("Data connection dropped without close: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for DataStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStream")
            .field("stream", &self.stream)
            .field("control", &self.control.peer_addr())
            .finish()
    }
}
