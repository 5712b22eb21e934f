//! Command connection management for RAX FTP Client
//!
//! Owns the control channel: writes command lines and frames the replies.
//! Each exchange runs under a [`Context`] without ever being cut off
//! half way, and exchanges reach the socket in the order they were issued,
//! so the reply stream stays in step with the commands sent.

use log::{debug, info, warn};
use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::context::Context;
use crate::error::{FtpError, Result};
use crate::responses::{Reply, ReplyReader};

type Channel = Arc<Mutex<ReplyReader<TcpStream>>>;

/// Manages the FTP command connection (main control channel)
pub struct CommandConnection {
    channel: Channel,
    turns: TurnQueue,
    // Second handle onto the socket, so shutdown does not have to wait for
    // an abandoned exchange that still holds the channel
    closer: TcpStream,
    peer: SocketAddr,
}

impl CommandConnection {
    /// Take ownership of a connected control stream
    pub fn new(stream: TcpStream) -> Result<Self> {
        let peer = stream.peer_addr()?;
        let closer = stream.try_clone()?;
        info!("Control connection established with {}", peer);

        Ok(Self {
            channel: Arc::new(Mutex::new(ReplyReader::new(stream))),
            turns: TurnQueue::new(),
            closer,
            peer,
        })
    }

    /// Address of the server end of the control connection
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Send an FTP command (adds CRLF) and read its reply
    pub fn send_command(&self, ctx: &Context, command: &str) -> Result<Reply> {
        if command.contains(['\r', '\n']) {
            return Err(FtpError::InvalidCommand(loggable(command).to_string()));
        }

        ctx.check()?;

        debug!("Sending command: {}", loggable(command));
        let line = format!("{}\r\n", command);
        let channel = Arc::clone(&self.channel);
        let turn = self.turns.take();

        let reply = ctx.race(move || {
            turn.wait();
            let mut reader = lock(&channel);
            write_line(reader.get_mut(), &line)?;
            reader.read_reply()
        })??;

        debug!("Received reply: {}", reply);
        Ok(reply)
    }

    /// Read one reply that was not prompted by a new command (the greeting)
    pub fn read_reply(&self, ctx: &Context) -> Result<Reply> {
        ctx.check()?;
        self.read_final_reply(ctx)
    }

    /// Read the reply that closes a data transfer.
    ///
    /// Unlike [`read_reply`](Self::read_reply) the read is started even when
    /// `ctx` has already fired: the server always sends this reply, and the
    /// next command would otherwise pick it up as its own.
    pub fn read_final_reply(&self, ctx: &Context) -> Result<Reply> {
        let channel = Arc::clone(&self.channel);
        let turn = self.turns.take();

        let reply = ctx.race(move || {
            turn.wait();
            let mut reader = lock(&channel);
            reader.read_reply()
        })??;

        debug!("Received reply: {}", reply);
        Ok(reply)
    }

    /// Shut down the control connection in both directions
    pub fn close(&self) -> Result<()> {
        match self.closer.shutdown(Shutdown::Both) {
            Ok(()) => {
                info!("Disconnected from {}", self.peer);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => {
                warn!("Failed to shut down control connection: {}", e);
                Err(FtpError::Io(e))
            }
        }
    }
}

impl Drop for CommandConnection {
    fn drop(&mut self) {
        let _ = self.closer.shutdown(Shutdown::Both);
    }
}

/// Orders exchanges on the control channel.
///
/// A place is taken on the caller's thread before any worker starts, so an
/// exchange abandoned to the background still goes ahead of every exchange
/// issued after it.
struct TurnQueue {
    tail: Mutex<Receiver<()>>,
}

/// A place in the queue. The next place opens once this one is dropped.
struct Turn {
    ready: Receiver<()>,
    _done: Sender<()>,
}

impl TurnQueue {
    fn new() -> Self {
        let (_, open) = mpsc::channel();
        Self {
            tail: Mutex::new(open),
        }
    }

    fn take(&self) -> Turn {
        let (done, next) = mpsc::channel();
        let mut tail = self.tail.lock().unwrap_or_else(PoisonError::into_inner);
        let ready = std::mem::replace(&mut *tail, next);
        Turn { ready, _done: done }
    }
}

impl Turn {
    /// Block until every earlier turn has been dropped
    fn wait(&self) {
        // Nothing is ever sent; the sender going away is the signal
        let _ = self.ready.recv();
    }
}

fn lock(channel: &Channel) -> MutexGuard<'_, ReplyReader<TcpStream>> {
    channel.lock().unwrap_or_else(PoisonError::into_inner)
}

fn write_line(stream: &mut TcpStream, line: &str) -> Result<()> {
    stream.write_all(line.as_bytes())?;
    stream.flush()?;
    Ok(())
}

/// Command text safe for logs: passwords are masked
fn loggable(command: &str) -> &str {
    match command.get(..5) {
        Some(verb) if verb.eq_ignore_ascii_case("PASS ") => "PASS [hidden]",
        _ => command,
    }
}
