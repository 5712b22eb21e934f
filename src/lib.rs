//! RAX FTP Lite
//!
//! A small passive-mode FTP client (RFC 959): reply framing on the control
//! connection, PASV/EPSV negotiation, and data transfers whose close is tied
//! to the server's final reply. Every blocking call takes a [`Context`] for
//! cancellation and deadlines.

pub mod client;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod logging;
pub mod responses;

pub use client::Client;
pub use config::ClientConfig;
pub use connection::{DataStream, Dialer, TransferType};
pub use context::{CancelHandle, Context};
pub use error::{FtpError, Result};
pub use responses::Reply;
