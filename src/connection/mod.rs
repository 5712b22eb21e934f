//! Connection management for RAX FTP Client
//!
//! Handles the command connection, passive address negotiation and the
//! data connections opened for transfers.

pub mod command;
pub mod data;
pub mod dialer;
pub mod passive;

// Re-export main types
pub use command::CommandConnection;
pub use data::{DataStream, TransferType};
pub use dialer::{Dialer, Network};
pub use passive::{parse_epsv_reply, parse_pasv_reply};
