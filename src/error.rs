use std::fmt;
use std::io;

use crate::responses::Reply;

/// Main error type for the RAX FTP client library
#[derive(Debug)]
pub enum FtpError {
    // Transport Errors
    Io(io::Error),

    // Protocol Errors
    Framing(String),
    IncompleteReply { partial: Reply, source: io::Error },
    Rejected(Reply),
    AddressParse(&'static str),
    InvalidCommand(String),

    // Cancellation
    Canceled,
    DeadlineExceeded,

    // Configuration Errors
    UnsupportedNetwork(String),
    InvalidAddress(String),
    Config(String),
}

impl fmt::Display for FtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "IO error: {}", err),

            Self::Framing(msg) => write!(f, "Malformed reply: {}", msg),
            Self::IncompleteReply { partial, source } => {
                write!(f, "Incomplete reply ({}): {}", partial.code(), source)
            }
            // A rejection renders exactly as the server's reply
            Self::Rejected(reply) => write!(f, "{}", reply),
            Self::AddressParse(msg) => write!(f, "{}", msg),
            Self::InvalidCommand(cmd) => {
                write!(f, "Invalid command {:?}: line breaks are not allowed", cmd)
            }

            Self::Canceled => write!(f, "operation canceled"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),

            Self::UnsupportedNetwork(network) => write!(
                f,
                "Unsupported network '{}': only TCP connections are supported",
                network
            ),
            Self::InvalidAddress(msg) => write!(f, "Invalid address: {}", msg),
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for FtpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::IncompleteReply { source, .. } => Some(source),
            Self::Rejected(reply) => Some(reply),
            _ => None,
        }
    }
}

impl From<io::Error> for FtpError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<Reply> for FtpError {
    fn from(reply: Reply) -> Self {
        Self::Rejected(reply)
    }
}

impl From<config::ConfigError> for FtpError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<FtpError> for io::Error {
    fn from(err: FtpError) -> Self {
        match err {
            FtpError::Io(inner) => inner,
            // Not `Interrupted`: std read loops retry that kind
            FtpError::Canceled => io::Error::other(FtpError::Canceled),
            FtpError::DeadlineExceeded => {
                io::Error::new(io::ErrorKind::TimedOut, FtpError::DeadlineExceeded)
            }
            other => io::Error::other(other),
        }
    }
}

impl FtpError {
    /// The reply carried by a rejection or by a truncated multi-line read
    pub fn reply(&self) -> Option<&Reply> {
        match self {
            Self::Rejected(reply) => Some(reply),
            Self::IncompleteReply { partial, .. } => Some(partial),
            _ => None,
        }
    }

    /// True for `Canceled` and `DeadlineExceeded`
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Canceled | Self::DeadlineExceeded)
    }

    /// Recover a cancellation error that travelled through `std::io`
    pub fn from_io_cancellation(err: &io::Error) -> Option<Self> {
        let inner = err.get_ref()?.downcast_ref::<FtpError>()?;
        match inner {
            Self::Canceled => Some(Self::Canceled),
            Self::DeadlineExceeded => Some(Self::DeadlineExceeded),
            _ => None,
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, FtpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_renders_as_reply() {
        let err = FtpError::Rejected(Reply::new(550, "No such file"));
        assert_eq!(err.to_string(), "550 No such file");
        assert_eq!(err.reply().map(|r| r.code()), Some(550));
    }

    #[test]
    fn test_cancellation_round_trips_through_io() {
        let io_err: io::Error = FtpError::Canceled.into();
        assert_eq!(io_err.kind(), io::ErrorKind::Other);
        assert!(matches!(
            FtpError::from_io_cancellation(&io_err),
            Some(FtpError::Canceled)
        ));

        let io_err: io::Error = FtpError::DeadlineExceeded.into();
        assert_eq!(io_err.kind(), io::ErrorKind::TimedOut);
        assert!(
            FtpError::from_io_cancellation(&io_err)
                .is_some_and(|e| e.is_cancellation())
        );
    }

    #[test]
    fn test_plain_io_error_is_not_cancellation() {
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "gone");
        assert!(FtpError::from_io_cancellation(&io_err).is_none());
    }
}
