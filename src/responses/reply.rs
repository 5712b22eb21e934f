//! FTP reply value type

use super::status_codes;

/// A complete reply from the server
///
/// Multi-line replies carry their lines joined with `\n`, without the
/// continuation markers and without the code echoed on the final line.
/// A reply never changes once read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reply {
    code: u16,
    message: String,
}

impl Reply {
    /// Create a new reply
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Reply code (e.g., 220, 331, 550)
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Reply text following the code
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 1xx: the action is being started, expect another reply
    pub fn is_positive_preliminary(&self) -> bool {
        status_codes::is_preliminary(self.code)
    }

    /// 2xx: the requested action completed successfully
    pub fn is_positive_complete(&self) -> bool {
        status_codes::is_success(self.code)
    }

    /// 3xx: the command was accepted but more information is needed
    pub fn is_positive_intermediate(&self) -> bool {
        status_codes::is_intermediate(self.code)
    }

    /// 1xx, 2xx or 3xx: the command did not fail outright
    pub fn is_positive(&self) -> bool {
        self.is_positive_preliminary()
            || self.is_positive_complete()
            || self.is_positive_intermediate()
    }

    /// 4xx: the command failed but may succeed if retried
    pub fn is_transient_negative(&self) -> bool {
        status_codes::is_transient_error(self.code)
    }

    /// 5xx: the command failed and should not be retried as is
    pub fn is_permanent_negative(&self) -> bool {
        status_codes::is_permanent_error(self.code)
    }
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code, self.message)
    }
}

impl std::error::Error for Reply {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_reply() {
        let reply = Reply::new(200, "Command okay");
        assert_eq!(reply.code(), 200);
        assert_eq!(reply.message(), "Command okay");
        assert!(reply.is_positive_complete());
        assert!(reply.is_positive());
        assert!(!reply.is_positive_preliminary());
        assert!(!reply.is_positive_intermediate());
    }

    #[test]
    fn test_preliminary_replies() {
        for code in 100..200 {
            let reply = Reply::new(code, "");
            assert!(reply.is_positive_preliminary());
            assert!(!reply.is_positive_complete());
            assert!(!reply.is_positive_intermediate());
            assert!(reply.is_positive());
        }
    }

    #[test]
    fn test_intermediate_reply() {
        let reply = Reply::new(331, "User name okay, need password");
        assert!(reply.is_positive_intermediate());
        assert!(reply.is_positive());
        assert!(!reply.is_positive_complete());
    }

    #[test]
    fn test_negative_replies_are_not_positive() {
        for code in 400..600 {
            let reply = Reply::new(code, "");
            assert!(!reply.is_positive());
            assert!(!reply.is_positive_preliminary());
            assert!(!reply.is_positive_complete());
            assert!(!reply.is_positive_intermediate());
        }
        assert!(Reply::new(421, "").is_transient_negative());
        assert!(Reply::new(550, "").is_permanent_negative());
    }

    #[test]
    fn test_reply_renders_as_error() {
        let reply = Reply::new(500, "Error");
        assert_eq!(reply.to_string(), "500 Error");

        let err: Box<dyn std::error::Error> = Box::new(reply);
        assert_eq!(err.to_string(), "500 Error");
    }
}
