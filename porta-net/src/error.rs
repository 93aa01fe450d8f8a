//! Error types for the IMAP client

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImapError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} timed out after {1:?}")]
    Timeout(&'static str, Duration),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Tagged `NO`; carries the server's text
    #[error("Rejected by server: {0}")]
    Rejected(String),

    #[error("Server closed the session: {0}")]
    Bye(String),

    #[error("Server advertises LOGINDISABLED")]
    LoginDisabled,

    #[error("Response line exceeds {0} bytes")]
    LineTooLong(usize),
}

impl ImapError {
    /// Whether the server refused the credentials, as opposed to the
    /// exchange itself failing
    pub fn is_rejection(&self) -> bool {
        matches!(self, ImapError::Rejected(_))
    }
}

/// Result type alias for IMAP operations
pub type Result<T> = std::result::Result<T, ImapError>;
