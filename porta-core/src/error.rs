//! Error types for Porta

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PortaError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Key material error: {0}")]
    KeyMaterial(String),

    #[error("Authenticator '{0}' does not exist")]
    AuthenticatorNotFound(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authorization denied")]
    AuthorizationDenied,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PortaError {
    /// Whether a caller may reasonably retry the operation later.
    ///
    /// Only backend transport failures qualify; a rejected credential or a
    /// denied issuance will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PortaError::Network(_) | PortaError::Io(_))
    }
}
