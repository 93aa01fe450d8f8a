//! The authenticator contract

use async_trait::async_trait;
use porta_core::Result;

/// Trait for credential verification backends
///
/// Implementations are built once at startup and shared across every login
/// request, so `verify` takes `&self` and must be safe to call concurrently.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Registry name of this backend
    fn name(&self) -> &'static str;

    /// Check that `secret` proves control of `identity`
    ///
    /// # Returns
    /// * `Ok(())` - The credentials are valid
    /// * `Err(PortaError::AuthenticationFailed)` - The backend rejected them
    /// * `Err(PortaError::Network)` - The backend could not be reached
    async fn verify(&self, identity: &str, secret: &str) -> Result<()>;

    /// Get a description of this backend (for logging)
    fn description(&self) -> String {
        self.name().to_string()
    }
}
