//! Authenticator registry
//!
//! An immutable name → constructor table built at startup. Adding a backend
//! is one [`Registry::with`] call.

use crate::authenticator::Authenticator;
use crate::imap::ImapAuthenticator;
use crate::static_secret::StaticSecretAuthenticator;
use porta_core::{PortaConfig, PortaError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Builds a backend from the shared configuration without doing I/O
pub type AuthenticatorFactory = fn(&PortaConfig) -> Result<Arc<dyn Authenticator>>;

#[derive(Clone, Default)]
pub struct Registry {
    factories: BTreeMap<&'static str, AuthenticatorFactory>,
}

impl Registry {
    /// Create a registry with no backends
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with every backend shipped in this crate
    pub fn builtin() -> Self {
        Self::empty()
            .with(StaticSecretAuthenticator::NAME, StaticSecretAuthenticator::from_config)
            .with(ImapAuthenticator::NAME, ImapAuthenticator::from_config)
    }

    /// Add (or replace) a backend
    pub fn with(mut self, name: &'static str, factory: AuthenticatorFactory) -> Self {
        self.factories.insert(name, factory);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    /// Construct the backend registered as `name`
    pub fn build(&self, name: &str, config: &PortaConfig) -> Result<Arc<dyn Authenticator>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| PortaError::AuthenticatorNotFound(name.to_string()))?;

        let authenticator = factory(config)?;
        info!(name, description = %authenticator.description(), "Authenticator ready");
        Ok(authenticator)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("names", &self.names()).finish()
    }
}
