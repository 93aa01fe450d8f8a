//! Shared-secret backend for development and tests

use crate::authenticator::Authenticator;
use async_trait::async_trait;
use porta_core::auth::constant_time_str_compare;
use porta_core::{PortaConfig, PortaError, Result};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// `[auth.static]`
#[derive(Debug, Clone, Deserialize)]
pub struct StaticSecretSettings {
    pub shared_secret: String,
}

/// Accepts any identity presenting the configured secret
pub struct StaticSecretAuthenticator {
    secret: String,
}

impl StaticSecretAuthenticator {
    pub const NAME: &'static str = "static";

    pub fn new(settings: StaticSecretSettings) -> Result<Self> {
        if settings.shared_secret.is_empty() {
            return Err(PortaError::Configuration("'[auth.static]' shared_secret is empty".into()));
        }

        warn!(
            "Static shared-secret authenticator enabled: every identity accepts the same password, \
             do not use in production"
        );
        Ok(StaticSecretAuthenticator {
            secret: settings.shared_secret,
        })
    }

    pub fn from_config(config: &PortaConfig) -> Result<Arc<dyn Authenticator>> {
        let settings = config.auth_section::<StaticSecretSettings>(Self::NAME)?;
        Ok(Arc::new(Self::new(settings)?))
    }
}

#[async_trait]
impl Authenticator for StaticSecretAuthenticator {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn verify(&self, identity: &str, secret: &str) -> Result<()> {
        if constant_time_str_compare(secret, &self.secret) {
            debug!(identity, "Shared secret accepted");
            Ok(())
        } else {
            Err(PortaError::AuthenticationFailed("invalid credentials".into()))
        }
    }
}

impl std::fmt::Debug for StaticSecretAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticSecretAuthenticator").finish_non_exhaustive()
    }
}
