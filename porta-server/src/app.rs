//! Application state shared by every connection

use porta_authn::{Authenticator, Registry};
use porta_core::auth::{CertificateIssuer, KeyStore, PublicKeyDescriptor, SessionCodec};
use porta_core::{PortaConfig, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

pub const BROWSERID_PATH: &str = "/.well-known/browserid";
pub const AUTHENTICATION_PATH: &str = "/.well-known/browserid/_porta/authentication";
pub const PROVISIONING_PATH: &str = "/.well-known/browserid/_porta/provisioning";
pub const GENERATE_CERTIFICATE_PATH: &str = "/.well-known/browserid/_porta/generate_certificate";
pub const IS_AUTHENTICATED_PATH: &str = "/.well-known/browserid/_porta/is_authenticated";
pub const HEALTH_PATH: &str = "/health";

/// Document advertising this domain as an identity provider
#[derive(Debug, Clone, Serialize)]
pub struct SupportDocument {
    pub authentication: String,
    pub provisioning: String,
    #[serde(rename = "public-key")]
    pub public_key: PublicKeyDescriptor,
}

impl SupportDocument {
    pub fn new(public_key: PublicKeyDescriptor) -> Self {
        SupportDocument {
            authentication: AUTHENTICATION_PATH.to_string(),
            provisioning: PROVISIONING_PATH.to_string(),
            public_key,
        }
    }
}

pub struct App {
    pub issuer: CertificateIssuer,
    pub authenticator: Arc<dyn Authenticator>,
    pub sessions: SessionCodec,
    pub support: SupportDocument,
    pub listen: String,
}

impl App {
    /// Load keys and build the configured authenticator
    pub fn from_config(config: &PortaConfig, registry: &Registry) -> Result<Self> {
        let global = &config.global;
        let keys = Arc::new(KeyStore::load(&global.private_key, &global.public_key)?);
        info!(key_id = %keys.key_id(), domain = %global.idp_domain, "Signing key loaded");

        let authenticator = registry.build(&global.auth, config)?;
        let issuer =
            CertificateIssuer::new(keys, global.idp_domain.clone(), config.issuance.policy());

        Ok(Self::new(
            issuer,
            authenticator,
            SessionCodec::new(global.session_secret_key.as_bytes()),
            global.listen.clone(),
        ))
    }

    pub fn new(
        issuer: CertificateIssuer,
        authenticator: Arc<dyn Authenticator>,
        sessions: SessionCodec,
        listen: impl Into<String>,
    ) -> Self {
        let support = SupportDocument::new(issuer.keys().public_key_descriptor());
        App {
            issuer,
            authenticator,
            sessions,
            support,
            listen: listen.into(),
        }
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("issuer", &self.issuer.issuer())
            .field("authenticator", &self.authenticator.description())
            .field("listen", &self.listen)
            .finish_non_exhaustive()
    }
}
