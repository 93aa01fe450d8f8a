//! Mailbox backend: credentials are checked with an IMAP `LOGIN`
//!
//! Each verify opens a fresh connection and walks it through
//!
//! ```text
//! Connected -> CapabilitiesKnown -> EncryptionNegotiated | PlaintextContinue
//!           -> Authenticated | Rejected
//! ```
//!
//! STARTTLS is negotiated whenever the server advertises it, and a failed
//! upgrade ends the attempt before any credential is sent.

use crate::authenticator::Authenticator;
use async_trait::async_trait;
use porta_core::{PortaConfig, PortaError, Result};
use porta_net::{
    connector, server_name, CertificatePolicy, ImapClient, ImapError, SessionState,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

pub const DEFAULT_IMAP_PORT: u16 = 143;

/// `[auth.imap]`
#[derive(Debug, Clone, Deserialize)]
pub struct ImapSettings {
    /// `host[:port]`
    pub server_address: String,

    #[serde(default = "default_verify")]
    pub verify_transport_cert: bool,

    #[serde(default = "default_io_timeout")]
    pub io_timeout_secs: u64,

    #[serde(default = "default_logout_timeout")]
    pub logout_timeout_secs: u64,
}

fn default_verify() -> bool {
    true
}

fn default_io_timeout() -> u64 {
    10
}

fn default_logout_timeout() -> u64 {
    30
}

/// Progress of one verification attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Connected,
    CapabilitiesKnown,
    EncryptionNegotiated,
    PlaintextContinue,
    Authenticated,
    Rejected,
}

pub struct ImapAuthenticator {
    address: String,
    server_name: ServerName<'static>,
    policy: CertificatePolicy,
    connector: TlsConnector,
    io_timeout: Duration,
    logout_timeout: Duration,
}

impl ImapAuthenticator {
    pub const NAME: &'static str = "imap";

    /// Validate settings and prepare the TLS connector. No I/O happens here.
    pub fn new(settings: ImapSettings) -> Result<Self> {
        let (host, port) = parse_server_address(&settings.server_address)?;
        if settings.io_timeout_secs == 0 || settings.logout_timeout_secs == 0 {
            return Err(PortaError::Configuration("'[auth.imap]' timeouts must be positive".into()));
        }

        let policy = CertificatePolicy::from_verify_flag(settings.verify_transport_cert);
        if policy == CertificatePolicy::SkipVerify {
            warn!(
                server = %settings.server_address,
                "IMAP server certificate verification is disabled"
            );
        }

        let connector = connector(policy).map_err(|e| PortaError::Configuration(e.to_string()))?;
        let server_name = server_name(&host).map_err(|e| PortaError::Configuration(e.to_string()))?;

        Ok(ImapAuthenticator {
            address: join_host_port(&host, port),
            server_name,
            policy,
            connector,
            io_timeout: Duration::from_secs(settings.io_timeout_secs),
            logout_timeout: Duration::from_secs(settings.logout_timeout_secs),
        })
    }

    pub fn from_config(config: &PortaConfig) -> Result<Arc<dyn Authenticator>> {
        let settings = config.auth_section::<ImapSettings>(Self::NAME)?;
        Ok(Arc::new(Self::new(settings)?))
    }

    /// Replace the TLS connector, e.g. to trust a private CA
    pub fn with_connector(mut self, connector: TlsConnector) -> Self {
        self.connector = connector;
        self
    }

    /// `host:port` that verify dials
    pub fn address(&self) -> &str {
        &self.address
    }

    fn network(&self, stage: Stage, error: ImapError) -> PortaError {
        warn!(server = %self.address, ?stage, error = %error, "IMAP exchange failed");
        PortaError::Network(format!("{}: {}", self.address, error))
    }

    async fn attempt(&self, identity: &str, secret: &str) -> Result<ImapClient> {
        let mut client = ImapClient::connect(&self.address, self.io_timeout)
            .await
            .map_err(|e| self.network(Stage::Connected, e))?;

        if client.state() != SessionState::NotAuthenticated {
            // Nothing left to prove the secret against
            let _ = client.logout(self.logout_timeout).await;
            return Err(PortaError::AuthenticationFailed(
                "server pre-authenticated the session; credentials cannot be checked".into(),
            ));
        }

        let starttls = client
            .capabilities()
            .await
            .map_err(|e| self.network(Stage::Connected, e))?
            .supports_starttls();

        let mut stage = Stage::CapabilitiesKnown;
        if starttls {
            client = client
                .starttls(&self.connector, self.server_name.clone())
                .await
                .map_err(|e| self.network(stage, e))?;
            client.capability().await.map_err(|e| self.network(stage, e))?;
            stage = Stage::EncryptionNegotiated;
        } else {
            stage = Stage::PlaintextContinue;
        }
        debug!(server = %self.address, ?stage, "Ready to authenticate");

        match client.login(identity, secret).await {
            Ok(()) => Ok(client),
            Err(ImapError::Rejected(text)) => {
                debug!(server = %self.address, stage = ?Stage::Rejected, "LOGIN rejected");
                let _ = client.logout(self.logout_timeout).await;
                Err(PortaError::AuthenticationFailed(text))
            }
            Err(e) => Err(self.network(stage, e)),
        }
    }
}

#[async_trait]
impl Authenticator for ImapAuthenticator {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn verify(&self, identity: &str, secret: &str) -> Result<()> {
        let mut client = self.attempt(identity, secret).await?;
        info!(
            identity,
            server = %self.address,
            stage = ?Stage::Authenticated,
            "IMAP login succeeded"
        );

        if let Err(e) = client.logout(self.logout_timeout).await {
            debug!(server = %self.address, error = %e, "LOGOUT failed after successful login");
        }
        Ok(())
    }

    fn description(&self) -> String {
        format!("imap://{} ({:?})", self.address, self.policy)
    }
}

impl std::fmt::Debug for ImapAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapAuthenticator")
            .field("address", &self.address)
            .field("policy", &self.policy)
            .field("io_timeout", &self.io_timeout)
            .field("logout_timeout", &self.logout_timeout)
            .finish_non_exhaustive()
    }
}

/// Split `host[:port]`, defaulting the port to 143.
///
/// IPv6 literals need brackets when a port is given (`[::1]:993`); a bare
/// address with several colons is taken as a host without port.
pub fn parse_server_address(address: &str) -> Result<(String, u16)> {
    let address = address.trim();
    let invalid = || {
        PortaError::Configuration(format!("'[auth.imap]' invalid server_address {:?}", address))
    };

    if address.is_empty() {
        return Err(invalid());
    }

    if let Some(rest) = address.strip_prefix('[') {
        let (host, after) = rest.split_once(']').ok_or_else(invalid)?;
        if host.is_empty() {
            return Err(invalid());
        }
        let port = match after {
            "" => DEFAULT_IMAP_PORT,
            _ => after.strip_prefix(':').and_then(|p| p.parse().ok()).ok_or_else(invalid)?,
        };
        return Ok((host.to_string(), port));
    }

    match address.rsplit_once(':') {
        Some((host, _)) if host.contains(':') => Ok((address.to_string(), DEFAULT_IMAP_PORT)),
        Some((host, port)) if !host.is_empty() => {
            let port = port.parse().map_err(|_| invalid())?;
            Ok((host.to_string(), port))
        }
        Some(_) => Err(invalid()),
        None => Ok((address.to_string(), DEFAULT_IMAP_PORT)),
    }
}

fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}
