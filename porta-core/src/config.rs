//! Service configuration
//!
//! Porta reads a single TOML file. The `[global]` and `[issuance]` tables are
//! typed here; each `[auth.<name>]` table is kept raw and deserialized by the
//! authenticator that owns it, so only the configured backend's keys are
//! required.

use crate::auth::{EpochUnit, IssuancePolicy};
use crate::{PortaError, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct PortaConfig {
    pub global: GlobalConfig,
    #[serde(default)]
    pub issuance: IssuanceConfig,
    #[serde(default)]
    pub auth: BTreeMap<String, toml::Table>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlobalConfig {
    /// Address the HTTP server binds to
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Domain this provider vouches for; used as the certificate issuer
    pub idp_domain: String,

    /// PEM file holding the `PUBLIC KEY` block
    pub public_key: PathBuf,

    /// PEM file holding the `RSA PRIVATE KEY` block
    pub private_key: PathBuf,

    /// Secret used to authenticate session cookies (32 or 64 bytes)
    pub session_secret_key: String,

    /// Registry name of the authenticator used for logins
    pub auth: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssuanceConfig {
    #[serde(default = "default_clock_skew")]
    pub clock_skew_secs: u64,

    #[serde(default)]
    pub epoch_unit: EpochUnit,

    #[serde(default = "default_max_validity")]
    pub max_validity_secs: u64,
}

impl Default for IssuanceConfig {
    fn default() -> Self {
        Self {
            clock_skew_secs: default_clock_skew(),
            epoch_unit: EpochUnit::default(),
            max_validity_secs: default_max_validity(),
        }
    }
}

impl IssuanceConfig {
    pub fn policy(&self) -> IssuancePolicy {
        IssuancePolicy {
            clock_skew: Duration::from_secs(self.clock_skew_secs),
            epoch_unit: self.epoch_unit,
            max_validity: Duration::from_secs(self.max_validity_secs),
        }
    }
}

/// Upper bound accepted for `max_validity_secs`
pub const MAX_VALIDITY_LIMIT_SECS: u64 = 365 * 24 * 60 * 60;

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_clock_skew() -> u64 {
    10
}

fn default_max_validity() -> u64 {
    24 * 60 * 60
}

impl PortaConfig {
    /// Load and validate a configuration file.
    ///
    /// Relative key paths are resolved against the directory holding the
    /// configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PortaError::Configuration(format!(
                "unable to read configuration file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let mut config = Self::from_toml_str(&content)?;
        if let Some(base) = path.parent() {
            config.global.public_key = resolve(base, &config.global.public_key);
            config.global.private_key = resolve(base, &config.global.private_key);
        }
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PortaConfig = toml::from_str(content)
            .map_err(|e| PortaError::Configuration(format!("malformed configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let global = &self.global;

        if global.idp_domain.trim().is_empty() {
            return Err(PortaError::Configuration("'idp_domain' is empty".into()));
        }
        if global.auth.trim().is_empty() {
            return Err(PortaError::Configuration("'auth' is empty".into()));
        }
        if global.public_key.as_os_str().is_empty() || global.private_key.as_os_str().is_empty() {
            return Err(PortaError::Configuration(
                "'public_key' and 'private_key' must both be set".into(),
            ));
        }

        let secret_len = global.session_secret_key.len();
        if secret_len != 32 && secret_len != 64 {
            return Err(PortaError::Configuration(format!(
                "'session_secret_key' must have a length of 32 or 64 bytes (currently: {})",
                secret_len
            )));
        }

        let issuance = &self.issuance;
        if issuance.max_validity_secs == 0 || issuance.max_validity_secs > MAX_VALIDITY_LIMIT_SECS {
            return Err(PortaError::Configuration(format!(
                "'max_validity_secs' must be between 1 and {} (currently: {})",
                MAX_VALIDITY_LIMIT_SECS, issuance.max_validity_secs
            )));
        }
        if issuance.clock_skew_secs > issuance.max_validity_secs {
            return Err(PortaError::Configuration(
                "'clock_skew_secs' exceeds 'max_validity_secs'".into(),
            ));
        }

        Ok(())
    }

    /// Deserialize the `[auth.<name>]` table into a backend's settings
    pub fn auth_section<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let table = self.auth.get(name).ok_or_else(|| {
            PortaError::Configuration(format!("'[auth.{}]' section missing", name))
        })?;

        toml::Value::Table(table.clone())
            .try_into()
            .map_err(|e| PortaError::Configuration(format!("'[auth.{}]': {}", name, e)))
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}
