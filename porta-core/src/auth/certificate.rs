//! Identity certificates
//!
//! A certificate is a JWS compact token signed RS256 by the provider's key.
//! Its claims bind the browser-supplied public key to an authenticated
//! identity for a bounded window:
//!
//! - `iat`: issue time, backdated by the clock-skew allowance
//! - `exp`: expiry time
//! - `iss`: issuer (the provider's domain)
//! - `public-key`: the browser's public key, verbatim
//! - `principal`: `{ "email": <identity> }`

use crate::auth::{KeyStore, PublicKey};
use crate::{Identity, PortaError, Result, SubjectPublicKey};
use jsonwebtoken::{decode, encode, Algorithm, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error};

/// JWS algorithm tag of issued certificates
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::RS256;

/// Unit of the `iat` and `exp` claims
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpochUnit {
    Seconds,
    #[default]
    Milliseconds,
}

impl EpochUnit {
    /// Encode a point in time as an epoch timestamp
    pub fn encode(self, time: SystemTime) -> Result<u64> {
        let since_epoch = time
            .duration_since(UNIX_EPOCH)
            .map_err(|_| PortaError::Signing("system clock is before the UNIX epoch".into()))?;

        match self {
            EpochUnit::Seconds => Ok(since_epoch.as_secs()),
            EpochUnit::Milliseconds => u64::try_from(since_epoch.as_millis())
                .map_err(|_| PortaError::InvalidRequest("timestamp out of range".into())),
        }
    }

    /// Point in time of an epoch timestamp, `None` if the platform cannot represent it
    pub fn decode(self, timestamp: u64) -> Option<SystemTime> {
        let since_epoch = match self {
            EpochUnit::Seconds => Duration::from_secs(timestamp),
            EpochUnit::Milliseconds => Duration::from_millis(timestamp),
        };
        UNIX_EPOCH.checked_add(since_epoch)
    }
}

/// Time-related issuance constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssuancePolicy {
    /// How far `iat` is backdated to tolerate relying-party clock drift
    pub clock_skew: Duration,
    pub epoch_unit: EpochUnit,
    /// Longest validity a caller may request
    pub max_validity: Duration,
}

impl Default for IssuancePolicy {
    fn default() -> Self {
        IssuancePolicy {
            clock_skew: Duration::from_secs(10),
            epoch_unit: EpochUnit::Milliseconds,
            max_validity: Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub email: String,
}

/// Claim set of an identity certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateClaims {
    pub iat: u64,
    pub exp: u64,
    pub iss: String,
    #[serde(rename = "public-key")]
    pub public_key: SubjectPublicKey,
    pub principal: Principal,
}

/// A signed certificate
#[derive(Debug, Clone)]
pub struct Certificate {
    token: String,
    claims: CertificateClaims,
}

impl Certificate {
    /// Parse a token and verify its signature against `public_key`
    ///
    /// Expiry is not checked here since `exp` may be in milliseconds; use
    /// [`is_valid_at`](Self::is_valid_at).
    pub fn parse(token: &str, public_key: &PublicKey) -> Result<Self> {
        let data = decode::<CertificateClaims>(token, &public_key.decoding_key(), &validation())
            .map_err(|e| PortaError::InvalidRequest(format!("invalid certificate: {}", e)))?;

        Ok(Certificate {
            token: token.to_string(),
            claims: data.claims,
        })
    }

    /// Get the token string
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn into_token(self) -> String {
        self.token
    }

    pub fn claims(&self) -> &CertificateClaims {
        &self.claims
    }

    /// Check if the certificate is valid at `now`
    pub fn is_valid_at(&self, now: SystemTime, unit: EpochUnit) -> bool {
        let not_before = unit.decode(self.claims.iat).is_some_and(|iat| now >= iat);
        // An expiry past the representable range never passes
        let not_after = unit.decode(self.claims.exp).map_or(true, |exp| now < exp);
        not_before && not_after
    }
}

/// Signs certificates with the provider's key
#[derive(Debug, Clone)]
pub struct CertificateIssuer {
    keys: Arc<KeyStore>,
    issuer: String,
    policy: IssuancePolicy,
}

impl CertificateIssuer {
    pub fn new(keys: Arc<KeyStore>, issuer: impl Into<String>, policy: IssuancePolicy) -> Self {
        CertificateIssuer {
            keys,
            issuer: issuer.into(),
            policy,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn policy(&self) -> &IssuancePolicy {
        &self.policy
    }

    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    /// Create and sign a certificate for `identity` valid for `validity`
    pub fn issue(
        &self,
        identity: &Identity,
        public_key: &SubjectPublicKey,
        validity: Duration,
    ) -> Result<Certificate> {
        self.issue_at(identity, public_key, validity, SystemTime::now())
    }

    /// Same as [`issue`](Self::issue) with an explicit clock reading
    pub fn issue_at(
        &self,
        identity: &Identity,
        public_key: &SubjectPublicKey,
        validity: Duration,
        now: SystemTime,
    ) -> Result<Certificate> {
        if validity.is_zero() {
            return Err(PortaError::InvalidRequest("certificate duration must be positive".into()));
        }
        if validity > self.policy.max_validity {
            return Err(PortaError::InvalidRequest(format!(
                "certificate duration exceeds {} seconds",
                self.policy.max_validity.as_secs()
            )));
        }

        let issued_at = now
            .checked_sub(self.policy.clock_skew)
            .ok_or_else(|| PortaError::Signing("system clock out of range".into()))?;
        let expires_at = now
            .checked_add(validity)
            .ok_or_else(|| PortaError::InvalidRequest("certificate expiry out of range".into()))?;

        let unit = self.policy.epoch_unit;
        let claims = CertificateClaims {
            iat: unit.encode(issued_at)?,
            exp: unit.encode(expires_at)?,
            iss: self.issuer.clone(),
            public_key: public_key.clone(),
            principal: Principal {
                email: identity.as_str().to_string(),
            },
        };

        let token = self.sign_claims(&claims).map_err(|e| {
            error!(identity = %identity, error = %e, "Certificate signing failed");
            e
        })?;

        debug!(identity = %identity, validity_secs = validity.as_secs(), "Issued certificate");
        Ok(Certificate { token, claims })
    }

    fn sign_claims(&self, claims: &CertificateClaims) -> Result<String> {
        encode(&Header::new(SIGNING_ALGORITHM), claims, self.keys.encoding_key())
            .map_err(|e| PortaError::Signing(e.to_string()))
    }
}

/// Signature and algorithm checks only; timestamps are interpreted by the caller
fn validation() -> Validation {
    let mut validation = Validation::new(SIGNING_ALGORITHM);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();
    validation
}
