//! Issuance authorization
//!
//! A certificate may only be minted for the identity the caller proved in
//! the same session. [`authorize_issuance`] is the only way to obtain an
//! [`AuthorizedIssuance`], and only an `AuthorizedIssuance` can reach the
//! issuer, so the check cannot be skipped.

use crate::auth::certificate::{Certificate, CertificateIssuer};
use crate::auth::session::SessionState;
use crate::auth::timing::constant_time_str_compare;
use crate::{Identity, PortaError, Result, SubjectPublicKey};
use std::time::Duration;
use tracing::{info, warn};

/// Fields of a certificate request, parsed from the form body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuanceRequest {
    pub identity: Identity,
    pub public_key: SubjectPublicKey,
    pub validity: Duration,
}

impl IssuanceRequest {
    /// Parse raw form values. Empty values count as missing.
    ///
    /// Malformed values are reported before missing ones.
    pub fn from_fields(
        email: Option<&str>,
        public_key: Option<&str>,
        cert_duration: Option<&str>,
    ) -> Result<Self> {
        let email = non_empty(email);
        let public_key = non_empty(public_key).map(SubjectPublicKey::from_json).transpose()?;
        let validity = non_empty(cert_duration).map(parse_duration).transpose()?;

        let identity = email.ok_or_else(|| missing("email"))?;
        let public_key = public_key.ok_or_else(|| missing("public_key"))?;
        let validity = validity.ok_or_else(|| missing("cert_duration"))?;

        Ok(IssuanceRequest {
            identity: Identity::new(identity),
            public_key,
            validity,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn missing(field: &str) -> PortaError {
    PortaError::InvalidRequest(format!("'{}' is required", field))
}

fn parse_duration(value: &str) -> Result<Duration> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(PortaError::InvalidRequest(format!(
            "'cert_duration' must be a positive number of seconds, got {:?}",
            value
        ))),
    }
}

/// A request that passed the session check
#[derive(Debug)]
pub struct AuthorizedIssuance {
    request: IssuanceRequest,
}

impl AuthorizedIssuance {
    pub fn identity(&self) -> &Identity {
        &self.request.identity
    }

    pub fn request(&self) -> &IssuanceRequest {
        &self.request
    }

    /// Sign the certificate
    pub fn issue_with(self, issuer: &CertificateIssuer) -> Result<Certificate> {
        let IssuanceRequest {
            identity,
            public_key,
            validity,
        } = self.request;
        issuer.issue(&identity, &public_key, validity)
    }
}

/// Check that the session proved the identity being certified
pub fn authorize_issuance(
    session: &SessionState,
    request: IssuanceRequest,
) -> Result<AuthorizedIssuance> {
    let Some(proven) = session.identity() else {
        warn!(
            requested = %request.identity,
            "Certificate requested without an authenticated session"
        );
        return Err(PortaError::AuthorizationDenied);
    };

    if !constant_time_str_compare(proven.as_str(), request.identity.as_str()) {
        warn!(
            session = %proven,
            requested = %request.identity,
            "Certificate requested for an identity other than the session's"
        );
        return Err(PortaError::AuthorizationDenied);
    }

    info!(identity = %request.identity, "Certificate issuance authorized");
    Ok(AuthorizedIssuance { request })
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = r#"{"algorithm":"DS","y":"foobar"}"#;

    fn request(email: &str) -> IssuanceRequest {
        IssuanceRequest::from_fields(Some(email), Some(KEY), Some("3600")).unwrap()
    }

    #[test]
    fn parses_complete_request() {
        let request = request("user@example.com");
        assert_eq!(request.identity.as_str(), "user@example.com");
        assert_eq!(request.public_key.algorithm(), Some("DS"));
        assert_eq!(request.validity, Duration::from_secs(3600));
    }

    #[test]
    fn missing_fields_are_rejected() {
        let cases = [
            (None, Some(KEY), Some("3600")),
            (Some("user@example.com"), None, Some("3600")),
            (Some("user@example.com"), Some(KEY), None),
            (Some("user@example.com"), Some(""), Some("3600")),
        ];
        for (email, key, duration) in cases {
            let err = IssuanceRequest::from_fields(email, key, duration).unwrap_err();
            assert!(matches!(err, PortaError::InvalidRequest(_)), "{:?}", err);
        }
    }

    #[test]
    fn malformed_fields_are_rejected() {
        let malformed_key = IssuanceRequest::from_fields(
            Some("a@b.c"),
            Some("this is a malformed JSON string"),
            Some("3600"),
        );
        assert!(matches!(malformed_key, Err(PortaError::InvalidRequest(_))));

        for duration in ["abc", "0", "-5", "1.5"] {
            let err =
                IssuanceRequest::from_fields(Some("a@b.c"), Some(KEY), Some(duration)).unwrap_err();
            assert!(err.to_string().contains("cert_duration"), "{}", err);
        }
    }

    #[test]
    fn malformed_reported_before_missing() {
        let err = IssuanceRequest::from_fields(None, Some("{"), None).unwrap_err();
        assert!(err.to_string().contains("malformed public key"), "{}", err);
    }

    #[test]
    fn denies_without_session() {
        let err =
            authorize_issuance(&SessionState::default(), request("user@example.com")).unwrap_err();
        assert!(matches!(err, PortaError::AuthorizationDenied));
    }

    #[test]
    fn denies_other_identity() {
        let session = SessionState::authenticated(Identity::new("user@example.com"));
        let err = authorize_issuance(&session, request("other@example.com")).unwrap_err();
        assert!(matches!(err, PortaError::AuthorizationDenied));
    }

    #[test]
    fn allows_session_identity() {
        let session = SessionState::authenticated(Identity::new("user@example.com"));
        let authorized = authorize_issuance(&session, request("user@example.com")).unwrap();
        assert_eq!(authorized.identity().as_str(), "user@example.com");
    }
}
