//! Certificates checked by an independent RS256 verifier

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use porta_core::auth::*;
use porta_core::test_utils;
use porta_core::{Identity, SubjectPublicKey};
use std::collections::HashSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn browser_key() -> SubjectPublicKey {
    SubjectPublicKey::from_json(r#"{"algorithm":"DS","y":"foobar"}"#).unwrap()
}

fn decoding_key(public_key: &PublicKey) -> DecodingKey {
    DecodingKey::from_rsa_components(
        &URL_SAFE_NO_PAD.encode(public_key.modulus_bytes()),
        &URL_SAFE_NO_PAD.encode(public_key.exponent_bytes()),
    )
    .unwrap()
}

fn lenient_validation() -> Validation {
    // iat/exp are milliseconds, which jsonwebtoken reads as seconds
    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();
    validation
}

#[test]
fn certificate_round_trip() {
    let issuer = test_utils::issuer();
    let before = SystemTime::now();
    let certificate = issuer
        .issue(&Identity::new("user@example.com"), &browser_key(), Duration::from_secs(3600))
        .unwrap();

    let parsed = Certificate::parse(certificate.token(), &test_utils::public_key()).unwrap();
    let claims = parsed.claims();
    assert_eq!(claims.principal.email, "user@example.com");
    assert_eq!(claims.public_key, browser_key());
    assert_eq!(claims.iss, "test.example.com");

    let now_ms = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as u64;
    let before_ms = before.duration_since(UNIX_EPOCH).unwrap().as_millis() as u64;
    assert!(claims.iat <= now_ms);
    assert!(now_ms < claims.exp);
    assert!(claims.exp >= before_ms + 3_600_000);

    let window = claims.exp - claims.iat;
    assert!(window >= 3_610_000 && window < 3_611_000, "window {}", window);
}

#[test]
fn jsonwebtoken_accepts_issued_certificate() {
    let issuer = test_utils::issuer();
    let certificate = issuer
        .issue(&Identity::new("user@example.com"), &browser_key(), Duration::from_secs(3600))
        .unwrap();

    let key = decoding_key(issuer.keys().public_key());
    let data =
        decode::<serde_json::Value>(certificate.token(), &key, &lenient_validation()).unwrap();

    assert_eq!(data.header.alg, Algorithm::RS256);
    assert_eq!(data.claims["principal"]["email"], "user@example.com");
    assert_eq!(data.claims["public-key"]["algorithm"], "DS");
    assert_eq!(data.claims["iss"], "test.example.com");
}

#[test]
fn jsonwebtoken_rejects_foreign_key() {
    let certificate = test_utils::issuer()
        .issue(&Identity::new("user@example.com"), &browser_key(), Duration::from_secs(60))
        .unwrap();

    let other = PublicKey::from_pem(test_utils::OTHER_PUBLIC_KEY_PEM).unwrap();
    let key = decoding_key(&other);
    let result = decode::<serde_json::Value>(certificate.token(), &key, &lenient_validation());
    assert!(result.is_err());
}

#[test]
fn session_login_then_issue() {
    let codec = test_utils::session_codec();
    let cookie = codec
        .seal(&SessionState::authenticated(Identity::new("user@example.com")))
        .unwrap();
    let session = codec.open(&cookie);

    let request = IssuanceRequest::from_fields(
        Some("user@example.com"),
        Some(r#"{"algorithm":"DS","y":"foobar"}"#),
        Some("3600"),
    )
    .unwrap();

    let certificate = authorize_issuance(&session, request)
        .unwrap()
        .issue_with(&test_utils::issuer())
        .unwrap();
    assert_eq!(certificate.claims().principal.email, "user@example.com");
}

#[test]
fn exported_descriptor_verifies_certificates() {
    let issuer = test_utils::issuer();
    let descriptor = issuer.keys().public_key_descriptor();
    assert_eq!(descriptor.algorithm, "RS");
    assert_eq!(descriptor.e, "65537");

    let certificate = issuer
        .issue(&Identity::new("user@example.com"), &browser_key(), Duration::from_secs(60))
        .unwrap();
    assert!(Certificate::parse(certificate.token(), issuer.keys().public_key()).is_ok());
}

#[test]
fn oversized_max_validity_is_refused_at_load() {
    let section = "[issuance]\nmax_validity_secs = 9223372036854775807";
    let toml = test_utils::config_toml("static", section);
    let err = porta_core::PortaConfig::from_toml_str(&toml).unwrap_err();
    assert!(matches!(err, porta_core::PortaError::Configuration(_)));
}

#[test]
fn huge_cert_duration_is_rejected_without_panicking() {
    let policy = IssuancePolicy {
        max_validity: Duration::MAX,
        ..IssuancePolicy::default()
    };
    let issuer = CertificateIssuer::new(test_utils::key_store(), test_utils::IDP_DOMAIN, policy);
    let session = SessionState::authenticated(Identity::new("user@example.com"));

    let request = IssuanceRequest::from_fields(
        Some("user@example.com"),
        Some(r#"{"algorithm":"DS","y":"foobar"}"#),
        Some("9223372036854775000"),
    )
    .unwrap();

    let err = authorize_issuance(&session, request)
        .unwrap()
        .issue_with(&issuer)
        .unwrap_err();
    assert!(matches!(err, porta_core::PortaError::InvalidRequest(_)), "{}", err);
}
