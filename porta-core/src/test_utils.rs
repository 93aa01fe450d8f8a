//! Fixtures shared by Porta's test suites
//!
//! Key material comes from the repository's `testdata/` directory.

use crate::auth::{CertificateIssuer, IssuancePolicy, KeyStore, PublicKey, SessionCodec};
use crate::PortaConfig;
use std::path::PathBuf;
use std::sync::Arc;

pub const PRIVATE_KEY_PEM: &[u8] = include_bytes!("../../testdata/private_key.pem");
pub const PUBLIC_KEY_PEM: &[u8] = include_bytes!("../../testdata/public_key.pem");
pub const OTHER_PUBLIC_KEY_PEM: &[u8] = include_bytes!("../../testdata/other_public_key.pem");

pub const SESSION_SECRET: &str = "0123456789abcdef0123456789abcdef";
pub const SHARED_SECRET: &str = "secretpasswordfortests";
pub const IDP_DOMAIN: &str = "test.example.com";

/// Absolute path of a file under `testdata/`
pub fn testdata_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("testdata")
        .join(name)
}

pub fn key_store() -> Arc<KeyStore> {
    Arc::new(KeyStore::from_pem(PRIVATE_KEY_PEM, PUBLIC_KEY_PEM).expect("fixture key pair"))
}

pub fn public_key() -> PublicKey {
    PublicKey::from_pem(PUBLIC_KEY_PEM).expect("fixture public key")
}

pub fn issuer() -> CertificateIssuer {
    CertificateIssuer::new(key_store(), IDP_DOMAIN, IssuancePolicy::default())
}

pub fn session_codec() -> SessionCodec {
    SessionCodec::new(SESSION_SECRET.as_bytes())
}

/// Configuration text using the fixture keys, `auth` as the primary
/// authenticator and `extra` appended verbatim.
pub fn config_toml(auth: &str, extra: &str) -> String {
    format!(
        r#"
[global]
idp_domain = "{domain}"
public_key = "{public}"
private_key = "{private}"
session_secret_key = "{secret}"
auth = "{auth}"

[auth.static]
shared_secret = "{shared}"
{extra}
"#,
        domain = IDP_DOMAIN,
        public = testdata_path("public_key.pem").display(),
        private = testdata_path("private_key.pem").display(),
        secret = SESSION_SECRET,
        auth = auth,
        shared = SHARED_SECRET,
        extra = extra,
    )
}

pub fn config(auth: &str, extra: &str) -> PortaConfig {
    PortaConfig::from_toml_str(&config_toml(auth, extra)).expect("fixture configuration")
}
