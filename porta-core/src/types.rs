//! Core data types for Porta

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An identity a user can prove control of, in practice an email address.
///
/// The core never inspects its structure; identities are only compared
/// for exact equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(identity: impl Into<String>) -> Self {
        Identity(identity.into())
    }

    /// Get the identity as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Identity {
    fn from(identity: &str) -> Self {
        Identity::new(identity)
    }
}

/// Public key supplied by the browser, embedded verbatim in certificates.
///
/// Its shape (algorithm tag and parameters) is the relying party's concern;
/// the only requirement here is that it is a JSON object of string values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectPublicKey(BTreeMap<String, String>);

impl SubjectPublicKey {
    /// Parse the wire encoding sent by the browser
    pub fn from_json(encoded: &str) -> crate::Result<Self> {
        serde_json::from_str(encoded).map_err(|e| {
            crate::PortaError::InvalidRequest(format!("malformed public key: {}", e))
        })
    }

    /// Algorithm tag, if the browser supplied one
    pub fn algorithm(&self) -> Option<&str> {
        self.0.get("algorithm").map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SubjectPublicKey {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        SubjectPublicKey(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
