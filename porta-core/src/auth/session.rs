//! Client-side session state
//!
//! Sessions live entirely in a cookie: `base64url(json) "." base64url(mac)`.
//! The MAC is a BLAKE3 keyed hash whose key is derived from the configured
//! session secret. Anything that fails to decode or authenticate is treated
//! as an empty session.

use crate::auth::timing::constant_time_compare;
use crate::{Identity, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Cookie carrying the session
pub const SESSION_COOKIE: &str = "persona-auth";

const KEY_CONTEXT: &str = "porta 2024-01-01 session cookie mac";

/// What the provider remembers about a browser between requests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Set only after a successful verify for exactly this identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticated_as: Option<Identity>,
}

impl SessionState {
    pub fn authenticated(identity: Identity) -> Self {
        SessionState {
            authenticated_as: Some(identity),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated_as.is_some()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.authenticated_as.as_ref()
    }

    pub fn sign_in(&mut self, identity: Identity) {
        self.authenticated_as = Some(identity);
    }

    pub fn sign_out(&mut self) {
        self.authenticated_as = None;
    }
}

/// Seals and opens session cookies
#[derive(Clone)]
pub struct SessionCodec {
    key: [u8; 32],
}

impl SessionCodec {
    pub fn new(secret: &[u8]) -> Self {
        SessionCodec {
            key: blake3::derive_key(KEY_CONTEXT, secret),
        }
    }

    /// Encode a session into a cookie value
    pub fn seal(&self, state: &SessionState) -> Result<String> {
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(state)?);
        let mac = blake3::keyed_hash(&self.key, payload.as_bytes());
        Ok(format!("{}.{}", payload, URL_SAFE_NO_PAD.encode(mac.as_bytes())))
    }

    /// Decode a cookie value; tampered or malformed input yields an empty session
    pub fn open(&self, cookie: &str) -> SessionState {
        match self.try_open(cookie) {
            Some(state) => state,
            None => {
                debug!("Discarding session cookie that failed authentication");
                SessionState::default()
            }
        }
    }

    fn try_open(&self, cookie: &str) -> Option<SessionState> {
        let (payload, mac) = cookie.split_once('.')?;
        let mac = URL_SAFE_NO_PAD.decode(mac).ok()?;
        let expected = blake3::keyed_hash(&self.key, payload.as_bytes());

        if !constant_time_compare(expected.as_bytes(), &mac) {
            return None;
        }

        let json = URL_SAFE_NO_PAD.decode(payload).ok()?;
        serde_json::from_slice(&json).ok()
    }
}

impl std::fmt::Debug for SessionCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCodec").finish_non_exhaustive()
    }
}
