//! Pluggable credential verification for Porta
//!
//! Backends implement [`Authenticator`]; a [`Registry`] maps configuration
//! names to their constructors.

pub mod authenticator;
pub mod imap;
pub mod registry;
pub mod static_secret;

pub use authenticator::*;
pub use imap::{ImapAuthenticator, ImapSettings};
pub use registry::*;
pub use static_secret::{StaticSecretAuthenticator, StaticSecretSettings};
