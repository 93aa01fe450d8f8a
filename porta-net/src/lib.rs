//! Minimal async IMAP client for credential checks
//!
//! Covers the part of IMAP4rev1 needed to test a username and password
//! against a mail server: greeting, `CAPABILITY`, `STARTTLS`, `LOGIN` and
//! `LOGOUT`. Mailbox access is out of scope.

pub mod client;
pub mod error;
pub mod protocol;
pub mod tls;
pub mod wire;

#[cfg(any(test, feature = "test-utils"))]
pub mod testutil;

pub use client::*;
pub use error::*;
pub use protocol::*;
pub use tls::*;
pub use wire::*;
