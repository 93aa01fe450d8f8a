//! Authentication and issuance module for Porta
//!
//! This module implements the signing plane with:
//! - RSA key loading and the exported public-key descriptor
//! - RS256 identity certificates
//! - Signed client-side sessions
//! - The session-bound issuance gate
//! - Constant-time comparisons

pub mod keys;
pub mod certificate;
pub mod session;
pub mod gate;
pub mod timing;

pub use keys::*;
pub use certificate::*;
pub use session::*;
pub use gate::*;
pub use timing::*;
