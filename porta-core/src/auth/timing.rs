//! Constant-time comparisons
//!
//! Secrets, session MACs and identities are compared without early exit so
//! that response timing does not reveal how much of a guess was right.

use subtle::ConstantTimeEq;

/// Constant-time byte comparison
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.ct_eq(b).into()
}

/// Constant-time string comparison (for secrets, identities, etc.)
pub fn constant_time_str_compare(a: &str, b: &str) -> bool {
    constant_time_compare(a.as_bytes(), b.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compares_equal_and_unequal_bytes() {
        assert!(constant_time_compare(&[1u8; 32], &[1u8; 32]));
        assert!(!constant_time_compare(&[1u8; 32], &[2u8; 32]));
    }

    #[test]
    fn length_mismatch_is_unequal() {
        assert!(!constant_time_compare(b"secret", b"secret!"));
        assert!(!constant_time_str_compare("", "x"));
        assert!(constant_time_str_compare("", ""));
    }

    #[test]
    fn string_comparison_is_exact() {
        assert!(constant_time_str_compare("user@example.com", "user@example.com"));
        assert!(!constant_time_str_compare("user@example.com", "User@example.com"));
    }
}
