//! Property-based tests for Porta core

use porta_core::auth::*;
use porta_core::test_utils;
use porta_core::{Identity, PortaError};
use proptest::prelude::*;

const KEY: &str = r#"{"algorithm":"DS","y":"foobar"}"#;

fn identity_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9._%+-]{1,16}@[a-z0-9-]{1,12}\\.[a-z]{2,6}"
}

proptest! {
    #[test]
    fn props_gate_allows_only_session_identity(
        proven in identity_strategy(),
        requested in identity_strategy(),
    ) {
        let session = SessionState::authenticated(Identity::new(proven.clone()));
        let request =
            IssuanceRequest::from_fields(Some(&requested), Some(KEY), Some("60")).unwrap();

        let result = authorize_issuance(&session, request);
        if proven == requested {
            prop_assert!(result.is_ok());
        } else {
            prop_assert!(matches!(result, Err(PortaError::AuthorizationDenied)));
        }
    }

    #[test]
    fn props_gate_denies_anonymous_session(requested in identity_strategy()) {
        let request =
            IssuanceRequest::from_fields(Some(&requested), Some(KEY), Some("60")).unwrap();
        let result = authorize_issuance(&SessionState::default(), request);
        prop_assert!(matches!(result, Err(PortaError::AuthorizationDenied)));
    }

    #[test]
    fn props_non_numeric_duration_rejected(duration in "[^0-9]{1,10}") {
        let result = IssuanceRequest::from_fields(Some("a@b.c"), Some(KEY), Some(&duration));
        prop_assert!(matches!(result, Err(PortaError::InvalidRequest(_))));
    }

    #[test]
    fn props_session_survives_sealing(identity in identity_strategy()) {
        let codec = test_utils::session_codec();
        let state = SessionState::authenticated(Identity::new(identity));
        let cookie = codec.seal(&state).unwrap();
        prop_assert_eq!(codec.open(&cookie), state);
    }

    #[test]
    fn props_flipped_cookie_byte_is_rejected(
        identity in identity_strategy(),
        index in any::<prop::sample::Index>(),
    ) {
        let codec = test_utils::session_codec();
        let cookie = codec.seal(&SessionState::authenticated(Identity::new(identity))).unwrap();

        let mut bytes = cookie.into_bytes();
        let i = index.index(bytes.len());
        bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();

        prop_assert!(!codec.open(&tampered).is_authenticated());
    }
}
