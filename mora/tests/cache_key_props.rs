//! Property tests for cache key derivation and session key escaping.

use mora::cache::{derive_key, normalize};
use mora::session::SessionKey;
use proptest::prelude::*;

proptest! {
    #[test]
    fn normalize_is_idempotent(s in "\\PC{0,64}") {
        let once = normalize(&s);
        prop_assert_eq!(normalize(&once), once);
    }

    #[test]
    fn surrounding_whitespace_and_case_share_a_key(
        s in "[a-zA-Z0-9 ?]{1,40}",
        pad_left in " {0,4}",
        pad_right in "[ \t]{0,4}",
    ) {
        let padded = format!("{}{}{}", pad_left, s.to_uppercase(), pad_right);
        prop_assert_eq!(derive_key("s1", &s), derive_key("s1", &padded));
    }

    #[test]
    fn key_is_hex_sha256(session in "[a-z0-9_]{1,16}", input in "\\PC{0,64}") {
        let key = derive_key(&session, &input);
        prop_assert_eq!(key.as_str().len(), 64);
        prop_assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn distinct_user_session_pairs_never_collide(
        u1 in "[a-z_\\\\]{1,6}", s1 in "[a-z_\\\\]{1,6}",
        u2 in "[a-z_\\\\]{1,6}", s2 in "[a-z_\\\\]{1,6}",
    ) {
        prop_assume!((&u1, &s1) != (&u2, &s2));
        let a = SessionKey::new(Some(&u1), &s1).canonical();
        let b = SessionKey::new(Some(&u2), &s2).canonical();
        prop_assert_ne!(a, b);
    }
}
