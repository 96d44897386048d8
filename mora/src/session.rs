//! Session identity shared by the response cache and chat history.

use std::fmt;

/// A conversation identity: optional user plus client-supplied session token.
///
/// The canonical form escapes `\` and `_` inside each component, so the only
/// bare underscore is the user/session separator and distinct pairs never
/// map to the same string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    user_id: Option<String>,
    session_id: String,
}

impl SessionKey {
    pub fn new(user_id: Option<&str>, session_id: &str) -> Self {
        Self {
            user_id: user_id
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string),
            session_id: session_id.to_string(),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Canonical string used for cache keys and history collections
    pub fn canonical(&self) -> String {
        match &self.user_id {
            Some(user) => format!("{}_{}", escape(user), escape(&self.session_id)),
            None => escape(&self.session_id),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

fn escape(component: &str) -> String {
    let mut out = String::with_capacity(component.len());
    for c in component.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '_' => out.push_str("\\_"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_session() {
        let key = SessionKey::new(None, "s1");
        assert_eq!(key.canonical(), "s1");
    }

    #[test]
    fn test_user_and_session() {
        let key = SessionKey::new(Some("alice"), "s1");
        assert_eq!(key.canonical(), "alice_s1");
    }

    #[test]
    fn test_blank_user_is_ignored() {
        let key = SessionKey::new(Some("  "), "s1");
        assert_eq!(key.user_id(), None);
        assert_eq!(key.canonical(), "s1");
    }

    #[test]
    fn test_underscore_pairs_do_not_alias() {
        let a = SessionKey::new(Some("a_b"), "c");
        let b = SessionKey::new(Some("a"), "b_c");
        assert_ne!(a.canonical(), b.canonical());
        assert_eq!(a.canonical(), "a\\_b_c");
        assert_eq!(b.canonical(), "a_b\\_c");
    }

    #[test]
    fn test_backslash_escaped() {
        let a = SessionKey::new(Some("a\\"), "_b");
        let b = SessionKey::new(Some("a"), "\\_b");
        assert_ne!(a.canonical(), b.canonical());
    }
}
