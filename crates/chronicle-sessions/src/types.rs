use std::fmt;

use chronicle_core::{SourceType, UserId};

/// Identifies a single session file slot: one messenger protocol's
/// credential blob for one user.
///
/// Skynet sessions were conversation threads keyed by `user:agent:name`;
/// here a "session" is the spec's opaque per-protocol credential blob, so
/// the key collapses to just `(UserId, SourceType)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionFileKey {
    pub user_id: UserId,
    pub source_type: SourceType,
}

impl SessionFileKey {
    pub fn new(user_id: UserId, source_type: SourceType) -> Self {
        Self {
            user_id,
            source_type,
        }
    }

    /// On-disk path for this key given a protocol base path.
    ///
    /// Format: `"{base}.user_{UserID}"`.
    pub fn path(&self, base: &str) -> String {
        format!("{base}.user_{}", self.user_id)
    }

    /// The legacy bare-base path, accepted as a fallback only for `UserID=1`.
    pub fn legacy_path<'a>(&self, base: &'a str) -> Option<&'a str> {
        if self.user_id.get() == 1 {
            Some(base)
        } else {
            None
        }
    }
}

impl fmt::Display for SessionFileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user:{}:{}", self.user_id, self.source_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_has_expected_suffix_format() {
        let key = SessionFileKey::new(UserId(42), SourceType::MessengerA);
        assert_eq!(key.path("/data/session_a"), "/data/session_a.user_42");
    }

    #[test]
    fn legacy_path_only_for_user_one() {
        let key1 = SessionFileKey::new(UserId(1), SourceType::MessengerA);
        assert_eq!(key1.legacy_path("/data/session_a"), Some("/data/session_a"));

        let key2 = SessionFileKey::new(UserId(2), SourceType::MessengerA);
        assert_eq!(key2.legacy_path("/data/session_a"), None);
    }
}
