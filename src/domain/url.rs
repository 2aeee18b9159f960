use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Canonical form of a URL, used as the equality and lookup key.
///
/// Only [`UrlNormalizer`](crate::normalizer::UrlNormalizer) produces these
/// from raw input; [`from_normalized`](Self::from_normalized) exists for
/// values that were normalized before being persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedUrl(String);

impl NormalizedUrl {
    pub fn from_normalized(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Key used by `master_history_database.json`.
    pub fn history_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Host part, or an empty string for fallback-normalized values.
    pub fn host(&self) -> &str {
        let rest = self.0.strip_prefix("https://").unwrap_or(&self.0);
        let end = rest.find(['/', '?']).unwrap_or(rest.len());
        &rest[..end]
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_key_is_hex_sha256() {
        let key = NormalizedUrl::from_normalized("https://golf.com/news/foo").history_key();
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_history_key_deterministic() {
        let a = NormalizedUrl::from_normalized("https://golf.com/a");
        let b = NormalizedUrl::from_normalized("https://golf.com/a");
        let c = NormalizedUrl::from_normalized("https://golf.com/b");
        assert_eq!(a.history_key(), b.history_key());
        assert_ne!(a.history_key(), c.history_key());
    }

    #[test]
    fn test_host() {
        let url = NormalizedUrl::from_normalized("https://golfdigest.com/story/x?page=2");
        assert_eq!(url.host(), "golfdigest.com");
        let bare = NormalizedUrl::from_normalized("https://golf.com?id=1");
        assert_eq!(bare.host(), "golf.com");
    }
}
