//! Shared value types: the content hash and the three-way change kind.

use std::fmt;
use std::str::FromStr;

use crate::error::ChonkyError;

/// A lowercase hex-encoded SHA-1 digest (40 chars). Serves as both the
/// object-store key and the cache filename for a piece of content.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    pub const HEX_LEN: usize = 40;

    /// Wrap an already-computed hex digest, rejecting anything that isn't
    /// 40 lowercase hex characters.
    pub fn new(hex: impl Into<String>) -> Result<Self, ChonkyError> {
        let hex = hex.into();
        if hex.len() != Self::HEX_LEN || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ChonkyError::Parse(format!(
                "not a valid SHA-1 hex digest: {hex:?}"
            )));
        }
        Ok(ContentHash(hex.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentHash {
    type Err = ChonkyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentHash::new(s)
    }
}

impl AsRef<str> for ContentHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Which of the three disjoint buckets a changed path falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Missing,
    Modified,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeKind::Added => "added",
            ChangeKind::Missing => "missing",
            ChangeKind::Modified => "modified",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_hex() {
        let hex = "a".repeat(40);
        assert!(ContentHash::new(hex).is_ok());
    }

    #[test]
    fn lowercases_mixed_case() {
        let hex = "A".repeat(40);
        let h = ContentHash::new(hex).unwrap();
        assert_eq!(h.as_str(), "a".repeat(40));
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(ContentHash::new("abc").is_err());
    }

    #[test]
    fn rejects_non_hex() {
        let bad = "g".repeat(40);
        assert!(ContentHash::new(bad).is_err());
    }
}
