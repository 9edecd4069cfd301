//! Slash-separated addresses into the realtime tree.

use crate::error::StoreError;

/// A parsed, validated path such as `userChats/{uid}/{chatId}`.
///
/// Segments are never empty; the root path has zero segments and is not
/// addressable through [`StorePath::parse`] (no operation targets the whole
/// tree).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    /// Parse a `a/b/c` string. Leading/trailing slashes are rejected, as is
    /// the empty path.
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        if raw.is_empty() {
            return Err(StoreError::InvalidPath(raw.to_string()));
        }
        let segments: Vec<String> = raw.split('/').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(StoreError::InvalidPath(raw.to_string()));
        }
        Ok(Self { segments })
    }

    /// Build a path from already-validated segments.
    pub fn from_segments<I, S>(parts: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let segments: Vec<String> = parts
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect();
        if segments.is_empty() || segments.iter().any(|s| s.is_empty() || s.contains('/')) {
            return Err(StoreError::InvalidPath(segments.join("/")));
        }
        Ok(Self { segments })
    }

    /// Extend this path with one more segment.
    pub fn child(&self, segment: &str) -> Result<Self, StoreError> {
        if segment.is_empty() || segment.contains('/') {
            return Err(StoreError::InvalidPath(segment.to_string()));
        }
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn last(&self) -> &str {
        // Non-empty by construction.
        self.segments.last().expect("path has at least one segment")
    }

    /// Whether `self` is equal to or nested under `prefix`.
    pub fn starts_with(&self, prefix: &StorePath) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// The segments of `self` below `prefix`, if nested under it.
    pub fn strip_prefix(&self, prefix: &StorePath) -> Option<&[String]> {
        if self.starts_with(prefix) {
            Some(&self.segments[prefix.segments.len()..])
        } else {
            None
        }
    }
}

impl std::fmt::Display for StorePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

impl std::str::FromStr for StorePath {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_round_trip() {
        let p = StorePath::parse("users/u1/status").unwrap();
        assert_eq!(p.segments().len(), 3);
        assert_eq!(p.to_string(), "users/u1/status");
        assert_eq!(p.last(), "status");
    }

    #[test]
    fn rejects_empty_segments() {
        assert!(StorePath::parse("").is_err());
        assert!(StorePath::parse("/users").is_err());
        assert!(StorePath::parse("users//u1").is_err());
        assert!(StorePath::parse("users/").is_err());
    }

    #[test]
    fn prefix_relations() {
        let root = StorePath::parse("friends/u1").unwrap();
        let leaf = StorePath::parse("friends/u1/u2").unwrap();
        let other = StorePath::parse("friends/u2").unwrap();

        assert!(leaf.starts_with(&root));
        assert!(root.starts_with(&root));
        assert!(!other.starts_with(&root));
        assert_eq!(leaf.strip_prefix(&root).unwrap(), ["u2".to_string()]);
    }
}
