//! Identity and marker types.

use serde::{Deserialize, Serialize};

/// Logical identity of a file, independent of its path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity(String);

impl Identity {
    /// Wrap an identity string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The identity as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Proof that a file has been uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    /// Bucket the object lives in.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Public URL of the object.
    pub url: String,
}

impl Marker {
    /// Create a new marker.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            url: url.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_display() {
        let identity: Identity = Identity::new("0f3c");
        assert_eq!(identity.as_str(), "0f3c");
        assert_eq!(identity.to_string(), "0f3c");
    }

    #[test]
    fn test_marker_equality() {
        let a: Marker = Marker::new("media", "uploads/a.jpg", "https://x/uploads/a.jpg");
        let b: Marker = Marker::new("media", "uploads/a.jpg", "https://x/uploads/a.jpg");
        assert_eq!(a, b);
        assert_ne!(a, Marker::new("media", "uploads/b.jpg", "https://x/uploads/b.jpg"));
    }
}
