//! Scope paths: the lockable units of the managed hierarchy.

use serde::{Deserialize, Serialize};

/// Path identifying one independently lockable scope (e.g. `"svc/auth"`).
///
/// Scope paths are opaque to the coordination core; the hierarchy is the
/// caller's convention. Two paths refer to the same scope iff they are
/// string-equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopePath(String);

impl ScopePath {
    /// Create a scope path from any string-like value.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ScopePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ScopePath {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ScopePath {
    fn from(s: String) -> Self {
        Self(s)
    }
}
