//! Common types used throughout vault-dump.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

/// Separator used when displaying or parsing a [`SecretPath`].
pub const PATH_SEPARATOR: char = '/';

/// A position in the secret store's hierarchy.
///
/// Paths are compared segment by segment, so `/db` is an ancestor of
/// `/db/user` but not of `/dbx`. Ordering is lexicographic over segments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SecretPath {
    components: Vec<String>,
}

impl SecretPath {
    /// Create a root path.
    pub fn root() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Build a path from already split segments.
    ///
    /// # Errors
    /// - Returns error if any component is empty or contains a separator
    pub fn from_components(components: Vec<String>) -> crate::Result<Self> {
        for comp in &components {
            validate_component(comp)?;
        }
        Ok(Self { components })
    }

    /// Parse a path string into a SecretPath.
    ///
    /// Leading, trailing and repeated separators are ignored, so
    /// `"secret/app/"` and `"/secret//app"` name the same node.
    pub fn parse(path: &str) -> crate::Result<Self> {
        let components: Vec<String> = path
            .split(PATH_SEPARATOR)
            .filter(|segment| !segment.is_empty())
            .map(String::from)
            .collect();
        Self::from_components(components)
    }

    /// True for the store root `/`.
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// The enclosing branch. `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            None
        } else {
            let mut components = self.components.clone();
            components.pop();
            Some(Self { components })
        }
    }

    /// Get the last component.
    pub fn name(&self) -> Option<&str> {
        self.components.last().map(|s| s.as_str())
    }

    /// Append one child segment.
    pub fn join(&self, child: &str) -> crate::Result<Self> {
        validate_component(child)?;
        let mut components = self.components.clone();
        components.push(child.to_string());
        Ok(Self { components })
    }

    /// Get the path components.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Number of components.
    pub fn depth(&self) -> usize {
        self.components.len()
    }

    /// True if `self` equals `prefix` or lies underneath it.
    pub fn starts_with(&self, prefix: &SecretPath) -> bool {
        self.components.starts_with(&prefix.components)
    }

    /// Render as `/a/b/c`, or `/` for the root.
    pub fn to_string_path(&self) -> String {
        if self.is_root() {
            PATH_SEPARATOR.to_string()
        } else {
            format!("/{}", self.components.join("/"))
        }
    }
}

fn validate_component(comp: &str) -> crate::Result<()> {
    if comp.is_empty() {
        return Err(crate::Error::InvalidInput(
            "Path component cannot be empty".to_string(),
        ));
    }
    if comp.contains(PATH_SEPARATOR) {
        return Err(crate::Error::InvalidInput(format!(
            "Path component cannot contain separators: {comp}"
        )));
    }
    Ok(())
}

impl fmt::Display for SecretPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_path())
    }
}

/// Sensitive string (tokens, credentials) that zeroizes on drop.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SensitiveString(String);

impl SensitiveString {
    /// Wrap a sensitive value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the inner value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SensitiveString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensitiveString([REDACTED])")
    }
}
