//! Dotted locators addressing positions inside a [`ResultTree`](crate::ResultTree).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Separator between locator segments.
pub const LOCATOR_SEPARATOR: char = '.';

/// A non-empty sequence of mapping keys, written as `db.user`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Locator {
    segments: Vec<String>,
}

impl Locator {
    /// Parse a dotted locator.
    ///
    /// # Errors
    /// - Returns error if the locator is empty or has an empty segment
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::InvalidInput("Locator cannot be empty".to_string()));
        }

        let segments: Vec<String> = raw.split(LOCATOR_SEPARATOR).map(String::from).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(Error::InvalidInput(format!(
                "Locator has an empty segment: '{raw}'"
            )));
        }

        Ok(Self { segments })
    }

    /// Build a locator from already split segments.
    pub fn from_segments(segments: Vec<String>) -> Result<Self> {
        if segments.is_empty() || segments.iter().any(|s| s.is_empty()) {
            return Err(Error::InvalidInput(
                "Locator segments must be non-empty".to_string(),
            ));
        }
        Ok(Self { segments })
    }

    /// The segment keys, outermost first.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl FromStr for Locator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Locator {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Locator> for String {
    fn from(locator: Locator) -> Self {
        locator.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dotted() {
        let locator = Locator::parse("database.username").unwrap();
        assert_eq!(locator.segments(), &["database", "username"]);
        assert_eq!(locator.to_string(), "database.username");
    }

    #[test]
    fn test_rejects_empty_segments() {
        assert!(Locator::parse("").is_err());
        assert!(Locator::parse("a..b").is_err());
        assert!(Locator::parse(".a").is_err());
        assert!(Locator::from_segments(vec![]).is_err());
    }

    #[test]
    fn test_deserializes_from_string() {
        let locator: Locator = serde_json::from_str("\"db.user\"").unwrap();
        assert_eq!(locator.segments(), &["db", "user"]);

        let err = serde_json::from_str::<Locator>("\"db..user\"");
        assert!(err.is_err());
    }
}
