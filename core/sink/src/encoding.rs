//! Document encodings.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use vaultdump_common::{Error, Result};

/// On-disk encoding of a document or rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Pretty-printed JSON with a trailing newline.
    #[default]
    Json,
    /// YAML.
    Yaml,
}

impl Encoding {
    /// File extension, without the dot. Equal to the encoding name.
    pub fn extension(&self) -> &'static str {
        match self {
            Encoding::Json => "json",
            Encoding::Yaml => "yaml",
        }
    }

    /// Guess the encoding from a file extension.
    ///
    /// Returns `None` for unknown or missing extensions.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "json" => Some(Encoding::Json),
            "yaml" | "yml" => Some(Encoding::Yaml),
            _ => None,
        }
    }

    /// Encode a value to text.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        match self {
            Encoding::Json => {
                let mut text = serde_json::to_string_pretty(value)?;
                text.push('\n');
                Ok(text)
            }
            Encoding::Yaml => {
                serde_yaml::to_string(value).map_err(|e| Error::Serialization(e.to_string()))
            }
        }
    }

    /// Decode text in this encoding.
    pub fn decode<T: DeserializeOwned>(&self, input: &str) -> Result<T> {
        match self {
            Encoding::Json => Ok(serde_json::from_str(input)?),
            Encoding::Yaml => {
                serde_yaml::from_str(input).map_err(|e| Error::Serialization(e.to_string()))
            }
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Encoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Encoding::Json),
            "yaml" | "yml" => Ok(Encoding::Yaml),
            other => Err(Error::InvalidInput(format!(
                "Unsupported encoding '{other}' (expected json or yaml)"
            ))),
        }
    }
}
