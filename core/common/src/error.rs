//! Common error types for vault-dump.

use thiserror::Error;

use crate::types::SecretPath;

/// Top-level error type for extraction, transform, and delivery.
///
/// Store failures are split into [`Error::Transient`] and
/// [`Error::Permanent`]; only the former is ever retried. The wrapper
/// variants carry the context (path, rule index, attempt count) of the
/// failure they enclose.
#[derive(Debug, Error)]
pub enum Error {
    /// Retryable store failure (network, timeout, 5xx).
    #[error("Transient store error: {0}")]
    Transient(String),

    /// Non-retryable store failure (not found, unauthorized, malformed path).
    #[error("Store error: {0}")]
    Permanent(String),

    /// Every allowed attempt failed with a transient error.
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<Error> },

    /// The caller aborted the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// The walk aborted at `path`.
    #[error("Extraction failed at {path}: {cause}")]
    ExtractionFailed { path: SecretPath, cause: Box<Error> },

    /// The rule at `rule_index` (zero-based) could not be applied.
    #[error("Transform rule #{rule_index} failed: {cause}")]
    TransformFailed { rule_index: usize, cause: Box<Error> },

    /// A locator tried to descend into a non-mapping value.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration could not be resolved.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Delivery to a remote sink failed.
    #[error("Upload error: {0}")]
    Upload(String),
}

impl Error {
    /// Whether a retry of the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }

    /// Whether this error, or the error it wraps, is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root_cause(), Error::Cancelled)
    }

    /// Walk through the wrapper variants to the innermost error.
    ///
    /// `RetriesExhausted` is not unwrapped: the exhaustion itself is the
    /// meaningful outcome, not the last transient failure.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::ExtractionFailed { cause, .. } | Error::TransformFailed { cause, .. } => {
                cause.root_cause()
            }
            other => other,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_unwraps_context() {
        let err = Error::ExtractionFailed {
            path: SecretPath::parse("/a").unwrap(),
            cause: Box::new(Error::RetriesExhausted {
                attempts: 3,
                last: Box::new(Error::Transient("timeout".to_string())),
            }),
        };

        assert!(matches!(
            err.root_cause(),
            Error::RetriesExhausted { attempts: 3, .. }
        ));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_display_carries_context() {
        let err = Error::TransformFailed {
            rule_index: 2,
            cause: Box::new(Error::ShapeMismatch("db.user is not a mapping".to_string())),
        };

        let message = err.to_string();
        assert!(message.contains("#2"));
        assert!(message.contains("db.user is not a mapping"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::Transient("503".to_string()).is_transient());
        assert!(!Error::Permanent("404".to_string()).is_transient());
        assert!(!Error::Cancelled.is_transient());
    }
}
