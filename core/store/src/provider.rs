//! Secret store trait definition.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use vaultdump_common::{Result, SecretPath};

/// Key/value pairs held by a leaf.
pub type SecretValues = Map<String, Value>;

/// Read access to a hierarchical secret store.
///
/// A node is either a branch (it has children) or a leaf (it holds values);
/// implementations guarantee this partition. Errors must be reported as
/// `Error::Transient` when the same request may succeed later and as
/// `Error::Permanent` otherwise.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Get the store name (e.g., "vault", "memory").
    fn name(&self) -> &str;

    /// List the direct children of `path`.
    ///
    /// # Returns
    /// Child paths in store order. An empty list means `path` is a leaf
    /// (or does not exist; reading it will tell).
    async fn list_children(&self, path: &SecretPath) -> Result<Vec<SecretPath>>;

    /// Read the key/value pairs of the leaf at `path`.
    ///
    /// # Errors
    /// - `Permanent` if the leaf does not exist or access is denied
    /// - `Transient` on network failures
    async fn read_leaf(&self, path: &SecretPath) -> Result<SecretValues>;
}

#[async_trait]
impl<S: SecretStore + ?Sized> SecretStore for Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn list_children(&self, path: &SecretPath) -> Result<Vec<SecretPath>> {
        (**self).list_children(path).await
    }

    async fn read_leaf(&self, path: &SecretPath) -> Result<SecretValues> {
        (**self).read_leaf(path).await
    }
}
