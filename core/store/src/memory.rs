//! In-memory secret store for testing and dry runs.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use vaultdump_common::{Error, Result, SecretPath};

use crate::provider::{SecretStore, SecretValues};

/// In-memory secret store.
///
/// Only leaves are stored; branches exist implicitly as the ancestors of
/// some leaf. All data is lost on drop.
#[derive(Clone, Default)]
pub struct MemoryStore {
    leaves: Arc<RwLock<BTreeMap<SecretPath, SecretValues>>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a leaf at `path`.
    ///
    /// # Errors
    /// - `InvalidInput` if `values` is not a JSON object
    /// - `InvalidInput` if the path would nest a leaf under another leaf
    pub fn insert(&self, path: &str, values: Value) -> Result<()> {
        let path = SecretPath::parse(path)?;
        let Value::Object(values) = values else {
            return Err(Error::InvalidInput(format!(
                "Leaf values at {path} must be an object"
            )));
        };

        let mut leaves = self.write();
        let conflict = leaves
            .keys()
            .any(|existing| existing != &path && (existing.starts_with(&path) || path.starts_with(existing)));
        if conflict {
            return Err(Error::InvalidInput(format!(
                "{path} would be both a leaf and a branch"
            )));
        }

        leaves.insert(path, values);
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_secret(self, path: &str, values: Value) -> Result<Self> {
        self.insert(path, values)?;
        Ok(self)
    }

    /// Number of stored leaves.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Check if the store holds no leaves.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<SecretPath, SecretValues>> {
        self.leaves.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<SecretPath, SecretValues>> {
        self.leaves.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_children(&self, path: &SecretPath) -> Result<Vec<SecretPath>> {
        let leaves = self.read();
        let depth = path.depth();

        let children: BTreeSet<SecretPath> = leaves
            .keys()
            .filter(|leaf| leaf.depth() > depth && leaf.starts_with(path))
            .map(|leaf| leaf.components()[..=depth].to_vec())
            .map(SecretPath::from_components)
            .collect::<Result<_>>()?;

        Ok(children.into_iter().collect())
    }

    async fn read_leaf(&self, path: &SecretPath) -> Result<SecretValues> {
        self.read()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Permanent(format!("Secret not found: {path}")))
    }
}
