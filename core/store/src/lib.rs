//! Secret store access for vault-dump.
//!
//! This module provides a trait-based interface over hierarchical secret
//! stores plus two implementations: the Vault HTTP API and an in-memory
//! store used by tests and offline pipelines.
//!
//! # Design Principles
//! - Two primitives only: list the children of a path, read a leaf
//! - Every failure is classified as transient or permanent at the source
//! - No retry logic here; callers wrap stores in a retrying client

pub mod memory;
pub mod provider;
pub mod vault;

pub use memory::MemoryStore;
pub use provider::{SecretStore, SecretValues};
pub use vault::{KvVersion, VaultConfig, VaultStore};
