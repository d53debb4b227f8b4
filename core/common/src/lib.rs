//! Common utilities and types shared across the vault-dump crates.
//!
//! This module provides the foundational types used by both the extraction
//! and transform engines: store paths, document locators, the result tree,
//! and the shared error taxonomy.

pub mod error;
pub mod locator;
pub mod tree;
pub mod types;

pub use error::{Error, Result};
pub use locator::Locator;
pub use tree::{Node, ResultTree};
pub use types::{SecretPath, SensitiveString};
