//! Secret tree extraction for vault-dump.
//!
//! This module provides:
//! - Path and key exclusion filters
//! - A retrying, cancellable wrapper around any secret store
//! - The recursive walker that assembles a [`ResultTree`](vaultdump_common::ResultTree)
//!
//! # Architecture
//! The walker only talks to the [`SecretStore`](vaultdump_store::SecretStore)
//! trait. Wrapping the concrete store in a [`RetryingStoreClient`] before
//! handing it to the walker gives every list and read call the same bounded
//! retry policy and cancellation token.

pub mod ignore;
pub mod retry;
pub mod walker;

pub use ignore::IgnoreFilter;
pub use retry::{RetryConfig, RetryExecutor, RetryingStoreClient};
pub use walker::SecretTreeWalker;

pub use tokio_util::sync::CancellationToken;
