//! Encoding and delivery of the final document.
//!
//! The extraction and transform crates hand a [`ResultTree`] to this crate
//! by value; everything about on-disk formats and destinations lives here.
//!
//! [`ResultTree`]: vaultdump_common::ResultTree

pub mod encoding;
pub mod output;
pub mod s3;

pub use encoding::Encoding;
pub use output::{deliver, Delivered, OutputConfig, OutputKind};
pub use s3::{ObjectUploader, S3Destination, S3Uploader};
