//! Encrypted object-storage delivery.
//!
//! Documents are staged into a private temporary directory and uploaded
//! from there with server-side KMS encryption. The staging directory is a
//! [`tempfile::TempDir`], so it is removed when the upload returns, whether
//! it succeeded or not.

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ServerSideEncryption;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

use vaultdump_common::{Error, Result};

const S3_SCHEME: &str = "s3://";

/// A parsed `s3://bucket/prefix` destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Destination {
    bucket: String,
    prefix: String,
}

impl S3Destination {
    /// Parse a destination URI.
    ///
    /// # Errors
    /// - `InvalidInput` unless the URI starts with `s3://` and names a bucket
    pub fn parse(uri: &str) -> Result<Self> {
        let rest = uri.trim().strip_prefix(S3_SCHEME).ok_or_else(|| {
            Error::InvalidInput(format!(
                "S3 destination must start with {S3_SCHEME}, got '{uri}'"
            ))
        })?;

        let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(Error::InvalidInput(format!(
                "S3 destination '{uri}' has no bucket"
            )));
        }

        Ok(Self {
            bucket: bucket.to_string(),
            prefix: prefix.trim_matches('/').to_string(),
        })
    }

    /// Bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Key prefix without leading or trailing slashes. May be empty.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Object key for `file_name` under this destination's prefix.
    pub fn key_for(&self, file_name: &str) -> String {
        if self.prefix.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{}", self.prefix, file_name)
        }
    }
}

impl fmt::Display for S3Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix.is_empty() {
            write!(f, "{S3_SCHEME}{}", self.bucket)
        } else {
            write!(f, "{S3_SCHEME}{}/{}", self.bucket, self.prefix)
        }
    }
}

/// Uploads a staged file to object storage.
#[async_trait]
pub trait ObjectUploader: Send + Sync {
    /// Upload the file at `source` to `bucket`/`key`, encrypted with
    /// `kms_key_id`.
    async fn upload(&self, bucket: &str, key: &str, source: &Path, kms_key_id: &str)
        -> Result<()>;
}

/// [`ObjectUploader`] backed by the AWS SDK.
pub struct S3Uploader {
    client: aws_sdk_s3::Client,
}

impl S3Uploader {
    /// Wrap an existing client.
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }

    /// Build a client from the default AWS credential and region chain.
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(aws_sdk_s3::Client::new(&config))
    }
}

#[async_trait]
impl ObjectUploader for S3Uploader {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
        kms_key_id: &str,
    ) -> Result<()> {
        let body = ByteStream::from_path(source)
            .await
            .map_err(|e| Error::Upload(format!("Failed to read staged file: {e}")))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .server_side_encryption(ServerSideEncryption::AwsKms)
            .ssekms_key_id(kms_key_id)
            .send()
            .await
            .map_err(|e| {
                Error::Upload(format!(
                    "put_object s3://{bucket}/{key} failed: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        Ok(())
    }
}

/// Stage `contents` as `file_name` and upload it under `destination`.
///
/// Returns the URI of the uploaded object.
pub async fn upload_document(
    uploader: &dyn ObjectUploader,
    destination: &S3Destination,
    file_name: &str,
    contents: &[u8],
    kms_key_id: &str,
) -> Result<String> {
    let staging = tempfile::Builder::new().prefix("vault-dump-").tempdir()?;
    let staged = staging.path().join(file_name);
    tokio::fs::write(&staged, contents).await?;
    debug!(staged = %staged.display(), bytes = contents.len(), "Staged document");

    let key = destination.key_for(file_name);
    uploader
        .upload(destination.bucket(), &key, &staged, kms_key_id)
        .await?;

    let uri = format!("{S3_SCHEME}{}/{}", destination.bucket(), key);
    info!(uri = %uri, "Uploaded document");
    Ok(uri)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingUploader {
        fail: bool,
        seen: Mutex<Vec<(String, String, PathBuf, String, Vec<u8>)>>,
    }

    #[async_trait]
    impl ObjectUploader for RecordingUploader {
        async fn upload(
            &self,
            bucket: &str,
            key: &str,
            source: &Path,
            kms_key_id: &str,
        ) -> Result<()> {
            let body = std::fs::read(source)?;
            self.seen.lock().unwrap().push((
                bucket.to_string(),
                key.to_string(),
                source.to_path_buf(),
                kms_key_id.to_string(),
                body,
            ));
            if self.fail {
                return Err(Error::Upload("access denied".to_string()));
            }
            Ok(())
        }
    }

    #[test]
    fn test_parse_destination() {
        let dest = S3Destination::parse("s3://backups/vault/daily/").unwrap();
        assert_eq!(dest.bucket(), "backups");
        assert_eq!(dest.prefix(), "vault/daily");
        assert_eq!(dest.key_for("dump.json"), "vault/daily/dump.json");
        assert_eq!(dest.to_string(), "s3://backups/vault/daily");

        let bare = S3Destination::parse("s3://backups").unwrap();
        assert_eq!(bare.key_for("dump.json"), "dump.json");
    }

    #[test]
    fn test_parse_rejects_other_schemes() {
        assert!(S3Destination::parse("backups/vault").is_err());
        assert!(S3Destination::parse("https://backups/vault").is_err());
        assert!(S3Destination::parse("s3://").is_err());
        assert!(S3Destination::parse("s3:///prefix").is_err());
    }

    #[tokio::test]
    async fn test_upload_stages_and_cleans_up() {
        let uploader = RecordingUploader::default();
        let dest = S3Destination::parse("s3://backups/vault").unwrap();

        let uri = upload_document(&uploader, &dest, "vault-dump.json", b"{}\n", "alias/dump")
            .await
            .unwrap();

        assert_eq!(uri, "s3://backups/vault/vault-dump.json");
        let seen = uploader.seen.lock().unwrap();
        let (bucket, key, staged, kms, body) = &seen[0];
        assert_eq!(bucket, "backups");
        assert_eq!(key, "vault/vault-dump.json");
        assert_eq!(kms, "alias/dump");
        assert_eq!(body, b"{}\n");
        assert!(!staged.exists());
    }

    #[tokio::test]
    async fn test_failed_upload_still_cleans_up() {
        let uploader = RecordingUploader {
            fail: true,
            ..Default::default()
        };
        let dest = S3Destination::parse("s3://backups").unwrap();

        let err = upload_document(&uploader, &dest, "vault-dump.yaml", b"a: 1\n", "key")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Upload(_)));
        let seen = uploader.seen.lock().unwrap();
        assert!(!seen[0].2.exists());
        assert!(!seen[0].2.parent().unwrap().exists());
    }
}
