//! Output destinations.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::io::AsyncWriteExt;
use tracing::info;

use vaultdump_common::{Error, Result, ResultTree};

use crate::encoding::Encoding;
use crate::s3::{upload_document, S3Destination, S3Uploader};

/// Where the encoded document goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputKind {
    Stdout,
    #[default]
    File,
    S3,
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputKind::Stdout => "stdout",
            OutputKind::File => "file",
            OutputKind::S3 => "s3",
        })
    }
}

impl FromStr for OutputKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdout" => Ok(OutputKind::Stdout),
            "file" => Ok(OutputKind::File),
            "s3" => Ok(OutputKind::S3),
            other => Err(Error::InvalidInput(format!(
                "Unsupported output '{other}' (expected stdout, file or s3)"
            ))),
        }
    }
}

/// Delivery settings for one document.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub kind: OutputKind,
    pub encoding: Encoding,
    /// Base file name, without extension.
    pub filename: String,
    /// Directory for `file`, `s3://bucket/prefix` for `s3`, unused for `stdout`.
    pub destination: Option<String>,
    /// KMS key id or ARN, required for `s3`.
    pub kms_key: Option<String>,
}

impl OutputConfig {
    /// Default settings: JSON, file name `vault-dump`.
    pub fn new(kind: OutputKind) -> Self {
        Self {
            kind,
            encoding: Encoding::default(),
            filename: "vault-dump".to_string(),
            destination: None,
            kms_key: None,
        }
    }

    /// Set the encoding.
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Set the base file name.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    /// Set the destination.
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Set the KMS key.
    pub fn with_kms_key(mut self, kms_key: impl Into<String>) -> Self {
        self.kms_key = Some(kms_key.into());
        self
    }

    /// `<filename>.<ext>`.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.filename, self.encoding.extension())
    }

    /// Check the settings before any work is done.
    ///
    /// # Errors
    /// - `Config` if the file name is empty or contains a path separator
    /// - `Config` for `s3` without an `s3://` destination or a KMS key
    pub fn validate(&self) -> Result<()> {
        if self.filename.trim().is_empty() {
            return Err(Error::Config("Output file name must not be empty".to_string()));
        }
        if self.filename.contains(['/', '\\']) {
            return Err(Error::Config(format!(
                "Output file name '{}' must not contain a path separator",
                self.filename
            )));
        }

        if self.kind == OutputKind::S3 {
            let destination = self.destination.as_deref().ok_or_else(|| {
                Error::Config("S3 output requires a destination starting with s3://".to_string())
            })?;
            S3Destination::parse(destination).map_err(|e| Error::Config(e.to_string()))?;
            if self.kms_key.as_deref().is_none_or(|key| key.trim().is_empty()) {
                return Err(Error::Config("S3 output requires a KMS key".to_string()));
            }
        }
        Ok(())
    }

    fn kms_key(&self) -> Result<&str> {
        self.kms_key
            .as_deref()
            .ok_or_else(|| Error::Config("S3 output requires a KMS key".to_string()))
    }
}

/// Where a document ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivered {
    Stdout,
    File(PathBuf),
    S3(String),
}

impl fmt::Display for Delivered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delivered::Stdout => f.write_str("stdout"),
            Delivered::File(path) => write!(f, "{}", path.display()),
            Delivered::S3(uri) => f.write_str(uri),
        }
    }
}

/// Encode `tree` and deliver it according to `config`.
pub async fn deliver(config: &OutputConfig, tree: &ResultTree) -> Result<Delivered> {
    config.validate()?;
    let document = config.encoding.encode(tree)?;

    match config.kind {
        OutputKind::Stdout => {
            write_stdout(&document).await?;
            Ok(Delivered::Stdout)
        }
        OutputKind::File => {
            let dir = config.destination.as_deref().unwrap_or(".");
            let path = write_file(Path::new(dir), &config.file_name(), &document).await?;
            Ok(Delivered::File(path))
        }
        OutputKind::S3 => {
            let destination = S3Destination::parse(config.destination.as_deref().unwrap_or(""))?;
            let uploader = S3Uploader::from_env().await;
            let uri = upload_document(
                &uploader,
                &destination,
                &config.file_name(),
                document.as_bytes(),
                config.kms_key()?,
            )
            .await?;
            Ok(Delivered::S3(uri))
        }
    }
}

/// Write a document to stdout.
pub async fn write_stdout(document: &str) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(document.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}

/// Write a document to `dir/file_name`, creating `dir` as needed.
pub async fn write_file(dir: &Path, file_name: &str, document: &str) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(file_name);
    tokio::fs::write(&path, document).await?;
    info!(path = %path.display(), "Wrote document");
    Ok(path)
}
