//! Layered settings: flags, environment, settings file, defaults.
//!
//! Flags and `VAULT_DUMP_*` variables are both read by clap into
//! [`SettingsArgs`]. The conventional `VAULT_ADDR` and `VAULT_TOKEN`
//! variables come next, then the YAML settings file.

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use vaultdump_common::SensitiveString;
use vaultdump_store::vault::{DEFAULT_TIMEOUT, DEFAULT_VAULT_ADDR};
use vaultdump_store::KvVersion;

const DEFAULT_FILENAME: &str = "vault-dump";
const DEFAULT_RETRIES: u32 = 5;
const DEFAULT_CONCURRENCY: usize = 1;

/// System-wide settings file.
pub const SYSTEM_SETTINGS_FILE: &str = "/etc/vault-dump/config.yaml";

/// Settings given on the command line or through `VAULT_DUMP_*` variables.
#[derive(Debug, Clone, Default, Args)]
pub struct SettingsArgs {
    /// Vault address.
    #[arg(long, env = "VAULT_DUMP_VAULT_ADDR")]
    pub vault_addr: Option<String>,

    /// Vault token.
    #[arg(long, env = "VAULT_DUMP_VAULT_TOKEN", hide_env_values = true)]
    pub vault_token: Option<String>,

    /// Vault Enterprise namespace.
    #[arg(long, env = "VAULT_DUMP_VAULT_NAMESPACE")]
    pub vault_namespace: Option<String>,

    /// KV secrets engine version (1 or 2).
    #[arg(long, env = "VAULT_DUMP_KV_VERSION")]
    pub kv_version: Option<u8>,

    /// Comma separated keys to drop from every secret.
    #[arg(long, env = "VAULT_DUMP_IGNORE_KEYS", value_delimiter = ',')]
    pub ignore_keys: Option<Vec<String>>,

    /// Comma separated paths to skip entirely.
    #[arg(long, env = "VAULT_DUMP_IGNORE_PATHS", value_delimiter = ',')]
    pub ignore_paths: Option<Vec<String>>,

    /// Output file name, without extension.
    #[arg(long, env = "VAULT_DUMP_FILENAME")]
    pub filename: Option<String>,

    /// Attempts per store request.
    #[arg(long, env = "VAULT_DUMP_RETRIES")]
    pub retries: Option<u32>,

    /// Sibling subtrees walked at once.
    #[arg(long, env = "VAULT_DUMP_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Per-request timeout in seconds.
    #[arg(long, env = "VAULT_DUMP_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,
}

/// Contents of a settings file. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileSettings {
    pub vault_addr: Option<String>,
    pub vault_token: Option<String>,
    pub vault_namespace: Option<String>,
    pub kv_version: Option<u8>,
    pub ignore_keys: Option<Vec<String>>,
    pub ignore_paths: Option<Vec<String>>,
    pub filename: Option<String>,
    pub retries: Option<u32>,
    pub concurrency: Option<usize>,
    pub timeout_secs: Option<u64>,
}

impl FileSettings {
    /// Parse a settings file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))
    }

    /// Load the explicit file, or the first existing default location.
    ///
    /// An explicit file must exist; missing default files are skipped.
    pub fn load(explicit: Option<&Path>, defaults: &[PathBuf]) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                bail!("Settings file {} does not exist", path.display());
            }
            return Self::from_file(path);
        }

        match defaults.iter().find(|path| path.is_file()) {
            Some(path) => {
                debug!(path = %path.display(), "Loading settings file");
                Self::from_file(path)
            }
            None => Ok(Self::default()),
        }
    }
}

/// Default settings file locations, in lookup order.
pub fn default_settings_files() -> Vec<PathBuf> {
    let mut files = vec![PathBuf::from(SYSTEM_SETTINGS_FILE)];
    if let Some(home) = dirs::home_dir() {
        files.push(home.join(".vault-dump").join("config.yaml"));
    }
    files
}

/// Fully resolved settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub vault_addr: String,
    pub vault_token: Option<SensitiveString>,
    pub vault_namespace: Option<String>,
    pub kv_version: KvVersion,
    pub ignore_keys: Vec<String>,
    pub ignore_paths: Vec<String>,
    pub filename: String,
    pub retries: u32,
    pub concurrency: usize,
    pub timeout: Duration,
}

impl Settings {
    /// Merge the layers. `env` looks up the conventional Vault variables.
    pub fn resolve(
        args: &SettingsArgs,
        file: FileSettings,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let vault_addr = args
            .vault_addr
            .clone()
            .or_else(|| env("VAULT_ADDR"))
            .or(file.vault_addr)
            .unwrap_or_else(|| DEFAULT_VAULT_ADDR.to_string());

        let vault_token = args
            .vault_token
            .clone()
            .or_else(|| env("VAULT_TOKEN"))
            .or(file.vault_token)
            .filter(|token| !token.trim().is_empty())
            .map(SensitiveString::new);

        let kv_version = match args.kv_version.or(file.kv_version) {
            Some(version) => KvVersion::from_number(version)?,
            None => KvVersion::default(),
        };

        let retries = args.retries.or(file.retries).unwrap_or(DEFAULT_RETRIES);
        if retries == 0 {
            bail!("retries must be at least 1");
        }

        Ok(Self {
            vault_addr,
            vault_token,
            vault_namespace: args
                .vault_namespace
                .clone()
                .or_else(|| env("VAULT_NAMESPACE"))
                .or(file.vault_namespace),
            kv_version,
            ignore_keys: args.ignore_keys.clone().or(file.ignore_keys).unwrap_or_default(),
            ignore_paths: args.ignore_paths.clone().or(file.ignore_paths).unwrap_or_default(),
            filename: args
                .filename
                .clone()
                .or(file.filename)
                .unwrap_or_else(|| DEFAULT_FILENAME.to_string()),
            retries,
            concurrency: args
                .concurrency
                .or(file.concurrency)
                .unwrap_or(DEFAULT_CONCURRENCY)
                .max(1),
            timeout: args
                .timeout_secs
                .or(file.timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TIMEOUT),
        })
    }
}
