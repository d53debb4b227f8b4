//! HashiCorp Vault KV store over the HTTP API.

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;
use url::Url;

use vaultdump_common::{Error, Result, SecretPath, SensitiveString};

use crate::provider::{SecretStore, SecretValues};

/// Default Vault address.
pub const DEFAULT_VAULT_ADDR: &str = "https://127.0.0.1:8200";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const TOKEN_HEADER: &str = "X-Vault-Token";
const NAMESPACE_HEADER: &str = "X-Vault-Namespace";

/// Characters escaped inside a single path segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

/// KV secrets engine version of the mount being dumped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KvVersion {
    /// Paths are used as-is.
    #[default]
    V1,
    /// The mount is the first segment; listing goes through `metadata/`,
    /// reading through `data/`.
    V2,
}

impl KvVersion {
    /// Parse the numeric engine version.
    pub fn from_number(version: u8) -> Result<Self> {
        match version {
            1 => Ok(KvVersion::V1),
            2 => Ok(KvVersion::V2),
            other => Err(Error::Config(format!(
                "Unsupported KV version {other}, expected 1 or 2"
            ))),
        }
    }
}

/// Connection settings for [`VaultStore`].
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Base address, e.g. `https://vault.internal:8200`.
    pub address: Url,
    /// Client token.
    pub token: SensitiveString,
    /// Enterprise namespace, if any.
    pub namespace: Option<String>,
    /// KV engine version.
    pub kv_version: KvVersion,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl VaultConfig {
    /// Create a configuration with default timeout and KV v1.
    ///
    /// # Errors
    /// - `Config` if the address is not a valid URL
    pub fn new(address: &str, token: SensitiveString) -> Result<Self> {
        let address = Url::parse(address)
            .map_err(|e| Error::Config(format!("Invalid Vault address '{address}': {e}")))?;
        Ok(Self {
            address,
            token,
            namespace: None,
            kv_version: KvVersion::default(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Set the namespace.
    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace.filter(|ns| !ns.is_empty());
        self
    }

    /// Set the KV engine version.
    pub fn with_kv_version(mut self, kv_version: KvVersion) -> Self {
        self.kv_version = kv_version;
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    data: ListData,
}

#[derive(Debug, Deserialize)]
struct ListData {
    #[serde(default)]
    keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ReadResponse {
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    errors: Vec<String>,
}

/// Which API view of a KV v2 mount a request targets.
#[derive(Debug, Clone, Copy)]
enum Operation {
    List,
    Read,
}

/// Vault KV client.
pub struct VaultStore {
    http: Client,
    config: VaultConfig,
}

impl VaultStore {
    /// Create a new Vault client.
    ///
    /// # Errors
    /// - `Config` if the HTTP client cannot be built
    pub fn new(config: VaultConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("vault-dump/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Get the connection settings.
    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Build the API URL for `path`.
    fn api_url(&self, path: &SecretPath, operation: Operation) -> Result<Url> {
        let segments = api_segments(path, self.config.kv_version, operation);
        let encoded: Vec<String> = segments
            .iter()
            .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
            .collect();

        let base = self.config.address.as_str().trim_end_matches('/');
        let url = format!("{}/v1/{}", base, encoded.join("/"));
        Url::parse(&url).map_err(|e| Error::Permanent(format!("Malformed path {path}: {e}")))
    }

    async fn get(&self, url: Url, list: bool) -> Result<reqwest::Response> {
        let mut request = self
            .http
            .get(url)
            .header(TOKEN_HEADER, self.config.token.expose())
            .header(header::ACCEPT, "application/json");

        if let Some(namespace) = &self.config.namespace {
            request = request.header(NAMESPACE_HEADER, namespace);
        }
        if list {
            request = request.query(&[("list", "true")]);
        }

        request.send().await.map_err(classify_transport)
    }
}

#[async_trait]
impl SecretStore for VaultStore {
    fn name(&self) -> &str {
        "vault"
    }

    async fn list_children(&self, path: &SecretPath) -> Result<Vec<SecretPath>> {
        let url = self.api_url(path, Operation::List)?;
        debug!(path = %path, "Listing secrets");

        let response = self.get(url, true).await?;
        let status = response.status();

        // Vault answers LIST on a leaf with 404.
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body, path));
        }

        let listing: ListResponse = response
            .json()
            .await
            .map_err(|e| Error::Permanent(format!("Malformed list response for {path}: {e}")))?;

        child_paths(path, &listing.data.keys)
    }

    async fn read_leaf(&self, path: &SecretPath) -> Result<SecretValues> {
        let url = self.api_url(path, Operation::Read)?;
        debug!(path = %path, "Reading secret");

        let response = self.get(url, false).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body, path));
        }

        let read: ReadResponse = response
            .json()
            .await
            .map_err(|e| Error::Permanent(format!("Malformed read response for {path}: {e}")))?;

        extract_values(read.data, self.config.kv_version, path)
    }
}

/// Turn listed keys into child paths.
///
/// Vault allows a name to be both a secret and a folder (`app` and `app/`).
/// Such a node cannot be placed in the document without losing one side, so
/// it is rejected.
fn child_paths(path: &SecretPath, keys: &[String]) -> Result<Vec<SecretPath>> {
    let mut leaves = BTreeSet::new();
    let mut branches = BTreeSet::new();
    for key in keys {
        match key.strip_suffix('/') {
            Some(branch) if !branch.is_empty() => {
                branches.insert(branch);
            }
            Some(_) => {}
            None if !key.is_empty() => {
                leaves.insert(key.as_str());
            }
            None => {}
        }
    }

    if let Some(name) = leaves.intersection(&branches).next() {
        return Err(Error::Permanent(format!(
            "{} is both a secret and a folder",
            path.join(name)?
        )));
    }

    leaves
        .union(&branches)
        .map(|name| path.join(name))
        .collect()
}

/// Map a logical path onto the API path segments.
fn api_segments(path: &SecretPath, kv_version: KvVersion, operation: Operation) -> Vec<String> {
    let components = path.components();
    match (kv_version, components.split_first()) {
        (KvVersion::V2, Some((mount, rest))) => {
            let view = match operation {
                Operation::List => "metadata",
                Operation::Read => "data",
            };
            let mut segments = Vec::with_capacity(components.len() + 1);
            segments.push(mount.clone());
            segments.push(view.to_string());
            segments.extend(rest.iter().cloned());
            segments
        }
        _ => components.to_vec(),
    }
}

/// Pull the key/value pairs out of a read response payload.
fn extract_values(data: Option<Value>, kv_version: KvVersion, path: &SecretPath) -> Result<SecretValues> {
    let payload = match kv_version {
        KvVersion::V1 => data,
        // A soft-deleted latest version reads back as `data: null`.
        KvVersion::V2 => data.and_then(|mut envelope| envelope.get_mut("data").map(Value::take)),
    };

    match payload {
        Some(Value::Object(values)) => Ok(values),
        None | Some(Value::Null) => Ok(SecretValues::new()),
        Some(other) => Err(Error::Permanent(format!(
            "Secret at {path} is not a key/value mapping: {}",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn classify_transport(err: reqwest::Error) -> Error {
    if err.is_builder() {
        Error::Permanent(format!("Invalid request: {err}"))
    } else {
        Error::Transient(format!("Request failed: {err}"))
    }
}

fn classify_status(status: StatusCode, body: &str, path: &SecretPath) -> Error {
    let detail = serde_json::from_str::<ErrorResponse>(body)
        .unwrap_or_default()
        .errors
        .join("; ");
    let message = if detail.is_empty() {
        format!("{path}: HTTP {status}")
    } else {
        format!("{path}: HTTP {status}: {detail}")
    };

    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        Error::Transient(message)
    } else if status == StatusCode::NOT_FOUND {
        Error::Permanent(format!("Secret not found: {message}"))
    } else {
        Error::Permanent(message)
    }
}
