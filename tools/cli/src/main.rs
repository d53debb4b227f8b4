//! vault-dump CLI - Export a Vault KV tree as a structured document.
//!
//! `dump` walks one or more store paths, optionally reshapes the result with
//! a rule set, and delivers it to stdout, a file, or S3. `transform` applies
//! a rule set to an existing document.

mod settings;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use vaultdump_common::{ResultTree, SecretPath, SensitiveString};
use vaultdump_extract::{
    CancellationToken, IgnoreFilter, RetryConfig, RetryingStoreClient, SecretTreeWalker,
};
use vaultdump_sink::{deliver, output::write_stdout, Encoding, OutputConfig, OutputKind};
use vaultdump_store::{VaultConfig, VaultStore};
use vaultdump_transform::{RuleSet, TransformEngine};

use settings::{default_settings_files, FileSettings, Settings, SettingsArgs};

#[derive(Parser)]
#[command(name = "vault-dump")]
#[command(about = "Dump a Vault KV tree to JSON or YAML")]
#[command(version)]
struct Cli {
    /// Settings file (default: /etc/vault-dump/config.yaml, then ~/.vault-dump/config.yaml).
    #[arg(long, global = true, env = "VAULT_DUMP_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk store paths and write the secrets as one document.
    Dump {
        /// Store paths to walk, comma separated.
        #[arg(value_delimiter = ',', num_args = 1, action = clap::ArgAction::Set, required = true)]
        paths: Vec<String>,

        /// Output directory (file) or s3://bucket/prefix (s3).
        destination: Option<String>,

        /// Rule set applied to the extracted tree before delivery.
        #[arg(long)]
        apply: Option<PathBuf>,

        /// Document encoding: "json" or "yaml".
        #[arg(short, long, default_value = "json")]
        encoding: Encoding,

        /// Output: "stdout", "file", or "s3".
        #[arg(short, long, default_value = "file")]
        output: OutputKind,

        /// KMS key id or ARN for s3 output.
        #[arg(long, env = "VAULT_DUMP_KMS_KEY")]
        kms_key: Option<String>,

        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// Apply a rule set to a JSON or YAML document and print the result.
    Transform {
        /// Rule set file.
        #[arg(long)]
        apply: PathBuf,

        /// Document to transform, or "-" for stdin.
        document: PathBuf,

        /// Output encoding: "json" or "yaml".
        #[arg(short, long, default_value = "json")]
        encoding: Encoding,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the document.
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Dump {
            paths,
            destination,
            apply,
            encoding,
            output,
            kms_key,
            settings,
        } => {
            let file = FileSettings::load(cli.config.as_deref(), &default_settings_files())?;
            let settings = Settings::resolve(&settings, file, |key| std::env::var(key).ok())?;
            let output = OutputConfig {
                kind: output,
                encoding,
                filename: settings.filename.clone(),
                destination,
                kms_key,
            };
            cmd_dump(&paths, apply.as_deref(), &output, settings).await
        }

        Commands::Transform {
            apply,
            document,
            encoding,
        } => cmd_transform(&apply, &document, encoding).await,
    }
}

/// Prompt for the Vault token securely.
fn prompt_token() -> Result<SensitiveString> {
    let token = rpassword::prompt_password("Vault token: ").context("Failed to read token")?;
    Ok(SensitiveString::new(token))
}

/// Read a file, or stdin for "-".
async fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut input = String::new();
        tokio::io::stdin()
            .read_to_string(&mut input)
            .await
            .context("Failed to read stdin")?;
        return Ok(input);
    }
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

/// Decode by file extension. Unknown extensions are read as YAML, which
/// also accepts JSON.
fn decoding_for(path: &Path) -> Encoding {
    Encoding::from_path(path).unwrap_or(Encoding::Yaml)
}

async fn load_rules(path: &Path) -> Result<RuleSet> {
    let text = read_input(path).await?;
    let rules: RuleSet = decoding_for(path)
        .decode(&text)
        .with_context(|| format!("Invalid rule set {}", path.display()))?;
    info!(rules = rules.len(), path = %path.display(), "Loaded rule set");
    Ok(rules)
}

/// Cancel `cancel` on Ctrl-C.
fn cancel_on_interrupt(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling extraction");
            cancel.cancel();
        }
    });
}

/// Walk, transform, and deliver.
async fn cmd_dump(
    paths: &[String],
    apply: Option<&Path>,
    output: &OutputConfig,
    settings: Settings,
) -> Result<()> {
    output.validate().context("Invalid output settings")?;

    let roots = paths
        .iter()
        .map(|path| path.trim())
        .filter(|path| !path.is_empty())
        .map(SecretPath::parse)
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Invalid store path")?;
    if roots.is_empty() {
        bail!("No store paths given");
    }

    let rules = match apply {
        Some(path) => Some(load_rules(path).await?),
        None => None,
    };

    let filter = IgnoreFilter::from_strings(&settings.ignore_keys, &settings.ignore_paths)
        .context("Invalid ignore settings")?;

    let token = match settings.vault_token {
        Some(token) => token,
        None if std::io::stdin().is_terminal() => prompt_token()?,
        None => bail!("No Vault token configured (set VAULT_TOKEN or --vault-token)"),
    };

    let config = VaultConfig::new(&settings.vault_addr, token)?
        .with_namespace(settings.vault_namespace)
        .with_kv_version(settings.kv_version)
        .with_timeout(settings.timeout);
    let store = VaultStore::new(config).context("Failed to create Vault client")?;

    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());

    let client = RetryingStoreClient::new(store, RetryConfig::new(settings.retries), cancel);
    let walker = SecretTreeWalker::new(client, filter).with_concurrency(settings.concurrency);

    let mut tree = walker
        .walk_all(&roots)
        .await
        .context("Failed to extract secrets")?;

    if let Some(rules) = rules {
        tree = TransformEngine::new()
            .apply(&rules, &tree)
            .context("Failed to apply transform rules")?;
    }

    let delivered = deliver(output, &tree)
        .await
        .context("Failed to deliver document")?;
    info!(destination = %delivered, secrets = tree.count_values(), "Dump complete");

    Ok(())
}

/// Transform an existing document.
async fn cmd_transform(apply: &Path, document: &Path, encoding: Encoding) -> Result<()> {
    let rules = load_rules(apply).await?;

    let text = read_input(document).await?;
    let tree: ResultTree = decoding_for(document)
        .decode(&text)
        .with_context(|| format!("Invalid document {}", document.display()))?;

    let result = TransformEngine::new()
        .apply(&rules, &tree)
        .context("Failed to apply transform rules")?;

    write_stdout(&encoding.encode(&result)?)
        .await
        .context("Failed to write output")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dump() {
        let cli = Cli::try_parse_from([
            "vault-dump",
            "-v",
            "dump",
            "-e",
            "yaml",
            "-o",
            "s3",
            "--kms-key",
            "alias/dump",
            "--ignore-keys",
            "pass,token",
            "/secret/a,/secret/b",
            "s3://backups/vault",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Dump {
                paths,
                destination,
                encoding,
                output,
                kms_key,
                settings,
                ..
            } => {
                assert_eq!(paths, ["/secret/a", "/secret/b"]);
                assert_eq!(destination.as_deref(), Some("s3://backups/vault"));
                assert_eq!(encoding, Encoding::Yaml);
                assert_eq!(output, OutputKind::S3);
                assert_eq!(kms_key.as_deref(), Some("alias/dump"));
                assert_eq!(
                    settings.ignore_keys,
                    Some(vec!["pass".to_string(), "token".to_string()])
                );
            }
            Commands::Transform { .. } => panic!("expected dump"),
        }
    }

    #[test]
    fn test_dump_writes_a_file_by_default() {
        let cli = Cli::try_parse_from(["vault-dump", "dump", "/secret"]).unwrap();
        match cli.command {
            Commands::Dump {
                output,
                encoding,
                destination,
                ..
            } => {
                assert_eq!(output, OutputKind::File);
                assert_eq!(encoding, Encoding::Json);
                assert!(destination.is_none());
            }
            Commands::Transform { .. } => panic!("expected dump"),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_encoding() {
        assert!(Cli::try_parse_from(["vault-dump", "dump", "-e", "toml", "/secret"]).is_err());
        assert!(Cli::try_parse_from(["vault-dump", "dump"]).is_err());
    }

    #[test]
    fn test_parse_transform() {
        let cli = Cli::try_parse_from([
            "vault-dump",
            "transform",
            "--apply",
            "rules.yaml",
            "doc.json",
        ])
        .unwrap();
        match cli.command {
            Commands::Transform {
                apply,
                document,
                encoding,
            } => {
                assert_eq!(apply, PathBuf::from("rules.yaml"));
                assert_eq!(document, PathBuf::from("doc.json"));
                assert_eq!(encoding, Encoding::Json);
            }
            Commands::Dump { .. } => panic!("expected transform"),
        }
    }

    #[test]
    fn test_decoding_for() {
        assert_eq!(decoding_for(Path::new("rules.json")), Encoding::Json);
        assert_eq!(decoding_for(Path::new("rules.yml")), Encoding::Yaml);
        assert_eq!(decoding_for(Path::new("-")), Encoding::Yaml);
    }

    #[tokio::test]
    async fn test_load_rules_from_yaml() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("rules.yaml");
        std::fs::write(
            &path,
            "rules:\n  - op: rename\n    from: db.user\n    to: database.username\n  - op: delete\n    path: db\n",
        )
        .unwrap();

        let rules = load_rules(&path).await.unwrap();
        assert_eq!(rules.len(), 2);
    }
}
