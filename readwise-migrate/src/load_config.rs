/// `load_config` module: Loads a static YAML config and injects the account tokens from the environment.
///
/// The YAML file never holds secrets. Tokens are read from
/// `READWISE_SOURCE_TOKEN` and `READWISE_TARGET_TOKEN`, which may also come
/// from a `.env` file in the working directory.
///
/// # Accepted YAML
/// ```yaml
/// sync:
///   upload_from_file: false
///   cache_dir: .
///   updated_after: null
/// api:
///   base_url: https://readwise.io/api
/// retry:
///   default_retry_after_secs: 60
///   server_error_retries: 3
///   server_error_backoff_secs: 5
///   max_batch_rate_limit_retries: null
/// ```
/// Every section and key is optional.
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::{Context, Result};
use readwise_migrate_core::cache::CachePaths;
use readwise_migrate_core::client::DEFAULT_BASE_URL;
use readwise_migrate_core::retry::RetryPolicy;
use readwise_migrate_core::synchronise::SyncConfig;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

pub const SOURCE_TOKEN_ENV: &str = "READWISE_SOURCE_TOKEN";
pub const TARGET_TOKEN_ENV: &str = "READWISE_TARGET_TOKEN";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    pub upload_from_file: bool,
    pub cache_dir: Option<PathBuf>,
    pub updated_after: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    pub base_url: String,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub default_retry_after_secs: Option<u64>,
    pub server_error_retries: Option<u32>,
    pub server_error_backoff_secs: Option<u64>,
    pub max_batch_rate_limit_retries: Option<u32>,
}

impl RetrySection {
    fn into_policy(self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            default_retry_after: self
                .default_retry_after_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.default_retry_after),
            server_error_retries: self
                .server_error_retries
                .unwrap_or(defaults.server_error_retries),
            server_error_backoff: self
                .server_error_backoff_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.server_error_backoff),
            max_batch_rate_limit_retries: self.max_batch_rate_limit_retries,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    sync: SyncSection,
    api: ApiSection,
    retry: RetrySection,
}

/// Fully merged configuration for one CLI run.
#[derive(Debug)]
pub struct CliConfig {
    pub sync: SyncConfig,
    pub base_url: String,
    /// Absent only when uploading from cache files.
    pub source_token: Option<String>,
    pub target_token: String,
}

fn token_from_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Loads the YAML config at `path`, then injects tokens from the environment.
///
/// `from_cache` forces `upload_from_file` on regardless of the file.
pub fn load_config<P: AsRef<Path>>(path: P, from_cache: bool) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = fs::read_to_string(path_ref).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
        anyhow::anyhow!("Failed to read config file {:?}: {}", path_ref, e)
    })?;

    let raw: RawConfig = if config_content.trim().is_empty() {
        RawConfig::default()
    } else {
        serde_yaml::from_str(&config_content).map_err(|e| {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            anyhow::anyhow!("Failed to parse config YAML: {e}")
        })?
    };
    info!(config_path = ?path_ref, "Parsed config YAML successfully");

    let upload_from_file = from_cache || raw.sync.upload_from_file;

    let target_token = token_from_env(TARGET_TOKEN_ENV)
        .with_context(|| format!("{TARGET_TOKEN_ENV} environment variable not set"))?;
    let source_token = token_from_env(SOURCE_TOKEN_ENV);
    if source_token.is_none() && !upload_from_file {
        error!("Source token missing while fetching from the source account");
        anyhow::bail!(
            "{SOURCE_TOKEN_ENV} environment variable not set (required unless uploading from cache files)"
        );
    }

    let cache = raw
        .sync
        .cache_dir
        .as_deref()
        .map(CachePaths::in_dir)
        .unwrap_or_default();

    let sync = SyncConfig {
        upload_from_file,
        cache,
        updated_after: raw.sync.updated_after,
        retry: raw.retry.into_policy(),
    };

    info!(
        upload_from_file,
        base_url = %raw.api.base_url,
        highlights_cache = %sync.cache.highlights.display(),
        documents_cache = %sync.cache.documents.display(),
        "Config loaded and merged successfully"
    );

    Ok(CliConfig {
        sync,
        base_url: raw.api.base_url,
        source_token,
        target_token,
    })
}
