/// `load_config` module: resolves where the session record lives and how to reach the object store.
///
/// Settings come from three layers, later ones winning:
/// 1. an optional YAML file (`--config <PATH>` or `S3MULTIPART_CONFIG`),
/// 2. environment variables (`S3MULTIPART_STATE_FILE`, `AWS_REGION`,
///    `S3_ENDPOINT`, `S3_FORCE_PATH_STYLE`),
/// 3. the `--state-file` CLI flag (applied by the caller via [`CliConfig::state_file`]).
///
/// Credentials are never read here; the AWS default provider chain supplies them.
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::{Context, Result};
use s3multipart_core::state::DEFAULT_STATE_FILE;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub state_file: Option<PathBuf>,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible services (MinIO, R2, ...).
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
}

impl CliConfig {
    /// Path of the session record, preferring an explicit CLI override.
    pub fn state_file(&self, cli_override: Option<PathBuf>) -> PathBuf {
        cli_override
            .or_else(|| self.state_file.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE))
    }
}

/// Loads the optional YAML config and applies environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<CliConfig> {
    let path = path
        .map(Path::to_path_buf)
        .or_else(|| env::var_os("S3MULTIPART_CONFIG").map(PathBuf::from));

    let mut config = match &path {
        Some(path_ref) => {
            info!(config_path = ?path_ref, "Loading configuration from file");
            let content = fs::read_to_string(path_ref).map_err(|e| {
                error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
                anyhow::anyhow!("Failed to read config file {:?}: {}", path_ref, e)
            })?;
            let parsed: CliConfig = serde_yaml::from_str(&content).map_err(|e| {
                error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
                anyhow::anyhow!("Failed to parse config YAML: {e}")
            })?;
            parsed
        }
        None => CliConfig::default(),
    };

    if let Ok(state_file) = env::var("S3MULTIPART_STATE_FILE") {
        info!(state_file = %state_file, "State file set from environment");
        config.state_file = Some(PathBuf::from(state_file));
    }
    if let Ok(region) = env::var("AWS_REGION") {
        config.storage.region = Some(region);
    }
    if let Ok(endpoint) = env::var("S3_ENDPOINT") {
        info!(endpoint = %endpoint, "Custom S3 endpoint set from environment");
        config.storage.endpoint = Some(endpoint);
    }
    if let Ok(raw) = env::var("S3_FORCE_PATH_STYLE") {
        config.storage.force_path_style = parse_flag(&raw)
            .with_context(|| format!("S3_FORCE_PATH_STYLE must be true or false, got {raw:?}"))?;
    }

    info!(
        region = config.storage.region.as_deref().unwrap_or("<default chain>"),
        endpoint = config.storage.endpoint.as_deref().unwrap_or("<aws>"),
        force_path_style = config.storage.force_path_style,
        "Config loaded and merged successfully"
    );
    Ok(config)
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" | "" => Ok(false),
        other => anyhow::bail!("unrecognised flag value {other}"),
    }
}
