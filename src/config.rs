#![forbid(unsafe_code)]

use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::audit::log_file_for_channel;
use crate::downloader::{DEFAULT_YT_DLP, DownloaderParams};
use crate::error::{ImporterError, Result};
use crate::token::split_shared_secret;

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_DOWNLOADS_PATH: &str = "downloads";
pub const DEFAULT_LOGS_PATH: &str = "logs";
pub const DEFAULT_THROTTLE_SECONDS: u64 = 30;

/// Everything one importer run needs. Immutable once handed to an
/// [`Importer`](crate::importer::Importer).
#[derive(Debug, Clone)]
pub struct ImporterConfig {
    pub channel_url: String,
    pub publication_name: String,
    pub shared_secret: String,
    pub downloader_params: DownloaderParams,
    pub downloads_path: PathBuf,
    pub logs_path: PathBuf,
    pub throttle: Duration,
    /// Ask the VMS for an existing import before submitting.
    pub dedupe: bool,
}

impl ImporterConfig {
    pub fn new(
        channel_url: impl Into<String>,
        publication_name: impl Into<String>,
        shared_secret: impl Into<String>,
    ) -> Self {
        Self {
            channel_url: channel_url.into(),
            publication_name: publication_name.into(),
            shared_secret: shared_secret.into(),
            downloader_params: DownloaderParams::default(),
            downloads_path: PathBuf::from(DEFAULT_DOWNLOADS_PATH),
            logs_path: PathBuf::from(DEFAULT_LOGS_PATH),
            throttle: Duration::from_secs(DEFAULT_THROTTLE_SECONDS),
            dedupe: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.channel_url.trim().is_empty() {
            return Err(ImporterError::Configuration("channel URL is empty".into()));
        }
        if self.publication_name.trim().is_empty() {
            return Err(ImporterError::Configuration(
                "publication name is empty".into(),
            ));
        }
        split_shared_secret(&self.shared_secret)?;
        ensure_directory("downloads", &self.downloads_path)?;
        ensure_directory("logs", &self.logs_path)?;
        Ok(())
    }

    pub fn log_file(&self) -> PathBuf {
        log_file_for_channel(&self.logs_path, &self.channel_url)
    }
}

fn ensure_directory(label: &str, path: &Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(ImporterError::Configuration(format!(
            "{label} path {} does not exist",
            path.display()
        )))
    }
}

/// Values given on the command line; they win over the environment and the
/// env file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub channel_url: Option<String>,
    pub publication_name: Option<String>,
    pub shared_secret: Option<String>,
    pub downloads_path: Option<PathBuf>,
    pub logs_path: Option<PathBuf>,
    pub throttle_seconds: Option<u64>,
    pub dedupe: Option<bool>,
    pub yt_dlp: Option<PathBuf>,
    pub env_path: Option<PathBuf>,
}

/// A fully resolved configuration plus the downloader binary to run.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub importer: ImporterConfig,
    pub yt_dlp: PathBuf,
}

pub fn resolve_config(overrides: ConfigOverrides) -> Result<ResolvedConfig> {
    let env_path = overrides
        .env_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(&env_path)?;
    build_config_with_overrides(&file_vars, env_var_string, overrides)
}

fn build_config_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: ConfigOverrides,
) -> Result<ResolvedConfig> {
    let lookup = |key: &str| lookup_value(key, file_vars, &env_lookup);
    let required = |value: Option<String>, key: &str| {
        value
            .filter(|value| !value.trim().is_empty())
            .or_else(|| lookup(key))
            .ok_or_else(|| ImporterError::Configuration(format!("{key} not set")))
    };

    let channel_url = required(overrides.channel_url, "CHANNEL_URL")?;
    let publication_name = required(overrides.publication_name, "PUBLICATION_NAME")?;
    let shared_secret = required(overrides.shared_secret, "PUBLICATION_SHARED_SECRET")?;

    let downloads_path = overrides
        .downloads_path
        .or_else(|| lookup("DOWNLOADS_PATH").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOADS_PATH));
    let logs_path = overrides
        .logs_path
        .or_else(|| lookup("LOGS_PATH").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOGS_PATH));
    let throttle_seconds = overrides
        .throttle_seconds
        .or_else(|| lookup("THROTTLE_SECONDS").and_then(|value| value.parse::<u64>().ok()))
        .unwrap_or(DEFAULT_THROTTLE_SECONDS);
    let dedupe = overrides
        .dedupe
        .or_else(|| lookup("DEDUPE").and_then(|value| parse_flag(&value)))
        .unwrap_or(true);
    let yt_dlp = overrides
        .yt_dlp
        .or_else(|| lookup("YT_DLP_PATH").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_YT_DLP));

    Ok(ResolvedConfig {
        importer: ImporterConfig {
            channel_url,
            publication_name,
            shared_secret,
            downloader_params: DownloaderParams::default(),
            downloads_path,
            logs_path,
            throttle: Duration::from_secs(throttle_seconds),
            dedupe,
        },
        yt_dlp,
    })
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| {
        file_vars
            .get(key)
            .filter(|value| !value.trim().is_empty())
            .cloned()
    })
}

/// Reads `KEY=value` pairs. Comments, blank lines and `export ` prefixes are
/// accepted; a missing file yields no variables.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content = fs::read_to_string(path)
        .map_err(|err| ImporterError::io(format!("reading {}", path.display()), err))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
