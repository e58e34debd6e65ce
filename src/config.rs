use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use log::info;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("Invalid {key} value {value:?}: {reason}")]
pub struct ConfigError {
    pub key: String,
    pub value: String,
    pub reason: String,
}

/// Runtime settings, read from `SHEETGATE_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub data_dir: PathBuf,
    /// Endpoint `/process-files` relays to. Forwarding is off when unset.
    pub external_api_url: Option<String>,
    pub external_timeout: Duration,
    pub dataset_ttl: Duration,
    pub session_ttl: Duration,
    /// Users file for argon2 logins. Any login is accepted when unset.
    pub users_file: Option<PathBuf>,
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5000".to_string(),
            data_dir: PathBuf::from("data"),
            external_api_url: None,
            external_timeout: Duration::from_secs(30),
            dataset_ttl: Duration::from_secs(60 * 60),
            session_ttl: Duration::from_secs(24 * 60 * 60),
            users_file: None,
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup; unset keys fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        Ok(Self {
            bind_addr: try_load(&lookup, "SHEETGATE_BIND", defaults.bind_addr)?,
            data_dir: try_load(&lookup, "SHEETGATE_DATA_DIR", defaults.data_dir.display())?,
            external_api_url: optional(&lookup, "SHEETGATE_EXTERNAL_API_URL"),
            external_timeout: seconds(
                &lookup,
                "SHEETGATE_EXTERNAL_TIMEOUT_SECS",
                defaults.external_timeout,
            )?,
            dataset_ttl: seconds(&lookup, "SHEETGATE_DATASET_TTL_SECS", defaults.dataset_ttl)?,
            session_ttl: seconds(&lookup, "SHEETGATE_SESSION_TTL_SECS", defaults.session_ttl)?,
            users_file: optional(&lookup, "SHEETGATE_USERS_FILE").map(PathBuf::from),
            max_upload_bytes: try_load(
                &lookup,
                "SHEETGATE_MAX_UPLOAD_BYTES",
                defaults.max_upload_bytes,
            )?,
        })
    }
}

fn optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|value| !value.trim().is_empty())
}

fn try_load<F, T>(lookup: &F, key: &str, default: impl Display) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    let raw = optional(lookup, key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.trim().parse().map_err(|e: T::Err| ConfigError {
        key: key.to_string(),
        value: raw.clone(),
        reason: e.to_string(),
    })
}

fn seconds<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    try_load(lookup, key, default.as_secs()).map(Duration::from_secs)
}
