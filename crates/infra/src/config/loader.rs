//! Configuration loader
//!
//! Loads queue configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. Reads a `.env` file into the environment when one exists
//! 2. Attempts to load from environment variables
//! 3. If `FIELDSYNC_STORAGE_BACKEND` is unset, falls back to a config file
//! 4. Without any config file, uses the defaults
//!
//! Every result is validated before it is returned.
//!
//! ## Environment Variables
//! - `FIELDSYNC_STORAGE_BACKEND`: `memory`, `file` or `sqlite` (required)
//! - `FIELDSYNC_STORAGE_PATH`: Directory (file) or database path (sqlite)
//! - `FIELDSYNC_QUEUE_MAX_CAPACITY`: Maximum number of queued operations
//! - `FIELDSYNC_QUEUE_MAX_RETRIES`: Default retry budget per operation
//! - `FIELDSYNC_QUEUE_BASE_DELAY_MS`: First retry delay
//! - `FIELDSYNC_QUEUE_MAX_DELAY_MS`: Retry delay cap
//! - `FIELDSYNC_QUEUE_DRAIN_INTERVAL_MS`: Periodic drain interval
//! - `FIELDSYNC_QUEUE_STORAGE_KEY`: Key the queue is saved under
//! - `FIELDSYNC_NETWORK_PROBE_URL`: Endpoint probed for connectivity
//! - `FIELDSYNC_NETWORK_PROBE_INTERVAL_MS`: Probe interval
//! - `FIELDSYNC_LOG_LEVEL`: Default log filter
//! - `FIELDSYNC_LOG_JSON`: Emit JSON logs (true/false)
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./config.json` or `./config.toml` (current working directory)
//! 2. `./fieldsync.json` or `./fieldsync.toml` (current working directory)
//! 3. The same names next to the executable

use std::path::{Path, PathBuf};
use std::str::FromStr;

use fieldsync_domain::{Config, FieldSyncError, Result, StorageBackend};

const CONFIG_FILE_NAMES: [&str; 4] =
    ["config.json", "config.toml", "fieldsync.json", "fieldsync.toml"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `FieldSyncError::Config` if a source exists but is invalid, or if
/// the resulting configuration fails validation.
pub fn load() -> Result<Config> {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env file"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "Ignoring unreadable .env file"),
    }

    if std::env::var_os("FIELDSYNC_STORAGE_BACKEND").is_some() {
        let config = load_from_env()?;
        tracing::info!("Configuration loaded from environment variables");
        return Ok(config);
    }

    match probe_config_paths() {
        Some(path) => load_from_file(Some(path)),
        None => {
            tracing::info!("No configuration found, using defaults");
            Ok(Config::default())
        }
    }
}

/// Load configuration from environment variables
///
/// `FIELDSYNC_STORAGE_BACKEND` must be set; every other variable falls back
/// to its default.
///
/// # Errors
/// Returns `FieldSyncError::Config` if the backend variable is missing or
/// any variable has an invalid value.
pub fn load_from_env() -> Result<Config> {
    let mut config = Config::default();

    config.storage.backend = StorageBackend::from_str(&env_var("FIELDSYNC_STORAGE_BACKEND")?)
        .map_err(FieldSyncError::Config)?;
    if let Some(path) = env_opt("FIELDSYNC_STORAGE_PATH") {
        config.storage.path = Some(PathBuf::from(path));
    }

    if let Some(v) = env_parse("FIELDSYNC_QUEUE_MAX_CAPACITY")? {
        config.queue.max_capacity = v;
    }
    if let Some(v) = env_parse("FIELDSYNC_QUEUE_MAX_RETRIES")? {
        config.queue.default_max_retries = v;
    }
    if let Some(v) = env_parse("FIELDSYNC_QUEUE_BASE_DELAY_MS")? {
        config.queue.base_retry_delay_ms = v;
    }
    if let Some(v) = env_parse("FIELDSYNC_QUEUE_MAX_DELAY_MS")? {
        config.queue.max_retry_delay_ms = v;
    }
    if let Some(v) = env_parse("FIELDSYNC_QUEUE_DRAIN_INTERVAL_MS")? {
        config.queue.drain_interval_ms = v;
    }
    if let Some(key) = env_opt("FIELDSYNC_QUEUE_STORAGE_KEY") {
        config.queue.storage_key = key;
    }

    if let Some(url) = env_opt("FIELDSYNC_NETWORK_PROBE_URL") {
        config.network.probe_url = Some(url);
    }
    if let Some(v) = env_parse("FIELDSYNC_NETWORK_PROBE_INTERVAL_MS")? {
        config.network.probe_interval_ms = v;
    }

    if let Some(level) = env_opt("FIELDSYNC_LOG_LEVEL") {
        config.logging.level = level;
    }
    config.logging.json = env_bool("FIELDSYNC_LOG_JSON", config.logging.json);

    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations. Format is detected by
/// extension (`.json` or `.toml`); omitted fields take their defaults.
///
/// # Errors
/// Returns `FieldSyncError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
/// - Validation fails
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(FieldSyncError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            FieldSyncError::Config("No config file found in any of the standard locations".into())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| FieldSyncError::Config(format!("Failed to read config file: {e}")))?;

    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    Ok(config)
}

/// Parse configuration, detecting the format by file extension
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| FieldSyncError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| FieldSyncError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(FieldSyncError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe the standard locations for a configuration file
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut dirs = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd);
    }
    if let Some(exe_dir) =
        std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        dirs.push(exe_dir);
    }

    dirs.iter()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.exists())
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| FieldSyncError::Config(format!("Missing required environment variable: {key}")))
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_opt(key)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .map_err(|e| FieldSyncError::Config(format!("Invalid value for {key}: {e}")))
        })
        .transpose()
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
