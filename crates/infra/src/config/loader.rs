//! Configuration loader
//!
//! Loads queue configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. If any `COURIER_*` variable is set, the environment wins: defaults
//!    overlaid with every variable present
//! 2. Otherwise the first config file found is used
//! 3. With neither, built-in defaults apply
//!
//! The result is validated before it is returned.
//!
//! ## Environment Variables
//! - `COURIER_MAX_CAPACITY`: Maximum number of queued items
//! - `COURIER_BACKOFF_MS`: Comma-separated backoff table in milliseconds
//! - `COURIER_MAX_ATTEMPTS`: Failed attempts before dead-lettering (0 = never)
//! - `COURIER_HEALTH_URL`: Health endpoint for the connectivity probe
//! - `COURIER_PROBE_INTERVAL_SECS`: Probe interval in seconds
//! - `COURIER_PROBE_TIMEOUT_SECS`: Probe timeout in seconds
//! - `COURIER_START_ONLINE`: Initial connectivity state (true/false)
//! - `COURIER_DB_PATH`: SQLite database file
//! - `COURIER_DB_POOL_SIZE`: Connection pool size
//! - `COURIER_LOG_LEVEL`: Default log filter
//! - `COURIER_LOG_JSON`: Emit JSON logs (true/false)
//!
//! ## File Locations
//! `courier.toml`, `courier.json`, `config.toml` and `config.json` are probed
//! in the working directory, its parent and grandparent, then next to the
//! executable.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use courier_domain::{CourierConfig, QueueError, Result};

const ENV_PREFIX: &str = "COURIER_";

const CONFIG_FILE_NAMES: [&str; 4] = ["courier.toml", "courier.json", "config.toml", "config.json"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `QueueError::Config` if a present source is malformed or the
/// resulting configuration fails validation.
pub fn load() -> Result<CourierConfig> {
    let config = match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            config
        }
        Err(e) => {
            tracing::debug!(error = %e, "Environment not used, trying file");
            match probe_config_paths() {
                Some(path) => load_from_file(Some(path))?,
                None => {
                    tracing::info!("No configuration found, using defaults");
                    CourierConfig::default()
                }
            }
        }
    };

    config.validate()?;
    Ok(config)
}

/// Load configuration from `COURIER_*` environment variables
///
/// Unset variables keep their defaults.
///
/// # Errors
/// Returns `QueueError::Config` if no `COURIER_*` variable is set or a value
/// cannot be parsed.
pub fn load_from_env() -> Result<CourierConfig> {
    let has_any = std::env::vars_os()
        .any(|(key, _)| key.to_str().is_some_and(|key| key.starts_with(ENV_PREFIX)));
    if !has_any {
        return Err(QueueError::Config("No COURIER_* environment variables set".into()));
    }
    from_lookup(|key| std::env::var(key).ok())
}

/// Build a configuration from defaults plus whatever `lookup` returns.
fn from_lookup<F>(lookup: F) -> Result<CourierConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = CourierConfig::default();

    if let Some(value) = parsed(&lookup, "COURIER_MAX_CAPACITY")? {
        config.queue.max_capacity = value;
    }
    if let Some(raw) = lookup("COURIER_BACKOFF_MS") {
        config.queue.backoff_ms = parse_backoff(&raw)?;
    }
    if let Some(value) = parsed(&lookup, "COURIER_MAX_ATTEMPTS")? {
        config.queue.max_attempts = value;
    }

    if let Some(url) = lookup("COURIER_HEALTH_URL").filter(|url| !url.trim().is_empty()) {
        config.network.health_url = Some(url);
    }
    if let Some(value) = parsed(&lookup, "COURIER_PROBE_INTERVAL_SECS")? {
        config.network.probe_interval_secs = value;
    }
    if let Some(value) = parsed(&lookup, "COURIER_PROBE_TIMEOUT_SECS")? {
        config.network.probe_timeout_secs = value;
    }
    config.network.start_online =
        env_bool(&lookup, "COURIER_START_ONLINE", config.network.start_online);

    if let Some(path) = lookup("COURIER_DB_PATH").filter(|path| !path.trim().is_empty()) {
        config.storage.path = Some(PathBuf::from(path));
    }
    if let Some(value) = parsed(&lookup, "COURIER_DB_POOL_SIZE")? {
        config.storage.pool_size = value;
    }

    if let Some(level) = lookup("COURIER_LOG_LEVEL") {
        config.logging.level = level;
    }
    config.logging.json = env_bool(&lookup, "COURIER_LOG_JSON", config.logging.json);

    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations. JSON and TOML are
/// detected by extension.
///
/// # Errors
/// Returns `QueueError::Config` if the file is missing, unreadable, or
/// malformed.
pub fn load_from_file(path: Option<PathBuf>) -> Result<CourierConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(QueueError::Config(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            QueueError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| QueueError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content, format chosen by extension.
fn parse_config(contents: &str, path: &Path) -> Result<CourierConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| QueueError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| QueueError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(QueueError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// First existing config file among the standard locations.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.extend(cwd.ancestors().take(3).map(Path::to_path_buf));
    }

    if let Some(exe_dir) =
        std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        roots.push(exe_dir);
    }

    roots
        .iter()
        .flat_map(|root| CONFIG_FILE_NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.is_file())
}

fn parsed<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| QueueError::Config(format!("Invalid value for {key}: {e}")))
        })
        .transpose()
}

fn parse_backoff(raw: &str) -> Result<Vec<u64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u64>().map_err(|e| {
                QueueError::Config(format!("Invalid value for COURIER_BACKOFF_MS ({part}): {e}"))
            })
        })
        .collect()
}

/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive).
fn env_bool<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|s| matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
