//! Configuration loader
//!
//! Builds a [`PipelineConfig`] from layered sources.
//!
//! ## Loading Strategy
//! 1. `.env` is read into the process environment (`dotenvy`), if present
//! 2. A config file is the base layer: the explicit path, else
//!    `FIELDLINK_CONFIG`, else the first probed location, else defaults
//! 3. `FIELDLINK_*` environment variables override individual fields
//! 4. The result is validated
//!
//! ## Environment Variables
//! - `FIELDLINK_API_BASE_URL`, `FIELDLINK_API_REFRESH_PATH`,
//!   `FIELDLINK_API_HEALTH_PATH`, `FIELDLINK_API_TIMEOUT_MS`
//! - `FIELDLINK_REFRESH_WINDOW_SECS`, `FIELDLINK_KEYCHAIN_SERVICE`
//! - `FIELDLINK_MAX_RETRIES`, `FIELDLINK_BASE_DELAY_MS`, `FIELDLINK_MAX_DELAY_MS`
//! - `FIELDLINK_QUEUE_CAPACITY`, `FIELDLINK_QUEUE_TTL_SECS`,
//!   `FIELDLINK_QUEUE_MAX_RETRIES`, `FIELDLINK_REPLAY_INTERVAL_SECS`
//! - `FIELDLINK_CIRCUIT_BREAKER_ENABLED`
//! - `FIELDLINK_DB_PATH`, `FIELDLINK_DB_POOL_SIZE`
//! - `FIELDLINK_LOG_FILTER`, `FIELDLINK_LOG_FORMAT` (`pretty` or `json`)
//!
//! ## File Locations
//! `fieldlink.{toml,json}` then `config.{toml,json}` in the working
//! directory, its parent, and next to the executable.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use fieldlink_common::error::{CommonError, CommonResult};
use fieldlink_domain::config::{LogFormat, PipelineConfig};
use tracing::{debug, info};

const CONFIG_PATH_VAR: &str = "FIELDLINK_CONFIG";
const CONFIG_FILE_NAMES: [&str; 4] =
    ["fieldlink.toml", "fieldlink.json", "config.toml", "config.json"];

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Layered configuration loader
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env: EnvLookup,
    read_dotenv: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Loader over the process environment
    pub fn new() -> Self {
        Self { file: None, env: Box::new(|key| std::env::var(key).ok()), read_dotenv: true }
    }

    /// Use `path` as the base layer; it must exist.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Replace the environment with `lookup`. `.env` files are not read.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Box::new(lookup);
        self.read_dotenv = false;
        self
    }

    pub fn load(&self) -> CommonResult<PipelineConfig> {
        if self.read_dotenv {
            match dotenvy::dotenv() {
                Ok(path) => debug!(path = %path.display(), "Loaded .env"),
                Err(e) if e.not_found() => {}
                Err(e) => return Err(CommonError::config(format!("Invalid .env file: {e}"))),
            }
        }

        let file = match &self.file {
            Some(path) => Some(path.clone()),
            None => (self.env)(CONFIG_PATH_VAR).map(PathBuf::from).or_else(probe_config_paths),
        };

        let mut config = match file {
            Some(path) => load_from_file(&path)?,
            None => {
                debug!("No config file found, starting from defaults");
                PipelineConfig::default()
            }
        };

        apply_env_overrides(&mut config, self.env.as_ref())?;
        config.validate()?;
        Ok(config)
    }
}

/// Load configuration from a `.toml` or `.json` file
pub fn load_from_file(path: &Path) -> CommonResult<PipelineConfig> {
    if !path.exists() {
        return Err(CommonError::config(format!("Config file not found: {}", path.display())));
    }

    info!(path = %path.display(), "Loading configuration from file");
    let contents = std::fs::read_to_string(path)
        .map_err(|e| CommonError::config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, path)
}

fn parse_config(contents: &str, path: &Path) -> CommonResult<PipelineConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| CommonError::config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| CommonError::config(format!("Invalid JSON format: {e}"))),
        _ => Err(CommonError::config(format!("Unsupported config format: {extension}"))),
    }
}

/// First existing config file among the standard locations
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut dirs = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        let parent = cwd.join("..");
        dirs.extend([cwd, parent]);
    }
    if let Some(exe_dir) = std::env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf))
    {
        dirs.push(exe_dir);
    }

    dirs.iter()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.is_file())
}

fn apply_env_overrides(
    config: &mut PipelineConfig,
    env: &(dyn Fn(&str) -> Option<String> + Send + Sync),
) -> CommonResult<()> {
    let var = |key: &str| env(key).filter(|value| !value.trim().is_empty());

    if let Some(value) = var("FIELDLINK_API_BASE_URL") {
        config.api.base_url = value;
    }
    if let Some(value) = var("FIELDLINK_API_REFRESH_PATH") {
        config.api.refresh_path = value;
    }
    if let Some(value) = var("FIELDLINK_API_HEALTH_PATH") {
        config.api.health_path = Some(value);
    }
    if let Some(value) = var("FIELDLINK_API_TIMEOUT_MS") {
        config.api.request_timeout = Duration::from_millis(parse("FIELDLINK_API_TIMEOUT_MS", &value)?);
    }
    if let Some(value) = var("FIELDLINK_REFRESH_WINDOW_SECS") {
        config.auth.refresh_window =
            Duration::from_secs(parse("FIELDLINK_REFRESH_WINDOW_SECS", &value)?);
    }
    if let Some(value) = var("FIELDLINK_KEYCHAIN_SERVICE") {
        config.auth.keychain_service = value;
    }
    if let Some(value) = var("FIELDLINK_MAX_RETRIES") {
        config.retry.max_retries = parse("FIELDLINK_MAX_RETRIES", &value)?;
    }
    if let Some(value) = var("FIELDLINK_BASE_DELAY_MS") {
        config.retry.base_delay = Duration::from_millis(parse("FIELDLINK_BASE_DELAY_MS", &value)?);
    }
    if let Some(value) = var("FIELDLINK_MAX_DELAY_MS") {
        config.retry.max_delay = Duration::from_millis(parse("FIELDLINK_MAX_DELAY_MS", &value)?);
    }
    if let Some(value) = var("FIELDLINK_QUEUE_CAPACITY") {
        config.queue.capacity = parse("FIELDLINK_QUEUE_CAPACITY", &value)?;
    }
    if let Some(value) = var("FIELDLINK_QUEUE_TTL_SECS") {
        config.queue.default_ttl = Duration::from_secs(parse("FIELDLINK_QUEUE_TTL_SECS", &value)?);
    }
    if let Some(value) = var("FIELDLINK_QUEUE_MAX_RETRIES") {
        config.queue.max_retries = parse("FIELDLINK_QUEUE_MAX_RETRIES", &value)?;
    }
    if let Some(value) = var("FIELDLINK_REPLAY_INTERVAL_SECS") {
        config.queue.replay_interval =
            Duration::from_secs(parse("FIELDLINK_REPLAY_INTERVAL_SECS", &value)?);
    }
    if let Some(value) = var("FIELDLINK_CIRCUIT_BREAKER_ENABLED") {
        config.circuit_breaker.enabled = parse_bool("FIELDLINK_CIRCUIT_BREAKER_ENABLED", &value)?;
    }
    if let Some(value) = var("FIELDLINK_DB_PATH") {
        config.database.path = value;
    }
    if let Some(value) = var("FIELDLINK_DB_POOL_SIZE") {
        config.database.pool_size = parse("FIELDLINK_DB_POOL_SIZE", &value)?;
    }
    if let Some(value) = var("FIELDLINK_LOG_FILTER") {
        config.logging.filter = value;
    }
    if let Some(value) = var("FIELDLINK_LOG_FORMAT") {
        config.logging.format = match value.to_ascii_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            other => {
                return Err(CommonError::config_field(
                    "FIELDLINK_LOG_FORMAT",
                    format!("expected 'pretty' or 'json', got '{other}'"),
                ))
            }
        };
    }
    Ok(())
}

fn parse<T>(key: &str, value: &str) -> CommonResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| CommonError::config_field(key, format!("invalid value '{value}': {e}")))
}

/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn parse_bool(key: &str, value: &str) -> CommonResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CommonError::config_field(key, format!("invalid boolean '{value}'"))),
    }
}
