//! Layered configuration loader.
//!
//! Layers are applied in order, later layers overriding earlier ones:
//!
//! 1. Built-in defaults
//! 2. A JSON or TOML file
//! 3. A `.env` file
//! 4. Environment variables
//!
//! Environment variables use `PREFIX__SECTION__KEY` (for example
//! `HERON__SERVER__PORT=9000`). A few common settings also have short
//! aliases: `PREFIX_HOST`, `PREFIX_PORT`, `PREFIX_ENVIRONMENT`,
//! `PREFIX_READ_TIMEOUT`, `PREFIX_WRITE_TIMEOUT`, `PREFIX_ENABLE_CORS` and
//! `PREFIX_ENABLE_METRICS`. When both forms are set, the long form wins.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::{ConfigError, HeronConfig, HealthEndpointMode, LogFormat};

/// Prefix used by the `heron` binary.
pub const DEFAULT_ENV_PREFIX: &str = "HERON";

/// Where environment overrides come from.
#[derive(Debug)]
enum EnvSource {
    Process,
    Explicit(BTreeMap<String, String>),
}

/// Configuration loader with layered approach.
///
/// # Example
///
/// ```no_run
/// use heron_config::ConfigLoader;
///
/// # fn main() -> Result<(), heron_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_defaults()
///     .with_optional_file("heron.json")?
///     .with_dotenv()?
///     .with_env_prefix("HERON")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: HeronConfig,
    env_prefix: Option<String>,
    env_source: EnvSource,
    dotenv: BTreeMap<String, String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader holding the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: HeronConfig::default(),
            env_prefix: None,
            env_source: EnvSource::Process,
            dotenv: BTreeMap::new(),
        }
    }

    /// Reset to the default configuration values.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = HeronConfig::default();
        self
    }

    /// Load configuration from a file.
    ///
    /// `.toml` files are parsed as TOML, everything else as JSON. Fields the
    /// file leaves out keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, unreadable or invalid.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));

        self.config = if is_toml {
            toml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        Ok(self)
    }

    /// Load configuration from a file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in the given format (`json` or `toml`).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the format is unknown or parsing fails.
    ///
    /// # Example
    ///
    /// ```
    /// use heron_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(r#"{"server": {"port": 3000}}"#, "json")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.server.port, 3000);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };
        Ok(self)
    }

    /// Reads `.env` from the current directory, if present.
    ///
    /// Its variables sit below real environment variables and are only used
    /// for overrides; the process environment is not modified.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Dotenv` if the file exists but is malformed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv_iter() {
            Ok(iter) => self.collect_dotenv(iter),
            Err(err) if err.not_found() => Ok(self),
            Err(err) => Err(ConfigError::Dotenv(err.to_string())),
        }
    }

    /// Reads a specific dotenv file, which must exist.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Dotenv` if the file is missing or malformed.
    pub fn with_dotenv_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let iter = dotenvy::from_path_iter(&path)
            .map_err(|e| ConfigError::Dotenv(format!("{}: {e}", path.display())))?;
        self.collect_dotenv(iter)
    }

    fn collect_dotenv<I>(mut self, iter: dotenvy::Iter<I>) -> Result<Self, ConfigError>
    where
        I: std::io::Read,
    {
        for item in iter {
            let (key, value) = item.map_err(|e| ConfigError::Dotenv(e.to_string()))?;
            self.dotenv.insert(key, value);
        }
        Ok(self)
    }

    /// Set environment variable prefix for overrides.
    ///
    /// Without a prefix no environment overrides are applied.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Use these variables instead of the process environment.
    ///
    /// # Example
    ///
    /// ```
    /// use heron_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_env_prefix("HERON")
    ///     .with_env_vars([("HERON_PORT", "9090")])
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.server.port, 9090);
    /// ```
    #[must_use]
    pub fn with_env_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env_source = EnvSource::Explicit(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Apply environment overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override cannot be parsed or the result
    /// fails validation.
    pub fn load(self) -> Result<HeronConfig, ConfigError> {
        let config = self.load_unvalidated()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides without validating.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override cannot be parsed.
    pub fn load_unvalidated(mut self) -> Result<HeronConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            let mut vars = std::mem::take(&mut self.dotenv);
            match std::mem::replace(&mut self.env_source, EnvSource::Process) {
                EnvSource::Process => vars.extend(std::env::vars()),
                EnvSource::Explicit(explicit) => vars.extend(explicit),
            }
            // BTreeMap order puts `PREFIX_KEY` before `PREFIX__SECTION__KEY`.
            for (key, value) in &vars {
                self.apply_env_var(key, value, &prefix)?;
            }
        }
        Ok(self.config)
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let Some(rest) = key.strip_prefix(prefix) else {
            return Ok(());
        };

        if let Some(path) = rest.strip_prefix("__") {
            let parts: Vec<&str> = path.split("__").collect();
            return self.apply_section_var(key, value, &parts);
        }

        let Some(alias) = rest.strip_prefix('_') else {
            return Ok(());
        };
        let config = &mut self.config;
        match alias {
            "HOST" => config.server.host = value.to_string(),
            "PORT" => config.server.port = parse_num(key, value)?,
            "ENVIRONMENT" => config.server.environment = value.to_string(),
            "READ_TIMEOUT" => config.server.read_timeout_secs = parse_secs(key, value)?,
            "WRITE_TIMEOUT" => config.server.write_timeout_secs = parse_secs(key, value)?,
            "ENABLE_CORS" => config.features.enable_cors = parse_flag(key, value)?,
            "ENABLE_METRICS" => config.features.enable_metrics = parse_flag(key, value)?,
            // Unknown key - ignore
            _ => {}
        }
        Ok(())
    }

    fn apply_section_var(&mut self, key: &str, value: &str, parts: &[&str]) -> Result<(), ConfigError> {
        let config = &mut self.config;
        match parts {
            ["SERVER", "HOST"] => config.server.host = value.to_string(),
            ["SERVER", "PORT"] => config.server.port = parse_num(key, value)?,
            ["SERVER", "READ_TIMEOUT_SECS"] => config.server.read_timeout_secs = parse_secs(key, value)?,
            ["SERVER", "WRITE_TIMEOUT_SECS"] => config.server.write_timeout_secs = parse_secs(key, value)?,
            ["SERVER", "IDLE_TIMEOUT_SECS"] => config.server.idle_timeout_secs = parse_secs(key, value)?,
            ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => {
                config.server.shutdown_timeout_secs = parse_secs(key, value)?;
            }
            ["SERVER", "MAX_HEADER_BYTES"] => config.server.max_header_bytes = parse_num(key, value)?,
            ["SERVER", "REQUEST_TIMEOUT_SECS"] => {
                config.server.request_timeout_secs = parse_secs(key, value)?;
            }
            ["SERVER", "MAX_BODY_BYTES"] => config.server.max_body_bytes = parse_num(key, value)?,
            ["SERVER", "ENVIRONMENT"] => config.server.environment = value.to_string(),
            ["SERVER", "TRUST_REQUEST_ID"] => {
                config.server.trust_request_id = parse_flag(key, value)?;
            }

            ["FEATURES", "ENABLE_CORS"] => config.features.enable_cors = parse_flag(key, value)?,
            ["FEATURES", "ENABLE_COMPRESSION"] => {
                config.features.enable_compression = parse_flag(key, value)?;
            }
            ["FEATURES", "ENABLE_LOGGING"] => config.features.enable_logging = parse_flag(key, value)?,
            ["FEATURES", "ENABLE_METRICS"] => config.features.enable_metrics = parse_flag(key, value)?,
            ["FEATURES", "ENABLE_HEALTH"] => config.features.enable_health = parse_flag(key, value)?,

            ["TLS", "CERT_FILE"] => config.tls.cert_file = optional_path(value),
            ["TLS", "KEY_FILE"] => config.tls.key_file = optional_path(value),

            ["STATIC_FILES", "DIR"] => config.static_files.dir = optional_path(value),
            ["STATIC_FILES", "PREFIX"] => config.static_files.prefix = value.to_string(),

            ["RATE_LIMIT", "ENABLED"] => config.rate_limit.enabled = parse_flag(key, value)?,
            ["RATE_LIMIT", "REQUESTS"] => config.rate_limit.requests = parse_num(key, value)?,
            ["RATE_LIMIT", "WINDOW_SECS"] => config.rate_limit.window_secs = parse_secs(key, value)?,

            ["HEALTH", "INTERVAL_SECS"] => config.health.interval_secs = parse_secs(key, value)?,
            ["HEALTH", "LOG_EVERY_UNHEALTHY_TICK"] => {
                config.health.log_every_unhealthy_tick = parse_flag(key, value)?;
            }
            ["HEALTH", "ENDPOINT_MODE"] => {
                config.health.endpoint_mode = match value.to_lowercase().as_str() {
                    "fresh" => HealthEndpointMode::Fresh,
                    "cached" => HealthEndpointMode::Cached,
                    _ => return Err(ConfigError::env_parse_error(key, "expected 'fresh' or 'cached'")),
                };
            }
            ["HEALTH", "CRITICAL_CHECKS"] => {
                config.health.critical_checks = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
            }

            ["METRICS", "INTERVAL_SECS"] => config.metrics.interval_secs = parse_secs(key, value)?,
            ["METRICS", "SAMPLE_CAPACITY"] => config.metrics.sample_capacity = parse_num(key, value)?,

            ["LOGGING", "LEVEL"] => config.logging.level = value.to_string(),
            ["LOGGING", "FORMAT"] => {
                config.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => return Err(ConfigError::env_parse_error(key, "expected 'json' or 'pretty'")),
                };
            }

            // Unknown key - ignore
            _ => {}
        }
        Ok(())
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parses whole seconds: `30`, `30s`, `5m` or `1h`.
fn parse_secs(key: &str, value: &str) -> Result<u64, ConfigError> {
    let value = value.trim();
    let (digits, multiplier) = if let Some(n) = value.strip_suffix('h') {
        (n, 3600)
    } else if let Some(n) = value.strip_suffix('m') {
        (n, 60)
    } else if let Some(n) = value.strip_suffix('s') {
        (n, 1)
    } else {
        (value, 1)
    };
    digits
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(|| ConfigError::env_parse_error(key, "expected seconds, e.g. 30 or 30s"))
}

fn optional_path(value: &str) -> Option<PathBuf> {
    if value.trim().is_empty() {
        None
    } else {
        Some(PathBuf::from(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn with_env(vars: &[(&str, &str)]) -> Result<HeronConfig, ConfigError> {
        ConfigLoader::new()
            .with_env_prefix("HERON")
            .with_env_vars(vars.iter().copied())
            .load()
    }

    #[test]
    fn test_loader_defaults() {
        let config = ConfigLoader::new().with_defaults().load().unwrap();
        assert_eq!(config, HeronConfig::default());
    }

    #[test]
    fn test_json_file_then_env_then_defaults() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"server": {{"host": "127.0.0.1", "port": 3000, "environment": "staging"}}}}"#
        )
        .unwrap();

        let config = ConfigLoader::new()
            .with_file(file.path())
            .unwrap()
            .with_env_prefix("HERON")
            .with_env_vars([("HERON_PORT", "4000")])
            .load()
            .unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.environment, "staging");
        assert_eq!(config.server.idle_timeout_secs, 60);
    }

    #[test]
    fn test_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[rate_limit]\nenabled = true\nrequests = 5\nwindow_secs = 1").unwrap();

        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
        assert!(config.rate_limit.enabled);
        assert_eq!(config.rate_limit.requests, 5);
    }

    #[test]
    fn test_missing_file() {
        let result = ConfigLoader::new().with_file("/nonexistent/heron.json");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));

        let config = ConfigLoader::new()
            .with_optional_file("/nonexistent/heron.json")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_invalid_file_content() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, "{{ not json").unwrap();
        let result = ConfigLoader::new().with_file(file.path());
        assert!(matches!(result, Err(ConfigError::JsonError(_))));
    }

    #[test]
    fn test_short_aliases() {
        let config = with_env(&[
            ("HERON_HOST", "10.0.0.1"),
            ("HERON_PORT", "9000"),
            ("HERON_ENVIRONMENT", "production"),
            ("HERON_READ_TIMEOUT", "5s"),
            ("HERON_WRITE_TIMEOUT", "2m"),
            ("HERON_ENABLE_CORS", "false"),
            ("HERON_ENABLE_METRICS", "0"),
        ])
        .unwrap();

        assert_eq!(config.server.addr(), "10.0.0.1:9000");
        assert_eq!(config.server.environment, "production");
        assert_eq!(config.server.read_timeout_secs, 5);
        assert_eq!(config.server.write_timeout_secs, 120);
        assert!(!config.features.enable_cors);
        assert!(!config.features.enable_metrics);
    }

    #[test]
    fn test_long_form_wins_over_alias() {
        let config = with_env(&[("HERON__SERVER__PORT", "7000"), ("HERON_PORT", "9000")]).unwrap();
        assert_eq!(config.server.port, 7000);
    }

    #[test]
    fn test_section_overrides() {
        let config = with_env(&[
            ("HERON__HEALTH__ENDPOINT_MODE", "cached"),
            ("HERON__HEALTH__CRITICAL_CHECKS", "database, queue"),
            ("HERON__RATE_LIMIT__ENABLED", "yes"),
            ("HERON__LOGGING__FORMAT", "json"),
            ("HERON__STATIC_FILES__DIR", "/srv/www"),
            ("HERON__SERVER__TRUST_REQUEST_ID", "true"),
            ("OTHER__SERVER__PORT", "1"),
        ])
        .unwrap();

        assert_eq!(config.health.endpoint_mode, HealthEndpointMode::Cached);
        assert_eq!(config.health.critical_checks, vec!["database", "queue"]);
        assert!(config.rate_limit.enabled);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.static_files.dir, Some(PathBuf::from("/srv/www")));
        assert!(config.server.trust_request_id);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_bad_env_value() {
        let result = with_env(&[("HERON_PORT", "eighty")]);
        assert!(matches!(result, Err(ConfigError::EnvParseError { var, .. }) if var == "HERON_PORT"));

        assert!(with_env(&[("HERON_ENABLE_CORS", "maybe")]).is_err());
    }

    #[test]
    fn test_env_result_is_validated() {
        let result = with_env(&[("HERON_READ_TIMEOUT", "0")]);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_dotenv_file_below_environment() {
        let mut dotenv = tempfile::NamedTempFile::new().unwrap();
        writeln!(dotenv, "HERON_PORT=5000\nHERON_HOST=127.0.0.1").unwrap();

        let config = ConfigLoader::new()
            .with_dotenv_file(dotenv.path())
            .unwrap()
            .with_env_prefix("HERON")
            .with_env_vars([("HERON_PORT", "6000")])
            .load()
            .unwrap();

        assert_eq!(config.server.port, 6000);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_no_prefix_means_no_overrides() {
        let config = ConfigLoader::new()
            .with_env_vars([("HERON_PORT", "6000")])
            .load()
            .unwrap();
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_bool("On"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);

        assert_eq!(parse_secs("K", "45").unwrap(), 45);
        assert_eq!(parse_secs("K", "45s").unwrap(), 45);
        assert_eq!(parse_secs("K", "1h").unwrap(), 3600);
        assert!(parse_secs("K", "fast").is_err());
    }
}
