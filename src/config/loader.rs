//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::{Config, LogFormat};
use crate::port::{Parity, StopBits};
use directories::ProjectDirs;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "SERIAL_STREAM";

/// Config file name inside the platform config directory
const CONFIG_FILE_NAME: &str = "config.toml";

/// Config file name looked up in the current directory
const LOCAL_CONFIG_FILE: &str = "serial-stream.toml";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "SERIAL_STREAM_CONFIG";

const APP_NAME: &str = "serial-stream";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `SERIAL_STREAM_CONFIG` environment variable (explicit path)
    /// 2. `./serial-stream.toml` (current directory)
    /// 3. `serial-stream/config.toml` in the platform config directory
    /// 4. Built-in defaults (no file required)
    ///
    /// Environment variables can override any config file values.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = match config_path {
            Some(ref path) => load_from_file(path)?,
            None => Config::default(),
        };

        apply_env_overrides(&mut config)?;
        validate(&config)?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        validate(&config)?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    ///
    /// Environment overrides still apply; malformed ones are ignored.
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        let _ = apply_env_overrides(&mut config);

        Self {
            config_path: None,
            config,
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to the file it was loaded from.
    pub fn save(&self) -> ConfigResult<()> {
        let path = self
            .config_path
            .as_ref()
            .ok_or(ConfigError::NoConfigPath)?;

        save_to_file(&self.config, path)
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }

    get_default_config_path().filter(|path| path.exists())
}

/// Platform config directory for this application.
pub fn get_default_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Default config file path for creating new config files.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Reject settings the command line could not use as written.
fn validate(config: &Config) -> ConfigResult<()> {
    for (alias, target) in &config.serial.port_aliases {
        if alias.contains(':') {
            return Err(ConfigError::AliasWithColon(alias.clone()));
        }
        if target.trim().is_empty() {
            return Err(ConfigError::EmptyAlias(alias.clone()));
        }
    }

    let testing = &config.testing;
    match (&testing.port0, &testing.port1) {
        (Some(_), None) => Err(ConfigError::IncompleteLoopbackPair { missing: "port1" }),
        (None, Some(_)) => Err(ConfigError::IncompleteLoopbackPair { missing: "port0" }),
        _ => Ok(()),
    }
}

fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::Write {
        path: path.to_path_buf(),
        source: e,
    })
}

fn env_key(section_key: &str) -> String {
    format!("{ENV_PREFIX}_{section_key}")
}

/// Read `SERIAL_STREAM_<key>`, falling back to a legacy unprefixed name.
fn env_value(section_key: &str, legacy: Option<&str>) -> Option<(String, String)> {
    let key = env_key(section_key);
    if let Ok(val) = env::var(&key) {
        return Some((key, val));
    }
    let legacy = legacy?;
    env::var(legacy).ok().map(|val| (legacy.to_string(), val))
}

fn env_parsed<T, F>(
    section_key: &str,
    parse: F,
    expected: &'static str,
) -> ConfigResult<Option<T>>
where
    F: FnOnce(&str) -> Option<T>,
{
    match env_value(section_key, None) {
        Some((var, val)) => parse(val.trim())
            .map(Some)
            .ok_or_else(|| ConfigError::env(var, val, expected)),
        None => Ok(None),
    }
}

fn from_str<T: FromStr>(s: &str) -> Option<T> {
    s.parse().ok()
}

fn parse_parity(s: &str) -> Option<Parity> {
    match s.to_ascii_lowercase().as_str() {
        "none" => Some(Parity::None),
        "odd" => Some(Parity::Odd),
        "even" => Some(Parity::Even),
        "mark" => Some(Parity::Mark),
        "space" => Some(Parity::Space),
        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Parity::from_letter(c),
                _ => None,
            }
        }
    }
}

fn parse_stop_bits(s: &str) -> Option<StopBits> {
    match s {
        "1" => Some(StopBits::One),
        "1.5" => Some(StopBits::OneHalf),
        "2" => Some(StopBits::Two),
        _ => None,
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_log_format(s: &str) -> Option<LogFormat> {
    match s.to_ascii_lowercase().as_str() {
        "json" => Some(LogFormat::Json),
        "pretty" => Some(LogFormat::Pretty),
        "compact" => Some(LogFormat::Compact),
        _ => None,
    }
}

/// Apply environment variable overrides to the configuration.
///
/// Environment variables follow the pattern `SERIAL_STREAM_<SECTION>_<KEY>`,
/// for example `SERIAL_STREAM_SERIAL_DEFAULT_BAUD=9600`. The loopback pair
/// also honours the bare `PORT0` and `PORT1` variables.
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    let serial = &mut config.serial;
    if let Some(val) = env_parsed("SERIAL_DEFAULT_BAUD", from_str::<u32>, "baud rate")? {
        serial.default_baud = val;
    }
    if let Some(val) = env_parsed("SERIAL_DATA_BITS", from_str::<u8>, "data bit count")? {
        serial.data_bits = val;
    }
    if let Some(val) = env_parsed("SERIAL_PARITY", parse_parity, "parity")? {
        serial.parity = val;
    }
    if let Some(val) = env_parsed("SERIAL_STOP_BITS", parse_stop_bits, "stop bit setting")? {
        serial.stop_bits = val;
    }
    if let Some(val) = env_parsed("SERIAL_READ_TIMEOUT_MS", from_str::<u64>, "timeout in milliseconds")? {
        serial.read_timeout_ms = val;
    }
    if let Some(val) = env_parsed("SERIAL_ASSERT_DTR", parse_bool, "boolean")? {
        serial.assert_dtr = val;
    }

    if let Some((_, val)) = env_value("LOGGING_LEVEL", None) {
        config.logging.level = val;
    }
    if let Some(val) = env_parsed("LOGGING_FORMAT", parse_log_format, "log format")? {
        config.logging.format = val;
    }

    if let Some((_, val)) = env_value("TESTING_PORT0", Some("PORT0")) {
        config.testing.port0 = Some(val);
    }
    if let Some((_, val)) = env_value("TESTING_PORT1", Some("PORT1")) {
        config.testing.port1 = Some(val);
    }
    if let Some(val) = env_parsed("TESTING_BAUD", from_str::<u32>, "baud rate")? {
        config.testing.baud = val;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_default_loader() {
        let loader = ConfigLoader::with_defaults();
        assert_eq!(loader.config().serial.default_baud, 115200);
        assert!(loader.config_path.is_none());
    }

    #[test]
    #[serial]
    fn test_env_override() {
        env::set_var("SERIAL_STREAM_SERIAL_DEFAULT_BAUD", "9600");
        env::set_var("SERIAL_STREAM_SERIAL_PARITY", "e");
        env::set_var("SERIAL_STREAM_LOGGING_FORMAT", "json");

        let loader = ConfigLoader::with_defaults();
        assert_eq!(loader.config().serial.default_baud, 9600);
        assert_eq!(loader.config().serial.parity, Parity::Even);
        assert_eq!(loader.config().logging.format, LogFormat::Json);

        env::remove_var("SERIAL_STREAM_SERIAL_DEFAULT_BAUD");
        env::remove_var("SERIAL_STREAM_SERIAL_PARITY");
        env::remove_var("SERIAL_STREAM_LOGGING_FORMAT");
    }

    #[test]
    #[serial]
    fn test_invalid_env_override_is_reported() {
        env::set_var("SERIAL_STREAM_SERIAL_STOP_BITS", "3");

        let mut config = Config::default();
        let err = apply_env_overrides(&mut config).unwrap_err();
        assert!(err.to_string().contains("SERIAL_STREAM_SERIAL_STOP_BITS"));

        env::remove_var("SERIAL_STREAM_SERIAL_STOP_BITS");
    }

    #[test]
    #[serial]
    fn test_legacy_loopback_env() {
        env::set_var("PORT0", "/dev/ttyUSB0");
        env::set_var("PORT1", "/dev/ttyUSB1");

        let loader = ConfigLoader::with_defaults();
        assert_eq!(
            loader.config().testing.loopback_pair(),
            Some(("/dev/ttyUSB0", "/dev/ttyUSB1"))
        );

        env::remove_var("PORT0");
        env::remove_var("PORT1");
    }

    #[test]
    #[serial]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("serial-stream.toml");

        let mut loader = ConfigLoader::with_defaults();
        loader.config.serial.default_baud = 57600;
        loader
            .config
            .serial
            .port_aliases
            .insert("modem".to_string(), "/dev/ttyS1".to_string());
        loader.save_to(&path).unwrap();

        let reloaded = ConfigLoader::load_from(&path).unwrap();
        assert_eq!(reloaded.config_path.as_deref(), Some(path.as_path()));
        assert_eq!(reloaded.config(), loader.config());
    }

    #[test]
    #[serial]
    fn test_explicit_path_env() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[serial]\ndefault_baud = 4800\n").unwrap();
        env::set_var(CONFIG_PATH_ENV, &path);

        let loader = ConfigLoader::load().unwrap();
        assert_eq!(loader.config_path.as_deref(), Some(path.as_path()));
        assert_eq!(loader.config().serial.default_baud, 4800);

        env::remove_var(CONFIG_PATH_ENV);
    }

    #[test]
    fn test_load_missing_file() {
        let err = ConfigLoader::load_from("/nonexistent/serial-stream.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    #[serial]
    fn test_half_loopback_pair_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("serial-stream.toml");
        std::fs::write(&path, "[testing]\nport0 = \"/dev/ttyUSB0\"\n").unwrap();

        let err = ConfigLoader::load_from(&path).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::IncompleteLoopbackPair { missing: "port1" }
        ));

        env::set_var("PORT1", "/dev/ttyUSB1");
        let loader = ConfigLoader::load_from(&path).unwrap();
        assert_eq!(
            loader.config().testing.loopback_pair(),
            Some(("/dev/ttyUSB0", "/dev/ttyUSB1"))
        );
        env::remove_var("PORT1");
    }

    #[test]
    #[serial]
    fn test_alias_checks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("serial-stream.toml");

        std::fs::write(&path, "[serial.port_aliases]\n\"lab:1\" = \"/dev/ttyS0\"\n").unwrap();
        let err = ConfigLoader::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::AliasWithColon(ref a) if a == "lab:1"));

        std::fs::write(&path, "[serial.port_aliases]\nlab = \" \"\n").unwrap();
        let err = ConfigLoader::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyAlias(ref a) if a == "lab"));
    }

    #[test]
    #[serial]
    fn test_parse_error_names_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[serial\n").unwrap();

        let err = ConfigLoader::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    #[serial]
    fn test_save_without_path() {
        let loader = ConfigLoader::with_defaults();
        assert!(matches!(loader.save(), Err(ConfigError::NoConfigPath)));
    }

    #[test]
    fn test_parity_spellings() {
        assert_eq!(parse_parity("Odd"), Some(Parity::Odd));
        assert_eq!(parse_parity("M"), Some(Parity::Mark));
        assert_eq!(parse_parity("nn"), None);
        assert_eq!(parse_stop_bits("1.5"), Some(StopBits::OneHalf));
        assert_eq!(parse_bool("off"), Some(false));
    }
}
