//! Configuration for the `serial_stream` command-line tool.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `SERIAL_STREAM_CONFIG` environment variable (explicit path)
//! 2. `./serial-stream.toml` (current directory)
//! 3. `serial-stream/config.toml` in the platform config directory
//!    (`~/.config` on Linux, `~/Library/Application Support` on macOS,
//!    `%APPDATA%` on Windows)
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! Any configuration value can be overridden via environment variables.
//! The pattern is: `SERIAL_STREAM_<SECTION>_<KEY>`
//!
//! Examples:
//! - `SERIAL_STREAM_SERIAL_DEFAULT_BAUD=9600`
//! - `SERIAL_STREAM_LOGGING_FORMAT=json`
//! - `SERIAL_STREAM_TESTING_PORT0=/dev/ttyUSB0`
//!
//! The loopback test pair also honours the bare `PORT0` and `PORT1` variables.
//!
//! # Example
//!
//! ```rust,no_run
//! use serial_stream::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! let config = loader.config();
//! println!("Default baud: {}", config.serial.default_baud);
//! # Ok::<(), serial_stream::config::ConfigError>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{Config, LogFormat, LoggingConfig, SerialConfig, TestingConfig};
