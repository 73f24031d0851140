//! Errors raised while locating, reading or checking the configuration file.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("cannot encode configuration as TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("cannot write config file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An override variable that does not parse as its setting.
    #[error("{var}={value:?} is not a valid {expected}")]
    Env {
        var: String,
        value: String,
        expected: &'static str,
    },

    /// Aliases with a colon would be read as `NAME:BAUD` on the command line.
    #[error("port alias {0:?} must not contain ':'")]
    AliasWithColon(String),

    #[error("port alias {0:?} maps to an empty device name")]
    EmptyAlias(String),

    /// Only one end of the `[testing]` loopback pair is set.
    #[error("loopback pair is incomplete: {missing} is not set")]
    IncompleteLoopbackPair { missing: &'static str },

    /// `save` on a loader that was not read from a file.
    #[error("no config file path; use save_to")]
    NoConfigPath,
}

impl ConfigError {
    pub fn env<V: Into<String>, S: Into<String>>(var: V, value: S, expected: &'static str) -> Self {
        Self::Env {
            var: var.into(),
            value: value.into(),
            expected,
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
