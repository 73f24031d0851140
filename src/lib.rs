//! Blocking serial port I/O for POSIX and Windows.
//!
//! A [`PortConfig`] describes the device and its framing. [`port::open`]
//! validates it against the platform's control interface, opens the device
//! exclusively and returns a [`Port`] that behaves as a plain byte stream.
//!
//! ```no_run
//! use serial_stream::{PortConfig, SerialStream};
//! use std::time::Duration;
//!
//! let config: PortConfig = "/dev/ttyUSB0:115200,8N1,500ms".parse()?;
//! let port = serial_stream::open(&config)?;
//! port.write_all(b"AT\r")?;
//!
//! let mut reply = [0u8; 64];
//! let n = port.read(&mut reply)?;
//! println!("{:?}", &reply[..n]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Modules
//!
//! - `port`: the byte-stream contract, the native drivers and a mock
//! - `resolve`: configuration validation and translation to OS values
//! - `format`: the `name:baud,8N1,timeout` text form
//! - `list`: device discovery (Unix)
//! - `relay`: copy loops between a port and standard streams
//! - `config`: TOML configuration for the command-line tool
//! - `logging`: tracing subscriber setup

pub mod config;
pub mod format;
#[cfg(unix)]
pub mod list;
pub mod logging;
pub mod port;
pub mod relay;
pub mod resolve;

pub use format::{parse_config, FormatError};
pub use port::{
    MockPort, ModemStatus, Parity, PortConfig, Result, SerialError, SerialStream, StopBits,
};

#[cfg(any(unix, windows))]
pub use port::{open, Port};

pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
