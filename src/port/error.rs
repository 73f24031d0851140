//! Port-specific error types.
//!
//! Resolution errors are raised before any device handle exists. Everything an
//! operating system call reports is carried in [`SerialError::Os`] with the
//! native error code intact.

use super::traits::{Parity, StopBits};
use std::io;
use thiserror::Error;

/// Errors that can occur while resolving, opening or using a serial port.
#[derive(Debug, Error)]
pub enum SerialError {
    /// Data bits outside 5..=8 (0 is accepted and means 8).
    #[error("Invalid data size: {0} data bits")]
    InvalidDataSize(u8),

    /// The parity mode cannot be represented on this platform.
    #[error("Invalid parity: {0:?}")]
    InvalidParity(Parity),

    /// The stop-bit setting cannot be represented on this platform.
    #[error("Invalid stop bits: {0}")]
    InvalidStopBits(StopBits),

    /// The baud rate is not a speed the platform can configure.
    #[error("Unknown baud rate: {0}")]
    UnknownBaudRate(u32),

    /// The opened path is not a terminal device.
    #[error("Not a tty: {0}")]
    NotATty(String),

    /// Another handle already holds the device open.
    #[error("Serial port already locked: {0}")]
    AlreadyLocked(String),

    /// The handle has been closed.
    #[error("Port is closed")]
    Closed,

    /// An operating system call failed.
    #[error("{op} failed: {source}")]
    Os {
        op: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Result type for serial port operations.
pub type Result<T> = std::result::Result<T, SerialError>;

impl SerialError {
    /// Wrap an OS error together with the call that produced it.
    pub fn os(op: &'static str, source: io::Error) -> Self {
        Self::Os { op, source }
    }

    /// Capture `errno` / `GetLastError` for the call that just failed.
    pub fn last_os_error(op: &'static str) -> Self {
        Self::os(op, io::Error::last_os_error())
    }

    /// The native error code, if this error came from the OS.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            Self::Os { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    /// True for errors detected while validating a configuration.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidDataSize(_)
                | Self::InvalidParity(_)
                | Self::InvalidStopBits(_)
                | Self::UnknownBaudRate(_)
        )
    }
}

impl From<SerialError> for io::Error {
    fn from(err: SerialError) -> Self {
        match err {
            SerialError::Os { source, .. } => source,
            SerialError::Closed => io::Error::new(io::ErrorKind::NotConnected, err),
            SerialError::AlreadyLocked(_) => io::Error::new(io::ErrorKind::WouldBlock, err),
            SerialError::NotATty(_) => io::Error::new(io::ErrorKind::Unsupported, err),
            other => io::Error::new(io::ErrorKind::InvalidInput, other),
        }
    }
}
