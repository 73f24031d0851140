//! Core types for the serial port abstraction.
//!
//! Defines the declarative [`PortConfig`] and the [`SerialStream`] byte-stream
//! contract that each platform driver implements.

use super::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default number of data bits when the configuration leaves it at 0.
pub const DEFAULT_DATA_BITS: u8 = 8;

/// Configuration parameters for opening a serial port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfig {
    /// Device path or identifier (`/dev/ttyUSB0`, `COM3`).
    pub name: String,

    /// Baud rate (bits per second).
    pub baud: u32,

    /// Number of data bits (5, 6, 7 or 8; 0 means 8).
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,

    /// Parity checking mode.
    #[serde(default)]
    pub parity: Parity,

    /// Number of stop bits.
    #[serde(default)]
    pub stop_bits: StopBits,

    /// Read timeout. Zero blocks until at least one byte arrives.
    ///
    /// The serde form is whole milliseconds; finer values fail to serialize.
    #[serde(default, rename = "read_timeout_ms", with = "duration_ms")]
    pub read_timeout: Duration,

    /// Raise DTR when the port opens.
    #[serde(default = "default_assert_dtr")]
    pub assert_dtr: bool,
}

fn default_data_bits() -> u8 {
    DEFAULT_DATA_BITS
}

fn default_assert_dtr() -> bool {
    true
}

impl PortConfig {
    /// Create a configuration with 8N1 framing and a blocking read.
    pub fn new(name: impl Into<String>, baud: u32) -> Self {
        Self {
            name: name.into(),
            baud,
            data_bits: DEFAULT_DATA_BITS,
            parity: Parity::None,
            stop_bits: StopBits::One,
            read_timeout: Duration::ZERO,
            assert_dtr: true,
        }
    }

    pub fn data_bits(mut self, data_bits: u8) -> Self {
        self.data_bits = data_bits;
        self
    }

    pub fn parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    pub fn stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    pub fn read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn assert_dtr(mut self, assert_dtr: bool) -> Self {
        self.assert_dtr = assert_dtr;
        self
    }
}

/// Parity checking modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
    /// Parity bit always 1. Not representable with termios.
    Mark,
    /// Parity bit always 0. Not representable with termios.
    Space,
}

impl Parity {
    /// The conventional single-letter notation (`N`, `O`, `E`, `M`, `S`).
    pub fn letter(self) -> char {
        match self {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
            Parity::Mark => 'M',
            Parity::Space => 'S',
        }
    }

    /// Parse a parity letter, case-insensitively.
    pub fn from_letter(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'N' => Some(Parity::None),
            'O' => Some(Parity::Odd),
            'E' => Some(Parity::Even),
            'M' => Some(Parity::Mark),
            'S' => Some(Parity::Space),
            _ => None,
        }
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StopBits {
    #[default]
    #[serde(rename = "1")]
    One,
    /// Only representable on the Windows comm interface.
    #[serde(rename = "1.5")]
    OneHalf,
    #[serde(rename = "2")]
    Two,
}

impl fmt::Display for StopBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopBits::One => "1",
            StopBits::OneHalf => "1.5",
            StopBits::Two => "2",
        })
    }
}

/// Snapshot of the modem input lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModemStatus {
    /// Clear To Send
    pub cts: bool,
    /// Data Set Ready
    pub dsr: bool,
    /// Ring Indicator
    pub ring: bool,
    /// Data Carrier Detect (RLSD on Windows)
    pub dcd: bool,
}

/// Blocking byte-stream contract implemented by every platform driver.
///
/// All methods take `&self` so one reader thread and one writer thread can
/// share a port. Concurrent calls in the same direction are serialized by the
/// driver or the operating system.
pub trait SerialStream: Send + Sync + fmt::Debug {
    /// Read whatever is available within the configured timeout.
    ///
    /// Returns 0 when a read timeout is configured and it elapsed with no data.
    /// A short read is not an error.
    fn read(&self, buf: &mut [u8]) -> Result<usize>;

    /// Write bytes, returning how many the OS accepted.
    ///
    /// No retry is attempted for short writes.
    fn write(&self, buf: &[u8]) -> Result<usize>;

    /// Discard unread input and unsent output.
    fn flush(&self) -> Result<()>;

    /// Release the device. Calling it again is a no-op.
    fn close(&self) -> Result<()>;

    /// The device name the port was opened with.
    fn name(&self) -> &str;

    /// Write the whole buffer, looping over short writes.
    fn write_all(&self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.write(buf)?;
            if n == 0 {
                return Err(super::error::SerialError::os(
                    "write",
                    std::io::Error::from(std::io::ErrorKind::WriteZero),
                ));
            }
            buf = &buf[n..];
        }
        Ok(())
    }
}

mod duration_ms {
    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Fails rather than truncate a timeout with sub-millisecond precision.
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        if value.subsec_nanos() % 1_000_000 != 0 {
            return Err(S::Error::custom(format!(
                "read timeout {value:?} is not a whole number of milliseconds"
            )));
        }
        let ms = u64::try_from(value.as_millis())
            .map_err(|_| S::Error::custom("read timeout does not fit in u64 milliseconds"))?;
        serializer.serialize_u64(ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configuration() {
        let config = PortConfig::new("/dev/ttyUSB0", 9600);
        assert_eq!(config.baud, 9600);
        assert_eq!(config.data_bits, 8);
        assert_eq!(config.parity, Parity::None);
        assert_eq!(config.stop_bits, StopBits::One);
        assert_eq!(config.read_timeout, Duration::ZERO);
        assert!(config.assert_dtr);
    }

    #[test]
    fn test_builder_setters() {
        let config = PortConfig::new("COM3", 115200)
            .data_bits(7)
            .parity(Parity::Even)
            .stop_bits(StopBits::Two)
            .read_timeout(Duration::from_millis(250))
            .assert_dtr(false);
        assert_eq!(config.data_bits, 7);
        assert_eq!(config.parity, Parity::Even);
        assert_eq!(config.stop_bits, StopBits::Two);
        assert_eq!(config.read_timeout, Duration::from_millis(250));
        assert!(!config.assert_dtr);
    }

    #[test]
    fn test_parity_letters() {
        for parity in [
            Parity::None,
            Parity::Odd,
            Parity::Even,
            Parity::Mark,
            Parity::Space,
        ] {
            assert_eq!(Parity::from_letter(parity.letter()), Some(parity));
            assert_eq!(
                Parity::from_letter(parity.letter().to_ascii_lowercase()),
                Some(parity)
            );
        }
        assert_eq!(Parity::from_letter('Z'), None);
    }

    #[test]
    fn test_read_timeout_millisecond_form() {
        let config = PortConfig::new("/dev/ttyS0", 9600).read_timeout(Duration::from_millis(1500));
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains(r#""read_timeout_ms":1500"#));

        let finer = config.read_timeout(Duration::from_micros(1500));
        let err = serde_json::to_string(&finer).unwrap_err();
        assert!(err.to_string().contains("whole number of milliseconds"));
    }

    #[test]
    fn test_stop_bits_display() {
        assert_eq!(StopBits::One.to_string(), "1");
        assert_eq!(StopBits::OneHalf.to_string(), "1.5");
        assert_eq!(StopBits::Two.to_string(), "2");
    }
}
