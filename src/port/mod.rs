//! Port abstraction layer for serial communication.
//!
//! [`Port`] is the native driver for the build target: termios on Unix,
//! overlapped comm I/O on Windows. Both implement [`SerialStream`], as does
//! [`MockPort`] for tests.

pub mod error;
pub mod mock;
pub mod traits;

#[cfg(unix)]
mod posix;
#[cfg(windows)]
mod windows;

pub use error::{Result, SerialError};
pub use mock::MockPort;
pub use traits::*;

#[cfg(unix)]
pub use posix::Port;
#[cfg(windows)]
pub use windows::Port;

/// Open the serial device described by `config`.
///
/// The configuration is validated before the device is touched, so an
/// unsupported setting never leaves a handle behind.
#[cfg(any(unix, windows))]
pub fn open(config: &PortConfig) -> Result<Port> {
    Port::open(config)
}

#[cfg(any(unix, windows))]
impl std::io::Read for Port {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        SerialStream::read(self, buf).map_err(Into::into)
    }
}

#[cfg(any(unix, windows))]
impl std::io::Read for &Port {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        SerialStream::read(*self, buf).map_err(Into::into)
    }
}

/// `io::Write::flush` is a no-op: writes are unbuffered, and
/// [`SerialStream::flush`] discards data rather than draining it.
#[cfg(any(unix, windows))]
impl std::io::Write for Port {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        SerialStream::write(self, buf).map_err(Into::into)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(any(unix, windows))]
impl std::io::Write for &Port {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        SerialStream::write(*self, buf).map_err(Into::into)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
