//! Shared test utilities for serial_stream integration tests.
//!
//! On Unix this provides a pseudo-terminal pair: the slave side is a real tty
//! that `Port::open` accepts, the master side plays the remote device.

#![allow(dead_code)]

use serial_stream::PortConfig;
use std::time::Duration;

/// Default read timeout for tests that must never hang.
pub const TEST_TIMEOUT: Duration = Duration::from_millis(100);

/// A configuration with a short read timeout for `name`.
pub fn test_config(name: &str) -> PortConfig {
    PortConfig::new(name, 115200).read_timeout(TEST_TIMEOUT)
}

#[cfg(unix)]
pub use self::pty::Pty;

#[cfg(unix)]
mod pty {
    use std::ffi::CStr;
    use std::fs::File;
    use std::io::{self, Read, Write};
    use std::os::unix::io::{AsRawFd, FromRawFd};
    use std::time::{Duration, Instant};

    /// A pseudo-terminal pair. The master stays open for the pair's lifetime.
    pub struct Pty {
        pub master: File,
        pub slave_path: String,
    }

    fn check(ret: libc::c_int) -> io::Result<libc::c_int> {
        if ret < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(ret)
        }
    }

    impl Pty {
        pub fn open() -> io::Result<Self> {
            let fd = check(unsafe { libc::posix_openpt(libc::O_RDWR | libc::O_NOCTTY) })?;
            let master = unsafe { File::from_raw_fd(fd) };
            check(unsafe { libc::grantpt(fd) })?;
            check(unsafe { libc::unlockpt(fd) })?;
            let slave_path = slave_name(fd)?;
            Ok(Self { master, slave_path })
        }

        /// Write to the device side.
        pub fn send(&mut self, data: &[u8]) {
            self.master.write_all(data).unwrap();
            self.master.flush().unwrap();
        }

        /// Read exactly `len` bytes from the device side, or panic after `timeout`.
        pub fn expect_bytes(&mut self, len: usize, timeout: Duration) -> Vec<u8> {
            read_exact_timeout(&mut self.master, len, timeout).unwrap()
        }

        /// Wait up to `timeout` for any bytes from the device side.
        pub fn readable(&self, timeout: Duration) -> bool {
            poll_readable(self.master.as_raw_fd(), timeout).unwrap()
        }
    }

    #[cfg(target_os = "linux")]
    fn slave_name(fd: libc::c_int) -> io::Result<String> {
        let mut buf = [0 as libc::c_char; 128];
        let ret = unsafe { libc::ptsname_r(fd, buf.as_mut_ptr(), buf.len()) };
        if ret != 0 {
            return Err(io::Error::from_raw_os_error(ret));
        }
        let name = unsafe { CStr::from_ptr(buf.as_ptr()) };
        Ok(name.to_string_lossy().into_owned())
    }

    #[cfg(not(target_os = "linux"))]
    fn slave_name(fd: libc::c_int) -> io::Result<String> {
        let ptr = unsafe { libc::ptsname(fd) };
        if ptr.is_null() {
            return Err(io::Error::last_os_error());
        }
        let name = unsafe { CStr::from_ptr(ptr) };
        Ok(name.to_string_lossy().into_owned())
    }

    fn poll_readable(fd: libc::c_int, timeout: Duration) -> io::Result<bool> {
        let mut pfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
        let n = check(unsafe { libc::poll(&mut pfd, 1, ms) })?;
        Ok(n > 0 && pfd.revents & libc::POLLIN != 0)
    }

    /// Read exactly `len` bytes, failing with `TimedOut` if they do not
    /// arrive within `timeout`.
    pub fn read_exact_timeout(
        file: &mut File,
        len: usize,
        timeout: Duration,
    ) -> io::Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut out = Vec::with_capacity(len);
        let mut buf = [0u8; 1024];
        while out.len() < len {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || !poll_readable(file.as_raw_fd(), remaining)? {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("got {} of {} bytes", out.len(), len),
                ));
            }
            let want = (len - out.len()).min(buf.len());
            let n = file.read(&mut buf[..want])?;
            out.extend_from_slice(&buf[..n]);
        }
        Ok(out)
    }
}
