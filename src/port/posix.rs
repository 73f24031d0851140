//! termios driver for Linux, macOS and the BSDs.
//!
//! The descriptor is opened non-blocking so `open(2)` cannot hang on carrier
//! detect, locked with `flock(2)`, switched to raw mode with the resolved
//! framing and `VMIN`/`VTIME`, and only then made blocking. Reads and writes
//! are single system calls; the kernel's `VMIN`/`VTIME` rules provide the
//! timeout.
//!
//! Linux programs the speed through `termios2`/`BOTHER`, so any positive baud
//! rate is accepted. macOS uses `IOSSIOSPEED` for rates without a `B*`
//! constant. Other systems are limited to the standard table.

use super::error::{Result, SerialError};
use super::traits::{ModemStatus, PortConfig, SerialStream};
use crate::resolve::{self, PosixSettings, Target};
#[cfg(not(target_os = "linux"))]
use crate::resolve::Speed;
use std::ffi::CString;
use std::fmt;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicI32, Ordering};
use tracing::{debug, trace, warn};

const CLOSED: RawFd = -1;

#[cfg(target_os = "linux")]
type Termios = libc::termios2;
#[cfg(not(target_os = "linux"))]
type Termios = libc::termios;

#[cfg(target_os = "macos")]
const IOSSIOSPEED: libc::c_ulong = 0x8004_5402;

/// An open termios serial device.
pub struct Port {
    fd: AtomicI32,
    name: String,
}

/// Closes the descriptor unless ownership is handed to a [`Port`].
struct FdGuard(RawFd);

impl FdGuard {
    fn release(self) -> RawFd {
        let fd = self.0;
        std::mem::forget(self);
        fd
    }
}

impl Drop for FdGuard {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.0);
        }
    }
}

fn check(op: &'static str, ret: libc::c_int) -> Result<libc::c_int> {
    if ret < 0 {
        Err(SerialError::last_os_error(op))
    } else {
        Ok(ret)
    }
}

impl Port {
    /// Resolve `config`, open the device and apply the settings.
    ///
    /// Fails with a resolution error before touching the filesystem, with
    /// [`SerialError::NotATty`] for non-terminals and
    /// [`SerialError::AlreadyLocked`] when another handle holds the device.
    pub fn open(config: &PortConfig) -> Result<Self> {
        let arbitrary_baud = matches!(
            Target::native(),
            Target::Posix {
                arbitrary_baud: true
            }
        );
        let settings = resolve::resolve_posix(config, arbitrary_baud)?;

        let path = CString::new(config.name.as_bytes()).map_err(|_| {
            SerialError::os("open", io::Error::from(io::ErrorKind::InvalidInput))
        })?;
        let fd = check("open", unsafe {
            libc::open(
                path.as_ptr(),
                libc::O_RDWR | libc::O_NOCTTY | libc::O_NONBLOCK | libc::O_CLOEXEC,
            )
        })?;
        let guard = FdGuard(fd);

        if unsafe { libc::isatty(fd) } != 1 {
            return Err(SerialError::NotATty(config.name.clone()));
        }
        lock_exclusive(fd, &config.name)?;
        apply_settings(fd, &settings)?;

        if config.assert_dtr {
            // Pseudo-terminals and some USB bridges have no modem lines.
            if let Err(e) = modem_bits(fd, libc::TIOCMBIS as libc::c_ulong, libc::TIOCM_DTR) {
                debug!(port = %config.name, error = %e, "could not raise DTR");
            }
        }

        let flags = check("fcntl(F_GETFL)", unsafe { libc::fcntl(fd, libc::F_GETFL) })?;
        check("fcntl(F_SETFL)", unsafe {
            libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_NONBLOCK)
        })?;

        debug!(
            port = %config.name,
            baud = settings.speed.baud(),
            data_bits = settings.data_bits,
            parity = ?settings.parity,
            stop_bits = %settings.stop_bits,
            vmin = settings.vmin,
            vtime = settings.vtime,
            "opened serial port"
        );

        Ok(Self {
            fd: AtomicI32::new(guard.release()),
            name: config.name.clone(),
        })
    }

    fn raw(&self) -> Result<RawFd> {
        match self.fd.load(Ordering::Acquire) {
            CLOSED => Err(SerialError::Closed),
            fd => Ok(fd),
        }
    }

    /// Assert or clear the DTR line.
    pub fn set_dtr(&self, level: bool) -> Result<()> {
        let request = if level { libc::TIOCMBIS } else { libc::TIOCMBIC };
        modem_bits(self.raw()?, request as libc::c_ulong, libc::TIOCM_DTR)
    }

    /// Assert or clear the RTS line.
    pub fn set_rts(&self, level: bool) -> Result<()> {
        let request = if level { libc::TIOCMBIS } else { libc::TIOCMBIC };
        modem_bits(self.raw()?, request as libc::c_ulong, libc::TIOCM_RTS)
    }

    /// Read the modem input lines.
    pub fn modem_status(&self) -> Result<ModemStatus> {
        let mut bits: libc::c_int = 0;
        check("ioctl(TIOCMGET)", unsafe {
            libc::ioctl(self.raw()?, libc::TIOCMGET as _, &mut bits as *mut libc::c_int)
        })?;
        Ok(ModemStatus {
            cts: bits & libc::TIOCM_CTS != 0,
            dsr: bits & libc::TIOCM_DSR != 0,
            ring: bits & libc::TIOCM_RNG != 0,
            dcd: bits & libc::TIOCM_CAR != 0,
        })
    }
}

fn lock_exclusive(fd: RawFd, name: &str) -> Result<()> {
    if unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) } == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        Err(SerialError::AlreadyLocked(name.to_string()))
    } else {
        Err(SerialError::os("flock", err))
    }
}

fn modem_bits(fd: RawFd, request: libc::c_ulong, bits: libc::c_int) -> Result<()> {
    check("ioctl(TIOCM)", unsafe { libc::ioctl(fd, request as _, &bits as *const libc::c_int) })?;
    Ok(())
}

/// Clear the bits the resolver owns and switch the line discipline to raw.
fn make_raw(t: &mut Termios, settings: &PosixSettings) {
    t.c_cflag &= !PosixSettings::CONTROL_MASK;
    t.c_cflag |= settings.control_flags();
    t.c_lflag &= !(libc::ICANON
        | libc::ECHO
        | libc::ECHOE
        | libc::ECHOK
        | libc::ECHONL
        | libc::ISIG
        | libc::IEXTEN);
    t.c_oflag &= !libc::OPOST;
    t.c_iflag &= !(libc::IXON
        | libc::IXOFF
        | libc::IXANY
        | libc::PARMRK
        | libc::INPCK
        | libc::ISTRIP
        | libc::INLCR
        | libc::IGNCR
        | libc::ICRNL
        | libc::IGNBRK
        | libc::BRKINT);
    t.c_iflag |= libc::IGNPAR;
    t.c_cc[libc::VMIN] = settings.vmin;
    t.c_cc[libc::VTIME] = settings.vtime;
}

#[cfg(target_os = "linux")]
fn apply_settings(fd: RawFd, settings: &PosixSettings) -> Result<()> {
    const IBSHIFT: u32 = 16;

    let mut t: Termios = unsafe { std::mem::zeroed() };
    check("ioctl(TCGETS2)", unsafe {
        libc::ioctl(fd, libc::TCGETS2 as _, &mut t as *mut Termios)
    })?;
    make_raw(&mut t, settings);

    let baud = settings.speed.baud();
    t.c_cflag &= !(libc::CBAUD | (libc::CBAUD << IBSHIFT));
    t.c_cflag |= libc::BOTHER;
    t.c_ispeed = baud;
    t.c_ospeed = baud;

    check("ioctl(TCSETS2)", unsafe {
        libc::ioctl(fd, libc::TCSETS2 as _, &t as *const Termios)
    })?;
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn apply_settings(fd: RawFd, settings: &PosixSettings) -> Result<()> {
    let mut t: Termios = unsafe { std::mem::zeroed() };
    check("tcgetattr", unsafe { libc::tcgetattr(fd, &mut t) })?;
    make_raw(&mut t, settings);

    let speed = match settings.speed {
        Speed::Standard(baud) => {
            speed_constant(baud).ok_or(SerialError::UnknownBaudRate(baud))?
        }
        // Placeholder until IOSSIOSPEED below.
        Speed::Custom(_) => libc::B9600,
    };
    check("cfsetispeed", unsafe { libc::cfsetispeed(&mut t, speed) })?;
    check("cfsetospeed", unsafe { libc::cfsetospeed(&mut t, speed) })?;
    check("tcsetattr", unsafe {
        libc::tcsetattr(fd, libc::TCSANOW, &t)
    })?;

    if let Speed::Custom(baud) = settings.speed {
        set_custom_speed(fd, baud)?;
    }
    Ok(())
}

#[cfg(target_os = "macos")]
fn set_custom_speed(fd: RawFd, baud: u32) -> Result<()> {
    let speed = baud as libc::speed_t;
    check("ioctl(IOSSIOSPEED)", unsafe {
        libc::ioctl(fd, IOSSIOSPEED as _, &speed as *const libc::speed_t)
    })?;
    Ok(())
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn set_custom_speed(_fd: RawFd, baud: u32) -> Result<()> {
    Err(SerialError::UnknownBaudRate(baud))
}

#[cfg(not(target_os = "linux"))]
fn speed_constant(baud: u32) -> Option<libc::speed_t> {
    Some(match baud {
        50 => libc::B50,
        75 => libc::B75,
        110 => libc::B110,
        134 => libc::B134,
        150 => libc::B150,
        200 => libc::B200,
        300 => libc::B300,
        600 => libc::B600,
        1200 => libc::B1200,
        1800 => libc::B1800,
        2400 => libc::B2400,
        4800 => libc::B4800,
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115200 => libc::B115200,
        230400 => libc::B230400,
        _ => return None,
    })
}

impl SerialStream for Port {
    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let fd = self.raw()?;
        let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
        if n < 0 {
            return Err(SerialError::last_os_error("read"));
        }
        trace!(port = %self.name, bytes = n, "read");
        Ok(n as usize)
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        let fd = self.raw()?;
        let n = unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) };
        if n < 0 {
            return Err(SerialError::last_os_error("write"));
        }
        trace!(port = %self.name, bytes = n, "write");
        Ok(n as usize)
    }

    fn flush(&self) -> Result<()> {
        check("tcflush", unsafe {
            libc::tcflush(self.raw()?, libc::TCIOFLUSH)
        })?;
        debug!(port = %self.name, "flushed input and output queues");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let fd = self.fd.swap(CLOSED, Ordering::AcqRel);
        if fd == CLOSED {
            return Ok(());
        }
        // Releases the flock as well.
        check("close", unsafe { libc::close(fd) })?;
        debug!(port = %self.name, "closed serial port");
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl AsRawFd for Port {
    /// The descriptor, or -1 once closed.
    fn as_raw_fd(&self) -> RawFd {
        self.fd.load(Ordering::Acquire)
    }
}

impl Drop for Port {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(port = %self.name, error = %e, "error closing serial port on drop");
        }
    }
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("name", &self.name)
            .field("fd", &self.fd.load(Ordering::Relaxed))
            .finish()
    }
}
