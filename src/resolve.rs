//! Configuration resolver.
//!
//! Turns a declarative [`PortConfig`] into the primitive values a platform's
//! control interface expects: termios flag bits and `VMIN`/`VTIME` on POSIX,
//! DCB enumerations and `COMMTIMEOUTS` fields on Windows. Resolution is pure;
//! it runs before any device handle is allocated, so a validation failure
//! never needs cleanup.
//!
//! Both rule sets are available on every host so they can be tested
//! anywhere. The drivers use [`Target::native`].

use crate::port::{Parity, PortConfig, Result, SerialError, StopBits, DEFAULT_DATA_BITS};
use std::time::Duration;

/// Speeds with a named termios constant on every supported POSIX system.
pub const STANDARD_BAUD_RATES: &[u32] = &[
    50, 75, 110, 134, 150, 200, 300, 600, 1200, 1800, 2400, 4800, 9600, 19200, 38400, 57600,
    115200, 230400,
];

/// Largest `VTIME` value, in deciseconds.
pub const MAX_VTIME: u8 = u8::MAX;

/// `MAXDWORD` from the Windows headers.
pub const MAXDWORD: u32 = u32::MAX;

/// DCB parity codes.
pub mod dcb {
    pub const NOPARITY: u8 = 0;
    pub const ODDPARITY: u8 = 1;
    pub const EVENPARITY: u8 = 2;
    pub const MARKPARITY: u8 = 3;
    pub const SPACEPARITY: u8 = 4;

    pub const ONESTOPBIT: u8 = 0;
    pub const ONE5STOPBITS: u8 = 1;
    pub const TWOSTOPBITS: u8 = 2;
}

/// The control interface a configuration is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// termios. `arbitrary_baud` is set where the OS accepts integer speeds
    /// outside [`STANDARD_BAUD_RATES`].
    Posix { arbitrary_baud: bool },
    /// Windows comm API (DCB + overlapped I/O).
    Windows,
}

impl Target {
    /// The target this crate was compiled for.
    pub const fn native() -> Self {
        #[cfg(windows)]
        {
            Target::Windows
        }
        #[cfg(any(target_os = "linux", target_os = "macos"))]
        {
            Target::Posix {
                arbitrary_baud: true,
            }
        }
        #[cfg(not(any(windows, target_os = "linux", target_os = "macos")))]
        {
            Target::Posix {
                arbitrary_baud: false,
            }
        }
    }
}

/// How a POSIX driver must program the line speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speed {
    /// One of [`STANDARD_BAUD_RATES`]; has a `B*` constant.
    Standard(u32),
    /// Any other rate, set through the OS's arbitrary-speed interface.
    Custom(u32),
}

impl Speed {
    pub fn baud(self) -> u32 {
        match self {
            Speed::Standard(baud) | Speed::Custom(baud) => baud,
        }
    }
}

/// Resolved termios values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PosixSettings {
    pub speed: Speed,
    pub data_bits: u8,
    /// `None`, `Odd` or `Even`.
    pub parity: Parity,
    /// `One` or `Two`.
    pub stop_bits: StopBits,
    /// Minimum bytes before `read` returns.
    pub vmin: u8,
    /// Inter-byte/total timer in deciseconds.
    pub vtime: u8,
    /// Drop DTR on last close (`HUPCL`); set together with asserting DTR on open.
    pub hang_up_on_close: bool,
}

#[cfg(unix)]
impl PosixSettings {
    /// `c_cflag` bits owned by the resolver; cleared before
    /// [`control_flags`](Self::control_flags) is or-ed in.
    pub const CONTROL_MASK: libc::tcflag_t = libc::CSIZE
        | libc::CSTOPB
        | libc::PARENB
        | libc::PARODD
        | libc::CRTSCTS
        | libc::HUPCL
        | libc::CREAD
        | libc::CLOCAL;

    /// The `c_cflag` bit pattern for this configuration.
    pub fn control_flags(&self) -> libc::tcflag_t {
        let mut cflag = libc::CREAD | libc::CLOCAL;
        cflag |= match self.data_bits {
            5 => libc::CS5,
            6 => libc::CS6,
            7 => libc::CS7,
            _ => libc::CS8,
        };
        if self.stop_bits == StopBits::Two {
            cflag |= libc::CSTOPB;
        }
        match self.parity {
            Parity::Odd => cflag |= libc::PARENB | libc::PARODD,
            Parity::Even => cflag |= libc::PARENB,
            _ => {}
        }
        if self.hang_up_on_close {
            cflag |= libc::HUPCL;
        }
        cflag
    }
}

/// `COMMTIMEOUTS` field values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommTimeouts {
    pub read_interval: u32,
    pub read_total_multiplier: u32,
    pub read_total_constant: u32,
    pub write_total_multiplier: u32,
    pub write_total_constant: u32,
}

/// Resolved Windows comm values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommSettings {
    pub baud: u32,
    pub byte_size: u8,
    /// One of the [`dcb`] parity codes.
    pub parity: u8,
    /// One of the [`dcb`] stop-bit codes.
    pub stop_bits: u8,
    pub timeouts: CommTimeouts,
    pub dtr_enable: bool,
}

/// Validate data bits; 0 normalizes to 8.
pub fn data_bits(bits: u8) -> Result<u8> {
    match bits {
        0 => Ok(DEFAULT_DATA_BITS),
        5..=8 => Ok(bits),
        other => Err(SerialError::InvalidDataSize(other)),
    }
}

/// `VMIN`/`VTIME` for a read timeout.
///
/// Zero blocks until one byte arrives (`(1, 0)`). Otherwise a zero-byte read
/// signals the timeout, and the timer is clamped to 0.1 s ..= 25.5 s.
pub fn posix_read_timeout(timeout: Duration) -> (u8, u8) {
    if timeout.is_zero() {
        return (1, 0);
    }
    let deciseconds = timeout.as_millis() / 100;
    let vtime = deciseconds.clamp(1, MAX_VTIME as u128) as u8;
    (0, vtime)
}

/// `ReadTotalTimeoutConstant` for a read timeout.
///
/// Used with `ReadIntervalTimeout` and `ReadTotalTimeoutMultiplier` at
/// `MAXDWORD`, so a read returns as soon as any byte is queued. Zero waits the
/// longest representable time.
pub fn comm_read_timeout(timeout: Duration) -> u32 {
    if timeout.is_zero() {
        return MAXDWORD - 1;
    }
    timeout.as_millis().clamp(1, (MAXDWORD - 1) as u128) as u32
}

fn posix_speed(baud: u32, arbitrary_baud: bool) -> Result<Speed> {
    if STANDARD_BAUD_RATES.contains(&baud) {
        Ok(Speed::Standard(baud))
    } else if arbitrary_baud && baud > 0 {
        Ok(Speed::Custom(baud))
    } else {
        Err(SerialError::UnknownBaudRate(baud))
    }
}

/// Resolve for a termios device.
pub fn resolve_posix(config: &PortConfig, arbitrary_baud: bool) -> Result<PosixSettings> {
    let data_bits = data_bits(config.data_bits)?;
    let parity = match config.parity {
        p @ (Parity::None | Parity::Odd | Parity::Even) => p,
        p => return Err(SerialError::InvalidParity(p)),
    };
    let stop_bits = match config.stop_bits {
        s @ (StopBits::One | StopBits::Two) => s,
        s => return Err(SerialError::InvalidStopBits(s)),
    };
    let speed = posix_speed(config.baud, arbitrary_baud)?;
    let (vmin, vtime) = posix_read_timeout(config.read_timeout);

    Ok(PosixSettings {
        speed,
        data_bits,
        parity,
        stop_bits,
        vmin,
        vtime,
        hang_up_on_close: config.assert_dtr,
    })
}

/// Resolve for the Windows comm API.
pub fn resolve_comm(config: &PortConfig) -> Result<CommSettings> {
    let byte_size = data_bits(config.data_bits)?;
    let parity = match config.parity {
        Parity::None => dcb::NOPARITY,
        Parity::Odd => dcb::ODDPARITY,
        Parity::Even => dcb::EVENPARITY,
        Parity::Mark => dcb::MARKPARITY,
        Parity::Space => dcb::SPACEPARITY,
    };
    let stop_bits = match config.stop_bits {
        StopBits::One => dcb::ONESTOPBIT,
        StopBits::OneHalf => dcb::ONE5STOPBITS,
        StopBits::Two => dcb::TWOSTOPBITS,
    };
    if config.baud == 0 {
        return Err(SerialError::UnknownBaudRate(0));
    }

    Ok(CommSettings {
        baud: config.baud,
        byte_size,
        parity,
        stop_bits,
        timeouts: CommTimeouts {
            read_interval: MAXDWORD,
            read_total_multiplier: MAXDWORD,
            read_total_constant: comm_read_timeout(config.read_timeout),
            write_total_multiplier: 0,
            write_total_constant: 0,
        },
        dtr_enable: config.assert_dtr,
    })
}

/// Check a configuration against a target without producing settings.
pub fn validate(config: &PortConfig, target: Target) -> Result<()> {
    match target {
        Target::Posix { arbitrary_baud } => resolve_posix(config, arbitrary_baud).map(|_| ()),
        Target::Windows => resolve_comm(config).map(|_| ()),
    }
}
