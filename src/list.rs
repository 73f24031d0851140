//! Serial device discovery for Unix hosts.

use crate::port::{self, PortConfig, SerialError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const DEV_DIR: &str = "/dev";
const SYS_TTY_DIR: &str = "/sys/class/tty";

#[cfg(target_os = "linux")]
const DEVICE_PATTERN: &str = r"^(ttyS|ttyUSB|ttyACM|ttyAMA)\d+";
#[cfg(target_os = "macos")]
const DEVICE_PATTERN: &str = r"^(cu|tty)\..*";
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
const DEVICE_PATTERN: &str = r"^(cu|tty)\.?.*";

static DEVICE_FILTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(DEVICE_PATTERN).expect("device pattern is a valid regex"));

/// Serial devices under `/dev`, sorted by path.
///
/// Legacy `ttyS*` nodes exist whether or not a UART backs them, so each one
/// is opened briefly and dropped from the list if that fails.
pub fn available_ports() -> io::Result<Vec<String>> {
    scan_dir(Path::new(DEV_DIR), &DEVICE_FILTER, probe)
}

/// Scan `dir` for entries whose name matches `filter`, keeping placeholder
/// `ttyS*` entries only when `probe` accepts them.
pub fn scan_dir<P>(dir: &Path, filter: &Regex, probe: P) -> io::Result<Vec<String>>
where
    P: Fn(&str) -> bool,
{
    let mut ports = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if !filter.is_match(name) {
            continue;
        }

        let path = entry.path().to_string_lossy().into_owned();
        if name.starts_with("ttyS") && !probe(&path) {
            debug!(port = %path, "skipping placeholder serial device");
            continue;
        }
        ports.push(path);
    }
    ports.sort();
    Ok(ports)
}

/// Opening only to test presence must leave the modem lines alone.
fn probe_config(path: &str) -> PortConfig {
    PortConfig::new(path, 9600)
        .read_timeout(Duration::from_millis(100))
        .assert_dtr(false)
}

/// A device counts as present if it opens, or if someone else holds it.
fn probe(path: &str) -> bool {
    match port::open(&probe_config(path)) {
        Ok(_) => true,
        Err(SerialError::AlreadyLocked(_)) => true,
        Err(_) => false,
    }
}

/// Devices whose driver exposes an `rx_trig_bytes` attribute in sysfs.
///
/// This covers UARTs with a programmable receive FIFO trigger and skips the
/// placeholder nodes, without opening anything.
pub fn ports_with_rx_trigger() -> io::Result<Vec<String>> {
    rx_trigger_ports_in(Path::new(SYS_TTY_DIR))
}

/// [`ports_with_rx_trigger`] over an arbitrary sysfs tty class directory.
pub fn rx_trigger_ports_in(root: &Path) -> io::Result<Vec<String>> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut names = Vec::new();
    for entry in entries {
        let dir = entry?.path();
        if !dir.join("rx_trig_bytes").exists() {
            continue;
        }
        let uevent = match fs::read_to_string(dir.join("uevent")) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        if let Some(devname) = uevent.lines().find_map(|line| line.strip_prefix("DEVNAME=")) {
            names.push(format!("{DEV_DIR}/{devname}"));
        }
    }
    names.sort();
    Ok(names)
}
