//! Copy loops between a serial port and ordinary readers and writers.

use crate::port::{Result, SerialError, SerialStream};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};
use tracing::debug;

const CHUNK_SIZE: usize = 4096;

/// Copy from `port` to `out` until `stop` returns true or the port is closed.
///
/// `stop` is checked after every read, including reads that time out with no
/// data, so the port should be opened with a non-zero read timeout if the
/// loop must be stoppable while the line is idle.
pub fn pump<S, W, F>(port: &S, out: &mut W, mut stop: F) -> Result<u64>
where
    S: SerialStream + ?Sized,
    W: Write,
    F: FnMut() -> bool,
{
    let mut buf = [0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = match port.read(&mut buf) {
            Ok(n) => n,
            Err(SerialError::Closed) => break,
            Err(e) => return Err(e),
        };
        if n > 0 {
            out.write_all(&buf[..n])
                .and_then(|()| out.flush())
                .map_err(|e| SerialError::os("output", e))?;
            total += n as u64;
        }
        if stop() {
            break;
        }
    }
    debug!(port = port.name(), bytes = total, "port to output copy finished");
    Ok(total)
}

/// Copy `input` to `port` until end of input, returning the bytes written.
pub fn feed<R, S>(input: &mut R, port: &S) -> Result<u64>
where
    R: Read,
    S: SerialStream + ?Sized,
{
    let mut buf = [0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(SerialError::os("input", e)),
        };
        port.write_all(&buf[..n])?;
        total += n as u64;
    }
    debug!(port = port.name(), bytes = total, "input to port copy finished");
    Ok(total)
}

/// Read from `port` until `window` has elapsed, returning everything received.
pub fn collect<S>(port: &S, window: Duration) -> Result<Vec<u8>>
where
    S: SerialStream + ?Sized,
{
    let deadline = Instant::now() + window;
    let mut received = Vec::new();
    pump(port, &mut received, || Instant::now() >= deadline)?;
    Ok(received)
}

/// Decode a hex string such as `"48 65 6c 6c 6f"` or `"48656C6C6F"`.
///
/// Whitespace between digits is ignored.
pub fn decode_hex(s: &str) -> Option<Vec<u8>> {
    let digits: Vec<u8> = s
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_digit(16).map(|d| d as u8))
        .collect::<Option<_>>()?;
    if digits.len() % 2 != 0 {
        return None;
    }
    Some(digits.chunks(2).map(|pair| (pair[0] << 4) | pair[1]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::MockPort;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pump_copies_until_stopped() {
        let port = MockPort::new("MOCK0");
        port.enqueue_read(b"hello world");

        let mut out = Vec::new();
        let watcher = port.clone();
        let total = pump(&port, &mut out, || watcher.available_bytes() == 0).unwrap();

        assert_eq!(total, 11);
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn test_pump_ends_on_close() {
        let port = MockPort::new("MOCK0");
        port.enqueue_read(b"abc");

        let mut out = Vec::new();
        let closer = port.clone();
        let total = pump(&port, &mut out, || {
            closer.close().unwrap();
            false
        })
        .unwrap();

        assert_eq!(total, 3);
        assert_eq!(out, b"abc");
    }

    #[test]
    fn test_pump_propagates_port_errors() {
        let port = MockPort::new("MOCK0");
        port.fail_next(io::ErrorKind::BrokenPipe);

        let mut out = Vec::new();
        let err = pump(&port, &mut out, || true).unwrap_err();
        assert_eq!(err.os_code(), None);
        assert!(matches!(err, SerialError::Os { op: "read", .. }));
    }

    #[test]
    fn test_feed_writes_all_input() {
        let port = MockPort::new("MOCK0");
        port.set_write_limit(Some(5));

        let mut input: &[u8] = b"the quick brown fox";
        let total = feed(&mut input, &port).unwrap();

        assert_eq!(total, 19);
        assert_eq!(port.written(), b"the quick brown fox");
    }

    #[test]
    fn test_collect_returns_after_window() {
        let port = MockPort::new("MOCK0");
        port.enqueue_read(b"reply");

        let started = Instant::now();
        let received = collect(&port, Duration::from_millis(20)).unwrap();

        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(received, b"reply");
    }

    #[test]
    fn test_decode_hex() {
        assert_eq!(decode_hex("48656C6C6F"), Some(b"Hello".to_vec()));
        assert_eq!(decode_hex("de ad\tbe ef"), Some(vec![0xde, 0xad, 0xbe, 0xef]));
        assert_eq!(decode_hex(""), Some(Vec::new()));
        assert_eq!(decode_hex("abc"), None);
        assert_eq!(decode_hex("zz"), None);
    }
}
