//! Tests over a pair of connected ports.
//!
//! # Running Hardware Tests
//!
//! ```bash
//! # Two real ports wired TX to RX, or a virtual pair:
//! socat -d -d pty,rawer,echo=0,link=/tmp/ttyV0 pty,rawer,echo=0,link=/tmp/ttyV1
//!
//! PORT0=/tmp/ttyV0 PORT1=/tmp/ttyV1 cargo test --features hardware-tests --test integration_hardware -- --ignored --test-threads=1
//! ```

use super::utils::{measure_time, read_until, LoopbackPair};
use serial_stream::{SerialError, SerialStream};
use std::thread;
use std::time::Duration;

#[test]
#[ignore] // Run with --ignored flag
fn test_locking() {
    let Some(pair) = LoopbackPair::from_env() else {
        return;
    };

    let first = serial_stream::open(&pair.config0()).expect("first open failed");
    let err = serial_stream::open(&pair.config0()).unwrap_err();
    assert!(
        matches!(err, SerialError::AlreadyLocked(_)),
        "expected AlreadyLocked, got {err}"
    );

    first.close().unwrap();
    serial_stream::open(&pair.config0()).expect("reopen after close failed");
}

#[test]
#[ignore]
fn test_hello_world_across_pair() {
    let Some(pair) = LoopbackPair::from_env() else {
        return;
    };

    let tx = serial_stream::open(&pair.config0()).expect("open PORT0");
    let rx = serial_stream::open(&pair.config1()).expect("open PORT1");

    thread::scope(|s| {
        let reader = s.spawn(|| read_until(&rx, 11, Duration::from_secs(5)));

        tx.write_all(b"hello").unwrap();
        tx.write_all(b" ").unwrap();
        thread::sleep(Duration::from_secs(1));
        tx.write_all(b"world").unwrap();

        let (data, reads) = reader.join().unwrap();
        println!("received {:?} in {} reads", String::from_utf8_lossy(&data), reads);
        assert_eq!(data, b"hello world");
        // Bytes sent back to back are delivered in a handful of reads, not one per byte.
        assert!(reads < 5, "expected fewer than 5 reads, got {reads}");
    });
}

#[test]
#[ignore]
fn test_read_timeout_on_idle_line() {
    let Some(pair) = LoopbackPair::from_env() else {
        return;
    };

    let rx = serial_stream::open(&pair.config1()).expect("open PORT1");
    rx.flush().unwrap();

    let mut buf = [0u8; 16];
    let (n, elapsed) = measure_time(|| SerialStream::read(&rx, &mut buf).unwrap());
    assert_eq!(n, 0);
    assert!(elapsed >= Duration::from_millis(80), "returned after {elapsed:?}");
}

#[test]
#[ignore]
fn test_both_directions() {
    let Some(pair) = LoopbackPair::from_env() else {
        return;
    };

    let a = serial_stream::open(&pair.config0()).expect("open PORT0");
    let b = serial_stream::open(&pair.config1()).expect("open PORT1");

    a.write_all(b"ping").unwrap();
    assert_eq!(read_until(&b, 4, Duration::from_secs(2)).0, b"ping");

    b.write_all(b"pong").unwrap();
    assert_eq!(read_until(&a, 4, Duration::from_secs(2)).0, b"pong");
}
