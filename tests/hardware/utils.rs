//! Utility functions for hardware testing.

use serial_stream::config::ConfigLoader;
use serial_stream::{Port, PortConfig, SerialStream};
use std::time::{Duration, Instant};

/// The loopback pair and baud rate from `PORT0`/`PORT1` or the config file.
pub struct LoopbackPair {
    pub port0: String,
    pub port1: String,
    pub baud: u32,
}

impl LoopbackPair {
    /// `None` (after printing why) when no pair is configured.
    pub fn from_env() -> Option<Self> {
        let testing = ConfigLoader::with_defaults().into_config().testing;
        match testing.loopback_pair() {
            Some((port0, port1)) => Some(Self {
                port0: port0.to_string(),
                port1: port1.to_string(),
                baud: testing.baud,
            }),
            None => {
                println!("Skipping hardware test: PORT0 and PORT1 not set");
                None
            }
        }
    }

    pub fn config0(&self) -> PortConfig {
        PortConfig::new(self.port0.clone(), self.baud).read_timeout(Duration::from_millis(100))
    }

    pub fn config1(&self) -> PortConfig {
        PortConfig::new(self.port1.clone(), self.baud).read_timeout(Duration::from_millis(100))
    }
}

/// Read from `port` until `len` bytes arrive or `timeout` elapses.
///
/// Returns the bytes and the number of reads that returned data.
pub fn read_until(port: &Port, len: usize, timeout: Duration) -> (Vec<u8>, usize) {
    let deadline = Instant::now() + timeout;
    let mut out = Vec::new();
    let mut reads = 0;
    let mut buf = [0u8; 128];
    while out.len() < len && Instant::now() < deadline {
        let n = SerialStream::read(port, &mut buf).expect("read failed");
        if n > 0 {
            reads += 1;
            out.extend_from_slice(&buf[..n]);
        }
    }
    (out, reads)
}

/// Measure the execution time of a function.
pub fn measure_time<F, R>(f: F) -> (R, Duration)
where
    F: FnOnce() -> R,
{
    let start = Instant::now();
    let result = f();
    (result, start.elapsed())
}
