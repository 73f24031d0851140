//! In-memory serial port for testing.
//!
//! `MockPort` implements [`SerialStream`] without hardware. Bytes queued with
//! [`MockPort::enqueue_read`] are handed out by `read`; everything written is
//! logged for inspection. An empty queue behaves like an elapsed read timeout
//! and returns 0.

use super::error::{Result, SerialError};
use super::traits::SerialStream;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

#[derive(Debug, Default)]
struct MockPortState {
    read_queue: VecDeque<u8>,
    write_log: Vec<Vec<u8>>,
    /// Largest chunk a single write accepts; `None` takes everything.
    write_limit: Option<usize>,
    /// Error returned by the next read or write, then cleared.
    fail_next: Option<io::ErrorKind>,
    flush_count: usize,
    closed: bool,
}

/// Mock serial port.
///
/// Clones share state, so a test can keep one handle while the code under
/// test owns another.
///
/// # Example
/// ```
/// use serial_stream::port::{MockPort, SerialStream};
///
/// let port = MockPort::new("MOCK0");
/// port.enqueue_read(b"Hello, World!");
///
/// let mut buffer = [0u8; 13];
/// let n = port.read(&mut buffer).unwrap();
/// assert_eq!(&buffer[..n], b"Hello, World!");
///
/// port.write(b"Response").unwrap();
/// assert_eq!(port.written(), b"Response");
/// ```
#[derive(Clone)]
pub struct MockPort {
    name: String,
    state: Arc<Mutex<MockPortState>>,
}

impl MockPort {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockPortState::default())),
        }
    }

    /// Append bytes to the receive queue.
    pub fn enqueue_read(&self, data: &[u8]) {
        self.state.lock().read_queue.extend(data);
    }

    /// Each `write` call, in order.
    pub fn write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_log.clone()
    }

    /// Everything written, concatenated.
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().write_log.concat()
    }

    /// Cap how many bytes a single write accepts, to exercise short writes.
    pub fn set_write_limit(&self, limit: Option<usize>) {
        self.state.lock().write_limit = limit;
    }

    /// Make the next read or write fail with an OS error of `kind`.
    pub fn fail_next(&self, kind: io::ErrorKind) {
        self.state.lock().fail_next = Some(kind);
    }

    /// Bytes still waiting in the receive queue.
    pub fn available_bytes(&self) -> usize {
        self.state.lock().read_queue.len()
    }

    pub fn flush_count(&self) -> usize {
        self.state.lock().flush_count
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl MockPortState {
    fn check(&mut self, op: &'static str) -> Result<()> {
        if self.closed {
            return Err(SerialError::Closed);
        }
        match self.fail_next.take() {
            Some(kind) => Err(SerialError::os(op, io::Error::from(kind))),
            None => Ok(()),
        }
    }
}

impl SerialStream for MockPort {
    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.state.lock();
        state.check("read")?;

        let n = buf.len().min(state.read_queue.len());
        for (slot, byte) in buf.iter_mut().zip(state.read_queue.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut state = self.state.lock();
        state.check("write")?;

        let n = state.write_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
        state.write_log.push(buf[..n].to_vec());
        Ok(n)
    }

    fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(SerialError::Closed);
        }
        state.read_queue.clear();
        state.flush_count += 1;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.state.lock().closed = true;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for MockPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPort")
            .field("name", &self.name)
            .field("available_bytes", &self.available_bytes())
            .finish()
    }
}
