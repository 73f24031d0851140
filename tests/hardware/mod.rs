//! Hardware-specific tests requiring real serial devices.
//!
//! These tests are ignored by default and require actual hardware to run.
//! They should be run manually with the `--ignored` flag and `PORT0`/`PORT1`
//! naming two ports wired to each other (or a `socat` pty pair).

pub mod loopback_tests;
pub mod utils;
