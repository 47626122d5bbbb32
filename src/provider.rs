//! Byte source, byte sink and clock seams
//!
//! The relay never touches hardware directly. The host wires it to the BMS-side UART
//! through a [`ByteSource`], to the controller-side UART through a [`ByteSink`], and to a
//! monotonic millisecond [`Clock`]. Closures implement all three, so a host can write:
//!
//! ```rust
//! use bms_relay::BmsRelay;
//! use std::collections::VecDeque;
//!
//! let relay = BmsRelay::new(VecDeque::from(vec![0x01u8, 0x02]), Vec::<u8>::new(), || 0u64);
//! ```

use std::collections::VecDeque;
use std::time::Instant;

/// Polled for the next byte from the BMS.
pub trait ByteSource {
    /// Next byte, or `None` when nothing is available on the wire right now.
    ///
    /// Must not block: `None` is the point where [`BmsRelay::poll`](crate::BmsRelay::poll)
    /// returns control to the caller.
    fn read_byte(&mut self) -> Option<u8>;
}

/// Receives the bytes destined for the motor controller.
pub trait ByteSink {
    fn write_byte(&mut self, byte: u8);
}

/// Monotonic milliseconds.
pub trait Clock {
    fn now_millis(&self) -> u64;
}

impl<F> ByteSource for F
where
    F: FnMut() -> Option<u8>,
{
    fn read_byte(&mut self) -> Option<u8> {
        self()
    }
}

impl<F> ByteSink for F
where
    F: FnMut(u8),
{
    fn write_byte(&mut self, byte: u8) {
        self(byte)
    }
}

impl<F> Clock for F
where
    F: Fn() -> u64,
{
    fn now_millis(&self) -> u64 {
        self()
    }
}

impl ByteSource for VecDeque<u8> {
    fn read_byte(&mut self) -> Option<u8> {
        self.pop_front()
    }
}

impl ByteSink for Vec<u8> {
    fn write_byte(&mut self, byte: u8) {
        self.push(byte);
    }
}

/// Milliseconds since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Clock for MonotonicClock {
    fn now_millis(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}
