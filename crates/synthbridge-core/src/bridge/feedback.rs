//! Echo detection for generic MIDI inputs.
//!
//! Some instruments copy their MIDI input to their output. Every message the
//! bridge sends is remembered for a short window; an identical message coming
//! back on a generic input within that window is treated as an echo.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct FeedbackGuard {
    window: Duration,
    sent: VecDeque<(Instant, Vec<u8>)>,
}

impl FeedbackGuard {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            sent: VecDeque::new(),
        }
    }

    /// Remember an outbound message sent at `now`.
    pub fn record(&mut self, bytes: &[u8], now: Instant) {
        self.expire(now);
        self.sent.push_back((now + self.window, bytes.to_vec()));
    }

    /// Whether `bytes` echoes a recorded message. A match is consumed, so each
    /// recorded message suppresses at most one echo.
    pub fn is_echo(&mut self, bytes: &[u8], now: Instant) -> bool {
        self.expire(now);
        match self.sent.iter().position(|(_, sent)| sent == bytes) {
            Some(i) => {
                self.sent.remove(i);
                true
            }
            None => false,
        }
    }

    fn expire(&mut self, now: Instant) {
        while self.sent.front().is_some_and(|(expiry, _)| *expiry <= now) {
            self.sent.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }
}
