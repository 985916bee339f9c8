//! Bridge configuration.

use std::time::Duration;

/// Runtime settings for a [`Bridge`](super::Bridge).
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Case-insensitive fragment identifying the target synthesizer's ports
    pub device_match: String,
    /// MIDI channel, 1-16
    pub channel: u8,
    /// Connect the target as soon as both of its ports are detected
    pub auto_connect: bool,
    pub timing: Timing,
}

/// Every timed transition of the bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct Timing {
    /// Port enumeration interval
    pub port_poll: Duration,
    /// Delay from connecting to pushing the current preset
    pub connect_load: Duration,
    /// Further delay from that push to the full dump request
    pub dump_request: Duration,
    /// How long a Program-Change waits for its preset data
    pub awaiting_preset: Duration,
    /// How long CCs are dropped after an edit-buffer SYSEX
    pub ignore_cc: Duration,
    /// How long a sent message counts as a potential echo
    pub feedback_window: Duration,
    /// Debounce interval for snapshot flushes
    pub flush_interval: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            port_poll: Duration::from_millis(500),
            connect_load: Duration::from_millis(100),
            dump_request: Duration::from_millis(700),
            awaiting_preset: Duration::from_millis(700),
            ignore_cc: Duration::from_millis(500),
            feedback_window: Duration::from_millis(500),
            flush_interval: Duration::from_millis(100),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            device_match: "minisynth".to_string(),
            channel: 1,
            auto_connect: true,
            timing: Timing::default(),
        }
    }
}

impl BridgeConfig {
    /// Zero-based channel as carried in status bytes.
    pub fn wire_channel(&self) -> u8 {
        self.channel.clamp(1, 16) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_channel() {
        let mut config = BridgeConfig::default();
        assert_eq!(config.wire_channel(), 0);
        config.channel = 16;
        assert_eq!(config.wire_channel(), 15);
        config.channel = 0;
        assert_eq!(config.wire_channel(), 0);
    }
}
