//! Configuration file support for synthbridge
//!
//! Configuration is stored in TOML format at:
//! - Linux: `~/.config/synthbridge/config.toml`
//! - macOS: `~/Library/Application Support/synthbridge/config.toml`
//! - Windows: `%APPDATA%\synthbridge\config.toml`

use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use synthbridge_core::{BridgeConfig, Timing};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub midi: MidiSettings,
    pub osc: OscSettings,
    pub timing: TimingSettings,
    pub preset: PresetSettings,
}

impl Config {
    /// Load configuration from the default config file location
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Err(anyhow!("Config file not found at {:?}", path))
        }
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Load configuration or return default if not found
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                log::debug!("[CONFIG] Using defaults: {:#}", e);
                Self::default()
            }
        }
    }

    /// Get the default configuration file path
    pub fn config_path() -> Result<PathBuf> {
        ProjectDirs::from("", "", "synthbridge")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .ok_or_else(|| anyhow!("Could not determine config directory"))
    }

    /// Create a default config file with comments
    pub fn create_default_config_file() -> Result<PathBuf> {
        let path = Self::config_path()?;
        Self::write_default_config(&path)?;
        Ok(path)
    }

    fn write_default_config(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = r#"# synthbridge configuration file

[midi]
# Client name shown by the platform MIDI subsystem
client_name = "synthbridge"

# Case-insensitive fragment of the synthesizer's port names
device_match = "minisynth"

# MIDI channel of the synthesizer (1-16)
channel = 1

# Connect to the synthesizer as soon as its ports show up
auto_connect = true

[osc]
# Address control requests are received on
listen = "127.0.0.1:9000"

# Address notifications are sent to
reply = "127.0.0.1:9001"

[timing]
# All values in milliseconds unless noted otherwise
port_poll_ms = 500
connect_load_ms = 100
dump_request_ms = 700
awaiting_preset_ms = 700
ignore_cc_ms = 500
feedback_window_ms = 500
flush_interval_ms = 100

# Host loop period in microseconds
tick_us = 100

[preset]
# Preset file loaded as the initial edit buffer (optional)
# init_file = "/path/to/init.json"
"#;

        fs::write(path, content)?;
        Ok(())
    }

    /// Convert to the bridge's runtime configuration
    pub fn to_bridge_config(&self) -> BridgeConfig {
        if !(1..=16).contains(&self.midi.channel) {
            log::warn!(
                "[CONFIG] MIDI channel {} out of range, clamping to 1-16",
                self.midi.channel
            );
        }
        let t = &self.timing;
        BridgeConfig {
            device_match: self.midi.device_match.clone(),
            channel: self.midi.channel.clamp(1, 16),
            auto_connect: self.midi.auto_connect,
            timing: Timing {
                port_poll: Duration::from_millis(t.port_poll_ms),
                connect_load: Duration::from_millis(t.connect_load_ms),
                dump_request: Duration::from_millis(t.dump_request_ms),
                awaiting_preset: Duration::from_millis(t.awaiting_preset_ms),
                ignore_cc: Duration::from_millis(t.ignore_cc_ms),
                feedback_window: Duration::from_millis(t.feedback_window_ms),
                flush_interval: Duration::from_millis(t.flush_interval_ms),
            },
        }
    }

    /// Host loop period
    pub fn tick(&self) -> Duration {
        Duration::from_micros(self.timing.tick_us)
    }
}

/// MIDI settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiSettings {
    /// Client name registered with the MIDI subsystem
    pub client_name: String,
    /// Name fragment identifying the synthesizer
    pub device_match: String,
    /// MIDI channel (1-16)
    pub channel: u8,
    /// Connect the synthesizer automatically
    pub auto_connect: bool,
}

impl Default for MidiSettings {
    fn default() -> Self {
        let bridge = BridgeConfig::default();
        Self {
            client_name: "synthbridge".to_string(),
            device_match: bridge.device_match,
            channel: bridge.channel,
            auto_connect: bridge.auto_connect,
        }
    }
}

/// OSC settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OscSettings {
    pub listen: String,
    pub reply: String,
}

impl Default for OscSettings {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:9000".to_string(),
            reply: "127.0.0.1:9001".to_string(),
        }
    }
}

/// Timing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    pub port_poll_ms: u64,
    pub connect_load_ms: u64,
    pub dump_request_ms: u64,
    pub awaiting_preset_ms: u64,
    pub ignore_cc_ms: u64,
    pub feedback_window_ms: u64,
    pub flush_interval_ms: u64,
    pub tick_us: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        let timing = Timing::default();
        let ms = |d: Duration| d.as_millis() as u64;
        Self {
            port_poll_ms: ms(timing.port_poll),
            connect_load_ms: ms(timing.connect_load),
            dump_request_ms: ms(timing.dump_request),
            awaiting_preset_ms: ms(timing.awaiting_preset),
            ignore_cc_ms: ms(timing.ignore_cc),
            feedback_window_ms: ms(timing.feedback_window),
            flush_interval_ms: ms(timing.flush_interval),
            tick_us: 100,
        }
    }
}

/// Preset settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresetSettings {
    /// Preset file used as the initial edit buffer
    pub init_file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.midi.channel, 1);
        assert_eq!(config.timing.flush_interval_ms, 100);
        assert_eq!(config.tick(), Duration::from_micros(100));
        assert_eq!(config.to_bridge_config(), BridgeConfig::default());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_commented_default_file_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("synthbridge").join("config.toml");
        Config::write_default_config(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str("[midi]\nchannel = 10\n").unwrap();
        assert_eq!(config.midi.channel, 10);
        assert_eq!(config.midi.device_match, "minisynth");
        assert_eq!(config.to_bridge_config().wire_channel(), 9);
    }

    #[test]
    fn test_channel_is_clamped() {
        let mut config = Config::default();
        config.midi.channel = 40;
        assert_eq!(config.to_bridge_config().channel, 16);
    }
}
