//! SynthBridge Core - MIDI/SYSEX protocol bridge for a hardware synthesizer.
//!
//! This crate provides everything between the MIDI ports and a control
//! surface:
//!
//! - **CRC / Nibble** - Checksum and 4-bit packing used by preset SYSEX
//! - **Registry** - Static catalogue of every synthesizer parameter
//! - **Preset** - Snapshots, slot addressing, SYSEX codec, store and files
//! - **Connection** - Port discovery, classification and non-blocking I/O
//! - **Bridge** - The single-threaded orchestrator and its notification stream
//!
//! # Architecture
//!
//! The [`Bridge`] is driven by repeated calls to [`Bridge::update`]. Each tick
//! drains MIDI input, advances deadlines and flushes MIDI output without
//! blocking. Control requests are plain method calls on the bridge; state
//! changes come back as [`Notification`]s on a channel.
//!
//! # Feature Flags
//!
//! - `native` (default) - midir-backed [`connection::MidirDriver`]

pub mod bridge;
pub mod connection;
pub mod crc;
pub mod error;
pub mod midi;
pub mod nibble;
pub mod preset;
pub mod registry;

pub use bridge::{Bridge, BridgeConfig, Notification, Performance, Timing};
pub use connection::{ConnectionManager, Direction, MidiDriver, MidiInputPort, MidiOutputPort};
pub use error::{Error, Result};
pub use midi::MidiMessage;
pub use preset::store::PresetStore;
pub use preset::{ImportKind, PresetType, SlotKey, Snapshot};
pub use registry::{Descriptor, ModSource, Registry, Value, ValueKind};

#[cfg(feature = "native")]
pub use connection::MidirDriver;
