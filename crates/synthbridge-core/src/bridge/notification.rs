//! Events the bridge reports to its dispatch layer.

use crate::connection::Direction;
use crate::preset::SlotKey;
use crate::registry::{ModSource, Value};

/// Performance controller changes. Not part of the preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Performance {
    ModWheel(u8),
    Sustain(u8),
    Aftertouch(u8),
    PolyAftertouch { note: u8, pressure: u8 },
    NoteOn { note: u8, velocity: u8 },
}

/// Notification stream item.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    ParameterChanged {
        name: String,
        value: Value,
        /// Set for enum-alias parameters
        label: Option<&'static str>,
    },
    PresetLoaded(SlotKey),
    DumpReceived(SlotKey),
    /// The unsaved-changes flag flipped
    UnsavedChanges(bool),
    DeviceConnected { input: String, output: String },
    DeviceDisconnected,
    PortDetected {
        name: String,
        direction: Direction,
        target: bool,
    },
    PortLost {
        name: String,
        direction: Direction,
        target: bool,
    },
    PortConnected {
        name: String,
        direction: Direction,
        target: bool,
    },
    PortDisconnected {
        name: String,
        direction: Direction,
        target: bool,
    },
    PortError { name: String, reason: String },
    FeedbackDetected { port: String, bytes: Vec<u8> },
    ModSourceChanged(ModSource),
    Performance(Performance),
}
