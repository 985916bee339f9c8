//! Error types for synthbridge.

use crate::preset::SlotKey;
use thiserror::Error;

/// Result type alias for synthbridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while bridging the synthesizer.
///
/// Errors raised while handling a single inbound MIDI message are logged by the
/// bridge and never tear down the connection. Errors raised by dispatch requests
/// are returned to the caller before any state is touched.
#[derive(Debug, Error)]
pub enum Error {
    /// Nibble stream or frame has the wrong shape
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Manufacturer or model ID does not belong to the target synthesizer
    #[error("Unrecognized device: {0}")]
    UnrecognizedDevice(String),

    /// CRC8 over the preset body disagrees with the transmitted value
    #[error("Checksum mismatch: transmitted {expected:#04x}, computed {actual:#04x}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// Bank, slot number or preset type out of range
    #[error("Invalid slot address: {0}")]
    InvalidSlotAddress(String),

    /// No parameter with this name exists
    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    /// Value does not fit the parameter's declared domain
    #[error("Value out of domain for {name}: {reason}")]
    ValueOutOfDomain { name: String, reason: String },

    /// MIDI port could not be opened or written
    #[error("MIDI port unavailable: {name}: {reason}")]
    PortUnavailable { name: String, reason: String },

    /// No dump has been received for this memory slot
    #[error("No preset data cached for slot {0}")]
    EmptySlot(SlotKey),

    /// Preset file could not be parsed or written
    #[error("Preset file error: {0}")]
    PresetFile(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn out_of_domain(name: &str, reason: impl Into<String>) -> Self {
        Error::ValueOutOfDomain {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn port(name: &str, reason: impl ToString) -> Self {
        Error::PortUnavailable {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}
