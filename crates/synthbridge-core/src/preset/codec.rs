//! SYSEX preset dump codec.
//!
//! Frame layout:
//!
//! ```text
//! F0 | 00 22 03 | 01 | cmd | type | bank | number | crc_lo crc_hi | body nibbles... | F7
//! ```
//!
//! `cmd` is 0x01 for a persistent (slot) dump and 0x02 for an edit-buffer
//! load. The body is the registry in order: integers as one byte, floats as
//! little-endian `f32`. The CRC8 covers the raw (un-nibblized) body.

use super::{ImportKind, PresetType, SlotKey, Snapshot};
use crate::crc::crc8;
use crate::error::{Error, Result};
use crate::midi::{SYSEX_END, SYSEX_START};
use crate::nibble::{from_nibbles, to_nibbles};
use crate::registry::{Registry, Value, ValueKind};

pub const MANUFACTURER_ID: [u8; 3] = [0x00, 0x22, 0x03];
pub const MODEL_ID: u8 = 0x01;

pub const CMD_PERSISTENT: u8 = 0x01;
pub const CMD_NON_PERSISTENT: u8 = 0x02;
pub const CMD_DUMP_REQUEST: u8 = 0x10;

const CMD_OFFSET: usize = 5;
const TYPE_OFFSET: usize = 6;
const BANK_OFFSET: usize = 7;
const NUMBER_OFFSET: usize = 8;
const CRC_OFFSET: usize = 9;
const BODY_OFFSET: usize = 11;

/// A decoded preset frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPreset {
    pub snapshot: Snapshot,
    pub import_kind: ImportKind,
    pub slot: SlotKey,
}

/// Whether a SYSEX frame carries our manufacturer and model ID.
pub fn is_device_sysex(bytes: &[u8]) -> bool {
    bytes.len() > CMD_OFFSET
        && bytes[0] == SYSEX_START
        && bytes[1..4] == MANUFACTURER_ID
        && bytes[4] == MODEL_ID
}

/// Whether a SYSEX frame is a dump request rather than preset data.
pub fn is_dump_request(bytes: &[u8]) -> bool {
    is_device_sysex(bytes) && bytes[CMD_OFFSET] == CMD_DUMP_REQUEST
}

/// Ask the synthesizer to send every memory slot as a persistent dump.
pub fn dump_request() -> Vec<u8> {
    let mut msg = vec![SYSEX_START];
    msg.extend_from_slice(&MANUFACTURER_ID);
    msg.extend_from_slice(&[MODEL_ID, CMD_DUMP_REQUEST, SYSEX_END]);
    msg
}

/// Size of the raw preset body in bytes.
pub fn body_len() -> usize {
    Registry::global()
        .iter()
        .map(|d| match d.kind {
            ValueKind::Integer => 1,
            ValueKind::Float => 4,
        })
        .sum()
}

/// Decode a preset SYSEX frame.
pub fn decode(bytes: &[u8]) -> Result<DecodedPreset> {
    if bytes.len() < BODY_OFFSET + 1 {
        return Err(Error::MalformedPayload(format!(
            "frame too short ({} bytes)",
            bytes.len()
        )));
    }
    if bytes[0] != SYSEX_START || bytes[bytes.len() - 1] != SYSEX_END {
        return Err(Error::MalformedPayload("missing SYSEX delimiters".into()));
    }
    if bytes[1..4] != MANUFACTURER_ID || bytes[4] != MODEL_ID {
        return Err(Error::UnrecognizedDevice(format!(
            "manufacturer {:02X?}, model {:#04x}",
            &bytes[1..4],
            bytes[4]
        )));
    }

    let import_kind = match bytes[CMD_OFFSET] {
        CMD_PERSISTENT => ImportKind::Persistent,
        CMD_NON_PERSISTENT => ImportKind::NonPersistent,
        other => {
            return Err(Error::MalformedPayload(format!(
                "command {:#04x} is not a preset frame",
                other
            )))
        }
    };
    let preset_type = PresetType::from_wire(bytes[TYPE_OFFSET])?;
    let slot = SlotKey::new(preset_type, bytes[BANK_OFFSET], bytes[NUMBER_OFFSET])?;

    let expected = from_nibbles(&bytes[CRC_OFFSET..BODY_OFFSET])?[0];
    let body = from_nibbles(&bytes[BODY_OFFSET..bytes.len() - 1])?;
    let actual = crc8(&body);
    if actual != expected {
        return Err(Error::ChecksumMismatch { expected, actual });
    }

    Ok(DecodedPreset {
        snapshot: deserialize_body(&body)?,
        import_kind,
        slot,
    })
}

/// Encode a snapshot as a preset SYSEX frame.
pub fn encode(
    snapshot: &Snapshot,
    import_kind: ImportKind,
    preset_type: PresetType,
    bank: u8,
    number: u8,
) -> Result<Vec<u8>> {
    let slot = SlotKey::new(preset_type, bank, number)?;
    Ok(encode_for_slot(snapshot, import_kind, slot))
}

/// Encode a snapshot for an already validated slot.
pub fn encode_for_slot(snapshot: &Snapshot, import_kind: ImportKind, slot: SlotKey) -> Vec<u8> {
    let body = serialize_body(snapshot);
    let cmd = match import_kind {
        ImportKind::Persistent => CMD_PERSISTENT,
        ImportKind::NonPersistent => CMD_NON_PERSISTENT,
    };

    let mut msg = Vec::with_capacity(BODY_OFFSET + body.len() * 2 + 1);
    msg.push(SYSEX_START);
    msg.extend_from_slice(&MANUFACTURER_ID);
    msg.extend_from_slice(&[
        MODEL_ID,
        cmd,
        slot.preset_type.wire_value(),
        slot.bank(),
        slot.number(),
    ]);
    msg.extend(to_nibbles(&[crc8(&body)]));
    msg.extend(to_nibbles(&body));
    msg.push(SYSEX_END);
    msg
}

fn serialize_body(snapshot: &Snapshot) -> Vec<u8> {
    let mut body = Vec::with_capacity(body_len());
    for (_, value) in snapshot.iter() {
        match value {
            Value::Int(v) => body.push(v.clamp(0, 127) as u8),
            Value::Float(v) => body.extend_from_slice(&v.to_le_bytes()),
        }
    }
    body
}

fn deserialize_body(body: &[u8]) -> Result<Snapshot> {
    let expected_len = body_len();
    if body.len() != expected_len {
        return Err(Error::MalformedPayload(format!(
            "preset body is {} bytes, expected {}",
            body.len(),
            expected_len
        )));
    }

    let mut snapshot = Snapshot::default();
    let mut offset = 0;
    for descriptor in Registry::global().iter() {
        let value = match descriptor.kind {
            ValueKind::Integer => {
                let v = Value::Int(body[offset] as i32);
                offset += 1;
                v
            }
            ValueKind::Float => {
                let raw = [
                    body[offset],
                    body[offset + 1],
                    body[offset + 2],
                    body[offset + 3],
                ];
                offset += 4;
                Value::Float(f32::from_le_bytes(raw))
            }
        };
        snapshot.set_validated(descriptor, value)?;
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edited_snapshot() -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot.set("lpf.cutoff.value", Value::Float(0.123_456_7)).unwrap();
        snapshot.set("lpf.cutoff.mod.velocity", Value::Float(0.75)).unwrap();
        snapshot.set("chord.2.note.3", Value::Int(7)).unwrap();
        snapshot.set("voice.mode.value", Value::Int(76)).unwrap();
        snapshot.set("legato.value", Value::Int(127)).unwrap();
        snapshot
    }

    #[test]
    fn test_roundtrip() {
        let snapshot = edited_snapshot();
        let bytes = encode(&snapshot, ImportKind::Persistent, PresetType::Factory, 3, 4).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.snapshot, snapshot);
        assert_eq!(decoded.import_kind, ImportKind::Persistent);
        assert_eq!(decoded.slot, SlotKey::with_letter(PresetType::Factory, 'C', 4).unwrap());

        let bytes = encode(&snapshot, ImportKind::NonPersistent, PresetType::User, 7, 1).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.import_kind, ImportKind::NonPersistent);
        assert_eq!(decoded.slot.bank_letter(), 'G');
    }

    #[test]
    fn test_frame_shape() {
        let bytes = encode(&Snapshot::default(), ImportKind::NonPersistent, PresetType::User, 1, 1).unwrap();
        assert_eq!(bytes.len(), BODY_OFFSET + body_len() * 2 + 1);
        assert_eq!(&bytes[..6], &[0xF0, 0x00, 0x22, 0x03, 0x01, CMD_NON_PERSISTENT]);
        assert_eq!(*bytes.last().unwrap(), 0xF7);
        assert!(bytes[1..bytes.len() - 1].iter().all(|&b| b < 0x80));
    }

    #[test]
    fn test_encode_rejects_bad_address() {
        let snapshot = Snapshot::default();
        for (bank, number) in [(0, 1), (8, 1), (1, 0), (1, 8)] {
            assert!(matches!(
                encode(&snapshot, ImportKind::Persistent, PresetType::User, bank, number),
                Err(Error::InvalidSlotAddress(_))
            ));
        }
    }

    #[test]
    fn test_single_bit_flip_in_body_fails_checksum() {
        let bytes = encode(&edited_snapshot(), ImportKind::Persistent, PresetType::User, 2, 5).unwrap();
        for position in BODY_OFFSET..bytes.len() - 1 {
            for bit in 0..4 {
                let mut corrupted = bytes.clone();
                corrupted[position] ^= 1 << bit;
                assert!(
                    matches!(decode(&corrupted), Err(Error::ChecksumMismatch { .. })),
                    "position {} bit {}",
                    position,
                    bit
                );
            }
        }
    }

    #[test]
    fn test_high_bit_flip_in_body_is_malformed() {
        // A flip above the low nibble fails the nibble range check before the CRC.
        let bytes = encode(&edited_snapshot(), ImportKind::Persistent, PresetType::User, 2, 5).unwrap();
        for position in BODY_OFFSET..bytes.len() - 1 {
            for bit in 4..7 {
                let mut corrupted = bytes.clone();
                corrupted[position] ^= 1 << bit;
                assert!(
                    matches!(decode(&corrupted), Err(Error::MalformedPayload(_))),
                    "position {} bit {}",
                    position,
                    bit
                );
            }
        }
    }

    #[test]
    fn test_wrong_manufacturer() {
        let mut bytes = encode(&Snapshot::default(), ImportKind::Persistent, PresetType::User, 1, 1).unwrap();
        bytes[2] = 0x21;
        assert!(matches!(decode(&bytes), Err(Error::UnrecognizedDevice(_))));
    }

    #[test]
    fn test_odd_nibble_body() {
        let mut bytes = encode(&Snapshot::default(), ImportKind::Persistent, PresetType::User, 1, 1).unwrap();
        bytes.remove(BODY_OFFSET);
        assert!(matches!(decode(&bytes), Err(Error::MalformedPayload(_))));
    }

    #[test]
    fn test_truncated_body() {
        let mut bytes = encode(&Snapshot::default(), ImportKind::Persistent, PresetType::User, 1, 1).unwrap();
        bytes.drain(BODY_OFFSET..BODY_OFFSET + 2);
        // Fix up the CRC so only the length is wrong.
        let body = from_nibbles(&bytes[BODY_OFFSET..bytes.len() - 1]).unwrap();
        let crc = to_nibbles(&[crc8(&body)]);
        bytes[CRC_OFFSET..BODY_OFFSET].copy_from_slice(&crc);
        assert!(matches!(decode(&bytes), Err(Error::MalformedPayload(_))));
    }

    #[test]
    fn test_dump_request() {
        let request = dump_request();
        assert!(is_device_sysex(&request));
        assert!(is_dump_request(&request));
        assert!(matches!(decode(&request), Err(Error::MalformedPayload(_))));
    }
}
