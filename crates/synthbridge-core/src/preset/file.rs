//! Preset files.
//!
//! A preset file is a JSON object mapping parameter names to values:
//!
//! ```json
//! { "format": 1, "parameters": { "lpf.cutoff.value": 0.5, "legato.value": 1 } }
//! ```
//!
//! Floats are widened to `f64` on save so they survive the text round trip
//! exactly. Parameters missing from a file keep their init value.

use super::Snapshot;
use crate::error::{Error, Result};
use crate::registry::{Registry, Value, ValueKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct PresetFile {
    format: u32,
    parameters: BTreeMap<String, FileValue>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
enum FileValue {
    Int(i64),
    Float(f64),
}

/// Serialize a snapshot to preset file bytes.
pub fn to_bytes(snapshot: &Snapshot) -> Result<Vec<u8>> {
    let parameters = snapshot
        .iter()
        .map(|(descriptor, value)| {
            let value = match value {
                Value::Int(v) => FileValue::Int(v as i64),
                Value::Float(v) => FileValue::Float(f64::from(v)),
            };
            (descriptor.name.clone(), value)
        })
        .collect();
    let file = PresetFile {
        format: FORMAT_VERSION,
        parameters,
    };
    Ok(serde_json::to_vec_pretty(&file)?)
}

/// Parse preset file bytes into a snapshot.
pub fn from_bytes(bytes: &[u8]) -> Result<Snapshot> {
    let file: PresetFile = serde_json::from_slice(bytes)?;
    if file.format != FORMAT_VERSION {
        return Err(Error::MalformedPayload(format!(
            "unsupported preset file format {}",
            file.format
        )));
    }

    let registry = Registry::global();
    let mut snapshot = Snapshot::default();
    for (name, raw) in file.parameters {
        let descriptor = registry.resolve_by_name(&name)?;
        let value = match (descriptor.kind, raw) {
            (ValueKind::Integer, FileValue::Int(v)) => Value::Int(
                i32::try_from(v).map_err(|_| Error::out_of_domain(&name, format!("{} is too large", v)))?,
            ),
            (ValueKind::Float, FileValue::Float(v)) => Value::Float(v as f32),
            // Hand-written files may spell 0.0 and 1.0 as integers
            (ValueKind::Float, FileValue::Int(v)) => Value::Float(v as f32),
            (ValueKind::Integer, FileValue::Float(v)) => {
                return Err(Error::out_of_domain(&name, format!("expected an integer, got {}", v)))
            }
        };
        snapshot.set_validated(descriptor, value)?;
    }
    Ok(snapshot)
}

/// Write a snapshot to a preset file.
pub fn save(snapshot: &Snapshot, path: &Path) -> Result<()> {
    fs::write(path, to_bytes(snapshot)?)?;
    Ok(())
}

/// Read a preset file.
pub fn load(path: &Path) -> Result<Snapshot> {
    from_bytes(&fs::read(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_is_exact() {
        let mut snapshot = Snapshot::default();
        snapshot.set("lpf.cutoff.value", Value::Float(0.1)).unwrap();
        snapshot.set("osc.mix.mod.aftertouch", Value::Float(0.333_333_34)).unwrap();
        snapshot.set("chord.4.note.4", Value::Int(12)).unwrap();

        let bytes = to_bytes(&snapshot).unwrap();
        assert_eq!(from_bytes(&bytes).unwrap(), snapshot);
    }

    #[test]
    fn test_missing_parameters_keep_defaults() {
        let snapshot = from_bytes(br#"{ "format": 1, "parameters": { "legato.value": 1 } }"#).unwrap();
        assert_eq!(snapshot.get("legato.value").unwrap(), Value::Int(1));
        assert_eq!(
            snapshot.get("volume.value").unwrap(),
            Snapshot::default().get("volume.value").unwrap()
        );
    }

    #[test]
    fn test_integer_spelling_for_float() {
        let snapshot = from_bytes(br#"{ "format": 1, "parameters": { "lpf.cutoff.value": 0 } }"#).unwrap();
        assert_eq!(snapshot.get("lpf.cutoff.value").unwrap(), Value::Float(0.0));
    }

    #[test]
    fn test_rejects_unknown_and_out_of_domain() {
        assert!(matches!(
            from_bytes(br#"{ "format": 1, "parameters": { "bogus": 1 } }"#),
            Err(Error::UnknownParameter(_))
        ));
        assert!(matches!(
            from_bytes(br#"{ "format": 1, "parameters": { "legato.value": 200 } }"#),
            Err(Error::ValueOutOfDomain { .. })
        ));
        assert!(matches!(
            from_bytes(br#"{ "format": 1, "parameters": { "legato.value": 0.5 } }"#),
            Err(Error::ValueOutOfDomain { .. })
        ));
        assert!(matches!(from_bytes(b"not json"), Err(Error::PresetFile(_))));
        assert!(matches!(
            from_bytes(br#"{ "format": 9, "parameters": {} }"#),
            Err(Error::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preset.json");
        let mut snapshot = Snapshot::default();
        snapshot.set("env.release.value", Value::Float(0.9)).unwrap();
        save(&snapshot, &path).unwrap();
        assert_eq!(load(&path).unwrap(), snapshot);
    }
}
