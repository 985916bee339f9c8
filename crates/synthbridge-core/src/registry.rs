//! Static catalogue of every controllable synthesizer parameter.
//!
//! The catalogue order is also the layout of the SYSEX preset body, so adding,
//! removing or reordering entries changes the wire format.
//!
//! Modulation amounts are the awkward part: the hardware reuses one CC per
//! destination for all four modulation sources and disambiguates with a prior
//! CC 30 message. [`Registry::resolve_by_cc`] therefore needs the currently
//! selected [`ModSource`].

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::build);

/// One of the four hardware modulation sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModSource {
    #[default]
    Lfo2 = 0,
    ModWheel = 1,
    Velocity = 2,
    Aftertouch = 3,
}

impl ModSource {
    /// All sources in column order.
    pub const ALL: [ModSource; 4] = [
        ModSource::Lfo2,
        ModSource::ModWheel,
        ModSource::Velocity,
        ModSource::Aftertouch,
    ];

    /// Interpret a CC 30 value. Values past the last slot select aftertouch.
    pub fn from_cc_value(value: u8) -> Self {
        match value {
            0 => ModSource::Lfo2,
            1 => ModSource::ModWheel,
            2 => ModSource::Velocity,
            _ => ModSource::Aftertouch,
        }
    }

    /// Slot number sent as the CC 30 value.
    pub fn slot(self) -> u8 {
        self as u8
    }

    /// Name suffix used in modulation parameter paths.
    pub fn suffix(self) -> &'static str {
        match self {
            ModSource::Lfo2 => "lfo2",
            ModSource::ModWheel => "modwheel",
            ModSource::Velocity => "velocity",
            ModSource::Aftertouch => "aftertouch",
        }
    }
}

impl fmt::Display for ModSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Declared value domain of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Integer in 0..=127
    Integer,
    /// Normalized float in 0.0..=1.0
    Float,
}

/// A parameter value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f32),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Int(_) => ValueKind::Integer,
            Value::Float(_) => ValueKind::Float,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{:.4}", v),
        }
    }
}

/// Owning section of a parameter within the preset body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Main,
    Modulation(ModSource),
    Lfo,
    Chord,
    Legato,
    Voice,
}

/// How a parameter maps onto MIDI CC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Plain parameter with an optional 1:1 CC. `None` means SYSEX-only.
    Basic { cc: Option<u8> },
    /// Modulation amount sharing `cc` with the other sources' columns.
    Modulated { cc: u8, source: ModSource },
    /// Integer parameter whose values are also addressed by label.
    EnumAlias {
        cc: Option<u8>,
        labels: &'static [&'static str],
    },
}

/// Immutable description of one parameter.
#[derive(Debug, Clone)]
pub struct Descriptor {
    /// Dotted path, unique across the registry
    pub name: String,
    /// Position in the registry and in the preset body
    pub index: usize,
    pub kind: ValueKind,
    pub section: Section,
    pub binding: Binding,
    /// Value in the init preset
    pub default: Value,
}

impl Descriptor {
    /// CC for a 1:1 wire mapping, if any.
    pub fn direct_cc(&self) -> Option<u8> {
        match self.binding {
            Binding::Basic { cc } | Binding::EnumAlias { cc, .. } => cc,
            Binding::Modulated { .. } => None,
        }
    }

    /// Shared CC and source column for modulation amounts.
    pub fn modulation(&self) -> Option<(u8, ModSource)> {
        match self.binding {
            Binding::Modulated { cc, source } => Some((cc, source)),
            _ => None,
        }
    }

    /// Whether a change must be sent as a full SYSEX snapshot.
    ///
    /// Floats would lose precision over a 7-bit CC, and modulated or
    /// SYSEX-only parameters have no single CC that addresses them.
    pub fn needs_snapshot_flush(&self) -> bool {
        self.kind == ValueKind::Float || self.direct_cc().is_none()
    }

    /// Check that `value` fits this parameter's domain.
    pub fn validate(&self, value: Value) -> Result<Value> {
        match (self.kind, value) {
            (ValueKind::Integer, Value::Int(v)) if (0..=127).contains(&v) => Ok(value),
            (ValueKind::Integer, Value::Int(v)) => {
                Err(Error::out_of_domain(&self.name, format!("{} not in 0..=127", v)))
            }
            (ValueKind::Float, Value::Float(v)) if (0.0..=1.0).contains(&v) => Ok(value),
            (ValueKind::Float, Value::Float(v)) => {
                Err(Error::out_of_domain(&self.name, format!("{} not in 0.0..=1.0", v)))
            }
            (ValueKind::Integer, Value::Float(_)) => {
                Err(Error::out_of_domain(&self.name, "expected an integer, got a float"))
            }
            (ValueKind::Float, Value::Int(_)) => {
                Err(Error::out_of_domain(&self.name, "expected a float, got an integer"))
            }
        }
    }

    /// Interpret a 7-bit CC value for this parameter.
    pub fn value_from_cc(&self, cc_value: u8) -> Value {
        let cc_value = cc_value.min(127);
        match self.kind {
            ValueKind::Integer => Value::Int(cc_value as i32),
            ValueKind::Float => Value::Float(cc_value as f32 / 127.0),
        }
    }

    /// Quantize a value to 7 bits for CC transmission.
    pub fn value_to_cc(&self, value: Value) -> u8 {
        match value {
            Value::Int(v) => v.clamp(0, 127) as u8,
            Value::Float(v) => (v.clamp(0.0, 1.0) * 127.0).round() as u8,
        }
    }

    /// Label for an integer value of an enum-alias parameter.
    pub fn label_for(&self, value: Value) -> Option<&'static str> {
        match (self.binding, value) {
            (Binding::EnumAlias { labels, .. }, Value::Int(v)) if (0..=127).contains(&v) => {
                labels.get(v as usize * labels.len() / 128).copied()
            }
            _ => None,
        }
    }

    /// Canonical wire value for a label of an enum-alias parameter.
    pub fn value_for_label(&self, label: &str) -> Result<Value> {
        let Binding::EnumAlias { labels, .. } = self.binding else {
            return Err(Error::out_of_domain(&self.name, "parameter has no labels"));
        };
        let position = labels
            .iter()
            .position(|l| l.eq_ignore_ascii_case(label))
            .ok_or_else(|| {
                Error::out_of_domain(
                    &self.name,
                    format!("unknown label '{}', expected one of {}", label, labels.join(", ")),
                )
            })?;
        let last = labels.len().saturating_sub(1).max(1);
        let value = (position * 127 + last / 2) / last;
        Ok(Value::Int(value as i32))
    }
}

/// Labels of `voice.mode.value`, in wire order.
pub const VOICE_MODE_LABELS: &[&str] = &["poly", "mono", "unison", "chord", "arp", "drone"];

/// Main section: (path, CC, default).
const MAIN_PARAMS: &[(&str, u8, f32)] = &[
    ("osc1.wave", 24, 0.0),
    ("osc1.pitch", 25, 0.5),
    ("osc2.wave", 26, 0.0),
    ("osc2.pitch", 27, 0.5),
    ("osc.mix", 28, 0.5),
    ("noise.level", 29, 0.0),
    ("lpf.cutoff", 74, 1.0),
    ("lpf.resonance", 71, 0.0),
    ("env.attack", 73, 0.0),
    ("env.decay", 75, 0.5),
    ("env.sustain", 76, 1.0),
    ("env.release", 72, 0.2),
    ("lfo1.rate", 77, 0.5),
    ("lfo1.depth", 78, 0.0),
    ("glide", 5, 0.0),
    ("volume", 7, 0.8),
];

/// Modulation destinations and their shared amount CC.
const MOD_DESTINATIONS: &[(&str, u8)] = &[
    ("osc1.pitch", 40),
    ("osc2.pitch", 41),
    ("osc.mix", 42),
    ("noise.level", 43),
    ("lpf.cutoff", 44),
    ("lpf.resonance", 45),
    ("lfo1.depth", 46),
];

const CHORD_TABLES: usize = 4;
const CHORD_NOTES: usize = 4;

/// The parameter catalogue.
#[derive(Debug)]
pub struct Registry {
    descriptors: Vec<Descriptor>,
    by_name: HashMap<String, usize>,
    by_cc: HashMap<u8, Vec<usize>>,
}

impl Registry {
    /// The process-wide catalogue.
    pub fn global() -> &'static Registry {
        &REGISTRY
    }

    fn build() -> Self {
        let mut registry = Registry {
            descriptors: Vec::new(),
            by_name: HashMap::new(),
            by_cc: HashMap::new(),
        };

        for &(path, cc, default) in MAIN_PARAMS {
            registry.push(
                format!("{}.value", path),
                ValueKind::Float,
                Section::Main,
                Binding::Basic { cc: Some(cc) },
                Value::Float(default),
            );
        }

        for source in ModSource::ALL {
            for &(destination, cc) in MOD_DESTINATIONS {
                registry.push(
                    format!("{}.mod.{}", destination, source.suffix()),
                    ValueKind::Float,
                    Section::Modulation(source),
                    Binding::Modulated { cc, source },
                    Value::Float(0.0),
                );
            }
        }

        registry.push(
            "lfo2.rate.value".into(),
            ValueKind::Float,
            Section::Lfo,
            Binding::Basic { cc: Some(79) },
            Value::Float(0.5),
        );
        for (path, cc) in [("lfo1.shape", 80), ("lfo2.shape", 81), ("lfo2.sync", 82)] {
            registry.push(
                format!("{}.value", path),
                ValueKind::Integer,
                Section::Lfo,
                Binding::Basic { cc: Some(cc) },
                Value::Int(0),
            );
        }

        for table in 1..=CHORD_TABLES {
            for note in 1..=CHORD_NOTES {
                registry.push(
                    format!("chord.{}.note.{}", table, note),
                    ValueKind::Integer,
                    Section::Chord,
                    Binding::Basic { cc: None },
                    Value::Int(0),
                );
            }
        }

        registry.push(
            "legato.value".into(),
            ValueKind::Integer,
            Section::Legato,
            Binding::Basic { cc: Some(68) },
            Value::Int(0),
        );
        registry.push(
            "voice.mode.value".into(),
            ValueKind::Integer,
            Section::Voice,
            Binding::EnumAlias {
                cc: Some(83),
                labels: VOICE_MODE_LABELS,
            },
            Value::Int(0),
        );

        registry
    }

    fn push(&mut self, name: String, kind: ValueKind, section: Section, binding: Binding, default: Value) {
        let index = self.descriptors.len();
        let cc = match binding {
            Binding::Basic { cc } | Binding::EnumAlias { cc, .. } => cc,
            Binding::Modulated { cc, .. } => Some(cc),
        };
        if let Some(cc) = cc {
            self.by_cc.entry(cc).or_default().push(index);
        }
        self.by_name.insert(name.clone(), index);
        self.descriptors.push(Descriptor {
            name,
            index,
            kind,
            section,
            binding,
            default,
        });
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// All descriptors in body order.
    pub fn iter(&self) -> impl Iterator<Item = &Descriptor> {
        self.descriptors.iter()
    }

    /// Descriptor at a body position.
    pub fn get(&self, index: usize) -> Option<&Descriptor> {
        self.descriptors.get(index)
    }

    /// Look a parameter up by its dotted name.
    pub fn resolve_by_name(&self, name: &str) -> Result<&Descriptor> {
        self.by_name
            .get(name)
            .map(|&i| &self.descriptors[i])
            .ok_or_else(|| Error::UnknownParameter(name.to_string()))
    }

    /// Resolve an incoming CC number.
    ///
    /// Returns nothing for unmapped CCs, the single owner of a direct CC, or
    /// the one modulation amount on a shared CC that belongs to
    /// `current_source`.
    pub fn resolve_by_cc(&self, cc: u8, current_source: ModSource) -> Vec<&Descriptor> {
        let Some(indices) = self.by_cc.get(&cc) else {
            return Vec::new();
        };
        indices
            .iter()
            .map(|&i| &self.descriptors[i])
            .filter(|d| match d.binding {
                Binding::Modulated { source, .. } => source == current_source,
                _ => true,
            })
            .take(1)
            .collect()
    }
}
