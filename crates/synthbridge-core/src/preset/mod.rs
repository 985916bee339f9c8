//! Preset snapshots, memory slot addressing and their codecs.
//!
//! - [`codec`] - SYSEX preset dump encoding/decoding
//! - [`store`] - current snapshot plus memory-slot cache
//! - [`file`] - textual preset files

pub mod codec;
pub mod file;
pub mod store;

use crate::error::{Error, Result};
use crate::registry::{Descriptor, Registry, Value};
use std::fmt;
use std::str::FromStr;

/// Number of banks (A-G) and of slots per bank.
pub const BANK_COUNT: u8 = 7;
pub const SLOTS_PER_BANK: u8 = 7;

/// Which half of the synthesizer's memory a slot lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum PresetType {
    #[default]
    User,
    Factory,
}

impl PresetType {
    /// Header byte in a preset SYSEX frame.
    pub fn wire_value(self) -> u8 {
        match self {
            PresetType::User => 0,
            PresetType::Factory => 1,
        }
    }

    pub fn from_wire(value: u8) -> Result<Self> {
        match value {
            0 => Ok(PresetType::User),
            1 => Ok(PresetType::Factory),
            other => Err(Error::InvalidSlotAddress(format!(
                "preset type byte {:#04x}",
                other
            ))),
        }
    }

    /// Interpret a bank-select (CC 0) value.
    pub fn from_bank_select(value: u8) -> Self {
        if value == 0 {
            PresetType::User
        } else {
            PresetType::Factory
        }
    }
}

impl fmt::Display for PresetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresetType::User => f.write_str("user"),
            PresetType::Factory => f.write_str("factory"),
        }
    }
}

impl FromStr for PresetType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "user" | "u" => Ok(PresetType::User),
            "factory" | "f" => Ok(PresetType::Factory),
            _ => Err(Error::InvalidSlotAddress(format!("preset type '{}'", s))),
        }
    }
}

/// Whether a preset frame targets a memory slot or only the edit buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    /// Stored into the addressed memory slot
    Persistent,
    /// Loaded into the edit buffer only
    NonPersistent,
}

/// Address of one of the synthesizer's 98 preset locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    pub preset_type: PresetType,
    /// 1..=7, shown as 'A'..='G'
    bank: u8,
    /// 1..=7
    number: u8,
}

impl SlotKey {
    /// User A1, the address used for edit-buffer frames when no preset has
    /// been loaded yet.
    pub const FIRST_USER: SlotKey = SlotKey {
        preset_type: PresetType::User,
        bank: 1,
        number: 1,
    };

    /// Build a key, validating bank and slot number.
    pub fn new(preset_type: PresetType, bank: u8, number: u8) -> Result<Self> {
        if !(1..=BANK_COUNT).contains(&bank) {
            return Err(Error::InvalidSlotAddress(format!("bank {} not in 1..=7", bank)));
        }
        if !(1..=SLOTS_PER_BANK).contains(&number) {
            return Err(Error::InvalidSlotAddress(format!(
                "slot number {} not in 1..=7",
                number
            )));
        }
        Ok(Self {
            preset_type,
            bank,
            number,
        })
    }

    /// Build a key from a bank letter ('A'..='G', case-insensitive).
    pub fn with_letter(preset_type: PresetType, bank: char, number: u8) -> Result<Self> {
        let upper = bank.to_ascii_uppercase();
        if !('A'..='G').contains(&upper) {
            return Err(Error::InvalidSlotAddress(format!("bank letter '{}'", bank)));
        }
        Self::new(preset_type, upper as u8 - b'A' + 1, number)
    }

    /// Decode a program change: bank from `program / 7`, slot from `program % 7 + 1`.
    pub fn from_program(preset_type: PresetType, program: u8) -> Result<Self> {
        Self::new(preset_type, program / SLOTS_PER_BANK + 1, program % SLOTS_PER_BANK + 1)
    }

    /// Program change number addressing this slot.
    pub fn program(&self) -> u8 {
        (self.bank - 1) * SLOTS_PER_BANK + (self.number - 1)
    }

    pub fn bank(&self) -> u8 {
        self.bank
    }

    pub fn bank_letter(&self) -> char {
        (b'A' + self.bank - 1) as char
    }

    pub fn number(&self) -> u8 {
        self.number
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}{}", self.preset_type, self.bank_letter(), self.number)
    }
}

/// A value for every registered parameter.
///
/// Values are stored in registry order and are always within their
/// descriptor's domain.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    values: Vec<Value>,
}

impl Default for Snapshot {
    /// The init preset.
    fn default() -> Self {
        Self {
            values: Registry::global().iter().map(|d| d.default).collect(),
        }
    }
}

impl Snapshot {
    /// Value of a parameter by name.
    pub fn get(&self, name: &str) -> Result<Value> {
        let descriptor = Registry::global().resolve_by_name(name)?;
        Ok(self.values[descriptor.index])
    }

    /// Set a parameter by name after validating it. Returns whether it changed.
    pub fn set(&mut self, name: &str, value: Value) -> Result<bool> {
        let descriptor = Registry::global().resolve_by_name(name)?;
        self.set_validated(descriptor, value)
    }

    pub(crate) fn set_validated(&mut self, descriptor: &Descriptor, value: Value) -> Result<bool> {
        let value = descriptor.validate(value)?;
        let slot = &mut self.values[descriptor.index];
        if *slot == value {
            return Ok(false);
        }
        *slot = value;
        Ok(true)
    }

    pub(crate) fn value_at(&self, index: usize) -> Value {
        self.values[index]
    }

    /// Iterate over `(descriptor, value)` in registry order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static Descriptor, Value)> + '_ {
        Registry::global().iter().zip(self.values.iter().copied())
    }
}
