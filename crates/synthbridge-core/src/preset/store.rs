//! The preset store: the live edit snapshot plus cached memory-slot dumps.

use super::{SlotKey, Snapshot};
use crate::error::Result;
use crate::registry::{Registry, Value};
use std::collections::BTreeMap;

/// Owns the current snapshot and every memory-slot snapshot seen so far.
///
/// Slot entries are created lazily when a dump for that slot is observed and
/// replaced wholesale by later dumps.
#[derive(Debug, Clone, Default)]
pub struct PresetStore {
    current: Snapshot,
    slots: BTreeMap<SlotKey, Snapshot>,
    dirty: bool,
}

impl PresetStore {
    /// Create a store whose current snapshot is `initial`.
    pub fn new(initial: Snapshot) -> Self {
        Self {
            current: initial,
            slots: BTreeMap::new(),
            dirty: false,
        }
    }

    /// Current value of a parameter.
    pub fn get(&self, name: &str) -> Result<Value> {
        self.current.get(name)
    }

    /// Set a parameter on the current snapshot.
    ///
    /// Returns whether the stored value changed; only real changes mark the
    /// store dirty.
    pub fn set(&mut self, name: &str, value: Value) -> Result<bool> {
        let descriptor = Registry::global().resolve_by_name(name)?;
        let changed = self.current.set_validated(descriptor, value)?;
        if changed {
            self.dirty = true;
        }
        Ok(changed)
    }

    /// Copy of the current snapshot.
    pub fn current_snapshot(&self) -> Snapshot {
        self.current.clone()
    }

    pub fn current(&self) -> &Snapshot {
        &self.current
    }

    /// Replace the current snapshot wholesale and clear the dirty flag.
    pub fn load_snapshot_as_current(&mut self, snapshot: Snapshot) {
        self.current = snapshot;
        self.dirty = false;
    }

    /// Store a memory-slot dump, replacing any previous one for `key`.
    pub fn record_slot_dump(&mut self, key: SlotKey, snapshot: Snapshot) {
        self.slots.insert(key, snapshot);
    }

    pub fn slot(&self, key: &SlotKey) -> Option<&Snapshot> {
        self.slots.get(key)
    }

    /// Cached slots in address order.
    pub fn slots(&self) -> impl Iterator<Item = (&SlotKey, &Snapshot)> {
        self.slots.iter()
    }

    /// Forget every cached slot dump.
    pub fn clear_slots(&mut self) {
        self.slots.clear();
    }

    /// Whether the current snapshot has unsaved edits.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::preset::PresetType;

    #[test]
    fn test_set_marks_dirty_only_on_change() {
        let mut store = PresetStore::default();
        assert!(!store.is_dirty());

        let unchanged = store.get("volume.value").unwrap();
        assert!(!store.set("volume.value", unchanged).unwrap());
        assert!(!store.is_dirty());

        assert!(store.set("volume.value", Value::Float(0.25)).unwrap());
        assert!(store.is_dirty());
        assert_eq!(store.get("volume.value").unwrap(), Value::Float(0.25));
    }

    #[test]
    fn test_invalid_set_leaves_state_untouched() {
        let mut store = PresetStore::default();
        let before = store.current_snapshot();
        assert!(matches!(
            store.set("volume.value", Value::Int(1)),
            Err(Error::ValueOutOfDomain { .. })
        ));
        assert!(matches!(
            store.set("nope.value", Value::Int(1)),
            Err(Error::UnknownParameter(_))
        ));
        assert_eq!(store.current_snapshot(), before);
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_load_clears_dirty() {
        let mut store = PresetStore::default();
        store.set("legato.value", Value::Int(1)).unwrap();
        store.load_snapshot_as_current(Snapshot::default());
        assert!(!store.is_dirty());
        assert_eq!(store.get("legato.value").unwrap(), Value::Int(0));
    }

    #[test]
    fn test_slot_dumps_replace() {
        let mut store = PresetStore::default();
        let key = SlotKey::new(PresetType::User, 2, 2).unwrap();
        assert!(store.slot(&key).is_none());

        let mut first = Snapshot::default();
        first.set("chord.1.note.1", Value::Int(3)).unwrap();
        store.record_slot_dump(key, first);

        let mut second = Snapshot::default();
        second.set("chord.1.note.1", Value::Int(5)).unwrap();
        store.record_slot_dump(key, second.clone());

        assert_eq!(store.slot(&key), Some(&second));
        assert_eq!(store.slots().count(), 1);
        assert_eq!(store.current_snapshot(), Snapshot::default());

        store.clear_slots();
        assert!(store.slot(&key).is_none());
    }
}
