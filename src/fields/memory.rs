//! Field store for memory-mode fields, backed by the metadata document.

use crate::error::{Result, StoreError};
use crate::schema::{FieldMode, ObjectSpec};
use crate::types::{Document, FieldValue, ItemEntry};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};

struct Slot {
    present: bool,
    value: serde_json::Value,
}

/// Inline values for the memory-mode subset of an object's fields.
pub struct MemoryFieldStore {
    slots: Mutex<BTreeMap<String, Slot>>,
}

impl MemoryFieldStore {
    /// Build the store from a document, keyed by the type's memory fields.
    pub(crate) fn from_document(spec: &ObjectSpec, doc: &Document) -> Self {
        let mut slots = BTreeMap::new();
        for (name, field) in &spec.fields {
            if field.mode != FieldMode::Memory {
                continue;
            }
            let entry = doc.items.get(name);
            slots.insert(
                name.clone(),
                Slot {
                    present: entry.map(|e| e.present).unwrap_or(false),
                    value: entry
                        .and_then(|e| e.value.clone())
                        .unwrap_or(serde_json::Value::Null),
                },
            );
        }
        Self {
            slots: Mutex::new(slots),
        }
    }

    /// True iff the field is declared for this mode.
    pub fn contains(&self, field: &str) -> bool {
        self.slots.lock().contains_key(field)
    }

    /// Current value; `None` designates an absent field.
    pub fn get(&self, field: &str) -> Result<Option<FieldValue>> {
        let slots = self.slots.lock();
        let slot = slots
            .get(field)
            .ok_or_else(|| StoreError::NoSuchField(field.to_string()))?;
        if !slot.present {
            return Ok(None);
        }
        Ok(Some(FieldValue::Json(slot.value.clone())))
    }

    pub fn set(&self, field: &str, value: serde_json::Value) -> Result<()> {
        let mut slots = self.slots.lock();
        let slot = slots
            .get_mut(field)
            .ok_or_else(|| StoreError::NoSuchField(field.to_string()))?;
        slot.value = value;
        slot.present = true;
        Ok(())
    }

    /// Clears the field; deleting an absent field is a no-op.
    pub fn delete(&self, field: &str) -> Result<()> {
        let mut slots = self.slots.lock();
        let slot = slots
            .get_mut(field)
            .ok_or_else(|| StoreError::NoSuchField(field.to_string()))?;
        slot.present = false;
        slot.value = serde_json::Value::Null;
        Ok(())
    }

    pub fn present(&self, field: &str) -> Result<bool> {
        let slots = self.slots.lock();
        let slot = slots
            .get(field)
            .ok_or_else(|| StoreError::NoSuchField(field.to_string()))?;
        Ok(slot.present)
    }

    pub fn present_fields(&self) -> BTreeSet<String> {
        self.slots
            .lock()
            .iter()
            .filter(|(_, slot)| slot.present)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn absent_fields(&self) -> BTreeSet<String> {
        self.slots
            .lock()
            .iter()
            .filter(|(_, slot)| !slot.present)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Document entry reflecting the field's current state.
    pub(crate) fn item_entry(&self, field: &str) -> Result<ItemEntry> {
        let slots = self.slots.lock();
        let slot = slots
            .get(field)
            .ok_or_else(|| StoreError::NoSuchField(field.to_string()))?;
        Ok(ItemEntry {
            present: slot.present,
            value: slot.present.then(|| slot.value.clone()),
        })
    }
}
