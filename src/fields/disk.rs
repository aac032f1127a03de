//! Field store for disk-mode fields: lazy loads, eager persistence.

use crate::error::{Result, StoreError};
use crate::schema::{FieldMode, LoadStrategy, ObjectSpec, SaveStrategy};
use crate::types::{Document, FieldValue};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

struct DiskSlot {
    path: PathBuf,
    load: Option<Arc<dyn LoadStrategy>>,
    save: Option<Arc<dyn SaveStrategy>>,
    present: bool,
    /// Lazy-load cache. `None` means not yet loaded, distinct from a
    /// loaded value that happens to be empty.
    cache: Option<FieldValue>,
}

/// On-disk values for the disk-mode subset of an object's fields.
///
/// Presence flag and cache live under one lock, so a reader never
/// observes one without the other.
pub struct DiskFieldStore {
    slots: Mutex<BTreeMap<String, DiskSlot>>,
}

impl DiskFieldStore {
    /// Build the store from a document, keyed by the type's disk fields.
    /// Backing paths are `document root` / `declared filename`.
    pub(crate) fn from_document(spec: &ObjectSpec, doc: &Document) -> Self {
        let mut slots = BTreeMap::new();
        for (name, field) in &spec.fields {
            if field.mode != FieldMode::Disk {
                continue;
            }
            let filename = field.filename.as_deref().unwrap_or(name.as_str());
            slots.insert(
                name.clone(),
                DiskSlot {
                    path: doc.root.join(filename),
                    load: field.load.clone(),
                    save: field.save.clone(),
                    present: doc.items.get(name).map(|e| e.present).unwrap_or(false),
                    cache: None,
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

    /// Current value, loading from the backing file on first access.
    /// Absent fields yield `None` without touching the filesystem.
    pub fn get(&self, field: &str) -> Result<Option<FieldValue>> {
        let mut slots = self.slots.lock();
        let slot = slots
            .get_mut(field)
            .ok_or_else(|| StoreError::NoSuchField(field.to_string()))?;
        if !slot.present {
            return Ok(None);
        }
        if slot.cache.is_none() {
            let load = slot.load.as_ref().ok_or_else(|| {
                StoreError::Schema(format!("no load strategy attached for field: {}", field))
            })?;
            slot.cache = Some(load.load(&slot.path)?);
        }
        Ok(slot.cache.clone())
    }

    /// Persists through the save strategy, then marks the field present.
    pub fn set(&self, field: &str, value: FieldValue) -> Result<()> {
        let mut slots = self.slots.lock();
        let slot = slots
            .get_mut(field)
            .ok_or_else(|| StoreError::NoSuchField(field.to_string()))?;
        let save = slot
            .save
            .as_ref()
            .ok_or_else(|| StoreError::ReadOnlyField(field.to_string()))?;
        save.save(&value, &slot.path)?;
        slot.cache = Some(value);
        slot.present = true;
        Ok(())
    }

    /// Clears the field and removes its backing file. Deleting an
    /// absent field (or one whose file is already gone) is a no-op.
    pub fn delete(&self, field: &str) -> Result<()> {
        let mut slots = self.slots.lock();
        let slot = slots
            .get_mut(field)
            .ok_or_else(|| StoreError::NoSuchField(field.to_string()))?;
        slot.present = false;
        slot.cache = None;
        if slot.path.exists() {
            fs::remove_file(&slot.path)?;
        }
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

    /// Backing path of a disk field.
    pub fn path(&self, field: &str) -> Result<PathBuf> {
        let slots = self.slots.lock();
        let slot = slots
            .get(field)
            .ok_or_else(|| StoreError::NoSuchField(field.to_string()))?;
        Ok(slot.path.clone())
    }

    /// Every present field must still have its backing file on disk.
    pub fn verify_present_files(&self) -> Result<()> {
        let slots = self.slots.lock();
        for (name, slot) in slots.iter() {
            if slot.present && !slot.path.exists() {
                return Err(StoreError::MissingOnDisk {
                    field: name.clone(),
                    path: slot.path.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RawBytes, RawFieldSpec, RawObjectSpec, RawSchema, SchemaRegistry};
    use crate::types::{ItemEntry, LocalId, QualifiedId, TypeName};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn frame_store(dir: &TempDir, present: &[&str]) -> DiskFieldStore {
        let schema = SchemaRegistry::parse(RawSchema::new().object(
            "Frame",
            RawObjectSpec::new()
                .field(
                    "image",
                    RawFieldSpec::disk(Arc::new(RawBytes))
                        .with_save(Arc::new(RawBytes))
                        .with_filename("image.png"),
                )
                .field("skeleton", RawFieldSpec::disk(Arc::new(RawBytes))),
        ))
        .unwrap();
        let frame = TypeName::new("Frame").unwrap();

        let mut items = BTreeMap::new();
        for name in present {
            items.insert(
                name.to_string(),
                ItemEntry {
                    present: true,
                    value: None,
                },
            );
        }
        let doc = Document {
            id: QualifiedId::root(&LocalId::new("f1").unwrap()),
            root: dir.path().to_path_buf(),
            items,
            children: BTreeMap::new(),
        };
        DiskFieldStore::from_document(schema.object(&frame).unwrap(), &doc)
    }

    #[test]
    fn test_set_then_get_and_file_exists() {
        let dir = TempDir::new().unwrap();
        let store = frame_store(&dir, &[]);

        store
            .set("image", FieldValue::Bytes(vec![9, 9, 9]))
            .unwrap();

        assert!(dir.path().join("image.png").exists());
        assert_eq!(
            store.get("image").unwrap(),
            Some(FieldValue::Bytes(vec![9, 9, 9]))
        );
    }

    #[test]
    fn test_lazy_load_from_existing_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("image.png"), [1, 2, 3]).unwrap();
        let store = frame_store(&dir, &["image"]);

        assert_eq!(
            store.get("image").unwrap(),
            Some(FieldValue::Bytes(vec![1, 2, 3]))
        );

        // Cached: mutating the file behind the store's back is not observed.
        fs::write(dir.path().join("image.png"), [7]).unwrap();
        assert_eq!(
            store.get("image").unwrap(),
            Some(FieldValue::Bytes(vec![1, 2, 3]))
        );
    }

    #[test]
    fn test_absent_field_never_loads() {
        let dir = TempDir::new().unwrap();
        let store = frame_store(&dir, &[]);

        // No backing file either -- a load attempt would fail with Io.
        assert_eq!(store.get("image").unwrap(), None);
    }

    #[test]
    fn test_read_only_field_rejects_set() {
        let dir = TempDir::new().unwrap();
        let store = frame_store(&dir, &[]);

        let result = store.set("skeleton", FieldValue::Bytes(vec![0]));
        assert!(matches!(result, Err(StoreError::ReadOnlyField(_))));
    }

    #[test]
    fn test_delete_removes_file_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = frame_store(&dir, &[]);

        store.set("image", FieldValue::Bytes(vec![5])).unwrap();
        assert!(dir.path().join("image.png").exists());

        store.delete("image").unwrap();
        assert!(!dir.path().join("image.png").exists());
        assert_eq!(store.get("image").unwrap(), None);

        // already absent: no-op, not an error
        store.delete("image").unwrap();
    }

    #[test]
    fn test_verify_present_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("image.png"), [1]).unwrap();
        let store = frame_store(&dir, &["image"]);

        store.verify_present_files().unwrap();

        fs::remove_file(dir.path().join("image.png")).unwrap();
        assert!(matches!(
            store.verify_present_files(),
            Err(StoreError::MissingOnDisk { .. })
        ));
    }

    #[test]
    fn test_empty_payload_is_not_absent() {
        let dir = TempDir::new().unwrap();
        let store = frame_store(&dir, &[]);

        store.set("image", FieldValue::Bytes(Vec::new())).unwrap();
        assert_eq!(
            store.get("image").unwrap(),
            Some(FieldValue::Bytes(Vec::new()))
        );
        assert!(store.present("image").unwrap());
    }
}
