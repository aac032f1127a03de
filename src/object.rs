//! Uniform object interface over both field stores plus child
//! navigation.

use crate::children::ChildIndex;
use crate::client::ClientInner;
use crate::docstore::DocumentUpdate;
use crate::error::{Result, StoreError};
use crate::fields::{DiskFieldStore, MemoryFieldStore};
use crate::schema::ObjectSpec;
use crate::types::{Document, FieldValue, ItemEntry, QualifiedId, TypeName};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A single object instance: fields routed to their storage medium,
/// children reachable through the index.
///
/// Field writes are pushed to the backing document (and, for disk
/// fields, the backing file) immediately; there is no buffering.
pub struct DataObject {
    id: QualifiedId,
    type_name: TypeName,
    root: PathBuf,
    memory: MemoryFieldStore,
    disk: DiskFieldStore,
    children: ChildIndex,
    client: Arc<ClientInner>,
}

impl DataObject {
    pub(crate) fn from_document(
        type_name: TypeName,
        spec: &ObjectSpec,
        doc: Document,
        client: Arc<ClientInner>,
    ) -> Self {
        let memory = MemoryFieldStore::from_document(spec, &doc);
        let disk = DiskFieldStore::from_document(spec, &doc);
        let children = ChildIndex::from_document(doc.id.clone(), &spec.contains, &doc.children);
        Self {
            id: doc.id,
            type_name,
            root: doc.root,
            memory,
            disk,
            children,
            client,
        }
    }

    pub fn id(&self) -> &QualifiedId {
        &self.id
    }

    pub fn type_name(&self) -> &TypeName {
        &self.type_name
    }

    /// Directory holding this object's disk payloads.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // --- Fields ---

    /// True iff the field is declared for this object's type.
    pub fn contains(&self, field: &str) -> bool {
        self.memory.contains(field) || self.disk.contains(field)
    }

    /// Field value, dispatched on the declared mode. `None` designates
    /// an absent field.
    pub fn get(&self, field: &str) -> Result<Option<FieldValue>> {
        if self.memory.contains(field) {
            self.memory.get(field)
        } else if self.disk.contains(field) {
            self.disk.get(field)
        } else {
            Err(StoreError::NoSuchField(field.to_string()))
        }
    }

    /// Write a field and push the change through to the backing stores.
    pub fn set(&self, field: &str, value: FieldValue) -> Result<()> {
        if self.memory.contains(field) {
            let json = match value {
                FieldValue::Json(v) => v,
                FieldValue::Bytes(_) => {
                    return Err(StoreError::InvalidOperation(format!(
                        "memory-mode field {} takes a structured value",
                        field
                    )))
                }
            };
            self.memory.set(field, json)?;
        } else if self.disk.contains(field) {
            self.disk.set(field, value)?;
        } else {
            return Err(StoreError::NoSuchField(field.to_string()));
        }
        self.write_back_item(field)
    }

    /// Clear a field; for disk fields the backing file is removed too.
    pub fn delete(&self, field: &str) -> Result<()> {
        if self.memory.contains(field) {
            self.memory.delete(field)?;
        } else if self.disk.contains(field) {
            self.disk.delete(field)?;
        } else {
            return Err(StoreError::NoSuchField(field.to_string()));
        }
        self.write_back_item(field)
    }

    pub fn present(&self, field: &str) -> Result<bool> {
        if self.memory.contains(field) {
            self.memory.present(field)
        } else if self.disk.contains(field) {
            self.disk.present(field)
        } else {
            Err(StoreError::NoSuchField(field.to_string()))
        }
    }

    /// Union across both field stores.
    pub fn present_fields(&self) -> BTreeSet<String> {
        let mut fields = self.memory.present_fields();
        fields.extend(self.disk.present_fields());
        fields
    }

    /// Union across both field stores.
    pub fn absent_fields(&self) -> BTreeSet<String> {
        let mut fields = self.memory.absent_fields();
        fields.extend(self.disk.absent_fields());
        fields
    }

    /// Backing path of a disk field.
    pub fn path_for(&self, field: &str) -> Result<PathBuf> {
        self.disk.path(field)
    }

    /// Present disk fields must still have their backing files.
    pub fn verify_present_files(&self) -> Result<()> {
        self.disk.verify_present_files()
    }

    // --- Children ---

    /// Child types this object may hold, in declaration order.
    pub fn child_types(&self) -> &[TypeName] {
        self.children.child_types()
    }

    /// Registered children without materializing them.
    pub fn child_entries(
        &self,
        type_name: Option<&TypeName>,
    ) -> Result<Vec<(TypeName, QualifiedId)>> {
        self.children.entries(type_name)
    }

    /// Materialize a registered child.
    pub fn get_child(&self, type_name: Option<&TypeName>, id: &str) -> Result<DataObject> {
        let (type_name, qualified) = self.children.get(type_name, id)?;
        self.client.materialize(&type_name, &qualified)
    }

    /// Register a child and write the updated bucket back to the
    /// metadata store.
    pub fn add_child(&self, type_name: Option<&TypeName>, id: &str) -> Result<()> {
        let type_name = self.children.add(type_name, id)?;
        let bucket = self.children.bucket(&type_name)?;
        self.client.docs.update_fields(
            &self.type_name,
            &self.id,
            DocumentUpdate::child_bucket(type_name, bucket),
        )
    }

    /// Materialized children in registration order.
    pub fn iter_children(&self, type_name: Option<&TypeName>) -> Result<ChildIter> {
        let entries = self.children.entries(type_name)?;
        Ok(ChildIter {
            entries: entries.into_iter(),
            client: Arc::clone(&self.client),
        })
    }

    fn write_back_item(&self, field: &str) -> Result<()> {
        let entry = if self.memory.contains(field) {
            self.memory.item_entry(field)?
        } else {
            ItemEntry {
                present: self.disk.present(field)?,
                value: None,
            }
        };
        self.client.docs.update_fields(
            &self.type_name,
            &self.id,
            DocumentUpdate::item(field, entry),
        )
    }
}

/// Iterator over a parent's materialized children.
///
/// Registrations are snapshotted up front; each child document is
/// fetched lazily on `next`.
pub struct ChildIter {
    entries: std::vec::IntoIter<(TypeName, QualifiedId)>,
    client: Arc<ClientInner>,
}

impl Iterator for ChildIter {
    type Item = Result<DataObject>;

    fn next(&mut self) -> Option<Self::Item> {
        let (type_name, qualified) = self.entries.next()?;
        Some(self.client.materialize(&type_name, &qualified))
    }
}
