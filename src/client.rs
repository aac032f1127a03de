//! Client orchestrating schema, document store, and filesystem.

use crate::docstore::{DocumentStore, FileDocumentStore};
use crate::error::{Result, StoreError};
use crate::fsops;
use crate::object::DataObject;
use crate::schema::{FieldMode, ObjectSpec, SchemaRegistry};
use crate::types::{
    Document, InsertValue, ItemEntry, LocalId, QualifiedId, StoreStats, TransferMethod, TypeName,
};
use fs2::FileExt;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Well-known name of the persisted schema under the data root.
const SCHEMA_FILE: &str = ".schema";

/// Directory holding the persisted collections.
const COLLECTIONS_DIR: &str = ".collections";

/// Scratch directory for staged inserts.
const STAGING_DIR: &str = ".staging";

/// Client configuration.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Data root holding the schema, collections, and payload tree.
    pub root: PathBuf,

    /// Whether to create the root if it doesn't exist.
    pub create_if_missing: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data"),
            create_if_missing: true,
        }
    }
}

pub(crate) struct ClientInner {
    pub(crate) root: PathBuf,
    pub(crate) schema: SchemaRegistry,
    pub(crate) docs: Box<dyn DocumentStore>,
}

impl ClientInner {
    /// Fetch a document and wrap it.
    pub(crate) fn materialize(
        self: &Arc<Self>,
        type_name: &TypeName,
        id: &QualifiedId,
    ) -> Result<DataObject> {
        let spec = self.schema.object(type_name)?;
        let doc = self
            .docs
            .find_by_id(type_name, id)?
            .ok_or_else(|| StoreError::NotFound {
                type_name: type_name.to_string(),
                id: id.to_string(),
            })?;
        Ok(DataObject::from_document(
            type_name.clone(),
            spec,
            doc,
            Arc::clone(self),
        ))
    }
}

/// The main store client.
///
/// Holds the validated schema, the document-store collaborator, and
/// exclusive ownership of the data root for this process.
pub struct ObjectClient {
    inner: Arc<ClientInner>,
    _lock_file: File,
}

impl ObjectClient {
    /// Open a store rooted at `config.root`, with the file-backed
    /// document store under `<root>/.collections`.
    ///
    /// A supplied schema is persisted to `<root>/.schema`; with `None`
    /// the persisted one is reloaded (disk fields then need their
    /// strategies re-attached before use).
    pub fn open(config: ClientConfig, schema: Option<SchemaRegistry>) -> Result<Self> {
        Self::prepare_root(&config)?;
        let docs = FileDocumentStore::open(config.root.join(COLLECTIONS_DIR))?;
        Self::open_inner(config, schema, Box::new(docs))
    }

    /// Open with an externally supplied document store.
    pub fn open_with_store(
        config: ClientConfig,
        schema: Option<SchemaRegistry>,
        docs: Box<dyn DocumentStore>,
    ) -> Result<Self> {
        Self::prepare_root(&config)?;
        Self::open_inner(config, schema, docs)
    }

    fn prepare_root(config: &ClientConfig) -> Result<()> {
        if !config.root.exists() {
            if !config.create_if_missing {
                return Err(StoreError::NotInitialized);
            }
            fsops::make_dir(&config.root)?;
        }
        Ok(())
    }

    fn open_inner(
        config: ClientConfig,
        schema: Option<SchemaRegistry>,
        docs: Box<dyn DocumentStore>,
    ) -> Result<Self> {
        let lock_file = Self::acquire_lock(&config.root)?;

        let schema_path = config.root.join(SCHEMA_FILE);
        let schema = match schema {
            Some(schema) => {
                schema.save_to(&schema_path)?;
                schema
            }
            None => {
                if !schema_path.exists() {
                    return Err(StoreError::Schema(
                        "no schema supplied and none persisted at the data root".into(),
                    ));
                }
                SchemaRegistry::load_from(&schema_path)?
            }
        };

        // One top-level payload directory per root type.
        for type_name in schema.root_types() {
            fsops::make_dir(&config.root.join(type_name.as_str()))?;
        }

        info!(root = %config.root.display(), "object store opened");

        Ok(Self {
            inner: Arc::new(ClientInner {
                root: config.root,
                schema,
                docs,
            }),
            _lock_file: lock_file,
        })
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.inner.schema
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    // --- Insert ---

    /// Create a new object: validate, stage its directory, persist the
    /// metadata document, link the parent, and return the wrapper.
    ///
    /// A failure before the document lands leaves nothing behind; the
    /// object directory is staged aside and renamed into place only
    /// once every payload has been materialized.
    pub fn insert(
        &self,
        type_name: &TypeName,
        id: &str,
        values: BTreeMap<String, InsertValue>,
        parent: Option<&DataObject>,
        method: TransferMethod,
    ) -> Result<DataObject> {
        let spec = self.inner.schema.object(type_name)?;
        let local = LocalId::new(id)?;

        // Nesting legality.
        match parent {
            Some(parent) => {
                let declared = self.inner.schema.contains(parent.type_name())?;
                if !declared.contains(type_name) {
                    return Err(StoreError::InvalidChildType(type_name.to_string()));
                }
            }
            None => {
                if !self.inner.schema.root_types().contains(type_name) {
                    return Err(StoreError::InvalidOperation(format!(
                        "{} is not a root type; supply its parent",
                        type_name
                    )));
                }
            }
        }

        let qualified = match parent {
            Some(parent) => parent.id().child(&local),
            None => QualifiedId::root(&local),
        };

        if self.inner.docs.find_by_id(type_name, &qualified)?.is_some() {
            return Err(StoreError::ObjectExists {
                type_name: type_name.to_string(),
                id: qualified.to_string(),
            });
        }

        // Partition supplied values per schema; disk sources must exist.
        let mut inline: BTreeMap<String, serde_json::Value> = BTreeMap::new();
        let mut payloads: Vec<(PathBuf, String)> = Vec::new();
        let mut supplied_disk: Vec<String> = Vec::new();
        for (field, value) in values {
            let field_spec = spec
                .fields
                .get(&field)
                .ok_or_else(|| StoreError::NoSuchField(field.clone()))?;
            match (field_spec.mode, value) {
                (FieldMode::Memory, InsertValue::Inline(v)) => {
                    inline.insert(field, v);
                }
                (FieldMode::Disk, InsertValue::Source(src)) => {
                    if !fsops::exists(&src) {
                        return Err(StoreError::SourceNotFound(src));
                    }
                    let filename = field_spec
                        .filename
                        .clone()
                        .unwrap_or_else(|| field.clone());
                    payloads.push((src, filename));
                    supplied_disk.push(field);
                }
                (FieldMode::Memory, InsertValue::Source(_)) => {
                    return Err(StoreError::InvalidOperation(format!(
                        "memory-mode field {} takes an inline value, not a source path",
                        field
                    )));
                }
                (FieldMode::Disk, InsertValue::Inline(_)) => {
                    return Err(StoreError::InvalidOperation(format!(
                        "disk-mode field {} takes a source path, not an inline value",
                        field
                    )));
                }
            }
        }

        let final_root = match parent {
            Some(parent) => parent
                .root()
                .join(type_name.as_str())
                .join(local.as_str()),
            None => self
                .inner
                .root
                .join(type_name.as_str())
                .join(local.as_str()),
        };
        if fsops::exists(&final_root) {
            return Err(StoreError::ObjectExists {
                type_name: type_name.to_string(),
                id: qualified.to_string(),
            });
        }

        // Stage, then commit with a single rename.
        let staging = self
            .inner
            .root
            .join(STAGING_DIR)
            .join(qualified.as_str().replace('/', "__"));
        if let Err(e) = Self::stage(&staging, spec, &payloads, method) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }
        if let Some(dir) = final_root.parent() {
            fsops::make_dir(dir)?;
        }
        if let Err(e) = fs::rename(&staging, &final_root) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e.into());
        }

        // Metadata document: every declared field gets a presence entry.
        let mut items = BTreeMap::new();
        for (field, field_spec) in &spec.fields {
            let entry = match field_spec.mode {
                FieldMode::Memory => ItemEntry {
                    present: inline.contains_key(field),
                    value: inline.get(field).cloned(),
                },
                FieldMode::Disk => ItemEntry {
                    present: supplied_disk.contains(field),
                    value: None,
                },
            };
            items.insert(field.clone(), entry);
        }
        let children = spec
            .contains
            .iter()
            .map(|t| (t.clone(), Vec::new()))
            .collect();
        let doc = Document {
            id: qualified.clone(),
            root: final_root.clone(),
            items,
            children,
        };

        if let Err(e) = self.inner.docs.insert(type_name, doc.clone()) {
            let _ = fs::remove_dir_all(&final_root);
            return Err(e);
        }

        // Link into the parent's child index.
        if let Some(parent) = parent {
            if let Err(e) = parent.add_child(Some(type_name), qualified.as_str()) {
                let _ = self.inner.docs.remove(type_name, &qualified);
                let _ = fs::remove_dir_all(&final_root);
                return Err(e);
            }
        }

        debug!(%type_name, id = %qualified, "object inserted");

        Ok(DataObject::from_document(
            type_name.clone(),
            spec,
            doc,
            Arc::clone(&self.inner),
        ))
    }

    fn stage(
        staging: &Path,
        spec: &ObjectSpec,
        payloads: &[(PathBuf, String)],
        method: TransferMethod,
    ) -> Result<()> {
        fsops::make_dir(staging)?;
        for child_type in &spec.contains {
            fsops::make_dir(&staging.join(child_type.as_str()))?;
        }
        for (src, filename) in payloads {
            fsops::transfer(src, &staging.join(filename), method)?;
        }
        Ok(())
    }

    // --- Retrieval ---

    /// Fetch an existing object by type and (bare or qualified) id.
    pub fn get(&self, type_name: &TypeName, id: &str) -> Result<DataObject> {
        let qualified = QualifiedId::parse(id)?;
        self.inner.materialize(type_name, &qualified)
    }

    /// All objects of a type, in insertion order. Each call re-issues
    /// the underlying query.
    pub fn iterate(&self, type_name: &TypeName) -> Result<ObjectIter> {
        let spec = self.inner.schema.object(type_name)?.clone();
        let docs = self.inner.docs.find_all(type_name)?;
        Ok(ObjectIter {
            type_name: type_name.clone(),
            spec,
            docs: docs.into_iter(),
            client: Arc::clone(&self.inner),
        })
    }

    /// Depth-first traversal of every object reachable from the root
    /// types.
    pub fn iterate_all(&self) -> Result<DeepIter> {
        let mut stack = Vec::new();
        for type_name in self.inner.schema.root_types().iter().rev() {
            let mut objects: Vec<DataObject> = self.iterate(type_name)?.collect();
            objects.reverse();
            stack.extend(objects);
        }
        Ok(DeepIter {
            stack,
            client: Arc::clone(&self.inner),
        })
    }

    // --- Maintenance ---

    /// Object counts per type plus persisted-collection size.
    pub fn stats(&self) -> Result<StoreStats> {
        let mut collection_size_bytes = 0u64;
        let collections = self.inner.root.join(COLLECTIONS_DIR);
        if collections.exists() {
            for entry in fs::read_dir(&collections)? {
                collection_size_bytes += entry?.metadata()?.len();
            }
        }
        Ok(StoreStats {
            objects: self.inner.docs.counts()?,
            collection_size_bytes,
        })
    }

    /// Drop every document and payload directory. Test/reset flows
    /// only.
    pub fn clear(&self) -> Result<()> {
        warn!(root = %self.inner.root.display(), "clearing object store");
        self.inner.docs.drop_all()?;
        for type_name in self.inner.schema.root_types() {
            let dir = self.inner.root.join(type_name.as_str());
            if dir.exists() {
                fs::remove_dir_all(&dir)?;
            }
            fsops::make_dir(&dir)?;
        }
        let staging = self.inner.root.join(STAGING_DIR);
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        Ok(())
    }

    fn acquire_lock(root: &Path) -> Result<File> {
        let lock_path = root.join("LOCK");
        let lock_file = File::create(lock_path)?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked)?;

        Ok(lock_file)
    }
}

/// Iterator over all objects of one type.
pub struct ObjectIter {
    type_name: TypeName,
    spec: ObjectSpec,
    docs: std::vec::IntoIter<Document>,
    client: Arc<ClientInner>,
}

impl Iterator for ObjectIter {
    type Item = DataObject;

    fn next(&mut self) -> Option<Self::Item> {
        let doc = self.docs.next()?;
        Some(DataObject::from_document(
            self.type_name.clone(),
            &self.spec,
            doc,
            Arc::clone(&self.client),
        ))
    }
}

/// Depth-first iterator over the whole containment tree.
pub struct DeepIter {
    stack: Vec<DataObject>,
    client: Arc<ClientInner>,
}

impl Iterator for DeepIter {
    type Item = Result<DataObject>;

    fn next(&mut self) -> Option<Self::Item> {
        let object = self.stack.pop()?;
        for type_name in object.child_types().to_vec().iter().rev() {
            let entries = match object.child_entries(Some(type_name)) {
                Ok(entries) => entries,
                Err(e) => return Some(Err(e)),
            };
            for (child_type, qualified) in entries.iter().rev() {
                match self.client.materialize(child_type, qualified) {
                    Ok(child) => self.stack.push(child),
                    Err(e) => return Some(Err(e)),
                }
            }
        }
        Some(Ok(object))
    }
}
