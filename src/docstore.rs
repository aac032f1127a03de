//! Document-store collaborators.
//!
//! The client only needs per-type collections with get-by-id,
//! iterate-all, insert, and partial update. Documents cross this
//! boundary as the explicit [`Document`] struct; the serialized
//! representation is an implementation detail.

use crate::error::{Result, StoreError};
use crate::types::{ChildBucket, Document, ItemEntry, QualifiedId, TypeName};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for collection files.
const COLLECTION_MAGIC: &[u8; 4] = b"MDC\0";

/// Current collection format version.
const COLLECTION_VERSION: u8 = 1;

/// Extension of persisted collection files.
const COLLECTION_EXT: &str = "docs";

/// Partial update applied by [`DocumentStore::update_fields`].
#[derive(Clone, Debug, Default)]
pub struct DocumentUpdate {
    /// Replacement item entries, by field name.
    pub items: BTreeMap<String, ItemEntry>,

    /// Replacement child buckets, by child type.
    pub children: BTreeMap<TypeName, ChildBucket>,
}

impl DocumentUpdate {
    pub fn item(field: impl Into<String>, entry: ItemEntry) -> Self {
        let mut update = Self::default();
        update.items.insert(field.into(), entry);
        update
    }

    pub fn child_bucket(type_name: TypeName, bucket: ChildBucket) -> Self {
        let mut update = Self::default();
        update.children.insert(type_name, bucket);
        update
    }

    fn apply(self, doc: &mut Document) {
        for (field, entry) in self.items {
            doc.items.insert(field, entry);
        }
        for (type_name, bucket) in self.children {
            doc.children.insert(type_name, bucket);
        }
    }
}

/// Per-type document collections.
pub trait DocumentStore: Send + Sync {
    /// Fetch a document by id from a type's collection.
    fn find_by_id(&self, type_name: &TypeName, id: &QualifiedId) -> Result<Option<Document>>;

    /// All documents of a type, in insertion order.
    fn find_all(&self, type_name: &TypeName) -> Result<Vec<Document>>;

    /// Insert a new document; a duplicate id fails.
    fn insert(&self, type_name: &TypeName, doc: Document) -> Result<()>;

    /// Replace named parts of an existing document.
    fn update_fields(
        &self,
        type_name: &TypeName,
        id: &QualifiedId,
        update: DocumentUpdate,
    ) -> Result<()>;

    /// Remove a single document.
    fn remove(&self, type_name: &TypeName, id: &QualifiedId) -> Result<()>;

    /// Drop every collection.
    fn drop_all(&self) -> Result<()>;

    /// Document counts per type.
    fn counts(&self) -> Result<BTreeMap<TypeName, u64>>;
}

#[derive(Default)]
struct Collection {
    /// Insertion order.
    order: Vec<QualifiedId>,
    docs: HashMap<QualifiedId, Document>,
}

impl Collection {
    fn from_docs(docs: Vec<Document>) -> Self {
        let mut collection = Collection::default();
        for doc in docs {
            if collection.docs.insert(doc.id.clone(), doc.clone()).is_none() {
                collection.order.push(doc.id.clone());
            }
        }
        collection
    }

    fn to_docs(&self) -> Vec<Document> {
        self.order
            .iter()
            .map(|id| self.docs[id].clone())
            .collect()
    }

    fn insert(&mut self, type_name: &TypeName, doc: Document) -> Result<()> {
        if self.docs.contains_key(&doc.id) {
            return Err(StoreError::ObjectExists {
                type_name: type_name.to_string(),
                id: doc.id.to_string(),
            });
        }
        self.order.push(doc.id.clone());
        self.docs.insert(doc.id.clone(), doc);
        Ok(())
    }

    fn update(
        &mut self,
        type_name: &TypeName,
        id: &QualifiedId,
        update: DocumentUpdate,
    ) -> Result<()> {
        let doc = self.docs.get_mut(id).ok_or_else(|| StoreError::NotFound {
            type_name: type_name.to_string(),
            id: id.to_string(),
        })?;
        update.apply(doc);
        Ok(())
    }

    fn remove(&mut self, type_name: &TypeName, id: &QualifiedId) -> Result<()> {
        if self.docs.remove(id).is_none() {
            return Err(StoreError::NotFound {
                type_name: type_name.to_string(),
                id: id.to_string(),
            });
        }
        self.order.retain(|existing| existing != id);
        Ok(())
    }
}

/// Volatile document store; used by unit tests and embeddings that
/// bring their own persistence.
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<BTreeMap<TypeName, Collection>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn find_by_id(&self, type_name: &TypeName, id: &QualifiedId) -> Result<Option<Document>> {
        Ok(self
            .collections
            .read()
            .get(type_name)
            .and_then(|c| c.docs.get(id))
            .cloned())
    }

    fn find_all(&self, type_name: &TypeName) -> Result<Vec<Document>> {
        Ok(self
            .collections
            .read()
            .get(type_name)
            .map(|c| c.to_docs())
            .unwrap_or_default())
    }

    fn insert(&self, type_name: &TypeName, doc: Document) -> Result<()> {
        self.collections
            .write()
            .entry(type_name.clone())
            .or_default()
            .insert(type_name, doc)
    }

    fn update_fields(
        &self,
        type_name: &TypeName,
        id: &QualifiedId,
        update: DocumentUpdate,
    ) -> Result<()> {
        let mut collections = self.collections.write();
        let collection = collections
            .get_mut(type_name)
            .ok_or_else(|| StoreError::NotFound {
                type_name: type_name.to_string(),
                id: id.to_string(),
            })?;
        collection.update(type_name, id, update)
    }

    fn remove(&self, type_name: &TypeName, id: &QualifiedId) -> Result<()> {
        let mut collections = self.collections.write();
        let collection = collections
            .get_mut(type_name)
            .ok_or_else(|| StoreError::NotFound {
                type_name: type_name.to_string(),
                id: id.to_string(),
            })?;
        collection.remove(type_name, id)
    }

    fn drop_all(&self) -> Result<()> {
        self.collections.write().clear();
        Ok(())
    }

    fn counts(&self) -> Result<BTreeMap<TypeName, u64>> {
        Ok(self
            .collections
            .read()
            .iter()
            .map(|(t, c)| (t.clone(), c.order.len() as u64))
            .collect())
    }
}

/// File-backed document store. Collections live in memory and every
/// mutation is persisted synchronously to `<dir>/<Type>.docs`.
pub struct FileDocumentStore {
    dir: PathBuf,
    collections: RwLock<BTreeMap<TypeName, Collection>>,
}

impl FileDocumentStore {
    /// Open the store directory, loading any persisted collections.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut collections = BTreeMap::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(COLLECTION_EXT) {
                continue;
            }
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| {
                    StoreError::InvalidFormat(format!("bad collection file: {}", path.display()))
                })?;
            let type_name = TypeName::new(stem)?;
            let docs = Self::read_collection(&path)?;
            collections.insert(type_name, Collection::from_docs(docs));
        }

        Ok(Self {
            dir,
            collections: RwLock::new(collections),
        })
    }

    /// Bytes used by the persisted collection files.
    pub fn size_bytes(&self) -> Result<u64> {
        let mut total = 0u64;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.path().extension().and_then(|e| e.to_str()) == Some(COLLECTION_EXT) {
                total += entry.metadata()?.len();
            }
        }
        Ok(total)
    }

    fn collection_path(&self, type_name: &TypeName) -> PathBuf {
        self.dir
            .join(format!("{}.{}", type_name.as_str(), COLLECTION_EXT))
    }

    fn write_collection(&self, type_name: &TypeName, collection: &Collection) -> Result<()> {
        let blob = rmp_serde::to_vec(&collection.to_docs())?;

        let mut file = File::create(self.collection_path(type_name))?;
        file.write_all(COLLECTION_MAGIC)?;
        file.write_all(&[COLLECTION_VERSION])?;
        file.write_all(&(blob.len() as u64).to_le_bytes())?;
        file.write_all(&blob)?;
        file.write_all(&crc32fast::hash(&blob).to_le_bytes())?;
        file.sync_all()?;

        Ok(())
    }

    fn read_collection(path: &Path) -> Result<Vec<Document>> {
        let mut file = File::open(path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != COLLECTION_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid collection magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != COLLECTION_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported collection version: {}",
                version[0]
            )));
        }

        let mut len_bytes = [0u8; 8];
        file.read_exact(&mut len_bytes)?;
        let len = u64::from_le_bytes(len_bytes) as usize;

        let mut blob = vec![0u8; len];
        file.read_exact(&mut blob)?;

        let mut checksum_bytes = [0u8; 4];
        file.read_exact(&mut checksum_bytes)?;
        let stored = u32::from_le_bytes(checksum_bytes);
        let computed = crc32fast::hash(&blob);
        if stored != computed {
            return Err(StoreError::ChecksumMismatch {
                expected: stored,
                got: computed,
            });
        }

        Ok(rmp_serde::from_slice(&blob)?)
    }
}

impl DocumentStore for FileDocumentStore {
    fn find_by_id(&self, type_name: &TypeName, id: &QualifiedId) -> Result<Option<Document>> {
        Ok(self
            .collections
            .read()
            .get(type_name)
            .and_then(|c| c.docs.get(id))
            .cloned())
    }

    fn find_all(&self, type_name: &TypeName) -> Result<Vec<Document>> {
        Ok(self
            .collections
            .read()
            .get(type_name)
            .map(|c| c.to_docs())
            .unwrap_or_default())
    }

    fn insert(&self, type_name: &TypeName, doc: Document) -> Result<()> {
        let mut collections = self.collections.write();
        let collection = collections.entry(type_name.clone()).or_default();
        collection.insert(type_name, doc)?;
        self.write_collection(type_name, collection)
    }

    fn update_fields(
        &self,
        type_name: &TypeName,
        id: &QualifiedId,
        update: DocumentUpdate,
    ) -> Result<()> {
        let mut collections = self.collections.write();
        let collection = collections
            .get_mut(type_name)
            .ok_or_else(|| StoreError::NotFound {
                type_name: type_name.to_string(),
                id: id.to_string(),
            })?;
        collection.update(type_name, id, update)?;
        self.write_collection(type_name, collection)
    }

    fn remove(&self, type_name: &TypeName, id: &QualifiedId) -> Result<()> {
        let mut collections = self.collections.write();
        let collection = collections
            .get_mut(type_name)
            .ok_or_else(|| StoreError::NotFound {
                type_name: type_name.to_string(),
                id: id.to_string(),
            })?;
        collection.remove(type_name, id)?;
        self.write_collection(type_name, collection)
    }

    fn drop_all(&self) -> Result<()> {
        let mut collections = self.collections.write();
        for type_name in collections.keys() {
            let path = self.collection_path(type_name);
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        collections.clear();
        Ok(())
    }

    fn counts(&self) -> Result<BTreeMap<TypeName, u64>> {
        Ok(self
            .collections
            .read()
            .iter()
            .map(|(t, c)| (t.clone(), c.order.len() as u64))
            .collect())
    }
}
