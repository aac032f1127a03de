//! Core value types for the object store.

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Separator joining ancestor ids into a qualified id.
///
/// Reserved: a bare local id must not contain it, and an id that does
/// is treated as already qualified.
pub const ID_SEPARATOR: char = '/';

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        _ => false,
    }
}

/// Name of a declared object type (e.g. "Video", "Frame").
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeName(String);

impl TypeName {
    /// Validates an object-type identifier.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if !is_identifier(&name) {
            return Err(StoreError::Schema(format!(
                "invalid object type name: {:?}",
                name
            )));
        }
        Ok(TypeName(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeName({})", self.0)
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Locally-scoped object identifier, unique within its parent's bucket.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(String);

impl LocalId {
    /// Validates a bare id: non-empty and free of the separator.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(StoreError::InvalidId("empty id".into()));
        }
        if id.contains(ID_SEPARATOR) {
            return Err(StoreError::InvalidId(format!(
                "bare id must not contain {:?}: {}",
                ID_SEPARATOR, id
            )));
        }
        Ok(LocalId(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocalId({})", self.0)
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Globally-qualified identifier: ancestor ids joined by the separator,
/// unique within the whole store.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QualifiedId(String);

impl QualifiedId {
    /// A root object's qualified id is its bare id.
    pub fn root(id: &LocalId) -> Self {
        QualifiedId(id.as_str().to_string())
    }

    /// Accepts either a bare id or a separator-joined qualified id.
    /// Empty segments are rejected.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() || raw.split(ID_SEPARATOR).any(|seg| seg.is_empty()) {
            return Err(StoreError::InvalidId(format!("malformed id: {:?}", raw)));
        }
        Ok(QualifiedId(raw.to_string()))
    }

    /// Qualified id of a direct child.
    pub fn child(&self, local: &LocalId) -> Self {
        QualifiedId(format!("{}{}{}", self.0, ID_SEPARATOR, local.as_str()))
    }

    /// The unqualified suffix after the last separator.
    pub fn local_part(&self) -> LocalId {
        let suffix = self.0.rsplit(ID_SEPARATOR).next().unwrap_or(&self.0);
        LocalId(suffix.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for QualifiedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QualifiedId({})", self.0)
    }
}

impl fmt::Display for QualifiedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A field's runtime value, crossing both storage modes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Structured value held inline in the metadata document.
    Json(serde_json::Value),
    /// Opaque payload produced by a disk codec.
    Bytes(Vec<u8>),
}

impl FieldValue {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            FieldValue::Json(v) => Some(v),
            FieldValue::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            FieldValue::Bytes(b) => Some(b),
            FieldValue::Json(_) => None,
        }
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(v: serde_json::Value) -> Self {
        FieldValue::Json(v)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(b: Vec<u8>) -> Self {
        FieldValue::Bytes(b)
    }
}

/// Presence flag plus the inline value for memory-mode fields.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemEntry {
    pub present: bool,

    /// Set only for memory-mode fields; disk payloads never appear here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

/// Local -> qualified registrations for one child type, in registration
/// order.
pub type ChildBucket = Vec<(LocalId, QualifiedId)>;

/// Per-instance metadata record held in the fast-access store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique within the type's collection.
    pub id: QualifiedId,

    /// Absolute directory holding the instance's disk payloads.
    pub root: PathBuf,

    /// Field name -> presence flag (+ inline value for memory fields).
    pub items: BTreeMap<String, ItemEntry>,

    /// Child type -> registered children.
    pub children: BTreeMap<TypeName, ChildBucket>,
}

/// How insert materializes a disk payload into the object directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferMethod {
    Copy,
    Move,
}

/// A field value supplied to `insert`.
#[derive(Clone, Debug)]
pub enum InsertValue {
    /// Inline JSON for a memory-mode field.
    Inline(serde_json::Value),
    /// Source path of a disk-mode field's payload.
    Source(PathBuf),
}

/// Store statistics.
#[derive(Clone, Debug, Default)]
pub struct StoreStats {
    /// Object counts per declared type.
    pub objects: BTreeMap<TypeName, u64>,
    /// Bytes used by the persisted collections.
    pub collection_size_bytes: u64,
}

impl StoreStats {
    pub fn total_objects(&self) -> u64 {
        self.objects.values().sum()
    }
}
