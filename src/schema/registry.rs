//! Schema parsing, validation, and persistence.

use crate::error::{Result, StoreError};
use crate::schema::codec::{LoadStrategy, SaveStrategy};
use crate::types::{TypeName, ID_SEPARATOR};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

/// Magic bytes for persisted schema files.
const SCHEMA_MAGIC: &[u8; 4] = b"MSC\0";

/// Current schema format version.
const SCHEMA_VERSION: u8 = 1;

/// Storage mode of a field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldMode {
    #[default]
    Memory,
    Disk,
}

impl fmt::Display for FieldMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldMode::Memory => write!(f, "memory"),
            FieldMode::Disk => write!(f, "disk"),
        }
    }
}

/// A not-yet-validated field declaration.
#[derive(Clone, Default)]
pub struct RawFieldSpec {
    pub mode: FieldMode,
    pub filename: Option<String>,
    pub load: Option<Arc<dyn LoadStrategy>>,
    pub save: Option<Arc<dyn SaveStrategy>>,
}

impl RawFieldSpec {
    /// A memory-mode field.
    pub fn memory() -> Self {
        Self::default()
    }

    /// A disk-mode field with the mandatory load strategy.
    pub fn disk(load: Arc<dyn LoadStrategy>) -> Self {
        Self {
            mode: FieldMode::Disk,
            filename: None,
            load: Some(load),
            save: None,
        }
    }

    pub fn with_save(mut self, save: Arc<dyn SaveStrategy>) -> Self {
        self.save = Some(save);
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

/// A not-yet-validated object-type declaration.
#[derive(Clone, Default)]
pub struct RawObjectSpec {
    pub fields: BTreeMap<String, RawFieldSpec>,
    pub contains: Vec<String>,
}

impl RawObjectSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, spec: RawFieldSpec) -> Self {
        self.fields.insert(name.into(), spec);
        self
    }

    pub fn contains(mut self, child: impl Into<String>) -> Self {
        self.contains.push(child.into());
        self
    }
}

/// A not-yet-validated schema declaration.
#[derive(Clone, Default)]
pub struct RawSchema {
    pub objects: BTreeMap<String, RawObjectSpec>,
}

impl RawSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object(mut self, name: impl Into<String>, spec: RawObjectSpec) -> Self {
        self.objects.insert(name.into(), spec);
        self
    }
}

/// A validated, normalized field descriptor.
#[derive(Clone)]
pub struct FieldSpec {
    pub mode: FieldMode,

    /// Backing file name under the object root. Disk mode only;
    /// defaults to the field name.
    pub filename: Option<String>,

    pub load: Option<Arc<dyn LoadStrategy>>,
    pub save: Option<Arc<dyn SaveStrategy>>,
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("mode", &self.mode)
            .field("filename", &self.filename)
            .field("load", &self.load.is_some())
            .field("save", &self.save.is_some())
            .finish()
    }
}

impl FieldSpec {
    /// Disk fields without a save strategy reject writes.
    pub fn is_read_only(&self) -> bool {
        self.mode == FieldMode::Disk && self.save.is_none()
    }
}

/// A validated object-type descriptor.
#[derive(Clone, Debug, Default)]
pub struct ObjectSpec {
    pub fields: BTreeMap<String, FieldSpec>,

    /// Child types this type may hold, in declaration order.
    pub contains: Vec<TypeName>,
}

/// Validated registry of object types; the single source of truth for
/// every other component.
#[derive(Clone, Debug, Default)]
pub struct SchemaRegistry {
    objects: BTreeMap<TypeName, ObjectSpec>,
}

/// Structural projection persisted to disk. Load/save strategies are
/// not portable across processes and are re-attached by the caller.
#[derive(Serialize, Deserialize)]
struct PersistedField {
    mode: FieldMode,
    filename: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct PersistedObject {
    fields: BTreeMap<String, PersistedField>,
    contains: Vec<TypeName>,
}

#[derive(Serialize, Deserialize)]
struct PersistedSchema {
    objects: BTreeMap<TypeName, PersistedObject>,
}

impl SchemaRegistry {
    /// Validate and normalize a raw schema declaration.
    pub fn parse(raw: RawSchema) -> Result<Self> {
        // Collect names first so `contains` may reference any declared type.
        let mut declared = BTreeSet::new();
        for name in raw.objects.keys() {
            declared.insert(TypeName::new(name.clone())?);
        }

        let mut objects = BTreeMap::new();
        for (name, spec) in raw.objects {
            let type_name = TypeName::new(name)?;
            let spec = Self::parse_object(&type_name, spec, &declared)?;
            objects.insert(type_name, spec);
        }

        Ok(SchemaRegistry { objects })
    }

    fn parse_object(
        type_name: &TypeName,
        raw: RawObjectSpec,
        declared: &BTreeSet<TypeName>,
    ) -> Result<ObjectSpec> {
        let mut fields = BTreeMap::new();
        for (field_name, raw_field) in raw.fields {
            let spec = Self::parse_field(type_name, &field_name, raw_field)?;
            fields.insert(field_name, spec);
        }

        let mut contains = Vec::new();
        for child in raw.contains {
            let child = TypeName::new(child)?;
            if !declared.contains(&child) {
                return Err(StoreError::Schema(format!(
                    "{} contains undeclared type {}",
                    type_name, child
                )));
            }
            if contains.contains(&child) {
                return Err(StoreError::Schema(format!(
                    "{} lists child type {} twice",
                    type_name, child
                )));
            }
            contains.push(child);
        }

        Ok(ObjectSpec { fields, contains })
    }

    fn parse_field(
        type_name: &TypeName,
        field_name: &str,
        raw: RawFieldSpec,
    ) -> Result<FieldSpec> {
        let context = || format!("{}.{}", type_name, field_name);

        if field_name.is_empty() || field_name.contains(ID_SEPARATOR) {
            return Err(StoreError::Schema(format!(
                "invalid field name: {:?}",
                field_name
            )));
        }

        match raw.mode {
            FieldMode::Memory => {
                if raw.filename.is_some() {
                    return Err(StoreError::Schema(format!(
                        "{}: memory-mode fields do not take a filename",
                        context()
                    )));
                }
                if raw.load.is_some() || raw.save.is_some() {
                    return Err(StoreError::Schema(format!(
                        "{}: memory-mode fields do not take load/save strategies",
                        context()
                    )));
                }
                Ok(FieldSpec {
                    mode: FieldMode::Memory,
                    filename: None,
                    load: None,
                    save: None,
                })
            }
            FieldMode::Disk => {
                if raw.load.is_none() {
                    return Err(StoreError::Schema(format!(
                        "{}: disk-mode fields require a load strategy",
                        context()
                    )));
                }
                let filename = raw.filename.unwrap_or_else(|| field_name.to_string());
                if filename.is_empty() || filename.contains(ID_SEPARATOR) || filename.contains('\\')
                {
                    return Err(StoreError::Schema(format!(
                        "{}: invalid backing filename: {:?}",
                        context(),
                        filename
                    )));
                }
                Ok(FieldSpec {
                    mode: FieldMode::Disk,
                    filename: Some(filename),
                    load: raw.load,
                    save: raw.save,
                })
            }
        }
    }

    // --- Incremental Mutation ---

    /// Validate and register a new object type.
    pub fn add_object_type(&mut self, name: &str, spec: RawObjectSpec) -> Result<()> {
        let type_name = TypeName::new(name)?;
        if self.objects.contains_key(&type_name) {
            return Err(StoreError::Schema(format!(
                "object type already declared: {}",
                type_name
            )));
        }

        let mut declared: BTreeSet<TypeName> = self.objects.keys().cloned().collect();
        declared.insert(type_name.clone());
        let spec = Self::parse_object(&type_name, spec, &declared)?;
        self.objects.insert(type_name, spec);
        Ok(())
    }

    /// Validate and add a field to an existing object type.
    pub fn add_field(
        &mut self,
        type_name: &TypeName,
        field_name: &str,
        spec: RawFieldSpec,
    ) -> Result<()> {
        let spec = Self::parse_field(type_name, field_name, spec)?;
        let object = self.objects.get_mut(type_name).ok_or_else(|| {
            StoreError::Schema(format!("no such object type: {}", type_name))
        })?;
        if object.fields.contains_key(field_name) {
            return Err(StoreError::Schema(format!(
                "{}.{} already declared",
                type_name, field_name
            )));
        }
        object.fields.insert(field_name.to_string(), spec);
        Ok(())
    }

    // --- Introspection ---

    pub fn object_types(&self) -> impl Iterator<Item = &TypeName> {
        self.objects.keys()
    }

    pub fn object(&self, type_name: &TypeName) -> Result<&ObjectSpec> {
        self.objects.get(type_name).ok_or_else(|| {
            StoreError::Schema(format!("no such object type: {}", type_name))
        })
    }

    pub fn field(&self, type_name: &TypeName, field_name: &str) -> Result<&FieldSpec> {
        self.object(type_name)?
            .fields
            .get(field_name)
            .ok_or_else(|| StoreError::NoSuchField(field_name.to_string()))
    }

    pub fn contains(&self, type_name: &TypeName) -> Result<&[TypeName]> {
        Ok(&self.object(type_name)?.contains)
    }

    /// Types contained by no other type.
    pub fn root_types(&self) -> Vec<TypeName> {
        let contained: BTreeSet<&TypeName> = self
            .objects
            .values()
            .flat_map(|spec| spec.contains.iter())
            .collect();
        self.objects
            .keys()
            .filter(|t| !contained.contains(t))
            .cloned()
            .collect()
    }

    /// The declaring parent of a type; `None` for roots. A type listed
    /// in more than one `contains` has no unique parent.
    pub fn parent_of(&self, type_name: &TypeName) -> Result<Option<TypeName>> {
        self.object(type_name)?;
        let parents: Vec<&TypeName> = self
            .objects
            .iter()
            .filter(|(_, spec)| spec.contains.contains(type_name))
            .map(|(name, _)| name)
            .collect();
        match parents.as_slice() {
            [] => Ok(None),
            [parent] => Ok(Some((*parent).clone())),
            _ => Err(StoreError::Schema(format!(
                "{} is contained by multiple types",
                type_name
            ))),
        }
    }

    // --- Persistence ---

    /// Serialize the structural projection (modes, filenames,
    /// containment). Strategies are dropped; see [`Self::from_blob`].
    pub fn to_blob(&self) -> Result<Vec<u8>> {
        let persisted = PersistedSchema {
            objects: self
                .objects
                .iter()
                .map(|(name, spec)| {
                    let fields = spec
                        .fields
                        .iter()
                        .map(|(field_name, field)| {
                            (
                                field_name.clone(),
                                PersistedField {
                                    mode: field.mode,
                                    filename: field.filename.clone(),
                                },
                            )
                        })
                        .collect();
                    (
                        name.clone(),
                        PersistedObject {
                            fields,
                            contains: spec.contains.clone(),
                        },
                    )
                })
                .collect(),
        };
        Ok(rmp_serde::to_vec(&persisted)?)
    }

    /// Rebuild a registry from a serialized blob. Disk fields come back
    /// without strategies and stay read-only until re-attached with
    /// [`Self::attach_strategies`].
    pub fn from_blob(bytes: &[u8]) -> Result<Self> {
        let persisted: PersistedSchema = rmp_serde::from_slice(bytes)?;

        let declared: BTreeSet<TypeName> = persisted.objects.keys().cloned().collect();
        let mut objects = BTreeMap::new();
        for (name, object) in persisted.objects {
            // Re-validate names; the blob may have been edited by hand.
            TypeName::new(name.as_str())?;
            for child in &object.contains {
                if !declared.contains(child) {
                    return Err(StoreError::Schema(format!(
                        "{} contains undeclared type {}",
                        name, child
                    )));
                }
            }
            let fields = object
                .fields
                .into_iter()
                .map(|(field_name, field)| {
                    (
                        field_name,
                        FieldSpec {
                            mode: field.mode,
                            filename: field.filename,
                            load: None,
                            save: None,
                        },
                    )
                })
                .collect();
            objects.insert(
                name,
                ObjectSpec {
                    fields,
                    contains: object.contains,
                },
            );
        }

        Ok(SchemaRegistry { objects })
    }

    /// Re-attach load/save strategies to a reloaded disk field.
    pub fn attach_strategies(
        &mut self,
        type_name: &TypeName,
        field_name: &str,
        load: Arc<dyn LoadStrategy>,
        save: Option<Arc<dyn SaveStrategy>>,
    ) -> Result<()> {
        let object = self.objects.get_mut(type_name).ok_or_else(|| {
            StoreError::Schema(format!("no such object type: {}", type_name))
        })?;
        let field = object
            .fields
            .get_mut(field_name)
            .ok_or_else(|| StoreError::NoSuchField(field_name.to_string()))?;
        if field.mode != FieldMode::Disk {
            return Err(StoreError::Schema(format!(
                "{}.{} is not a disk-mode field",
                type_name, field_name
            )));
        }
        field.load = Some(load);
        field.save = save;
        Ok(())
    }

    /// Save to a file with magic/version/checksum framing.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let blob = self.to_blob()?;

        let mut file = File::create(path)?;
        file.write_all(SCHEMA_MAGIC)?;
        file.write_all(&[SCHEMA_VERSION])?;
        file.write_all(&(blob.len() as u64).to_le_bytes())?;
        file.write_all(&blob)?;
        file.write_all(&crc32fast::hash(&blob).to_le_bytes())?;
        file.sync_all()?;

        Ok(())
    }

    /// Load a persisted schema, verifying the framing.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != SCHEMA_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid schema magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != SCHEMA_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported schema version: {}",
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

        Self::from_blob(&blob)
    }
}
