//! Child registration and local/qualified id translation.
//!
//! Children are addressed two ways: by a local id, unique only within
//! the parent's bucket for one child type, and by a qualified id, the
//! parent's qualified id joined with the local id. An incoming id that
//! contains the separator is treated as already qualified.

use crate::error::{Result, StoreError};
use crate::types::{ChildBucket, LocalId, QualifiedId, TypeName, ID_SEPARATOR};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

#[derive(Default)]
struct Bucket {
    /// Registration order.
    order: Vec<LocalId>,
    map: HashMap<LocalId, QualifiedId>,
}

/// Per-object registry of child registrations.
pub struct ChildIndex {
    parent: QualifiedId,
    declared: Vec<TypeName>,
    buckets: Mutex<BTreeMap<TypeName, Bucket>>,
}

impl ChildIndex {
    pub(crate) fn new(parent: QualifiedId, declared: &[TypeName]) -> Self {
        let buckets = declared
            .iter()
            .map(|t| (t.clone(), Bucket::default()))
            .collect();
        Self {
            parent,
            declared: declared.to_vec(),
            buckets: Mutex::new(buckets),
        }
    }

    /// Seed the index from a document's children map. Buckets for
    /// undeclared types are dropped.
    pub(crate) fn from_document(
        parent: QualifiedId,
        declared: &[TypeName],
        children: &BTreeMap<TypeName, ChildBucket>,
    ) -> Self {
        let index = Self::new(parent, declared);
        {
            let mut buckets = index.buckets.lock();
            for (type_name, entries) in children {
                let Some(bucket) = buckets.get_mut(type_name) else {
                    continue;
                };
                for (local, qualified) in entries {
                    if bucket.map.insert(local.clone(), qualified.clone()).is_none() {
                        bucket.order.push(local.clone());
                    }
                }
            }
        }
        index
    }

    /// Declared containee types, in declaration order.
    pub fn child_types(&self) -> &[TypeName] {
        &self.declared
    }

    /// Resolve an optional type plus a raw-or-qualified id to a
    /// concrete `(type, qualified id)` pair.
    pub fn resolve(
        &self,
        type_name: Option<&TypeName>,
        id: &str,
    ) -> Result<(TypeName, QualifiedId)> {
        let type_name = self.resolve_type(type_name)?;
        let (_, qualified) = self.split_id(id)?;
        Ok((type_name, qualified))
    }

    /// Registered qualified id for a child.
    pub fn get(&self, type_name: Option<&TypeName>, id: &str) -> Result<(TypeName, QualifiedId)> {
        let type_name = self.resolve_type(type_name)?;
        let (local, _) = self.split_id(id)?;

        let buckets = self.buckets.lock();
        let bucket = buckets.get(&type_name).expect("declared bucket");
        let qualified = bucket.map.get(&local).cloned().ok_or_else(|| {
            StoreError::NoSuchChild(format!("{}{}{}", type_name, ID_SEPARATOR, local))
        })?;
        Ok((type_name, qualified))
    }

    /// Register a local -> qualified mapping. Re-adding the identical
    /// pair is a no-op; a differing qualified id for a registered local
    /// id is a conflict.
    pub fn add(&self, type_name: Option<&TypeName>, id: &str) -> Result<TypeName> {
        let type_name = self.resolve_type(type_name)?;
        let (local, qualified) = self.split_id(id)?;

        let mut buckets = self.buckets.lock();
        let bucket = buckets.get_mut(&type_name).expect("declared bucket");
        match bucket.map.get(&local) {
            Some(existing) if *existing == qualified => Ok(type_name),
            Some(existing) => Err(StoreError::ChildConflict {
                local: local.to_string(),
                existing: existing.to_string(),
            }),
            None => {
                bucket.order.push(local.clone());
                bucket.map.insert(local, qualified);
                Ok(type_name)
            }
        }
    }

    /// Snapshot of registrations in registration order. A fresh,
    /// restartable sequence per call; same disambiguation rules as
    /// [`Self::resolve`].
    pub fn entries(&self, type_name: Option<&TypeName>) -> Result<Vec<(TypeName, QualifiedId)>> {
        let type_name = self.resolve_type(type_name)?;
        let buckets = self.buckets.lock();
        let bucket = buckets.get(&type_name).expect("declared bucket");
        Ok(bucket
            .order
            .iter()
            .map(|local| (type_name.clone(), bucket.map[local].clone()))
            .collect())
    }

    /// Current bucket contents for one child type, for document
    /// write-back.
    pub(crate) fn bucket(&self, type_name: &TypeName) -> Result<ChildBucket> {
        let buckets = self.buckets.lock();
        let bucket = buckets
            .get(type_name)
            .ok_or_else(|| StoreError::InvalidChildType(type_name.to_string()))?;
        Ok(bucket
            .order
            .iter()
            .map(|local| (local.clone(), bucket.map[local].clone()))
            .collect())
    }

    fn resolve_type(&self, type_name: Option<&TypeName>) -> Result<TypeName> {
        match type_name {
            Some(t) if self.declared.contains(t) => Ok(t.clone()),
            Some(t) => Err(StoreError::InvalidChildType(t.to_string())),
            None => match self.declared.as_slice() {
                [] => Err(StoreError::InvalidOperation(
                    "object type declares no child types".into(),
                )),
                [only] => Ok(only.clone()),
                _ => Err(StoreError::AmbiguousChildType(
                    self.declared.iter().map(|t| t.to_string()).collect(),
                )),
            },
        }
    }

    /// An id carrying the separator is taken as already qualified; a
    /// bare id is qualified under this index's parent.
    fn split_id(&self, raw: &str) -> Result<(LocalId, QualifiedId)> {
        if raw.contains(ID_SEPARATOR) {
            let qualified = QualifiedId::parse(raw)?;
            Ok((qualified.local_part(), qualified))
        } else {
            let local = LocalId::new(raw)?;
            let qualified = self.parent.child(&local);
            Ok((local, qualified))
        }
    }
}
