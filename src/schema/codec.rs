//! Load/save strategies for disk-mode fields.
//!
//! A disk field's value never lives in the metadata document; it is read
//! from and written to its backing file through a pair of strategy
//! objects. The load side is mandatory; fields without a save strategy
//! are read-only.

use crate::error::{Result, StoreError};
use crate::types::FieldValue;
use std::fs;
use std::path::Path;

/// Reads a disk-mode field's backing file into a runtime value.
pub trait LoadStrategy: Send + Sync {
    fn load(&self, path: &Path) -> Result<FieldValue>;
}

/// Writes a disk-mode field's runtime value to its backing file.
pub trait SaveStrategy: Send + Sync {
    fn save(&self, value: &FieldValue, path: &Path) -> Result<()>;
}

/// Raw byte payloads (images, feature matrices, masks).
#[derive(Clone, Copy, Debug, Default)]
pub struct RawBytes;

impl LoadStrategy for RawBytes {
    fn load(&self, path: &Path) -> Result<FieldValue> {
        Ok(FieldValue::Bytes(fs::read(path)?))
    }
}

impl SaveStrategy for RawBytes {
    fn save(&self, value: &FieldValue, path: &Path) -> Result<()> {
        let bytes = value.as_bytes().ok_or_else(|| {
            StoreError::InvalidOperation("raw codec expects a byte payload".into())
        })?;
        fs::write(path, bytes)?;
        Ok(())
    }
}

/// JSON-encoded structured payloads.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonFile;

impl LoadStrategy for JsonFile {
    fn load(&self, path: &Path) -> Result<FieldValue> {
        let bytes = fs::read(path)?;
        let value: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Deserialization(e.to_string()))?;
        Ok(FieldValue::Json(value))
    }
}

impl SaveStrategy for JsonFile {
    fn save(&self, value: &FieldValue, path: &Path) -> Result<()> {
        let json = value.as_json().ok_or_else(|| {
            StoreError::InvalidOperation("json codec expects a structured payload".into())
        })?;
        fs::write(path, serde_json::to_vec(json)?)?;
        Ok(())
    }
}

/// MessagePack-encoded structured payloads.
#[derive(Clone, Copy, Debug, Default)]
pub struct MessagePackFile;

impl LoadStrategy for MessagePackFile {
    fn load(&self, path: &Path) -> Result<FieldValue> {
        let bytes = fs::read(path)?;
        let value: serde_json::Value = rmp_serde::from_slice(&bytes)?;
        Ok(FieldValue::Json(value))
    }
}

impl SaveStrategy for MessagePackFile {
    fn save(&self, value: &FieldValue, path: &Path) -> Result<()> {
        let json = value.as_json().ok_or_else(|| {
            StoreError::InvalidOperation("messagepack codec expects a structured payload".into())
        })?;
        fs::write(path, rmp_serde::to_vec(json)?)?;
        Ok(())
    }
}
