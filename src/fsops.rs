//! Filesystem collaborator for payload materialization.

use crate::error::Result;
use crate::types::TransferMethod;
use std::fs;
use std::path::Path;

pub fn exists(path: &Path) -> bool {
    path.exists()
}

/// Recursive, idempotent directory creation.
pub fn make_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

pub fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    fs::copy(src, dst)?;
    Ok(())
}

/// Rename, falling back to copy + remove across filesystems.
pub fn move_file(src: &Path, dst: &Path) -> Result<()> {
    if fs::rename(src, dst).is_err() {
        fs::copy(src, dst)?;
        fs::remove_file(src)?;
    }
    Ok(())
}

pub fn remove_file(path: &Path) -> Result<()> {
    fs::remove_file(path)?;
    Ok(())
}

/// True when both paths resolve to the same file.
pub fn is_same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Materialize `src` at `dst`; a transfer onto the same file is a skip.
pub fn transfer(src: &Path, dst: &Path, method: TransferMethod) -> Result<()> {
    if is_same_file(src, dst) {
        return Ok(());
    }
    match method {
        TransferMethod::Copy => copy_file(src, dst),
        TransferMethod::Move => move_file(src, dst),
    }
}
