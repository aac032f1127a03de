//! Error handling and edge case tests.

use modal_store::{
    ClientConfig, FieldValue, InsertValue, ObjectClient, RawBytes, RawFieldSpec, RawObjectSpec,
    RawSchema, SchemaRegistry, StoreError, TransferMethod, TypeName,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

/// Video holds two child types, so omitted-type child access is
/// ambiguous.
fn two_child_schema() -> SchemaRegistry {
    SchemaRegistry::parse(
        RawSchema::new()
            .object(
                "Video",
                RawObjectSpec::new()
                    .field("summary", RawFieldSpec::memory())
                    .field(
                        "thumbnail",
                        RawFieldSpec::disk(Arc::new(RawBytes)).with_save(Arc::new(RawBytes)),
                    )
                    .field("mask", RawFieldSpec::disk(Arc::new(RawBytes)))
                    .contains("Frame")
                    .contains("Caption"),
            )
            .object(
                "Frame",
                RawObjectSpec::new().field(
                    "image",
                    RawFieldSpec::disk(Arc::new(RawBytes)).with_save(Arc::new(RawBytes)),
                ),
            )
            .object(
                "Caption",
                RawObjectSpec::new().field("text", RawFieldSpec::memory()),
            ),
    )
    .unwrap()
}

fn open_client(dir: &TempDir) -> ObjectClient {
    ObjectClient::open(
        ClientConfig {
            root: dir.path().join("data"),
            create_if_missing: true,
        },
        Some(two_child_schema()),
    )
    .unwrap()
}

fn video() -> TypeName {
    TypeName::new("Video").unwrap()
}

fn frame() -> TypeName {
    TypeName::new("Frame").unwrap()
}

#[test]
fn test_ambiguous_child_type() {
    let dir = TempDir::new().unwrap();
    let client = open_client(&dir);

    let v1 = client
        .insert(&video(), "v1", BTreeMap::new(), None, TransferMethod::Copy)
        .unwrap();
    client
        .insert(&frame(), "f1", BTreeMap::new(), Some(&v1), TransferMethod::Copy)
        .unwrap();

    assert!(matches!(
        v1.get_child(None, "f1"),
        Err(StoreError::AmbiguousChildType(_))
    ));
    assert!(matches!(
        v1.iter_children(None),
        Err(StoreError::AmbiguousChildType(_))
    ));

    // naming the type resolves it
    assert!(v1.get_child(Some(&frame()), "f1").is_ok());
}

#[test]
fn test_invalid_child_type() {
    let dir = TempDir::new().unwrap();
    let client = open_client(&dir);

    let v1 = client
        .insert(&video(), "v1", BTreeMap::new(), None, TransferMethod::Copy)
        .unwrap();

    let unknown = TypeName::new("Chapter").unwrap();
    assert!(matches!(
        v1.get_child(Some(&unknown), "c1"),
        Err(StoreError::InvalidChildType(_))
    ));

    // inserting under a parent that doesn't contain the type fails too
    let f1 = client
        .insert(&frame(), "f1", BTreeMap::new(), Some(&v1), TransferMethod::Copy)
        .unwrap();
    assert!(matches!(
        client.insert(&video(), "v2", BTreeMap::new(), Some(&f1), TransferMethod::Copy),
        Err(StoreError::InvalidChildType(_))
    ));
}

#[test]
fn test_no_such_child() {
    let dir = TempDir::new().unwrap();
    let client = open_client(&dir);

    let v1 = client
        .insert(&video(), "v1", BTreeMap::new(), None, TransferMethod::Copy)
        .unwrap();
    assert!(matches!(
        v1.get_child(Some(&frame()), "f9"),
        Err(StoreError::NoSuchChild(_))
    ));
}

#[test]
fn test_no_such_field() {
    let dir = TempDir::new().unwrap();
    let client = open_client(&dir);

    let v1 = client
        .insert(&video(), "v1", BTreeMap::new(), None, TransferMethod::Copy)
        .unwrap();

    assert!(matches!(
        v1.get("subtitles"),
        Err(StoreError::NoSuchField(_))
    ));
    assert!(matches!(
        v1.set("subtitles", FieldValue::Json(json!("x"))),
        Err(StoreError::NoSuchField(_))
    ));
    assert!(matches!(
        v1.delete("subtitles"),
        Err(StoreError::NoSuchField(_))
    ));

    // undeclared fields are rejected at insert time as well
    let mut values = BTreeMap::new();
    values.insert("subtitles".to_string(), InsertValue::Inline(json!("x")));
    assert!(matches!(
        client.insert(&video(), "v2", values, None, TransferMethod::Copy),
        Err(StoreError::NoSuchField(_))
    ));
}

#[test]
fn test_not_found() {
    let dir = TempDir::new().unwrap();
    let client = open_client(&dir);

    assert!(matches!(
        client.get(&video(), "v9"),
        Err(StoreError::NotFound { .. })
    ));
}

#[test]
fn test_read_only_field() {
    let dir = TempDir::new().unwrap();
    let client = open_client(&dir);

    let v1 = client
        .insert(&video(), "v1", BTreeMap::new(), None, TransferMethod::Copy)
        .unwrap();

    // "mask" declares no save strategy
    assert!(matches!(
        v1.set("mask", FieldValue::Bytes(vec![1])),
        Err(StoreError::ReadOnlyField(_))
    ));
}

#[test]
fn test_missing_source_fails_whole_insert() {
    let dir = TempDir::new().unwrap();
    let client = open_client(&dir);

    let mut values = BTreeMap::new();
    values.insert("summary".to_string(), InsertValue::Inline(json!("hi")));
    values.insert(
        "thumbnail".to_string(),
        InsertValue::Source(dir.path().join("nonexistent.png")),
    );
    let result = client.insert(&video(), "v1", values, None, TransferMethod::Copy);

    assert!(matches!(result, Err(StoreError::SourceNotFound(_))));
    // no partial directory, no partial document
    assert!(!dir.path().join("data/Video/v1").exists());
    assert!(matches!(
        client.get(&video(), "v1"),
        Err(StoreError::NotFound { .. })
    ));
}

#[test]
fn test_value_mode_mismatch() {
    let dir = TempDir::new().unwrap();
    let client = open_client(&dir);

    let mut values = BTreeMap::new();
    values.insert(
        "summary".to_string(),
        InsertValue::Source(dir.path().join("anything")),
    );
    assert!(matches!(
        client.insert(&video(), "v1", values, None, TransferMethod::Copy),
        Err(StoreError::InvalidOperation(_))
    ));

    let mut values = BTreeMap::new();
    values.insert("thumbnail".to_string(), InsertValue::Inline(json!(1)));
    assert!(matches!(
        client.insert(&video(), "v2", values, None, TransferMethod::Copy),
        Err(StoreError::InvalidOperation(_))
    ));
}

#[test]
fn test_child_re_add_semantics() {
    let dir = TempDir::new().unwrap();
    let client = open_client(&dir);

    let v1 = client
        .insert(&video(), "v1", BTreeMap::new(), None, TransferMethod::Copy)
        .unwrap();
    client
        .insert(&frame(), "f1", BTreeMap::new(), Some(&v1), TransferMethod::Copy)
        .unwrap();

    // identical re-add is a no-op
    v1.add_child(Some(&frame()), "f1").unwrap();
    assert_eq!(v1.child_entries(Some(&frame())).unwrap().len(), 1);

    // same local id under a different qualified id is a conflict
    assert!(matches!(
        v1.add_child(Some(&frame()), "other/f1"),
        Err(StoreError::ChildConflict { .. })
    ));
}

#[test]
fn test_delete_absent_disk_field_is_noop() {
    let dir = TempDir::new().unwrap();
    let client = open_client(&dir);

    let v1 = client
        .insert(&video(), "v1", BTreeMap::new(), None, TransferMethod::Copy)
        .unwrap();

    v1.delete("thumbnail").unwrap();
    v1.delete("thumbnail").unwrap();
    assert_eq!(v1.get("thumbnail").unwrap(), None);
}

#[test]
fn test_missing_backing_file_detected() {
    let dir = TempDir::new().unwrap();
    let client = open_client(&dir);

    let thumb = dir.path().join("thumb.png");
    fs::write(&thumb, [1]).unwrap();
    let mut values = BTreeMap::new();
    values.insert("thumbnail".to_string(), InsertValue::Source(thumb));
    let v1 = client
        .insert(&video(), "v1", values, None, TransferMethod::Copy)
        .unwrap();

    v1.verify_present_files().unwrap();

    // remove the payload behind the store's back
    fs::remove_file(v1.path_for("thumbnail").unwrap()).unwrap();
    assert!(matches!(
        v1.verify_present_files(),
        Err(StoreError::MissingOnDisk { .. })
    ));
}

#[test]
fn test_malformed_ids_rejected() {
    let dir = TempDir::new().unwrap();
    let client = open_client(&dir);

    assert!(matches!(
        client.insert(&video(), "", BTreeMap::new(), None, TransferMethod::Copy),
        Err(StoreError::InvalidId(_))
    ));
    assert!(matches!(
        client.insert(&video(), "a/b", BTreeMap::new(), None, TransferMethod::Copy),
        Err(StoreError::InvalidId(_))
    ));
    assert!(matches!(
        client.get(&video(), "v1//f1"),
        Err(StoreError::InvalidId(_))
    ));
}

#[test]
fn test_undeclared_type() {
    let dir = TempDir::new().unwrap();
    let client = open_client(&dir);

    let unknown = TypeName::new("Chapter").unwrap();
    assert!(matches!(
        client.insert(&unknown, "c1", BTreeMap::new(), None, TransferMethod::Copy),
        Err(StoreError::Schema(_))
    ));
    assert!(matches!(
        client.get(&unknown, "c1"),
        Err(StoreError::Schema(_))
    ));
    assert!(matches!(
        client.iterate(&unknown),
        Err(StoreError::Schema(_))
    ));
}
