//! # Modal Store
//!
//! A schema-driven hierarchical object store over two heterogeneous
//! backends: a document store holding small, fast-access metadata and
//! inline values, and a filesystem tree holding large binary payloads.
//!
//! ## Core Concepts
//!
//! - **Schema**: declared object types, their fields (storage mode plus
//!   disk codecs), and containment relationships
//! - **Objects**: one uniform key/value interface per instance; reads
//!   and writes are routed to the right medium, disk payloads load
//!   lazily and persist eagerly
//! - **Children**: parent/child containment with local and qualified
//!   addressing
//! - **Client**: staged inserts, retrieval by type + id, iteration
//!
//! ## Example
//!
//! ```ignore
//! use modal_store::{
//!     ClientConfig, InsertValue, ObjectClient, RawBytes, RawFieldSpec,
//!     RawObjectSpec, RawSchema, SchemaRegistry, TransferMethod, TypeName,
//! };
//! use std::sync::Arc;
//!
//! let schema = SchemaRegistry::parse(
//!     RawSchema::new()
//!         .object(
//!             "Video",
//!             RawObjectSpec::new()
//!                 .field("summary", RawFieldSpec::memory())
//!                 .field(
//!                     "thumbnail",
//!                     RawFieldSpec::disk(Arc::new(RawBytes)).with_save(Arc::new(RawBytes)),
//!                 )
//!                 .contains("Frame"),
//!         )
//!         .object(
//!             "Frame",
//!             RawObjectSpec::new().field("image", RawFieldSpec::disk(Arc::new(RawBytes))),
//!         ),
//! )?;
//!
//! let client = ObjectClient::open(
//!     ClientConfig { root: "./data".into(), ..Default::default() },
//!     Some(schema),
//! )?;
//!
//! let video = TypeName::new("Video")?;
//! let v1 = client.insert(
//!     &video,
//!     "v1",
//!     [("summary".to_string(), InsertValue::Inline("hi".into()))].into(),
//!     None,
//!     TransferMethod::Copy,
//! )?;
//! ```

pub mod children;
pub mod client;
pub mod docstore;
pub mod error;
pub mod fields;
pub mod fsops;
pub mod object;
pub mod schema;
pub mod types;

// Re-exports
pub use children::ChildIndex;
pub use client::{ClientConfig, DeepIter, ObjectClient, ObjectIter};
pub use docstore::{DocumentStore, DocumentUpdate, FileDocumentStore, MemoryDocumentStore};
pub use error::{Result, StoreError};
pub use fields::{DiskFieldStore, MemoryFieldStore};
pub use object::{ChildIter, DataObject};
pub use schema::{
    FieldMode, FieldSpec, JsonFile, LoadStrategy, MessagePackFile, ObjectSpec, RawBytes,
    RawFieldSpec, RawObjectSpec, RawSchema, SaveStrategy, SchemaRegistry,
};
pub use types::*;
