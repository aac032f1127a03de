//! Schema declaration, validation, and disk codecs.

pub mod codec;
pub mod registry;

pub use codec::{JsonFile, LoadStrategy, MessagePackFile, RawBytes, SaveStrategy};
pub use registry::{
    FieldMode, FieldSpec, ObjectSpec, RawFieldSpec, RawObjectSpec, RawSchema, SchemaRegistry,
};
