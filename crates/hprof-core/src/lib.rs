//! Core data structures for HPROF heap dumps.
//!
//! This crate defines the identity, type-tag, GC-root and field-value types
//! shared by the decoder (`hprof-format`) and the heap index (`hprof-query`),
//! together with the error taxonomy used across the workspace.

pub mod error;
pub mod field;
pub mod roots;
pub mod types;
pub mod utf16;
pub mod value;

pub use error::{Error, FormatError, QueryError, ResolveError};
pub use field::{FieldSpec, StaticFieldSpec};
pub use roots::{GcRoot, RootKind, RootPayload};
pub use types::{element_size, HeapType, IdSize, JvmType, ObjectId};
pub use value::{FieldValue, Value};
