#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::types::JvmType;

/// One declared instance field: name, type and byte offset into the
/// instance data blob.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub ty: JvmType,
    pub offset: usize,
}

/// One static field; `offset` points into the owning class's static data blob.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticFieldSpec {
    pub name: String,
    pub ty: JvmType,
    pub offset: usize,
}
