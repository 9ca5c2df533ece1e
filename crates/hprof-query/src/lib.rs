//! Heap graph and query engine over decoded HPROF dumps.
//!
//! [`build`] decodes a dump with `hprof-format` and resolves it into a
//! [`HeapIndex`]: classes linked to their super-classes, instances linked to
//! their classes, `java.lang.String` contents decoded and GC roots attached.
//! Queries run [`Filter`] trees over one partition of the index.

mod builder;
pub mod filter;
mod heap;
mod index;
mod matching;
mod options;

pub use builder::{resolve, STRING_CLASS_NAME};
pub use filter::{CompareOp, FieldPath, Filter, FilterResult, Literal};
pub use heap::{
    Ancestors, Class, HeapItem, Instance, ItemKind, ItemRef, ObjectArray, ObjectHeader,
    PrimitiveArray, StringObject,
};
pub use index::{HeapIndex, IndexStats, Source};
pub use matching::matches_class_name;
pub use options::BuildOptions;

use hprof_core::error::Error;
use hprof_format::ProgressSink;
use std::io::Read;
use std::path::Path;

/// Decodes a dump from a byte stream and resolves it.
pub fn build<R: Read>(
    input: R,
    options: &BuildOptions,
    progress: &mut dyn ProgressSink,
) -> Result<HeapIndex, Error> {
    let dump = hprof_format::decode(input, options.decode, progress)?;
    resolve(dump, options, progress)
}

pub fn build_bytes(
    bytes: &[u8],
    options: &BuildOptions,
    progress: &mut dyn ProgressSink,
) -> Result<HeapIndex, Error> {
    let dump = hprof_format::decode_bytes(bytes, options.decode, progress)?;
    resolve(dump, options, progress)
}

/// Memory-maps the dump at `path`, then decodes and resolves it.
pub fn build_from_path(
    path: impl AsRef<Path>,
    options: &BuildOptions,
    progress: &mut dyn ProgressSink,
) -> Result<HeapIndex, Error> {
    let dump = hprof_format::decode_path(path, options.decode, progress)?;
    resolve(dump, options, progress)
}
