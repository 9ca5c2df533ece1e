//! Streaming decoder for Android/Java HPROF heap dumps.
//!
//! The decoder turns a byte stream into flat, unresolved records
//! ([`DecodedDump`]); `hprof-query` resolves those into a heap graph.

mod decoder;
mod options;
mod progress;
mod reader;
mod records;
mod tags;

#[cfg(any(test, feature = "synth"))]
pub mod synth;

pub use decoder::{
    decoder_for_signature, read_signature, HprofVersion, RecordDecoder, MAX_SIGNATURE_LEN,
    SIGNATURE_1_0_3,
};
pub use options::{DecodeOptions, HeapInfoPolicy};
pub use progress::{NoProgress, ProgressSink, ProgressTracker, Stage};
pub use reader::{ByteReader, ReadShortfall, SectionFault, SectionReader};
pub use records::{
    ClassDumpRecord, DecodedDump, FieldRecord, HeapInfoRecord, InstanceDumpRecord,
    LoadClassRecord, ObjectArrayRecord, PrimitiveArrayRecord, RecordCounts, StaticFieldRecord,
};
pub use tags::{HeapTag, RecordTag};

use hprof_core::error::{Error, FormatError};
use memmap2::Mmap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Reads the signature, selects the matching decoder and decodes the stream.
pub fn decode_reader<R: Read>(
    reader: &mut ByteReader<R>,
    options: DecodeOptions,
    progress: &mut dyn ProgressSink,
) -> Result<DecodedDump, Error> {
    let signature = read_signature(reader)?;
    let decoder = decoder_for_signature(&signature, options)
        .ok_or(FormatError::UnsupportedSignature(signature))?;
    decoder.decode(reader, progress)
}

/// Decodes a dump from any byte stream. Progress is reported only when the
/// stream length is known; use [`decode_bytes`] or [`decode_path`] for that.
pub fn decode<R: Read>(
    input: R,
    options: DecodeOptions,
    progress: &mut dyn ProgressSink,
) -> Result<DecodedDump, Error> {
    decode_reader(&mut ByteReader::new(input), options, progress)
}

pub fn decode_bytes(
    bytes: &[u8],
    options: DecodeOptions,
    progress: &mut dyn ProgressSink,
) -> Result<DecodedDump, Error> {
    let mut reader = ByteReader::with_total(bytes, bytes.len() as u64);
    decode_reader(&mut reader, options, progress)
}

/// Memory-maps `path` and decodes it.
pub fn decode_path(
    path: impl AsRef<Path>,
    options: DecodeOptions,
    progress: &mut dyn ProgressSink,
) -> Result<DecodedDump, Error> {
    let file = File::open(path.as_ref())?;
    if file.metadata()?.len() == 0 {
        return Err(FormatError::UnsupportedSignature(String::new()).into());
    }
    // SAFETY: the map is read-only and dropped before returning; the dump is
    // copied into owned records while decoding.
    let mmap = unsafe { Mmap::map(&file)? };
    decode_bytes(&mmap, options, progress)
}
