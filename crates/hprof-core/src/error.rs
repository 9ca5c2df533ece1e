use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Query(#[from] QueryError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("no decoder available for signature {0:?}")]
    UnsupportedSignature(String),

    #[error("invalid identifier size {0} (expected 4 or 8)")]
    InvalidIdSize(u32),

    #[error("truncated header: missing {field}")]
    TruncatedHeader { field: &'static str },

    #[error("unsupported record tag 0x{tag:02x} ({name}) at byte {at}")]
    UnsupportedTag {
        tag: u8,
        name: &'static str,
        at: u64,
    },

    #[error("unknown record tag 0x{tag:02x} at byte {at}")]
    UnknownTag { tag: u8, at: u64 },

    #[error("unknown heap dump sub-record tag 0x{tag:02x} at byte {at}")]
    UnknownSubTag { tag: u8, at: u64 },

    #[error("invalid JVM basic type {value} in {record} at byte {at}")]
    InvalidJvmType {
        value: u8,
        record: &'static str,
        at: u64,
    },

    #[error("{record} overruns its section at byte {at}: need {needed} bytes, {remaining} remaining")]
    SectionOverrun {
        record: &'static str,
        at: u64,
        needed: u64,
        remaining: u64,
    },

    #[error("unexpected end of stream in {record} at byte {at}")]
    UnexpectedEof { record: &'static str, at: u64 },

    #[error("cannot allocate {bytes} bytes for {record} at byte {at}")]
    Allocation {
        record: &'static str,
        at: u64,
        bytes: u64,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("super-class cycle through class 0x{class_id:x}")]
    SuperClassCycle { class_id: u64 },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("filter failed on object 0x{object_id:x}: {reason}")]
    FilterFailed { object_id: u64, reason: String },
}
