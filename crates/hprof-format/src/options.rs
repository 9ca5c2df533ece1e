use serde::{Deserialize, Serialize};

/// How `HEAP_DUMP_INFO` markers assign heaps to the records around them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeapInfoPolicy {
    /// A marker tags every record decoded since the previous marker (or since
    /// the start of the segment). Records left after the last marker of a
    /// segment take that marker's heap when the segment ends.
    #[default]
    Retroactive,
    /// Each record takes the heap of the most recent marker seen.
    Forward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeOptions {
    pub heap_info: HeapInfoPolicy,
}
