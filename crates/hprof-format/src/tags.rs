use hprof_core::RootKind;

/// Top-level record tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordTag {
    Utf8String,
    LoadClass,
    UnloadClass,
    StackFrame,
    StackTrace,
    AllocSites,
    HeapSummary,
    StartThread,
    EndThread,
    HeapDump,
    CpuSamples,
    ControlSettings,
    HeapDumpSegment,
    HeapDumpEnd,
}

impl RecordTag {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x01 => Some(Self::Utf8String),
            0x02 => Some(Self::LoadClass),
            0x03 => Some(Self::UnloadClass),
            0x04 => Some(Self::StackFrame),
            0x05 => Some(Self::StackTrace),
            0x06 => Some(Self::AllocSites),
            0x07 => Some(Self::HeapSummary),
            0x0a => Some(Self::StartThread),
            0x0b => Some(Self::EndThread),
            0x0c => Some(Self::HeapDump),
            0x0d => Some(Self::CpuSamples),
            0x0e => Some(Self::ControlSettings),
            0x1c => Some(Self::HeapDumpSegment),
            0x2c => Some(Self::HeapDumpEnd),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::Utf8String => 0x01,
            Self::LoadClass => 0x02,
            Self::UnloadClass => 0x03,
            Self::StackFrame => 0x04,
            Self::StackTrace => 0x05,
            Self::AllocSites => 0x06,
            Self::HeapSummary => 0x07,
            Self::StartThread => 0x0a,
            Self::EndThread => 0x0b,
            Self::HeapDump => 0x0c,
            Self::CpuSamples => 0x0d,
            Self::ControlSettings => 0x0e,
            Self::HeapDumpSegment => 0x1c,
            Self::HeapDumpEnd => 0x2c,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Utf8String => "UTF8",
            Self::LoadClass => "LOAD CLASS",
            Self::UnloadClass => "UNLOAD CLASS",
            Self::StackFrame => "STACK FRAME",
            Self::StackTrace => "STACK TRACE",
            Self::AllocSites => "ALLOC SITES",
            Self::HeapSummary => "HEAP SUMMARY",
            Self::StartThread => "START THREAD",
            Self::EndThread => "END THREAD",
            Self::HeapDump => "HEAP DUMP",
            Self::CpuSamples => "CPU SAMPLES",
            Self::ControlSettings => "CONTROL SETTINGS",
            Self::HeapDumpSegment => "HEAP DUMP SEGMENT",
            Self::HeapDumpEnd => "HEAP DUMP END",
        }
    }

    /// Tags that Android never emits; seeing one means a different producer or corruption.
    pub fn is_supported(self) -> bool {
        !matches!(
            self,
            Self::UnloadClass
                | Self::AllocSites
                | Self::HeapSummary
                | Self::StartThread
                | Self::EndThread
                | Self::CpuSamples
                | Self::ControlSettings
        )
    }
}

/// Sub-record tags inside a heap dump (segment).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapTag {
    Root(RootKind),
    ClassDump,
    InstanceDump,
    ObjectArrayDump,
    PrimitiveArrayDump,
    PrimitiveArrayNoDataDump,
    HeapDumpInfo,
}

impl HeapTag {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x20 => Some(Self::ClassDump),
            0x21 => Some(Self::InstanceDump),
            0x22 => Some(Self::ObjectArrayDump),
            0x23 => Some(Self::PrimitiveArrayDump),
            0xc3 => Some(Self::PrimitiveArrayNoDataDump),
            0xfe => Some(Self::HeapDumpInfo),
            other => RootKind::from_sub_tag(other).map(Self::Root),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::Root(kind) => kind.sub_tag(),
            Self::ClassDump => 0x20,
            Self::InstanceDump => 0x21,
            Self::ObjectArrayDump => 0x22,
            Self::PrimitiveArrayDump => 0x23,
            Self::PrimitiveArrayNoDataDump => 0xc3,
            Self::HeapDumpInfo => 0xfe,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Root(kind) => kind.name(),
            Self::ClassDump => "CLASS DUMP",
            Self::InstanceDump => "INSTANCE DUMP",
            Self::ObjectArrayDump => "OBJECT ARRAY DUMP",
            Self::PrimitiveArrayDump => "PRIMITIVE ARRAY DUMP",
            Self::PrimitiveArrayNoDataDump => "PRIMITIVE ARRAY NODATA DUMP",
            Self::HeapDumpInfo => "HEAP DUMP INFO",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_tags_round_trip() {
        for v in 0u8..=0xff {
            if let Some(tag) = RecordTag::from_u8(v) {
                assert_eq!(tag.to_u8(), v);
            }
        }
        assert_eq!(RecordTag::from_u8(0x08), None);
    }

    #[test]
    fn android_only_tags_are_supported() {
        assert!(RecordTag::HeapDumpSegment.is_supported());
        assert!(RecordTag::StackTrace.is_supported());
        assert!(!RecordTag::CpuSamples.is_supported());
        assert!(!RecordTag::UnloadClass.is_supported());
    }

    #[test]
    fn heap_tags_include_roots() {
        assert_eq!(HeapTag::from_u8(0x20), Some(HeapTag::ClassDump));
        assert_eq!(
            HeapTag::from_u8(0x8e),
            Some(HeapTag::Root(RootKind::JniMonitor))
        );
        assert_eq!(HeapTag::from_u8(0x09), None);
        for v in 0u8..=0xff {
            if let Some(tag) = HeapTag::from_u8(v) {
                assert_eq!(tag.to_u8(), v);
            }
        }
    }
}
