#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::ObjectId;

/// Why the collector treats an object as reachable.
///
/// The discriminants follow the heap-dump sub-record tags; the `0x89..=0x90`
/// range is the Android extension set.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootKind {
    Unknown,
    JniGlobal,
    JniLocal,
    JavaFrame,
    NativeStack,
    StickyClass,
    ThreadBlock,
    MonitorUsed,
    ThreadObject,
    InternedString,
    Finalizing,
    Debugger,
    ReferenceCleanup,
    VmInternal,
    JniMonitor,
    Unreachable,
}

impl RootKind {
    pub fn from_sub_tag(tag: u8) -> Option<Self> {
        match tag {
            0xff => Some(Self::Unknown),
            0x01 => Some(Self::JniGlobal),
            0x02 => Some(Self::JniLocal),
            0x03 => Some(Self::JavaFrame),
            0x04 => Some(Self::NativeStack),
            0x05 => Some(Self::StickyClass),
            0x06 => Some(Self::ThreadBlock),
            0x07 => Some(Self::MonitorUsed),
            0x08 => Some(Self::ThreadObject),
            0x89 => Some(Self::InternedString),
            0x8a => Some(Self::Finalizing),
            0x8b => Some(Self::Debugger),
            0x8c => Some(Self::ReferenceCleanup),
            0x8d => Some(Self::VmInternal),
            0x8e => Some(Self::JniMonitor),
            0x90 => Some(Self::Unreachable),
            _ => None,
        }
    }

    pub fn sub_tag(self) -> u8 {
        match self {
            Self::Unknown => 0xff,
            Self::JniGlobal => 0x01,
            Self::JniLocal => 0x02,
            Self::JavaFrame => 0x03,
            Self::NativeStack => 0x04,
            Self::StickyClass => 0x05,
            Self::ThreadBlock => 0x06,
            Self::MonitorUsed => 0x07,
            Self::ThreadObject => 0x08,
            Self::InternedString => 0x89,
            Self::Finalizing => 0x8a,
            Self::Debugger => 0x8b,
            Self::ReferenceCleanup => 0x8c,
            Self::VmInternal => 0x8d,
            Self::JniMonitor => 0x8e,
            Self::Unreachable => 0x90,
        }
    }

    /// Layout of the auxiliary fields that follow the object id.
    pub fn payload(self) -> RootPayload {
        match self {
            Self::JniGlobal => RootPayload::JniRef,
            Self::JniLocal | Self::JavaFrame | Self::JniMonitor => RootPayload::ThreadAndFrame,
            Self::NativeStack | Self::ThreadBlock => RootPayload::Thread,
            Self::ThreadObject => RootPayload::ThreadAndStackTrace,
            Self::Unknown
            | Self::StickyClass
            | Self::MonitorUsed
            | Self::InternedString
            | Self::Finalizing
            | Self::Debugger
            | Self::ReferenceCleanup
            | Self::VmInternal
            | Self::Unreachable => RootPayload::None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Unknown => "ROOT_UNKNOWN",
            Self::JniGlobal => "ROOT_JNI_GLOBAL",
            Self::JniLocal => "ROOT_JNI_LOCAL",
            Self::JavaFrame => "ROOT_JAVA_FRAME",
            Self::NativeStack => "ROOT_NATIVE_STACK",
            Self::StickyClass => "ROOT_STICKY_CLASS",
            Self::ThreadBlock => "ROOT_THREAD_BLOCK",
            Self::MonitorUsed => "ROOT_MONITOR_USED",
            Self::ThreadObject => "ROOT_THREAD_OBJECT",
            Self::InternedString => "ROOT_INTERNED_STRING",
            Self::Finalizing => "ROOT_FINALIZING",
            Self::Debugger => "ROOT_DEBUGGER",
            Self::ReferenceCleanup => "ROOT_REFERENCE_CLEANUP",
            Self::VmInternal => "ROOT_VM_INTERNAL",
            Self::JniMonitor => "ROOT_JNI_MONITOR",
            Self::Unreachable => "ROOT_UNREACHABLE",
        }
    }
}

impl fmt::Display for RootKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootPayload {
    None,
    /// One id-sized JNI global reference id.
    JniRef,
    /// Thread serial number.
    Thread,
    /// Thread serial number, frame number in stack trace.
    ThreadAndFrame,
    /// Thread serial number, stack trace serial number.
    ThreadAndStackTrace,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcRoot {
    pub kind: RootKind,
    pub object_id: ObjectId,
    pub thread_serial: Option<u32>,
    /// Frame number (JNI local, Java frame, JNI monitor) or stack trace serial (thread object).
    pub frame: Option<u32>,
    pub jni_ref: Option<ObjectId>,
}

impl GcRoot {
    pub fn new(kind: RootKind, object_id: ObjectId) -> Self {
        Self {
            kind,
            object_id,
            thread_serial: None,
            frame: None,
            jni_ref: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_sub_tag_round_trips() {
        let tags = [
            0xffu8, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x89, 0x8a, 0x8b, 0x8c, 0x8d,
            0x8e, 0x90,
        ];
        for tag in tags {
            let kind = RootKind::from_sub_tag(tag).unwrap();
            assert_eq!(kind.sub_tag(), tag);
        }
        assert_eq!(RootKind::from_sub_tag(0x8f), None);
        assert_eq!(RootKind::from_sub_tag(0x20), None);
    }

    #[test]
    fn payload_layouts() {
        assert_eq!(RootKind::JniGlobal.payload(), RootPayload::JniRef);
        assert_eq!(RootKind::JavaFrame.payload(), RootPayload::ThreadAndFrame);
        assert_eq!(RootKind::JniMonitor.payload(), RootPayload::ThreadAndFrame);
        assert_eq!(RootKind::ThreadBlock.payload(), RootPayload::Thread);
        assert_eq!(
            RootKind::ThreadObject.payload(),
            RootPayload::ThreadAndStackTrace
        );
        assert_eq!(RootKind::StickyClass.payload(), RootPayload::None);
    }
}
