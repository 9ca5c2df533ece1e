#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one heap object or class within a dump.
///
/// Dumps carry either 4- or 8-byte identifiers; both are widened to `u64`.
/// `ObjectId(0)` is the null reference.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct ObjectId(pub u64);

impl ObjectId {
    pub const NULL: ObjectId = ObjectId(0);

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl From<u64> for ObjectId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Width of every object identifier in a dump, fixed by the file header.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdSize {
    Four,
    Eight,
}

impl IdSize {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            4 => Some(Self::Four),
            8 => Some(Self::Eight),
            _ => None,
        }
    }

    pub fn bytes(self) -> usize {
        match self {
            Self::Four => 4,
            Self::Eight => 8,
        }
    }

    /// Big-endian decode of an identifier from exactly `self.bytes()` bytes.
    pub fn decode(self, bytes: &[u8]) -> Option<ObjectId> {
        match self {
            Self::Four => {
                let raw: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
                Some(ObjectId(u64::from(u32::from_be_bytes(raw))))
            }
            Self::Eight => {
                let raw: [u8; 8] = bytes.get(..8)?.try_into().ok()?;
                Some(ObjectId(u64::from_be_bytes(raw)))
            }
        }
    }
}

/// HPROF basic type tags.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JvmType {
    Object,
    Bool,
    Char,
    Float,
    Double,
    Byte,
    Short,
    Int,
    Long,
}

impl JvmType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            2 => Some(Self::Object),
            4 => Some(Self::Bool),
            5 => Some(Self::Char),
            6 => Some(Self::Float),
            7 => Some(Self::Double),
            8 => Some(Self::Byte),
            9 => Some(Self::Short),
            10 => Some(Self::Int),
            11 => Some(Self::Long),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::Object => 2,
            Self::Bool => 4,
            Self::Char => 5,
            Self::Float => 6,
            Self::Double => 7,
            Self::Byte => 8,
            Self::Short => 9,
            Self::Int => 10,
            Self::Long => 11,
        }
    }

    /// Width in bytes of one value of this type in a dump with the given id size.
    pub fn size(self, id_size: IdSize) -> usize {
        match self {
            Self::Bool | Self::Byte => 1,
            Self::Char | Self::Short => 2,
            Self::Int | Self::Float => 4,
            Self::Long | Self::Double => 8,
            Self::Object => id_size.bytes(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Bool => "boolean",
            Self::Char => "char",
            Self::Float => "float",
            Self::Double => "double",
            Self::Byte => "byte",
            Self::Short => "short",
            Self::Int => "int",
            Self::Long => "long",
        }
    }

    pub fn is_integral(self) -> bool {
        matches!(
            self,
            Self::Byte | Self::Char | Self::Short | Self::Int | Self::Long
        )
    }

    pub fn is_floating(self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }
}

impl fmt::Display for JvmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Width of one element of `ty` in a dump with the given id size.
pub fn element_size(ty: JvmType, id_size: IdSize) -> usize {
    ty.size(id_size)
}

/// Heap an item was dumped from, as announced by `HEAP_DUMP_INFO` markers.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum HeapType {
    #[default]
    Unknown,
    App,
    System,
    Zygote,
}

impl HeapType {
    /// Maps the Android heap id written in `HEAP_DUMP_INFO`.
    pub fn from_heap_id(v: u32) -> Self {
        match v {
            0x41 => Self::App,    // 'A'
            0x49 => Self::System, // 'I' (boot image)
            0x5a => Self::Zygote, // 'Z'
            _ => Self::Unknown,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::App => "app",
            Self::System => "system",
            Self::Zygote => "zygote",
        }
    }
}

impl fmt::Display for HeapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL_TYPES: [JvmType; 9] = [
        JvmType::Object,
        JvmType::Bool,
        JvmType::Char,
        JvmType::Float,
        JvmType::Double,
        JvmType::Byte,
        JvmType::Short,
        JvmType::Int,
        JvmType::Long,
    ];

    #[test]
    fn element_sizes_match_width_table() {
        for id_size in [IdSize::Four, IdSize::Eight] {
            for ty in ALL_TYPES {
                let expected = match ty {
                    JvmType::Bool | JvmType::Byte => 1,
                    JvmType::Char | JvmType::Short => 2,
                    JvmType::Int | JvmType::Float => 4,
                    JvmType::Long | JvmType::Double => 8,
                    JvmType::Object => id_size.bytes(),
                };
                assert_eq!(element_size(ty, id_size), expected, "{ty} / {id_size:?}");
            }
        }
    }

    #[test]
    fn type_tags_round_trip_and_reject_unknown() {
        for ty in ALL_TYPES {
            assert_eq!(JvmType::from_u8(ty.to_u8()), Some(ty));
        }
        for bad in [0u8, 1, 3, 12, 0xff] {
            assert_eq!(JvmType::from_u8(bad), None);
        }
    }

    #[test]
    fn heap_ids_map_to_heap_types() {
        assert_eq!(HeapType::from_heap_id(u32::from(b'A')), HeapType::App);
        assert_eq!(HeapType::from_heap_id(u32::from(b'Z')), HeapType::Zygote);
        assert_eq!(HeapType::from_heap_id(u32::from(b'I')), HeapType::System);
        assert_eq!(HeapType::from_heap_id(0), HeapType::Unknown);
    }

    proptest! {
        #[test]
        fn four_byte_ids_decode_big_endian(v in any::<u32>()) {
            let bytes = v.to_be_bytes();
            prop_assert_eq!(IdSize::Four.decode(&bytes), Some(ObjectId(u64::from(v))));
        }

        #[test]
        fn eight_byte_ids_decode_big_endian(v in any::<u64>()) {
            let bytes = v.to_be_bytes();
            prop_assert_eq!(IdSize::Eight.decode(&bytes), Some(ObjectId(v)));
        }

        #[test]
        fn short_input_never_decodes(len in 0usize..4) {
            let bytes = vec![0xabu8; len];
            prop_assert_eq!(IdSize::Four.decode(&bytes), None);
            prop_assert_eq!(IdSize::Eight.decode(&bytes), None);
        }
    }
}
