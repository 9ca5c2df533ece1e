#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{IdSize, JvmType, ObjectId};

/// A type-tagged view over the bytes of one field or array element.
///
/// Nothing is decoded until an accessor is called. The accessors return
/// `None` when the requested interpretation does not match the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldValue<'a> {
    ty: JvmType,
    bytes: &'a [u8],
    id_size: IdSize,
}

impl<'a> FieldValue<'a> {
    /// Takes exactly `ty.size(id_size)` bytes from the front of `bytes`.
    /// Returns `None` if `bytes` is shorter than that width.
    pub fn new(ty: JvmType, bytes: &'a [u8], id_size: IdSize) -> Option<Self> {
        let bytes = bytes.get(..ty.size(id_size))?;
        Some(Self { ty, bytes, id_size })
    }

    /// View at `offset` inside a larger blob (instance data, static data, array body).
    pub fn at(ty: JvmType, blob: &'a [u8], offset: usize, id_size: IdSize) -> Option<Self> {
        Self::new(ty, blob.get(offset..)?, id_size)
    }

    pub fn ty(&self) -> JvmType {
        self.ty
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn id_size(&self) -> IdSize {
        self.id_size
    }

    fn array<const N: usize>(&self) -> Option<[u8; N]> {
        self.bytes.get(..N)?.try_into().ok()
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.ty {
            JvmType::Bool => self.bytes.first().map(|b| *b != 0),
            _ => None,
        }
    }

    pub fn as_byte(&self) -> Option<i8> {
        match self.ty {
            JvmType::Byte => Some(i8::from_be_bytes(self.array::<1>()?)),
            _ => None,
        }
    }

    pub fn as_char(&self) -> Option<u16> {
        match self.ty {
            JvmType::Char => Some(u16::from_be_bytes(self.array::<2>()?)),
            _ => None,
        }
    }

    pub fn as_short(&self) -> Option<i16> {
        match self.ty {
            JvmType::Short => Some(i16::from_be_bytes(self.array::<2>()?)),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self.ty {
            JvmType::Int => Some(i32::from_be_bytes(self.array::<4>()?)),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self.ty {
            JvmType::Long => Some(i64::from_be_bytes(self.array::<8>()?)),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self.ty {
            JvmType::Float => Some(f32::from_be_bytes(self.array::<4>()?)),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self.ty {
            JvmType::Double => Some(f64::from_be_bytes(self.array::<8>()?)),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<ObjectId> {
        match self.ty {
            JvmType::Object => self.id_size.decode(self.bytes),
            _ => None,
        }
    }

    pub fn decode(&self) -> Option<Value> {
        Some(match self.ty {
            JvmType::Bool => Value::Bool(self.as_bool()?),
            JvmType::Byte => Value::Byte(self.as_byte()?),
            JvmType::Char => Value::Char(self.as_char()?),
            JvmType::Short => Value::Short(self.as_short()?),
            JvmType::Int => Value::Int(self.as_int()?),
            JvmType::Long => Value::Long(self.as_long()?),
            JvmType::Float => Value::Float(self.as_float()?),
            JvmType::Double => Value::Double(self.as_double()?),
            JvmType::Object => Value::Object(self.as_object()?),
        })
    }
}

/// A decoded scalar.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Object(ObjectId),
}

impl Value {
    pub fn ty(&self) -> JvmType {
        match self {
            Self::Bool(_) => JvmType::Bool,
            Self::Byte(_) => JvmType::Byte,
            Self::Char(_) => JvmType::Char,
            Self::Short(_) => JvmType::Short,
            Self::Int(_) => JvmType::Int,
            Self::Long(_) => JvmType::Long,
            Self::Float(_) => JvmType::Float,
            Self::Double(_) => JvmType::Double,
            Self::Object(_) => JvmType::Object,
        }
    }

    /// Integral value widened to `i64`; `None` for bool, floating and object values.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Byte(v) => Some(i64::from(v)),
            Self::Char(v) => Some(i64::from(v)),
            Self::Short(v) => Some(i64::from(v)),
            Self::Int(v) => Some(i64::from(v)),
            Self::Long(v) => Some(v),
            Self::Bool(_) | Self::Float(_) | Self::Double(_) | Self::Object(_) => None,
        }
    }

    /// Any numeric value widened to `f64`.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Float(v) => Some(f64::from(v)),
            Self::Double(v) => Some(v),
            other => other.as_i64().map(|v| v as f64),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Byte(v) => write!(f, "{v}"),
            Self::Char(v) => match char::from_u32(u32::from(*v)) {
                Some(c) => write!(f, "'{c}'"),
                None => write!(f, "'\\u{v:04x}'"),
            },
            Self::Short(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Object(id) if id.is_null() => f.write_str("null"),
            Self::Object(id) => write!(f, "{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_each_type_big_endian() {
        let v = FieldValue::new(JvmType::Int, &[0xff, 0xff, 0xff, 0xfe], IdSize::Four).unwrap();
        assert_eq!(v.as_int(), Some(-2));
        assert_eq!(v.as_long(), None);

        let v = FieldValue::new(JvmType::Char, &[0x00, 0x48, 0x99], IdSize::Four).unwrap();
        assert_eq!(v.bytes().len(), 2);
        assert_eq!(v.decode(), Some(Value::Char(0x48)));

        let bytes = 1.5f64.to_be_bytes();
        let v = FieldValue::new(JvmType::Double, &bytes, IdSize::Eight).unwrap();
        assert_eq!(v.as_double(), Some(1.5));

        let v = FieldValue::new(JvmType::Bool, &[1], IdSize::Four).unwrap();
        assert_eq!(v.decode(), Some(Value::Bool(true)));
    }

    #[test]
    fn object_width_follows_id_size() {
        let bytes = [0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02];
        let four = FieldValue::new(JvmType::Object, &bytes, IdSize::Four).unwrap();
        assert_eq!(four.as_object(), Some(ObjectId(1)));
        let eight = FieldValue::new(JvmType::Object, &bytes, IdSize::Eight).unwrap();
        assert_eq!(eight.as_object(), Some(ObjectId(0x1_0000_0002)));
    }

    #[test]
    fn rejects_short_ranges() {
        assert!(FieldValue::new(JvmType::Long, &[0; 7], IdSize::Four).is_none());
        assert!(FieldValue::new(JvmType::Object, &[0; 4], IdSize::Eight).is_none());
        assert!(FieldValue::at(JvmType::Int, &[0; 6], 4, IdSize::Four).is_none());
        assert!(FieldValue::at(JvmType::Int, &[0; 6], 9, IdSize::Four).is_none());
    }

    #[test]
    fn numeric_widening() {
        assert_eq!(Value::Char(65).as_i64(), Some(65));
        assert_eq!(Value::Float(0.5).as_f64(), Some(0.5));
        assert_eq!(Value::Bool(true).as_f64(), None);
        assert_eq!(Value::Object(ObjectId(3)).as_i64(), None);
    }
}
