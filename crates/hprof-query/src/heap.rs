use hprof_core::utf16::decode_utf16_be;
use hprof_core::{FieldSpec, FieldValue, GcRoot, HeapType, IdSize, JvmType, ObjectId, StaticFieldSpec};
use std::borrow::Cow;
use std::sync::Arc;

/// Shared handle to one resolved item; the index and query results share it.
pub type ItemRef = Arc<HeapItem>;

/// Identity and bookkeeping common to every heap item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHeader {
    pub id: ObjectId,
    pub heap: HeapType,
    pub roots: Vec<GcRoot>,
}

impl ObjectHeader {
    pub fn new(id: ObjectId, heap: HeapType) -> Self {
        Self {
            id,
            heap,
            roots: Vec::new(),
        }
    }
}

/// A resolved class.
///
/// `fields` holds the class's own instance fields with offsets relative to
/// its own block. `layout` is the full instance layout: own fields first,
/// then each ancestor's block, with absolute offsets into the instance data.
#[derive(Debug)]
pub struct Class {
    pub header: ObjectHeader,
    pub name: String,
    pub super_id: ObjectId,
    pub class_loader_id: ObjectId,
    pub stack_trace_serial: u32,
    pub instance_size: u32,
    pub(crate) super_class: Option<Arc<Class>>,
    pub(crate) fields: Vec<FieldSpec>,
    pub(crate) layout: Vec<FieldSpec>,
    pub(crate) static_fields: Vec<StaticFieldSpec>,
    pub(crate) static_data: Vec<u8>,
    pub(crate) id_size: IdSize,
}

impl Class {
    pub fn id(&self) -> ObjectId {
        self.header.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn super_class(&self) -> Option<&Arc<Class>> {
        self.super_class.as_ref()
    }

    /// This class followed by each super-class, most derived first.
    pub fn ancestors(&self) -> Ancestors<'_> {
        Ancestors { next: Some(self) }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Own and inherited fields in instance-data order.
    pub fn instance_fields(&self) -> &[FieldSpec] {
        &self.layout
    }

    /// Bytes of instance data covered by own and inherited fields.
    pub fn instance_data_size(&self) -> usize {
        self.layout
            .iter()
            .map(|f| f.offset + f.ty.size(self.id_size))
            .max()
            .unwrap_or(0)
    }

    pub fn static_fields(&self) -> &[StaticFieldSpec] {
        &self.static_fields
    }

    pub fn static_value_at(&self, index: usize) -> Option<FieldValue<'_>> {
        let spec = self.static_fields.get(index)?;
        FieldValue::at(spec.ty, &self.static_data, spec.offset, self.id_size)
    }

    pub fn static_value(&self, name: &str) -> Option<FieldValue<'_>> {
        let index = self.static_fields.iter().position(|f| f.name == name)?;
        self.static_value_at(index)
    }

    /// True if this class or one of its ancestors is named exactly `name`.
    pub fn is_subclass_of(&self, name: &str) -> bool {
        self.ancestors().any(|c| c.name == name)
    }
}

pub struct Ancestors<'a> {
    next: Option<&'a Class>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a Class;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.super_class.as_deref();
        Some(current)
    }
}

#[derive(Debug)]
pub struct Instance {
    pub header: ObjectHeader,
    pub class_id: ObjectId,
    pub stack_trace_serial: u32,
    pub(crate) class: Option<Arc<Class>>,
    pub(crate) data: Vec<u8>,
    pub(crate) id_size: IdSize,
}

impl Instance {
    pub fn id(&self) -> ObjectId {
        self.header.id
    }

    /// `None` when the instance's class was not present in the dump.
    pub fn class(&self) -> Option<&Arc<Class>> {
        self.class.as_ref()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn field_specs(&self) -> &[FieldSpec] {
        match &self.class {
            Some(class) => class.instance_fields(),
            None => &[],
        }
    }

    /// First field named `name` in layout order, so a subclass field shadows
    /// an inherited one.
    pub fn field_spec(&self, name: &str) -> Option<&FieldSpec> {
        self.field_specs().iter().find(|f| f.name == name)
    }

    pub fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        let spec = self.field_spec(name)?;
        FieldValue::at(spec.ty, &self.data, spec.offset, self.id_size)
    }

    pub fn field_at(&self, index: usize) -> Option<FieldValue<'_>> {
        let spec = self.field_specs().get(index)?;
        FieldValue::at(spec.ty, &self.data, spec.offset, self.id_size)
    }

    /// Every field with its value; the value is `None` when the data blob is
    /// too short for it.
    pub fn fields(&self) -> impl Iterator<Item = (&FieldSpec, Option<FieldValue<'_>>)> + '_ {
        self.field_specs().iter().map(move |spec| {
            (
                spec,
                FieldValue::at(spec.ty, &self.data, spec.offset, self.id_size),
            )
        })
    }
}

/// An instance of `java.lang.String` with its decoded contents.
#[derive(Debug)]
pub struct StringObject {
    pub instance: Instance,
    pub(crate) value: Option<String>,
}

impl StringObject {
    /// Decoded text; `None` when the backing char array could not be resolved.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

#[derive(Debug)]
pub struct ObjectArray {
    pub header: ObjectHeader,
    pub class_id: ObjectId,
    pub stack_trace_serial: u32,
    pub(crate) class: Option<Arc<Class>>,
    pub(crate) elements: Vec<ObjectId>,
}

impl ObjectArray {
    pub fn id(&self) -> ObjectId {
        self.header.id
    }

    pub fn class(&self) -> Option<&Arc<Class>> {
        self.class.as_ref()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<ObjectId> {
        self.elements.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.elements.iter().copied()
    }

    pub fn elements(&self) -> &[ObjectId] {
        &self.elements
    }
}

#[derive(Debug)]
pub struct PrimitiveArray {
    pub header: ObjectHeader,
    pub element_type: JvmType,
    pub stack_trace_serial: u32,
    pub(crate) length: u32,
    pub(crate) data: Vec<u8>,
    pub(crate) id_size: IdSize,
}

impl PrimitiveArray {
    pub fn id(&self) -> ObjectId {
        self.header.id
    }

    pub fn len(&self) -> usize {
        self.length as usize
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn get(&self, index: usize) -> Option<FieldValue<'_>> {
        if index >= self.len() {
            return None;
        }
        let width = self.element_type.size(self.id_size);
        FieldValue::at(self.element_type, &self.data, index * width, self.id_size)
    }

    pub fn iter(&self) -> impl Iterator<Item = FieldValue<'_>> + '_ {
        (0..self.len()).map_while(move |i| self.get(i))
    }

    /// Contents of a `char[]` decoded from UTF-16.
    pub fn chars(&self) -> Option<String> {
        match self.element_type {
            JvmType::Char => Some(decode_utf16_be(&self.data)),
            _ => None,
        }
    }

    /// Java-style type name, e.g. `int[]`.
    pub fn type_name(&self) -> String {
        format!("{}[]", self.element_type.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Class,
    Instance,
    String,
    ObjectArray,
    PrimitiveArray,
}

impl ItemKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Instance => "instance",
            Self::String => "string",
            Self::ObjectArray => "object array",
            Self::PrimitiveArray => "primitive array",
        }
    }
}

/// One resolved heap item.
#[derive(Debug)]
pub enum HeapItem {
    Class(Arc<Class>),
    Instance(Instance),
    String(StringObject),
    ObjectArray(ObjectArray),
    PrimitiveArray(PrimitiveArray),
}

impl HeapItem {
    pub fn header(&self) -> &ObjectHeader {
        match self {
            Self::Class(c) => &c.header,
            Self::Instance(i) => &i.header,
            Self::String(s) => &s.instance.header,
            Self::ObjectArray(a) => &a.header,
            Self::PrimitiveArray(a) => &a.header,
        }
    }

    /// Classes are shared behind `Arc` and have no mutable header.
    pub(crate) fn header_mut(&mut self) -> Option<&mut ObjectHeader> {
        match self {
            Self::Class(_) => None,
            Self::Instance(i) => Some(&mut i.header),
            Self::String(s) => Some(&mut s.instance.header),
            Self::ObjectArray(a) => Some(&mut a.header),
            Self::PrimitiveArray(a) => Some(&mut a.header),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.header().id
    }

    pub fn heap(&self) -> HeapType {
        self.header().heap
    }

    pub fn roots(&self) -> &[GcRoot] {
        &self.header().roots
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            Self::Class(_) => ItemKind::Class,
            Self::Instance(_) => ItemKind::Instance,
            Self::String(_) => ItemKind::String,
            Self::ObjectArray(_) => ItemKind::ObjectArray,
            Self::PrimitiveArray(_) => ItemKind::PrimitiveArray,
        }
    }

    pub fn as_class(&self) -> Option<&Arc<Class>> {
        match self {
            Self::Class(c) => Some(c),
            _ => None,
        }
    }

    /// The instance view of plain instances and strings.
    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            Self::Instance(i) => Some(i),
            Self::String(s) => Some(&s.instance),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&StringObject> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object_array(&self) -> Option<&ObjectArray> {
        match self {
            Self::ObjectArray(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_primitive_array(&self) -> Option<&PrimitiveArray> {
        match self {
            Self::PrimitiveArray(a) => Some(a),
            _ => None,
        }
    }

    /// The class an inheritance walk starts from: the class itself for a
    /// class item, otherwise the item's class.
    pub fn class(&self) -> Option<&Class> {
        match self {
            Self::Class(c) => Some(c),
            Self::Instance(i) => i.class.as_deref(),
            Self::String(s) => s.instance.class.as_deref(),
            Self::ObjectArray(a) => a.class.as_deref(),
            Self::PrimitiveArray(_) => None,
        }
    }

    /// Name used by class-name filters: a class's own name, or the name of
    /// the item's class. Primitive arrays are named after their element type.
    pub fn class_name(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::PrimitiveArray(a) => Some(Cow::Owned(a.type_name())),
            other => other.class().map(|c| Cow::Borrowed(c.name())),
        }
    }

    /// Exact-name match against the item's class and its super-classes.
    pub fn instance_of(&self, name: &str) -> bool {
        match self {
            Self::PrimitiveArray(a) => a.type_name() == name,
            other => other.class().is_some_and(|c| c.is_subclass_of(name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(id: u64, name: &str, super_class: Option<Arc<Class>>, own: &[(&str, JvmType)]) -> Arc<Class> {
        let mut fields = Vec::new();
        let mut offset = 0;
        for (n, ty) in own {
            fields.push(FieldSpec {
                name: (*n).to_string(),
                ty: *ty,
                offset,
            });
            offset += ty.size(IdSize::Four);
        }
        let mut layout = fields.clone();
        if let Some(parent) = &super_class {
            layout.extend(parent.layout.iter().map(|f| FieldSpec {
                offset: f.offset + offset,
                ..f.clone()
            }));
        }
        Arc::new(Class {
            header: ObjectHeader::new(ObjectId(id), HeapType::App),
            name: name.to_string(),
            super_id: super_class.as_ref().map_or(ObjectId::NULL, |c| c.id()),
            class_loader_id: ObjectId::NULL,
            stack_trace_serial: 0,
            instance_size: 0,
            super_class,
            fields,
            layout,
            static_fields: vec![StaticFieldSpec {
                name: "COUNT".to_string(),
                ty: JvmType::Short,
                offset: 0,
            }],
            static_data: vec![0x01, 0x02],
            id_size: IdSize::Four,
        })
    }

    #[test]
    fn subclass_fields_shadow_inherited_ones() {
        let base = class(1, "Base", None, &[("x", JvmType::Int)]);
        let derived = class(2, "Derived", Some(base), &[("x", JvmType::Byte)]);
        let instance = Instance {
            header: ObjectHeader::new(ObjectId(10), HeapType::App),
            class_id: ObjectId(2),
            stack_trace_serial: 0,
            class: Some(derived),
            data: vec![7, 0, 0, 0, 9],
            id_size: IdSize::Four,
        };
        assert_eq!(instance.field("x").and_then(|v| v.as_byte()), Some(7));
        assert_eq!(instance.field_at(1).and_then(|v| v.as_int()), Some(9));
        assert_eq!(instance.fields().count(), 2);
        assert!(instance.field("y").is_none());
    }

    #[test]
    fn ancestors_and_statics() {
        let a = class(1, "A", None, &[]);
        let b = class(2, "B", Some(a), &[]);
        let names: Vec<&str> = b.ancestors().map(Class::name).collect();
        assert_eq!(names, vec!["B", "A"]);
        assert!(b.is_subclass_of("A"));
        assert!(!b.is_subclass_of("a"));
        assert_eq!(b.static_value("COUNT").and_then(|v| v.as_short()), Some(0x0102));
        assert!(b.static_value("MISSING").is_none());
    }

    #[test]
    fn primitive_array_access() {
        let array = PrimitiveArray {
            header: ObjectHeader::new(ObjectId(5), HeapType::Unknown),
            element_type: JvmType::Char,
            stack_trace_serial: 0,
            length: 2,
            data: vec![0x00, 0x48, 0x00, 0x69],
            id_size: IdSize::Four,
        };
        assert_eq!(array.chars().as_deref(), Some("Hi"));
        assert_eq!(array.get(1).and_then(|v| v.as_char()), Some(0x69));
        assert!(array.get(2).is_none());
        assert_eq!(array.iter().count(), 2);

        let item = HeapItem::PrimitiveArray(array);
        assert_eq!(item.class_name().as_deref(), Some("char[]"));
        assert!(item.instance_of("char[]"));
        assert!(item.class().is_none());
    }
}
