use hprof_core::{FieldValue, GcRoot, HeapType, IdSize, JvmType, ObjectId};
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadClassRecord {
    pub serial: u32,
    pub class_id: ObjectId,
    pub stack_trace_serial: u32,
    pub name_id: ObjectId,
}

/// Instance field declaration as it appears in a class dump. `offset` is
/// relative to the start of this class's own field block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRecord {
    pub name_id: ObjectId,
    pub ty: JvmType,
    pub offset: usize,
}

/// Static field declaration; `offset` indexes the class's static data blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticFieldRecord {
    pub name_id: ObjectId,
    pub ty: JvmType,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDumpRecord {
    pub id: ObjectId,
    pub stack_trace_serial: u32,
    pub super_id: ObjectId,
    pub class_loader_id: ObjectId,
    /// Instance size declared by the producer (may include object header bytes).
    pub instance_size: u32,
    pub static_fields: Vec<StaticFieldRecord>,
    pub static_data: Vec<u8>,
    pub fields: Vec<FieldRecord>,
    pub heap: HeapType,
}

impl ClassDumpRecord {
    /// Bytes occupied by this class's own instance fields.
    pub fn fields_size(&self, id_size: IdSize) -> usize {
        self.fields.iter().map(|f| f.ty.size(id_size)).sum()
    }

    pub fn static_value(&self, index: usize, id_size: IdSize) -> Option<FieldValue<'_>> {
        let spec = self.static_fields.get(index)?;
        FieldValue::at(spec.ty, &self.static_data, spec.offset, id_size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceDumpRecord {
    pub id: ObjectId,
    pub stack_trace_serial: u32,
    pub class_id: ObjectId,
    pub data: Vec<u8>,
    pub heap: HeapType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectArrayRecord {
    pub id: ObjectId,
    pub stack_trace_serial: u32,
    /// Class of the array as written by the producer (the element class on
    /// producers that do not dump array classes).
    pub class_id: ObjectId,
    pub elements: Vec<ObjectId>,
    pub heap: HeapType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimitiveArrayRecord {
    pub id: ObjectId,
    pub stack_trace_serial: u32,
    pub element_type: JvmType,
    pub length: u32,
    pub data: Vec<u8>,
    pub heap: HeapType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapInfoRecord {
    pub heap: HeapType,
    pub heap_id: u32,
    pub name_id: ObjectId,
}

/// Number of records of each kind seen while decoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordCounts {
    pub strings: u64,
    pub load_classes: u64,
    pub stack_frames: u64,
    pub stack_traces: u64,
    pub heap_segments: u64,
    pub classes: u64,
    pub instances: u64,
    pub object_arrays: u64,
    pub primitive_arrays: u64,
    pub primitive_arrays_no_data: u64,
    pub roots: u64,
    pub heap_infos: u64,
}

/// The flat, unresolved output of one decode pass.
#[derive(Debug, Clone)]
pub struct DecodedDump {
    pub signature: String,
    pub id_size: IdSize,
    pub timestamp_ms: u64,
    pub strings: HashMap<ObjectId, String>,
    /// Keyed by class id; may name classes whose dump appears before or after.
    pub load_classes: HashMap<ObjectId, LoadClassRecord>,
    pub classes: Vec<ClassDumpRecord>,
    pub instances: Vec<InstanceDumpRecord>,
    pub object_arrays: Vec<ObjectArrayRecord>,
    pub primitive_arrays: Vec<PrimitiveArrayRecord>,
    pub roots: Vec<GcRoot>,
    pub heap_infos: Vec<HeapInfoRecord>,
    pub counts: RecordCounts,
}

impl DecodedDump {
    pub fn new(signature: String, id_size: IdSize, timestamp_ms: u64) -> Self {
        Self {
            signature,
            id_size,
            timestamp_ms,
            strings: HashMap::new(),
            load_classes: HashMap::new(),
            classes: Vec::new(),
            instances: Vec::new(),
            object_arrays: Vec::new(),
            primitive_arrays: Vec::new(),
            roots: Vec::new(),
            heap_infos: Vec::new(),
            counts: RecordCounts::default(),
        }
    }

    pub fn created_at(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.timestamp_ms)
    }

    pub fn string(&self, id: ObjectId) -> Option<&str> {
        self.strings.get(&id).map(String::as_str)
    }

    /// Name of a class as announced by its `LOAD CLASS` record.
    pub fn class_name(&self, class_id: ObjectId) -> Option<&str> {
        let load = self.load_classes.get(&class_id)?;
        self.string(load.name_id)
    }

    /// Name of a heap as announced by `HEAP DUMP INFO`.
    pub fn heap_name(&self, heap: HeapType) -> Option<&str> {
        self.heap_infos
            .iter()
            .rev()
            .find(|h| h.heap == heap)
            .and_then(|h| self.string(h.name_id))
    }

    /// Total number of heap items (classes, instances and arrays).
    pub fn item_count(&self) -> usize {
        self.classes.len()
            + self.instances.len()
            + self.object_arrays.len()
            + self.primitive_arrays.len()
    }
}
