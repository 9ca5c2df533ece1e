//! Synthetic HPROF writer for tests.
//!
//! Produces byte streams in the same layout the decoder reads. Only compiled
//! for this crate's tests or with the `synth` feature.

use hprof_core::{GcRoot, IdSize, JvmType, RootPayload};

use crate::decoder::SIGNATURE_1_0_3;
use crate::tags::{HeapTag, RecordTag};

#[derive(Debug, Clone)]
pub struct HprofWriter {
    buf: Vec<u8>,
    id_size: IdSize,
}

impl HprofWriter {
    /// Starts a `JAVA PROFILE 1.0.3` dump with a zero timestamp.
    pub fn new(id_size: IdSize) -> Self {
        Self::with_header(SIGNATURE_1_0_3.as_bytes(), id_size, 0)
    }

    pub fn with_header(signature: &[u8], id_size: IdSize, timestamp_ms: u64) -> Self {
        let mut buf = Vec::new();
        buf.extend_from_slice(signature);
        buf.push(0);
        push_u32(&mut buf, id_size.bytes() as u32);
        push_u64(&mut buf, timestamp_ms);
        Self { buf, id_size }
    }

    pub fn id_size(&self) -> IdSize {
        self.id_size
    }

    /// Appends one top-level record with an arbitrary tag and payload.
    pub fn record(&mut self, tag: u8, payload: &[u8]) -> &mut Self {
        self.buf.push(tag);
        push_u32(&mut self.buf, 0);
        push_u32(&mut self.buf, payload.len() as u32);
        self.buf.extend_from_slice(payload);
        self
    }

    pub fn string(&mut self, id: u64, text: &str) -> &mut Self {
        let mut p = Vec::new();
        push_id(&mut p, self.id_size, id);
        p.extend_from_slice(text.as_bytes());
        self.record(RecordTag::Utf8String.to_u8(), &p)
    }

    pub fn load_class(&mut self, serial: u32, class_id: u64, name_id: u64) -> &mut Self {
        let mut p = Vec::new();
        push_u32(&mut p, serial);
        push_id(&mut p, self.id_size, class_id);
        push_u32(&mut p, 0);
        push_id(&mut p, self.id_size, name_id);
        self.record(RecordTag::LoadClass.to_u8(), &p)
    }

    pub fn stack_frame(&mut self, frame_id: u64, method_name_id: u64, line: i32) -> &mut Self {
        let mut p = Vec::new();
        push_id(&mut p, self.id_size, frame_id);
        push_id(&mut p, self.id_size, method_name_id);
        push_id(&mut p, self.id_size, 0);
        push_id(&mut p, self.id_size, 0);
        push_u32(&mut p, 0);
        p.extend_from_slice(&line.to_be_bytes());
        self.record(RecordTag::StackFrame.to_u8(), &p)
    }

    pub fn stack_trace(&mut self, serial: u32, thread_serial: u32, frames: &[u64]) -> &mut Self {
        let mut p = Vec::new();
        push_u32(&mut p, serial);
        push_u32(&mut p, thread_serial);
        push_u32(&mut p, frames.len() as u32);
        for f in frames {
            push_id(&mut p, self.id_size, *f);
        }
        self.record(RecordTag::StackTrace.to_u8(), &p)
    }

    pub fn heap_segment(&mut self, build: impl FnOnce(&mut SegmentWriter)) -> &mut Self {
        let mut seg = SegmentWriter {
            buf: Vec::new(),
            id_size: self.id_size,
        };
        build(&mut seg);
        self.record(RecordTag::HeapDumpSegment.to_u8(), &seg.buf)
    }

    pub fn heap_dump_end(&mut self) -> &mut Self {
        self.record(RecordTag::HeapDumpEnd.to_u8(), &[])
    }

    /// Raw bytes appended with no record framing.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn finish(&self) -> Vec<u8> {
        self.buf.clone()
    }
}

/// Field declarations of one synthetic class dump.
#[derive(Debug, Clone, Default)]
pub struct ClassDef {
    pub id: u64,
    pub super_id: u64,
    pub class_loader_id: u64,
    pub instance_size: u32,
    pub statics: Vec<(u64, JvmType, Vec<u8>)>,
    pub fields: Vec<(u64, JvmType)>,
}

impl ClassDef {
    pub fn new(id: u64, super_id: u64) -> Self {
        Self {
            id,
            super_id,
            ..Self::default()
        }
    }

    pub fn field(mut self, name_id: u64, ty: JvmType) -> Self {
        self.fields.push((name_id, ty));
        self
    }

    pub fn static_field(mut self, name_id: u64, ty: JvmType, value: &[u8]) -> Self {
        self.statics.push((name_id, ty, value.to_vec()));
        self
    }

    pub fn instance_size(mut self, size: u32) -> Self {
        self.instance_size = size;
        self
    }
}

#[derive(Debug)]
pub struct SegmentWriter {
    buf: Vec<u8>,
    id_size: IdSize,
}

impl SegmentWriter {
    pub fn id_size(&self) -> IdSize {
        self.id_size
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn class_dump(&mut self, class: &ClassDef) -> &mut Self {
        let ids = self.id_size;
        self.buf.push(HeapTag::ClassDump.to_u8());
        push_id(&mut self.buf, ids, class.id);
        push_u32(&mut self.buf, 0);
        push_id(&mut self.buf, ids, class.super_id);
        push_id(&mut self.buf, ids, class.class_loader_id);
        for _ in 0..4 {
            push_id(&mut self.buf, ids, 0);
        }
        push_u32(&mut self.buf, class.instance_size);
        push_u16(&mut self.buf, 0);
        push_u16(&mut self.buf, class.statics.len() as u16);
        for (name, ty, value) in &class.statics {
            push_id(&mut self.buf, ids, *name);
            self.buf.push(ty.to_u8());
            self.buf.extend_from_slice(value);
        }
        push_u16(&mut self.buf, class.fields.len() as u16);
        for (name, ty) in &class.fields {
            push_id(&mut self.buf, ids, *name);
            self.buf.push(ty.to_u8());
        }
        self
    }

    pub fn instance_dump(&mut self, id: u64, class_id: u64, data: &[u8]) -> &mut Self {
        let ids = self.id_size;
        self.buf.push(HeapTag::InstanceDump.to_u8());
        push_id(&mut self.buf, ids, id);
        push_u32(&mut self.buf, 0);
        push_id(&mut self.buf, ids, class_id);
        push_u32(&mut self.buf, data.len() as u32);
        self.buf.extend_from_slice(data);
        self
    }

    pub fn object_array(&mut self, id: u64, class_id: u64, elements: &[u64]) -> &mut Self {
        let ids = self.id_size;
        self.buf.push(HeapTag::ObjectArrayDump.to_u8());
        push_id(&mut self.buf, ids, id);
        push_u32(&mut self.buf, 0);
        push_u32(&mut self.buf, elements.len() as u32);
        push_id(&mut self.buf, ids, class_id);
        for e in elements {
            push_id(&mut self.buf, ids, *e);
        }
        self
    }

    /// `data` must hold `length * element width` bytes.
    pub fn primitive_array(&mut self, id: u64, ty: JvmType, length: u32, data: &[u8]) -> &mut Self {
        let ids = self.id_size;
        self.buf.push(HeapTag::PrimitiveArrayDump.to_u8());
        push_id(&mut self.buf, ids, id);
        push_u32(&mut self.buf, 0);
        push_u32(&mut self.buf, length);
        self.buf.push(ty.to_u8());
        self.buf.extend_from_slice(data);
        self
    }

    /// A `char[]` holding the UTF-16 encoding of `text`.
    pub fn char_array(&mut self, id: u64, text: &str) -> &mut Self {
        let units: Vec<u16> = text.encode_utf16().collect();
        let mut data = Vec::with_capacity(units.len() * 2);
        for u in &units {
            push_u16(&mut data, *u);
        }
        self.primitive_array(id, JvmType::Char, units.len() as u32, &data)
    }

    pub fn primitive_array_no_data(&mut self, id: u64) -> &mut Self {
        let ids = self.id_size;
        self.buf.push(HeapTag::PrimitiveArrayNoDataDump.to_u8());
        push_id(&mut self.buf, ids, id);
        self.buf.extend_from_slice(&[0u8; 5]);
        self
    }

    pub fn root(&mut self, root: &GcRoot) -> &mut Self {
        let ids = self.id_size;
        self.buf.push(root.kind.sub_tag());
        push_id(&mut self.buf, ids, root.object_id.get());
        match root.kind.payload() {
            RootPayload::None => {}
            RootPayload::JniRef => {
                push_id(&mut self.buf, ids, root.jni_ref.map_or(0, |r| r.get()));
            }
            RootPayload::Thread => push_u32(&mut self.buf, root.thread_serial.unwrap_or(0)),
            RootPayload::ThreadAndFrame | RootPayload::ThreadAndStackTrace => {
                push_u32(&mut self.buf, root.thread_serial.unwrap_or(0));
                push_u32(&mut self.buf, root.frame.unwrap_or(0));
            }
        }
        self
    }

    pub fn heap_info(&mut self, heap_id: u32, name_id: u64) -> &mut Self {
        let ids = self.id_size;
        self.buf.push(HeapTag::HeapDumpInfo.to_u8());
        push_u32(&mut self.buf, heap_id);
        push_id(&mut self.buf, ids, name_id);
        self
    }
}

/// Big-endian encodings of field values, for building instance data blobs.
pub fn id_bytes(id_size: IdSize, v: u64) -> Vec<u8> {
    let mut out = Vec::new();
    push_id(&mut out, id_size, v);
    out
}

pub fn push_id(buf: &mut Vec<u8>, id_size: IdSize, v: u64) {
    match id_size {
        IdSize::Four => push_u32(buf, v as u32),
        IdSize::Eight => push_u64(buf, v),
    }
}

pub fn push_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_be_bytes());
}

pub fn push_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

pub fn push_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_be_bytes());
}
