use hprof_core::error::{Error, FormatError};
use hprof_core::{GcRoot, HeapType, IdSize, JvmType, RootKind, RootPayload};
use std::io::Read;
use tracing::{debug, info, trace};

use crate::options::{DecodeOptions, HeapInfoPolicy};
use crate::progress::{ProgressSink, ProgressTracker, Stage};
use crate::reader::{ByteReader, SectionReader};
use crate::records::{
    ClassDumpRecord, DecodedDump, FieldRecord, HeapInfoRecord, InstanceDumpRecord,
    LoadClassRecord, ObjectArrayRecord, PrimitiveArrayRecord, StaticFieldRecord,
};
use crate::tags::{HeapTag, RecordTag};

pub const SIGNATURE_1_0_3: &str = "JAVA PROFILE 1.0.3";

/// Longest signature accepted before the terminating NUL.
pub const MAX_SIGNATURE_LEN: usize = 18;

/// Bytes following the id of a `PRIMITIVE ARRAY NODATA DUMP`.
const NODATA_TAIL_LEN: u64 = 5;

/// Reserved ids in a class dump after the class loader (signers, protection
/// domain, two reserved slots).
const CLASS_DUMP_RESERVED_IDS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HprofVersion {
    V1_0_3,
}

impl HprofVersion {
    pub fn from_signature(signature: &str) -> Option<Self> {
        match signature {
            SIGNATURE_1_0_3 => Some(Self::V1_0_3),
            _ => None,
        }
    }

    pub fn signature(self) -> &'static str {
        match self {
            Self::V1_0_3 => SIGNATURE_1_0_3,
        }
    }
}

/// Returns the record decoder for a magic signature, if one exists.
pub fn decoder_for_signature(signature: &str, options: DecodeOptions) -> Option<RecordDecoder> {
    HprofVersion::from_signature(signature).map(|version| RecordDecoder { version, options })
}

/// Reads the NUL-terminated magic string at the start of a dump.
///
/// Empty, over-long and unterminated signatures are reported as unsupported.
pub fn read_signature<R: Read>(reader: &mut ByteReader<R>) -> Result<String, Error> {
    let mut raw = Vec::with_capacity(MAX_SIGNATURE_LEN + 1);
    loop {
        let b = reader.read_u8();
        if reader.is_eof() {
            if let Some(e) = reader.take_io_error() {
                return Err(e.into());
            }
            return Err(unsupported(&raw));
        }
        if b == 0 {
            break;
        }
        raw.push(b);
        if raw.len() > MAX_SIGNATURE_LEN {
            return Err(unsupported(&raw));
        }
    }
    if raw.is_empty() || !raw.is_ascii() {
        return Err(unsupported(&raw));
    }
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

fn unsupported(raw: &[u8]) -> Error {
    FormatError::UnsupportedSignature(String::from_utf8_lossy(raw).into_owned()).into()
}

/// Decodes the record stream that follows a recognised signature.
#[derive(Debug, Clone, Copy)]
pub struct RecordDecoder {
    version: HprofVersion,
    options: DecodeOptions,
}

impl RecordDecoder {
    pub fn version(&self) -> HprofVersion {
        self.version
    }

    pub fn options(&self) -> DecodeOptions {
        self.options
    }

    /// Decodes everything after the signature. The reader must be positioned
    /// just past the signature's NUL byte.
    pub fn decode<R: Read>(
        &self,
        reader: &mut ByteReader<R>,
        progress: &mut dyn ProgressSink,
    ) -> Result<DecodedDump, Error> {
        let id_size = read_id_size(reader)?;
        let timestamp_ms = reader.read_u64();
        if reader.is_eof() {
            return Err(header_error(reader, "creation timestamp"));
        }
        debug!(
            signature = self.version.signature(),
            id_size = id_size.bytes(),
            timestamp_ms,
            "Accepted HPROF header"
        );

        let mut state = DecodeState {
            dump: DecodedDump::new(self.version.signature().to_string(), id_size, timestamp_ms),
            heap: HeapMarkers::new(self.options.heap_info),
            tracker: ProgressTracker::new(Stage::Decode, reader.total().unwrap_or(0)),
        };
        state.tracker.update(reader.position(), progress);

        loop {
            let at = reader.position();
            let tag_byte = reader.read_u8();
            if reader.is_eof() {
                if let Some(e) = reader.take_io_error() {
                    return Err(e.into());
                }
                break;
            }
            let _time_delta = reader.read_u32();
            let length = reader.read_u32();
            if reader.is_eof() {
                if let Some(e) = reader.take_io_error() {
                    return Err(e.into());
                }
                return Err(FormatError::UnexpectedEof {
                    record: "record header",
                    at,
                }
                .into());
            }

            let tag = RecordTag::from_u8(tag_byte)
                .ok_or(FormatError::UnknownTag { tag: tag_byte, at })?;
            if !tag.is_supported() {
                return Err(FormatError::UnsupportedTag {
                    tag: tag_byte,
                    name: tag.name(),
                    at,
                }
                .into());
            }
            trace!(tag = tag.name(), at, length, "Record");

            let mut section = SectionReader::new(reader, u64::from(length), id_size);
            state.decode_record(tag, &mut section, progress)?;
            section.finish(tag.name())?;
            if section.remaining() > 0 {
                debug!(
                    tag = tag.name(),
                    at,
                    trailing = section.remaining(),
                    "Skipping trailing record bytes"
                );
                section.skip_all();
                section.finish(tag.name())?;
            }
            state.tracker.update(reader.position(), progress);
        }

        state.tracker.finish(progress);
        let counts = state.dump.counts;
        info!(
            strings = counts.strings,
            classes = counts.classes,
            instances = counts.instances,
            object_arrays = counts.object_arrays,
            primitive_arrays = counts.primitive_arrays,
            roots = counts.roots,
            segments = counts.heap_segments,
            "Decoded HPROF records"
        );
        Ok(state.dump)
    }
}

fn read_id_size<R: Read>(reader: &mut ByteReader<R>) -> Result<IdSize, Error> {
    let raw = reader.read_u32();
    if reader.is_eof() {
        return Err(header_error(reader, "identifier size"));
    }
    IdSize::from_u32(raw).ok_or_else(|| FormatError::InvalidIdSize(raw).into())
}

fn header_error<R: Read>(reader: &mut ByteReader<R>, field: &'static str) -> Error {
    match reader.take_io_error() {
        Some(e) => e.into(),
        None => FormatError::TruncatedHeader { field }.into(),
    }
}

#[derive(Debug, Clone, Copy)]
enum Pending {
    Class(usize),
    Instance(usize),
    ObjectArray(usize),
    PrimitiveArray(usize),
}

/// Tracks `HEAP DUMP INFO` markers and the records they apply to.
#[derive(Debug)]
struct HeapMarkers {
    policy: HeapInfoPolicy,
    current: HeapType,
    pending: Vec<Pending>,
}

impl HeapMarkers {
    fn new(policy: HeapInfoPolicy) -> Self {
        Self {
            policy,
            current: HeapType::Unknown,
            pending: Vec::new(),
        }
    }

    fn track(&mut self, item: Pending) {
        if self.policy == HeapInfoPolicy::Retroactive {
            self.pending.push(item);
        }
    }

    fn marker(&mut self, heap: HeapType, dump: &mut DecodedDump) {
        for item in self.pending.drain(..) {
            match item {
                Pending::Class(i) => dump.classes[i].heap = heap,
                Pending::Instance(i) => dump.instances[i].heap = heap,
                Pending::ObjectArray(i) => dump.object_arrays[i].heap = heap,
                Pending::PrimitiveArray(i) => dump.primitive_arrays[i].heap = heap,
            }
        }
        self.current = heap;
    }

    fn end_segment(&mut self) {
        // Records after the segment's last marker were stamped with it on decode.
        self.pending.clear();
    }
}

struct DecodeState {
    dump: DecodedDump,
    heap: HeapMarkers,
    tracker: ProgressTracker,
}

impl DecodeState {
    fn decode_record<R: Read>(
        &mut self,
        tag: RecordTag,
        section: &mut SectionReader<'_, R>,
        progress: &mut dyn ProgressSink,
    ) -> Result<(), Error> {
        match tag {
            RecordTag::Utf8String => {
                let id = section.read_id();
                let bytes = section.read_bytes(section.remaining());
                if !section.is_error_occurred() {
                    self.dump
                        .strings
                        .insert(id, String::from_utf8_lossy(&bytes).into_owned());
                    self.dump.counts.strings += 1;
                }
            }
            RecordTag::LoadClass => {
                let record = LoadClassRecord {
                    serial: section.read_u32(),
                    class_id: section.read_id(),
                    stack_trace_serial: section.read_u32(),
                    name_id: section.read_id(),
                };
                if !section.is_error_occurred() {
                    self.dump.load_classes.insert(record.class_id, record);
                    self.dump.counts.load_classes += 1;
                }
            }
            RecordTag::StackFrame => {
                section.skip_all();
                self.dump.counts.stack_frames += 1;
            }
            RecordTag::StackTrace => {
                let _serial = section.read_u32();
                let _thread_serial = section.read_u32();
                let frames = section.read_u32();
                for _ in 0..frames {
                    section.read_id();
                    if section.is_error_occurred() {
                        break;
                    }
                }
                self.dump.counts.stack_traces += 1;
            }
            RecordTag::HeapDump | RecordTag::HeapDumpSegment => {
                self.dump.counts.heap_segments += 1;
                let result = self.decode_heap_segment(section, progress);
                self.heap.end_segment();
                result?;
            }
            RecordTag::HeapDumpEnd => section.skip_all(),
            RecordTag::UnloadClass
            | RecordTag::AllocSites
            | RecordTag::HeapSummary
            | RecordTag::StartThread
            | RecordTag::EndThread
            | RecordTag::CpuSamples
            | RecordTag::ControlSettings => {
                return Err(FormatError::UnsupportedTag {
                    tag: tag.to_u8(),
                    name: tag.name(),
                    at: section.position(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn decode_heap_segment<R: Read>(
        &mut self,
        section: &mut SectionReader<'_, R>,
        progress: &mut dyn ProgressSink,
    ) -> Result<(), Error> {
        while section.remaining() > 0 {
            let at = section.position();
            let raw = section.read_u8();
            section.finish(RecordTag::HeapDumpSegment.name())?;
            let tag = HeapTag::from_u8(raw).ok_or(FormatError::UnknownSubTag { tag: raw, at })?;

            match tag {
                HeapTag::Root(kind) => self.decode_root(kind, section),
                HeapTag::ClassDump => self.decode_class_dump(section)?,
                HeapTag::InstanceDump => self.decode_instance_dump(section),
                HeapTag::ObjectArrayDump => self.decode_object_array(section),
                HeapTag::PrimitiveArrayDump => self.decode_primitive_array(section)?,
                HeapTag::PrimitiveArrayNoDataDump => {
                    let _id = section.read_id();
                    section.skip(NODATA_TAIL_LEN);
                    self.dump.counts.primitive_arrays_no_data += 1;
                }
                HeapTag::HeapDumpInfo => self.decode_heap_info(section),
            }
            section.finish(tag.name())?;
            self.tracker.update(section.position(), progress);
        }
        Ok(())
    }

    fn decode_root<R: Read>(&mut self, kind: RootKind, section: &mut SectionReader<'_, R>) {
        let mut root = GcRoot::new(kind, section.read_id());
        match kind.payload() {
            RootPayload::None => {}
            RootPayload::JniRef => root.jni_ref = Some(section.read_id()),
            RootPayload::Thread => root.thread_serial = Some(section.read_u32()),
            RootPayload::ThreadAndFrame | RootPayload::ThreadAndStackTrace => {
                root.thread_serial = Some(section.read_u32());
                root.frame = Some(section.read_u32());
            }
        }
        if !section.is_error_occurred() {
            self.dump.roots.push(root);
            self.dump.counts.roots += 1;
        }
    }

    fn decode_class_dump<R: Read>(&mut self, section: &mut SectionReader<'_, R>) -> Result<(), Error> {
        const RECORD: &str = "CLASS DUMP";
        let id_size = section.id_size();

        let id = section.read_id();
        let stack_trace_serial = section.read_u32();
        let super_id = section.read_id();
        let class_loader_id = section.read_id();
        for _ in 0..CLASS_DUMP_RESERVED_IDS {
            section.read_id();
        }
        let instance_size = section.read_u32();

        // Always empty on Android; entries are consumed but not kept.
        let constant_pool = section.read_u16();
        for _ in 0..constant_pool {
            let _index = section.read_u16();
            let ty = read_type(section, RECORD)?;
            section.skip(ty.size(id_size) as u64);
        }

        let static_count = section.read_u16();
        let mut static_fields = Vec::with_capacity(usize::from(static_count));
        let mut static_data = Vec::new();
        for _ in 0..static_count {
            let name_id = section.read_id();
            let ty = read_type(section, RECORD)?;
            let value = section.read_bytes(ty.size(id_size) as u64);
            section.finish(RECORD)?;
            static_fields.push(StaticFieldRecord {
                name_id,
                ty,
                offset: static_data.len(),
            });
            static_data.extend_from_slice(&value);
        }

        let field_count = section.read_u16();
        let mut fields = Vec::with_capacity(usize::from(field_count));
        let mut offset = 0usize;
        for _ in 0..field_count {
            let name_id = section.read_id();
            let ty = read_type(section, RECORD)?;
            fields.push(FieldRecord {
                name_id,
                ty,
                offset,
            });
            offset += ty.size(id_size);
        }
        section.finish(RECORD)?;

        self.dump.classes.push(ClassDumpRecord {
            id,
            stack_trace_serial,
            super_id,
            class_loader_id,
            instance_size,
            static_fields,
            static_data,
            fields,
            heap: self.heap.current,
        });
        self.heap.track(Pending::Class(self.dump.classes.len() - 1));
        self.dump.counts.classes += 1;
        Ok(())
    }

    fn decode_instance_dump<R: Read>(&mut self, section: &mut SectionReader<'_, R>) {
        let id = section.read_id();
        let stack_trace_serial = section.read_u32();
        let class_id = section.read_id();
        let size = section.read_u32();
        let data = section.read_bytes(u64::from(size));
        if section.is_error_occurred() {
            return;
        }
        self.dump.instances.push(InstanceDumpRecord {
            id,
            stack_trace_serial,
            class_id,
            data,
            heap: self.heap.current,
        });
        self.heap
            .track(Pending::Instance(self.dump.instances.len() - 1));
        self.dump.counts.instances += 1;
    }

    fn decode_object_array<R: Read>(&mut self, section: &mut SectionReader<'_, R>) {
        let id = section.read_id();
        let stack_trace_serial = section.read_u32();
        let length = section.read_u32();
        let class_id = section.read_id();

        let id_bytes = section.id_size().bytes() as u64;
        let fits = section.remaining() / id_bytes;
        let capacity = usize::try_from(u64::from(length).min(fits)).unwrap_or(0);
        let mut elements = Vec::with_capacity(capacity);
        for _ in 0..length {
            elements.push(section.read_id());
            if section.is_error_occurred() {
                return;
            }
        }
        if section.is_error_occurred() {
            return;
        }
        self.dump.object_arrays.push(ObjectArrayRecord {
            id,
            stack_trace_serial,
            class_id,
            elements,
            heap: self.heap.current,
        });
        self.heap
            .track(Pending::ObjectArray(self.dump.object_arrays.len() - 1));
        self.dump.counts.object_arrays += 1;
    }

    fn decode_primitive_array<R: Read>(
        &mut self,
        section: &mut SectionReader<'_, R>,
    ) -> Result<(), Error> {
        const RECORD: &str = "PRIMITIVE ARRAY DUMP";
        let id = section.read_id();
        let stack_trace_serial = section.read_u32();
        let length = section.read_u32();
        let element_type = read_type(section, RECORD)?;
        let size = u64::from(length) * element_type.size(section.id_size()) as u64;
        let data = section.read_bytes(size);
        section.finish(RECORD)?;

        self.dump.primitive_arrays.push(PrimitiveArrayRecord {
            id,
            stack_trace_serial,
            element_type,
            length,
            data,
            heap: self.heap.current,
        });
        self.heap
            .track(Pending::PrimitiveArray(self.dump.primitive_arrays.len() - 1));
        self.dump.counts.primitive_arrays += 1;
        Ok(())
    }

    fn decode_heap_info<R: Read>(&mut self, section: &mut SectionReader<'_, R>) {
        let heap_id = section.read_u32();
        let name_id = section.read_id();
        if section.is_error_occurred() {
            return;
        }
        let heap = HeapType::from_heap_id(heap_id);
        self.dump.heap_infos.push(HeapInfoRecord {
            heap,
            heap_id,
            name_id,
        });
        self.heap.marker(heap, &mut self.dump);
        self.dump.counts.heap_infos += 1;
    }
}

fn read_type<R: Read>(
    section: &mut SectionReader<'_, R>,
    record: &'static str,
) -> Result<JvmType, Error> {
    let at = section.position();
    let raw = section.read_u8();
    section.finish(record)?;
    JvmType::from_u8(raw).ok_or_else(|| {
        FormatError::InvalidJvmType {
            value: raw,
            record,
            at,
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::synth::{id_bytes, ClassDef, HprofWriter};
    use crate::{decode_bytes, decode_path};
    use hprof_core::ObjectId;

    fn decode_ok(bytes: &[u8]) -> DecodedDump {
        decode_bytes(bytes, DecodeOptions::default(), &mut NoProgress).unwrap()
    }

    fn decode_err(bytes: &[u8]) -> Error {
        decode_bytes(bytes, DecodeOptions::default(), &mut NoProgress).unwrap_err()
    }

    #[test]
    fn empty_record_stream_is_valid() {
        let bytes = HprofWriter::with_header(SIGNATURE_1_0_3.as_bytes(), IdSize::Four, 1234).finish();
        let dump = decode_ok(&bytes);
        assert_eq!(dump.signature, SIGNATURE_1_0_3);
        assert_eq!(dump.id_size, IdSize::Four);
        assert_eq!(dump.timestamp_ms, 1234);
        assert_eq!(dump.item_count(), 0);
    }

    #[test]
    fn load_class_may_precede_or_follow_strings() {
        let bytes = HprofWriter::new(IdSize::Four)
            .load_class(1, 0x100, 0x10)
            .string(0x10, "com.example.Foo")
            .string(0x11, "com.example.Bar")
            .load_class(2, 0x200, 0x11)
            .finish();
        let dump = decode_ok(&bytes);
        assert_eq!(dump.counts.strings, 2);
        assert_eq!(dump.counts.load_classes, 2);
        assert_eq!(dump.class_name(ObjectId(0x100)), Some("com.example.Foo"));
        assert_eq!(dump.class_name(ObjectId(0x200)), Some("com.example.Bar"));
        assert_eq!(dump.load_classes[&ObjectId(0x200)].serial, 2);
    }

    #[test]
    fn class_dump_keeps_field_order_and_offsets() {
        let class = ClassDef::new(0x100, 0x50)
            .instance_size(14)
            .static_field(0x21, JvmType::Int, &7i32.to_be_bytes())
            .static_field(0x22, JvmType::Object, &id_bytes(IdSize::Four, 0x999))
            .field(0x31, JvmType::Int)
            .field(0x32, JvmType::Byte)
            .field(0x33, JvmType::Long);
        let bytes = HprofWriter::new(IdSize::Four)
            .heap_segment(|s| {
                s.class_dump(&class);
            })
            .finish();
        let dump = decode_ok(&bytes);
        assert_eq!(dump.classes.len(), 1);
        let c = &dump.classes[0];
        assert_eq!(c.id, ObjectId(0x100));
        assert_eq!(c.super_id, ObjectId(0x50));
        assert_eq!(c.instance_size, 14);

        assert_eq!(c.static_fields.len(), 2);
        assert_eq!(c.static_fields[0].name_id, ObjectId(0x21));
        assert_eq!(c.static_fields[1].ty, JvmType::Object);
        assert_eq!(c.static_value(0, IdSize::Four).unwrap().as_int(), Some(7));
        assert_eq!(
            c.static_value(1, IdSize::Four).unwrap().as_object(),
            Some(ObjectId(0x999))
        );

        assert_eq!(c.fields.len(), 3);
        let layout: Vec<(u64, JvmType, usize)> = c
            .fields
            .iter()
            .map(|f| (f.name_id.get(), f.ty, f.offset))
            .collect();
        assert_eq!(
            layout,
            vec![
                (0x31, JvmType::Int, 0),
                (0x32, JvmType::Byte, 4),
                (0x33, JvmType::Long, 5)
            ]
        );
        assert_eq!(c.fields_size(IdSize::Four), 13);
    }

    #[test]
    fn instances_and_arrays_are_copied_verbatim() {
        let bytes = HprofWriter::new(IdSize::Eight)
            .heap_segment(|s| {
                s.instance_dump(0x1000, 0x100, &[1, 2, 3, 4, 5])
                    .object_array(0x2000, 0x300, &[0x1000, 0, 0x1000])
                    .primitive_array(0x3000, JvmType::Short, 2, &[0, 1, 0xff, 0xff])
                    .char_array(0x4000, "Hi");
            })
            .finish();
        let dump = decode_ok(&bytes);
        assert_eq!(dump.instances[0].data, vec![1, 2, 3, 4, 5]);
        assert_eq!(dump.instances[0].class_id, ObjectId(0x100));
        assert_eq!(
            dump.object_arrays[0].elements,
            vec![ObjectId(0x1000), ObjectId(0), ObjectId(0x1000)]
        );
        assert_eq!(dump.object_arrays[0].class_id, ObjectId(0x300));
        let shorts = &dump.primitive_arrays[0];
        assert_eq!(shorts.element_type, JvmType::Short);
        assert_eq!(shorts.length, 2);
        assert_eq!(shorts.data, vec![0, 1, 0xff, 0xff]);
        let chars = &dump.primitive_arrays[1];
        assert_eq!(chars.data, vec![0x00, 0x48, 0x00, 0x69]);
    }

    #[test]
    fn decodes_every_root_layout() {
        let mut jni = GcRoot::new(RootKind::JniGlobal, ObjectId(1));
        jni.jni_ref = Some(ObjectId(0xaa));
        let mut frame = GcRoot::new(RootKind::JavaFrame, ObjectId(2));
        frame.thread_serial = Some(3);
        frame.frame = Some(4);
        let mut block = GcRoot::new(RootKind::ThreadBlock, ObjectId(3));
        block.thread_serial = Some(9);
        let mut thread = GcRoot::new(RootKind::ThreadObject, ObjectId(4));
        thread.thread_serial = Some(1);
        thread.frame = Some(2);
        let sticky = GcRoot::new(RootKind::StickyClass, ObjectId(5));
        let unreachable = GcRoot::new(RootKind::Unreachable, ObjectId(6));
        let roots = [jni, frame, block, thread, sticky, unreachable];

        let bytes = HprofWriter::new(IdSize::Four)
            .heap_segment(|s| {
                for r in &roots {
                    s.root(r);
                }
            })
            .finish();
        let dump = decode_ok(&bytes);
        assert_eq!(dump.roots, roots.to_vec());
    }

    #[test]
    fn stack_records_are_consumed() {
        let bytes = HprofWriter::new(IdSize::Four)
            .stack_frame(0x70, 0x71, 12)
            .stack_trace(1, 1, &[0x70, 0x70])
            .string(0x71, "run")
            .finish();
        let dump = decode_ok(&bytes);
        assert_eq!(dump.counts.stack_frames, 1);
        assert_eq!(dump.counts.stack_traces, 1);
        assert_eq!(dump.string(ObjectId(0x71)), Some("run"));
    }

    #[test]
    fn nodata_arrays_are_skipped() {
        let bytes = HprofWriter::new(IdSize::Four)
            .heap_segment(|s| {
                s.primitive_array_no_data(0x10).instance_dump(0x20, 0x1, &[]);
            })
            .finish();
        let dump = decode_ok(&bytes);
        assert_eq!(dump.primitive_arrays.len(), 0);
        assert_eq!(dump.counts.primitive_arrays_no_data, 1);
        assert_eq!(dump.instances.len(), 1);
    }

    #[test]
    fn legacy_heap_dump_and_end_records() {
        let mut seg = Vec::new();
        seg.push(HeapTag::InstanceDump.to_u8());
        seg.extend_from_slice(&id_bytes(IdSize::Four, 0x20));
        seg.extend_from_slice(&0u32.to_be_bytes());
        seg.extend_from_slice(&id_bytes(IdSize::Four, 0x1));
        seg.extend_from_slice(&0u32.to_be_bytes());
        let bytes = HprofWriter::new(IdSize::Four)
            .record(RecordTag::HeapDump.to_u8(), &seg)
            .heap_dump_end()
            .finish();
        let dump = decode_ok(&bytes);
        assert_eq!(dump.instances.len(), 1);
        assert_eq!(dump.counts.heap_segments, 1);
    }

    #[test]
    fn heap_info_tags_records_retroactively() {
        let bytes = HprofWriter::new(IdSize::Four)
            .string(0x90, "app")
            .string(0x91, "zygote")
            .heap_segment(|s| {
                s.instance_dump(0x1, 0x9, &[])
                    .heap_info(u32::from(b'Z'), 0x91)
                    .instance_dump(0x2, 0x9, &[])
                    .heap_info(u32::from(b'A'), 0x90)
                    .instance_dump(0x3, 0x9, &[]);
            })
            .heap_segment(|s| {
                s.instance_dump(0x4, 0x9, &[]);
            })
            .finish();
        let dump = decode_ok(&bytes);
        let heaps: Vec<HeapType> = dump.instances.iter().map(|i| i.heap).collect();
        assert_eq!(
            heaps,
            vec![HeapType::Zygote, HeapType::App, HeapType::App, HeapType::App]
        );
        assert_eq!(dump.heap_name(HeapType::Zygote), Some("zygote"));
        assert_eq!(dump.heap_name(HeapType::System), None);
    }

    #[test]
    fn heap_info_forward_policy() {
        let bytes = HprofWriter::new(IdSize::Four)
            .heap_segment(|s| {
                s.instance_dump(0x1, 0x9, &[])
                    .heap_info(u32::from(b'Z'), 0)
                    .instance_dump(0x2, 0x9, &[])
                    .heap_info(u32::from(b'A'), 0)
                    .instance_dump(0x3, 0x9, &[]);
            })
            .finish();
        let options = DecodeOptions {
            heap_info: HeapInfoPolicy::Forward,
        };
        let dump = decode_bytes(&bytes, options, &mut NoProgress).unwrap();
        let heaps: Vec<HeapType> = dump.instances.iter().map(|i| i.heap).collect();
        assert_eq!(
            heaps,
            vec![HeapType::Unknown, HeapType::Zygote, HeapType::App]
        );
    }

    #[test]
    fn rejects_unsupported_top_level_tags() {
        for tag in [RecordTag::CpuSamples, RecordTag::UnloadClass, RecordTag::ControlSettings] {
            let bytes = HprofWriter::new(IdSize::Four)
                .record(tag.to_u8(), &[0, 0, 0, 0])
                .finish();
            let err = decode_err(&bytes);
            assert!(
                matches!(err, Error::Format(FormatError::UnsupportedTag { tag: t, .. }) if t == tag.to_u8()),
                "{err}"
            );
        }
    }

    #[test]
    fn rejects_unknown_tags() {
        let bytes = HprofWriter::new(IdSize::Four).record(0x99, &[]).finish();
        assert!(matches!(
            decode_err(&bytes),
            Error::Format(FormatError::UnknownTag { tag: 0x99, .. })
        ));

        let bytes = HprofWriter::new(IdSize::Four)
            .heap_segment(|s| {
                s.raw(&[0x42, 0, 0, 0, 0]);
            })
            .finish();
        assert!(matches!(
            decode_err(&bytes),
            Error::Format(FormatError::UnknownSubTag { tag: 0x42, .. })
        ));
    }

    #[test]
    fn rejects_invalid_field_type() {
        let mut class = ClassDef::new(0x100, 0);
        class.fields.push((0x1, JvmType::Int));
        let mut bytes = HprofWriter::new(IdSize::Four)
            .heap_segment(|s| {
                s.class_dump(&class);
            })
            .finish();
        // The last byte of the stream is the field's type tag.
        let last = bytes.len() - 1;
        bytes[last] = 3;
        assert!(matches!(
            decode_err(&bytes),
            Error::Format(FormatError::InvalidJvmType { value: 3, .. })
        ));
    }

    #[test]
    fn truncated_stream_fails_whole_decode() {
        let full = HprofWriter::new(IdSize::Four)
            .string(0x10, "x")
            .heap_segment(|s| {
                s.instance_dump(0x1, 0x9, &[1, 2, 3, 4]);
            })
            .finish();
        let cut = &full[..full.len() - 2];
        let err = decode_err(cut);
        assert!(
            matches!(err, Error::Format(FormatError::UnexpectedEof { .. })),
            "{err}"
        );

        // Cut inside a record header.
        let header_len = SIGNATURE_1_0_3.len() + 1 + 4 + 8;
        let err = decode_err(&full[..header_len + 3]);
        assert!(matches!(
            err,
            Error::Format(FormatError::UnexpectedEof {
                record: "record header",
                ..
            })
        ));
    }

    #[test]
    fn sub_record_overrunning_its_segment_fails() {
        let mut seg = Vec::new();
        seg.push(HeapTag::InstanceDump.to_u8());
        seg.extend_from_slice(&id_bytes(IdSize::Four, 0x20));
        seg.extend_from_slice(&0u32.to_be_bytes());
        seg.extend_from_slice(&id_bytes(IdSize::Four, 0x1));
        seg.extend_from_slice(&8u32.to_be_bytes());
        seg.extend_from_slice(&[0u8; 4]);
        // Declared instance size (8) runs past the segment's end; pad the
        // stream so the overrun, not EOF, is what trips.
        let bytes = HprofWriter::new(IdSize::Four)
            .record(RecordTag::HeapDumpSegment.to_u8(), &seg)
            .raw(&[0u8; 16])
            .finish();
        let err = decode_err(&bytes);
        assert!(
            matches!(
                err,
                Error::Format(FormatError::SectionOverrun {
                    record: "INSTANCE DUMP",
                    needed: 8,
                    remaining: 4,
                    ..
                })
            ),
            "{err}"
        );
    }

    #[test]
    fn signature_selection() {
        assert!(decoder_for_signature(SIGNATURE_1_0_3, DecodeOptions::default()).is_some());
        assert!(decoder_for_signature("JAVA PROFILE 1.0.2", DecodeOptions::default()).is_none());
        assert!(decoder_for_signature("", DecodeOptions::default()).is_none());

        let other = HprofWriter::with_header(b"JAVA PROFILE 1.0.2", IdSize::Four, 0).finish();
        assert!(matches!(
            decode_err(&other),
            Error::Format(FormatError::UnsupportedSignature(s)) if s == "JAVA PROFILE 1.0.2"
        ));

        let empty = HprofWriter::with_header(b"", IdSize::Four, 0).finish();
        assert!(matches!(
            decode_err(&empty),
            Error::Format(FormatError::UnsupportedSignature(_))
        ));

        let too_long = HprofWriter::with_header(b"JAVA PROFILE 1.0.3X", IdSize::Four, 0).finish();
        assert!(matches!(
            decode_err(&too_long),
            Error::Format(FormatError::UnsupportedSignature(_))
        ));

        let unterminated = b"JAVA PROF";
        assert!(matches!(
            decode_err(unterminated),
            Error::Format(FormatError::UnsupportedSignature(_))
        ));
    }

    #[test]
    fn rejects_bad_header_fields() {
        let mut bytes = SIGNATURE_1_0_3.as_bytes().to_vec();
        bytes.push(0);
        bytes.extend_from_slice(&3u32.to_be_bytes());
        bytes.extend_from_slice(&0u64.to_be_bytes());
        assert!(matches!(
            decode_err(&bytes),
            Error::Format(FormatError::InvalidIdSize(3))
        ));

        let mut bytes = SIGNATURE_1_0_3.as_bytes().to_vec();
        bytes.push(0);
        bytes.extend_from_slice(&4u32.to_be_bytes());
        bytes.extend_from_slice(&[0, 0, 0]);
        assert!(matches!(
            decode_err(&bytes),
            Error::Format(FormatError::TruncatedHeader {
                field: "creation timestamp"
            })
        ));
    }

    #[test]
    fn reports_progress_up_to_completion() {
        let bytes = HprofWriter::new(IdSize::Four)
            .string(0x10, "a")
            .heap_segment(|s| {
                for i in 0..50 {
                    s.instance_dump(i + 1, 0x9, &[0u8; 16]);
                }
            })
            .finish();
        let mut seen = Vec::new();
        let mut sink = |stage: Stage, pct: u8| seen.push((stage, pct));
        decode_bytes(&bytes, DecodeOptions::default(), &mut sink).unwrap();
        assert!(seen.iter().all(|(s, _)| *s == Stage::Decode));
        assert!(seen.windows(2).all(|w| w[0].1 < w[1].1));
        assert_eq!(seen.last().map(|(_, p)| *p), Some(100));
    }

    #[test]
    fn decodes_from_path() {
        let bytes = HprofWriter::new(IdSize::Four)
            .string(0x10, "java.lang.Object")
            .finish();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heap.hprof");
        std::fs::write(&path, &bytes).unwrap();
        let dump = decode_path(&path, DecodeOptions::default(), &mut NoProgress).unwrap();
        assert_eq!(dump.string(ObjectId(0x10)), Some("java.lang.Object"));

        let missing = dir.path().join("missing.hprof");
        assert!(matches!(
            decode_path(&missing, DecodeOptions::default(), &mut NoProgress),
            Err(Error::Io(_))
        ));
    }
}
