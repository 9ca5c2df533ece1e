//! Resolves the flat records of a [`DecodedDump`] into a [`HeapIndex`].

use hprof_core::error::{Error, ResolveError};
use hprof_core::utf16::decode_utf16_be;
use hprof_core::{FieldSpec, GcRoot, HeapType, IdSize, JvmType, ObjectId, StaticFieldSpec};
use hprof_format::{
    ClassDumpRecord, DecodedDump, PrimitiveArrayRecord, ProgressSink, ProgressTracker, Stage,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::heap::{
    Class, HeapItem, Instance, ItemKind, ObjectArray, ObjectHeader, PrimitiveArray, StringObject,
};
use crate::index::HeapIndex;
use crate::options::BuildOptions;

pub const STRING_CLASS_NAME: &str = "java.lang.String";

/// Field of `java.lang.String` holding its `char[]`.
const STRING_VALUE_FIELD: &str = "value";

pub fn resolve(
    dump: DecodedDump,
    options: &BuildOptions,
    progress: &mut dyn ProgressSink,
) -> Result<HeapIndex, Error> {
    let total = dump.item_count() as u64;
    let mut builder = Builder {
        index: HeapIndex::new(dump.signature.clone(), dump.id_size, dump.timestamp_ms),
        id_size: dump.id_size,
        pending_roots: group_roots(&dump.roots),
        tracker: ProgressTracker::new(Stage::Resolve, total),
        done: 0,
    };

    for heap in [HeapType::App, HeapType::System, HeapType::Zygote, HeapType::Unknown] {
        if let Some(name) = dump.heap_name(heap) {
            builder.index.heap_names.insert(heap, name.to_string());
        }
    }

    let names = class_names(&dump, options);
    let classes = builder.resolve_classes(&dump, &names, progress)?;

    let string_class_id = find_string_class(&dump, &names);
    builder.index.string_class_id = string_class_id;

    let DecodedDump {
        instances,
        object_arrays,
        primitive_arrays,
        ..
    } = dump;

    let char_arrays: HashMap<ObjectId, &PrimitiveArrayRecord> =
        primitive_arrays.iter().map(|a| (a.id, a)).collect();
    for record in instances {
        let class = classes.get(&record.class_id).cloned();
        if class.is_none() {
            warn!(object_id = %record.id, class_id = %record.class_id, "Instance references unknown class");
        }
        let instance = Instance {
            header: builder.header(record.id, record.heap),
            class_id: record.class_id,
            stack_trace_serial: record.stack_trace_serial,
            class,
            data: record.data,
            id_size: builder.id_size,
        };
        let item = if string_class_id == Some(record.class_id) {
            let value = string_value(&instance, &char_arrays);
            HeapItem::String(StringObject { instance, value })
        } else {
            HeapItem::Instance(instance)
        };
        builder.insert(item, progress);
    }

    for record in object_arrays {
        let class = classes.get(&record.class_id).cloned();
        let array = ObjectArray {
            header: builder.header(record.id, record.heap),
            class_id: record.class_id,
            stack_trace_serial: record.stack_trace_serial,
            class,
            elements: record.elements,
        };
        builder.insert(HeapItem::ObjectArray(array), progress);
    }

    for record in primitive_arrays {
        let array = PrimitiveArray {
            header: builder.header(record.id, record.heap),
            element_type: record.element_type,
            stack_trace_serial: record.stack_trace_serial,
            length: record.length,
            data: record.data,
            id_size: builder.id_size,
        };
        builder.insert(HeapItem::PrimitiveArray(array), progress);
    }

    builder.finish(progress)
}

struct Builder {
    index: HeapIndex,
    id_size: IdSize,
    pending_roots: HashMap<ObjectId, Vec<GcRoot>>,
    tracker: ProgressTracker,
    done: u64,
}

impl Builder {
    /// Takes the GC roots that target `id`.
    fn header(&mut self, id: ObjectId, heap: HeapType) -> ObjectHeader {
        ObjectHeader {
            id,
            heap,
            roots: self.pending_roots.remove(&id).unwrap_or_default(),
        }
    }

    /// A later record with the same id replaces the earlier one and inherits
    /// its GC roots.
    fn insert(&mut self, mut item: HeapItem, progress: &mut dyn ProgressSink) {
        let (id, kind) = (item.id(), item.kind());
        let previous = match kind {
            ItemKind::Class => self.index.classes.get(&id),
            _ => self.index.objects.get(&id),
        };
        if let Some(previous) = previous {
            warn!(object_id = %id, kind = kind.name(), "Duplicate object id; keeping the later record");
            if let Some(header) = item.header_mut() {
                let mut roots = previous.roots().to_vec();
                roots.append(&mut header.roots);
                header.roots = roots;
            }
        }
        self.index.insert(item);
        self.done += 1;
        self.tracker.update(self.done, progress);
    }

    /// Builds every class after its super-class so each one can hold a
    /// reference to its resolved parent.
    fn resolve_classes(
        &mut self,
        dump: &DecodedDump,
        names: &HashMap<ObjectId, String>,
        progress: &mut dyn ProgressSink,
    ) -> Result<HashMap<ObjectId, Arc<Class>>, Error> {
        let records: HashMap<ObjectId, &ClassDumpRecord> =
            dump.classes.iter().map(|c| (c.id, c)).collect();
        if records.len() != dump.classes.len() {
            warn!(
                duplicates = dump.classes.len() - records.len(),
                "Duplicate class ids; keeping the last dump of each"
            );
        }

        let mut built: HashMap<ObjectId, Arc<Class>> = HashMap::with_capacity(records.len());
        for class in &dump.classes {
            if built.contains_key(&class.id) {
                continue;
            }
            for id in build_order(class.id, &records, &built)? {
                let Some(record) = records.get(&id) else {
                    continue;
                };
                let super_class = if record.super_id.is_null() {
                    None
                } else {
                    let parent = built.get(&record.super_id).cloned();
                    if parent.is_none() {
                        warn!(class_id = %record.id, super_id = %record.super_id, "Super-class missing from dump");
                    }
                    parent
                };
                let name = names
                    .get(&id)
                    .cloned()
                    .unwrap_or_else(|| unnamed_class(id));
                let class = Arc::new(self.class(record, name, super_class, dump));
                built.insert(id, Arc::clone(&class));
                self.insert(HeapItem::Class(class), progress);
            }
        }
        debug!(classes = built.len(), "Resolved classes");
        Ok(built)
    }

    fn class(
        &mut self,
        record: &ClassDumpRecord,
        name: String,
        super_class: Option<Arc<Class>>,
        dump: &DecodedDump,
    ) -> Class {
        let fields: Vec<FieldSpec> = record
            .fields
            .iter()
            .map(|f| FieldSpec {
                name: field_name(dump, f.name_id),
                ty: f.ty,
                offset: f.offset,
            })
            .collect();
        let own_size = record.fields_size(self.id_size);
        let mut layout = fields.clone();
        if let Some(parent) = &super_class {
            layout.extend(parent.instance_fields().iter().map(|f| FieldSpec {
                offset: f.offset + own_size,
                ..f.clone()
            }));
        }
        let static_fields = record
            .static_fields
            .iter()
            .map(|f| StaticFieldSpec {
                name: field_name(dump, f.name_id),
                ty: f.ty,
                offset: f.offset,
            })
            .collect();

        Class {
            header: self.header(record.id, record.heap),
            name,
            super_id: record.super_id,
            class_loader_id: record.class_loader_id,
            stack_trace_serial: record.stack_trace_serial,
            instance_size: record.instance_size,
            super_class,
            fields,
            layout,
            static_fields,
            static_data: record.static_data.clone(),
            id_size: self.id_size,
        }
    }

    fn finish(mut self, progress: &mut dyn ProgressSink) -> Result<HeapIndex, Error> {
        let dropped: usize = self.pending_roots.values().map(Vec::len).sum();
        if dropped > 0 {
            for (id, roots) in &self.pending_roots {
                for root in roots {
                    debug!(object_id = %id, kind = root.kind.name(), "Dropping GC root");
                }
            }
            warn!(dropped, "GC roots reference objects missing from the dump");
        }
        self.index.dropped_roots = dropped;
        self.tracker.finish(progress);

        let stats = self.index.stats();
        info!(
            classes = stats.classes,
            instances = stats.instances,
            strings = stats.strings,
            object_arrays = stats.object_arrays,
            primitive_arrays = stats.primitive_arrays,
            roots = stats.roots,
            dropped_roots = stats.dropped_roots,
            "Built heap index"
        );
        Ok(self.index)
    }
}

/// Ids to build, super-classes first, ending with `start`. Classes already
/// built and super ids absent from the dump end the walk.
fn build_order(
    start: ObjectId,
    records: &HashMap<ObjectId, &ClassDumpRecord>,
    built: &HashMap<ObjectId, Arc<Class>>,
) -> Result<Vec<ObjectId>, ResolveError> {
    let mut chain = Vec::new();
    let mut current = start;
    loop {
        if chain.contains(&current) {
            return Err(ResolveError::SuperClassCycle {
                class_id: current.get(),
            });
        }
        chain.push(current);
        let Some(record) = records.get(&current) else {
            break;
        };
        let parent = record.super_id;
        if parent.is_null() || built.contains_key(&parent) || !records.contains_key(&parent) {
            break;
        }
        current = parent;
    }
    chain.reverse();
    Ok(chain)
}

fn group_roots(roots: &[GcRoot]) -> HashMap<ObjectId, Vec<GcRoot>> {
    let mut grouped: HashMap<ObjectId, Vec<GcRoot>> = HashMap::new();
    for root in roots {
        grouped.entry(root.object_id).or_default().push(*root);
    }
    grouped
}

fn class_names(dump: &DecodedDump, options: &BuildOptions) -> HashMap<ObjectId, String> {
    dump.classes
        .iter()
        .filter_map(|class| {
            let name = dump.class_name(class.id)?;
            let name = if options.dotted_class_names {
                name.replace('/', ".")
            } else {
                name.to_string()
            };
            Some((class.id, name))
        })
        .collect()
}

fn find_string_class(dump: &DecodedDump, names: &HashMap<ObjectId, String>) -> Option<ObjectId> {
    let mut found = None;
    for class in &dump.classes {
        if names.get(&class.id).map(String::as_str) != Some(STRING_CLASS_NAME) {
            continue;
        }
        match found {
            None => found = Some(class.id),
            Some(first) if first != class.id => {
                warn!(first = %first, ignored = %class.id, "Several classes named java.lang.String");
            }
            Some(_) => {}
        }
    }
    found
}

fn string_value(
    instance: &Instance,
    arrays: &HashMap<ObjectId, &PrimitiveArrayRecord>,
) -> Option<String> {
    let value = instance.field(STRING_VALUE_FIELD);
    let Some(array_id) = value.and_then(|v| v.as_object()) else {
        warn!(object_id = %instance.id(), "String has no object-typed value field");
        return None;
    };
    if array_id.is_null() {
        return None;
    }
    match arrays.get(&array_id) {
        Some(array) if array.element_type == JvmType::Char => Some(decode_utf16_be(&array.data)),
        Some(array) => {
            warn!(object_id = %instance.id(), element_type = array.element_type.name(), "String value is not a char array");
            None
        }
        None => {
            warn!(object_id = %instance.id(), array_id = %array_id, "String value array missing from dump");
            None
        }
    }
}

fn field_name(dump: &DecodedDump, name_id: ObjectId) -> String {
    dump.string(name_id)
        .map_or_else(|| format!("<field {name_id}>"), str::to_string)
}

fn unnamed_class(id: ObjectId) -> String {
    format!("<class {id}>")
}
