use hprof_core::error::QueryError;
use hprof_core::{HeapType, IdSize, ObjectId};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::filter::{Filter, FilterResult};
use crate::heap::{HeapItem, ItemKind, ItemRef};

/// Which partition of the index a query scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Classes,
    Objects,
}

impl Source {
    pub fn name(self) -> &'static str {
        match self {
            Self::Classes => "classes",
            Self::Objects => "objects",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub classes: usize,
    pub instances: usize,
    pub strings: usize,
    pub object_arrays: usize,
    pub primitive_arrays: usize,
    pub roots: usize,
    pub dropped_roots: usize,
    pub per_heap: BTreeMap<HeapType, usize>,
}

/// Resolved, read-only heap graph.
///
/// Classes and all other items live in separate maps keyed by object id.
/// The index is never mutated after [`crate::build`] returns, so it can be
/// shared across threads and queried concurrently.
#[derive(Debug)]
pub struct HeapIndex {
    pub(crate) signature: String,
    pub(crate) id_size: IdSize,
    pub(crate) timestamp_ms: u64,
    pub(crate) heap_names: BTreeMap<HeapType, String>,
    pub(crate) string_class_id: Option<ObjectId>,
    pub(crate) classes: HashMap<ObjectId, ItemRef>,
    pub(crate) objects: HashMap<ObjectId, ItemRef>,
    pub(crate) dropped_roots: usize,
}

impl HeapIndex {
    pub(crate) fn new(signature: String, id_size: IdSize, timestamp_ms: u64) -> Self {
        Self {
            signature,
            id_size,
            timestamp_ms,
            heap_names: BTreeMap::new(),
            string_class_id: None,
            classes: HashMap::new(),
            objects: HashMap::new(),
            dropped_roots: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn empty() -> Self {
        Self::new(String::new(), IdSize::Four, 0)
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn id_size(&self) -> IdSize {
        self.id_size
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    pub fn created_at(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.timestamp_ms)
    }

    pub fn heap_name(&self, heap: HeapType) -> Option<&str> {
        self.heap_names.get(&heap).map(String::as_str)
    }

    /// Id of the `java.lang.String` class, if the dump contains it.
    pub fn string_class_id(&self) -> Option<ObjectId> {
        self.string_class_id
    }

    pub fn find_object(&self, id: ObjectId) -> Option<&ItemRef> {
        self.objects.get(&id)
    }

    pub fn find_class(&self, id: ObjectId) -> Option<&ItemRef> {
        self.classes.get(&id)
    }

    /// Looks `id` up among objects first, then classes.
    pub fn resolve(&self, id: ObjectId) -> Option<&ItemRef> {
        self.find_object(id).or_else(|| self.find_class(id))
    }

    /// First class named exactly `name`.
    pub fn find_class_by_name(&self, name: &str) -> Option<&ItemRef> {
        self.classes
            .values()
            .find(|item| item.as_class().is_some_and(|c| c.name() == name))
    }

    pub fn classes(&self) -> impl Iterator<Item = &ItemRef> + '_ {
        self.classes.values()
    }

    pub fn objects(&self) -> impl Iterator<Item = &ItemRef> + '_ {
        self.objects.values()
    }

    pub fn len(&self) -> usize {
        self.classes.len() + self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs `filter` over one partition and collects the matching items.
    ///
    /// Result order is unspecified. The first `Fail` aborts the query.
    pub fn query(&self, source: Source, filter: &dyn Filter) -> Result<Vec<ItemRef>, QueryError> {
        let partition = match source {
            Source::Classes => &self.classes,
            Source::Objects => &self.objects,
        };
        let mut hits = Vec::new();
        for item in partition.values() {
            match filter.evaluate(item, self) {
                FilterResult::Match => hits.push(ItemRef::clone(item)),
                FilterResult::NoMatch => {}
                FilterResult::Fail(reason) => {
                    debug!(source = source.name(), object_id = %item.id(), %reason, "Query failed");
                    return Err(QueryError::FilterFailed {
                        object_id: item.id().get(),
                        reason,
                    });
                }
            }
        }
        debug!(source = source.name(), scanned = partition.len(), matched = hits.len(), "Query finished");
        Ok(hits)
    }

    pub fn stats(&self) -> IndexStats {
        let mut stats = IndexStats {
            dropped_roots: self.dropped_roots,
            ..IndexStats::default()
        };
        for item in self.classes.values().chain(self.objects.values()) {
            match item.kind() {
                ItemKind::Class => stats.classes += 1,
                ItemKind::Instance => stats.instances += 1,
                ItemKind::String => stats.strings += 1,
                ItemKind::ObjectArray => stats.object_arrays += 1,
                ItemKind::PrimitiveArray => stats.primitive_arrays += 1,
            }
            stats.roots += item.roots().len();
            *stats.per_heap.entry(item.heap()).or_default() += 1;
        }
        stats
    }

    pub(crate) fn insert(&mut self, item: HeapItem) {
        let id = item.id();
        let item = ItemRef::new(item);
        match item.kind() {
            ItemKind::Class => self.classes.insert(id, item),
            _ => self.objects.insert(id, item),
        };
    }
}
