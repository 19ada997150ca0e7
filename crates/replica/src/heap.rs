use std::{
    collections::{BTreeMap, BTreeSet},
    fmt, mem,
};

use crate::{
    array::{Array, ArrayShape, ElementType},
    error::{AccessError, AllocationError, TypeError},
    resource::{NoLimitTracker, ResourceError, ResourceTracker},
    types::{ClassId, TypeDescriptor, TypeRegistry},
    value::Value,
};

/// Index of an entry in a [`Heap`]. Only meaningful for the heap that issued it.
///
/// Two references denote the same instance exactly when their ids are equal, so
/// the id is the object's identity for the lifetime of the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct HeapId(usize);

impl HeapId {
    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }

    #[cfg(test)]
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index)
    }
}

impl fmt::Display for HeapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of an opaque resource handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum HandleKind {
    File,
    Socket,
    Callback,
    Other,
}

/// An opaque resource (file descriptor, socket, callback). Never copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    kind: HandleKind,
    raw: u64,
}

impl Handle {
    #[must_use]
    pub fn new(kind: HandleKind, raw: u64) -> Self {
        Self { kind, raw }
    }

    #[must_use]
    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    #[must_use]
    pub fn raw(&self) -> u64 {
        self.raw
    }
}

/// Instance of a registered type: one slot per accessor of the class.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    class: ClassId,
    slots: Vec<Value>,
}

impl Object {
    #[must_use]
    pub fn class(&self) -> ClassId {
        self.class
    }

    #[must_use]
    pub fn slots(&self) -> &[Value] {
        &self.slots
    }

    #[must_use]
    pub fn slot(&self, index: usize) -> Option<&Value> {
        self.slots.get(index)
    }

    pub(crate) fn slots_mut(&mut self) -> &mut [Value] {
        &mut self.slots
    }

    fn estimate_size(&self) -> usize {
        mem::size_of::<Self>() + self.slots.len() * mem::size_of::<Value>()
    }
}

/// Everything that can live on the heap.
#[derive(Debug, Clone, PartialEq, strum::IntoStaticStr)]
pub enum HeapData {
    Array(Array),
    Object(Object),
    Handle(Handle),
}

impl HeapData {
    /// Static variant name, used for per-type statistics.
    #[must_use]
    pub fn variant_name(&self) -> &'static str {
        self.into()
    }

    /// Approximate size in bytes reported to the resource tracker.
    #[must_use]
    pub fn estimate_size(&self) -> usize {
        match self {
            Self::Array(array) => array.estimate_size(),
            Self::Object(object) => object.estimate_size(),
            Self::Handle(_) => mem::size_of::<Handle>(),
        }
    }
}

/// Counts taken from a heap at one moment; compare two with [`HeapStats::diff`]
/// to check that a failed copy left nothing behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapStats {
    pub live_entries: usize,
    pub registered_types: usize,
    /// Live entries per [`HeapData`] variant.
    pub entries_by_kind: BTreeMap<&'static str, usize>,
    pub tracker_allocations: Option<usize>,
    pub tracker_memory_bytes: Option<usize>,
}

/// `after - before` for two [`HeapStats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapDiff {
    pub live_entries_delta: isize,
    /// Only kinds whose count changed.
    pub kind_deltas: BTreeMap<&'static str, isize>,
    /// Kinds with no entries before and some after.
    pub appeared_kinds: Vec<&'static str>,
    /// Kinds with entries before and none after.
    pub vanished_kinds: Vec<&'static str>,
    /// `None` unless both snapshots came from a counting tracker.
    pub tracker_allocations_delta: Option<isize>,
    pub tracker_memory_bytes_delta: Option<isize>,
}

impl HeapStats {
    /// ```
    /// # use std::collections::BTreeMap;
    /// # use replica::HeapStats;
    /// let before = HeapStats {
    ///     live_entries: 2, registered_types: 1, entries_by_kind: BTreeMap::from([("Object", 2)]),
    ///     tracker_allocations: None, tracker_memory_bytes: None,
    /// };
    /// let after = HeapStats {
    ///     live_entries: 3, entries_by_kind: BTreeMap::from([("Object", 2), ("Array", 1)]), ..before.clone()
    /// };
    /// let diff = before.diff(&after);
    /// assert_eq!(diff.live_entries_delta, 1);
    /// assert_eq!(diff.appeared_kinds, ["Array"]);
    /// ```
    #[must_use]
    pub fn diff(&self, after: &Self) -> HeapDiff {
        let mut kind_deltas = BTreeMap::new();
        let mut appeared_kinds = Vec::new();
        let mut vanished_kinds = Vec::new();

        let kinds: BTreeSet<&'static str> = self
            .entries_by_kind
            .keys()
            .chain(after.entries_by_kind.keys())
            .copied()
            .collect();
        for kind in kinds {
            let was = self.entries_by_kind.get(kind).copied().unwrap_or(0);
            let now = after.entries_by_kind.get(kind).copied().unwrap_or(0);
            match (was, now) {
                (0, n) if n > 0 => appeared_kinds.push(kind),
                (n, 0) if n > 0 => vanished_kinds.push(kind),
                _ => {}
            }
            if was != now {
                kind_deltas.insert(kind, delta(was, now));
            }
        }

        HeapDiff {
            live_entries_delta: delta(self.live_entries, after.live_entries),
            kind_deltas,
            appeared_kinds,
            vanished_kinds,
            tracker_allocations_delta: self
                .tracker_allocations
                .zip(after.tracker_allocations)
                .map(|(was, now)| delta(was, now)),
            tracker_memory_bytes_delta: self
                .tracker_memory_bytes
                .zip(after.tracker_memory_bytes)
                .map(|(was, now)| delta(was, now)),
        }
    }
}

impl HeapDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live_entries_delta == 0
            && self.kind_deltas.is_empty()
            && self.tracker_allocations_delta.unwrap_or(0) == 0
            && self.tracker_memory_bytes_delta.unwrap_or(0) == 0
    }
}

impl fmt::Display for HeapDiff {
    /// ```text
    /// heap: +3 entries
    ///   Object: +2
    ///   Array: +1 (new)
    ///   tracker: +3 allocations, +240 bytes
    /// ```
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("heap: unchanged");
        }
        write!(f, "heap: {:+} entries", self.live_entries_delta)?;
        for (kind, delta) in &self.kind_deltas {
            write!(f, "\n  {kind}: {delta:+}")?;
            if self.appeared_kinds.contains(kind) {
                f.write_str(" (new)")?;
            } else if self.vanished_kinds.contains(kind) {
                f.write_str(" (gone)")?;
            }
        }
        match (self.tracker_allocations_delta, self.tracker_memory_bytes_delta) {
            (Some(allocations), Some(bytes)) if allocations != 0 || bytes != 0 => {
                write!(f, "\n  tracker: {allocations:+} allocations, {bytes:+} bytes")
            }
            _ => Ok(()),
        }
    }
}

#[expect(clippy::cast_possible_wrap, reason = "heap sizes stay far below isize::MAX")]
fn delta(before: usize, after: usize) -> isize {
    after as isize - before as isize
}

/// Arena owning every mutable value of an object graph, plus the registry of
/// types its objects are instances of.
///
/// Entries are never freed individually; a failed deep copy rolls the arena back
/// to its length at the start of the call.
#[derive(Debug, Clone)]
pub struct Heap<T: ResourceTracker = NoLimitTracker> {
    entries: Vec<HeapData>,
    types: TypeRegistry,
    tracker: T,
}

impl Heap<NoLimitTracker> {
    /// An empty heap without resource limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_tracker(NoLimitTracker)
    }
}

impl Default for Heap<NoLimitTracker> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ResourceTracker> Heap<T> {
    #[must_use]
    pub fn with_tracker(tracker: T) -> Self {
        Self::with_types(TypeRegistry::new(), tracker)
    }

    /// A heap sharing a pre-built type registry.
    #[must_use]
    pub fn with_types(types: TypeRegistry, tracker: T) -> Self {
        Self {
            entries: Vec::new(),
            types,
            tracker,
        }
    }

    #[must_use]
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn register_type(&mut self, descriptor: TypeDescriptor) -> Result<ClassId, TypeError> {
        self.types.register(descriptor)
    }

    #[must_use]
    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut T {
        &mut self.tracker
    }

    /// Number of entries on the heap.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Allocates a new heap entry, charging its size to the tracker.
    pub fn allocate(&mut self, data: HeapData) -> Result<HeapId, ResourceError> {
        self.tracker.on_allocate(|| data.estimate_size())?;
        let id = HeapId(self.entries.len());
        self.entries.push(data);
        Ok(id)
    }

    /// Creates an instance of `class` with every slot `None`, running no
    /// construction logic. Fails for constructor-only types.
    pub fn allocate_zeroed(&mut self, class: ClassId) -> Result<HeapId, AllocationError> {
        if self.types.get(class).is_constructor_only() {
            return Err(AllocationError::ConstructorRequired);
        }
        let object = self.blank_object(class);
        Ok(self.allocate(HeapData::Object(object))?)
    }

    /// Constructs an instance of `class`, assigning members by name; members
    /// left out stay `None`. Computed members write through to their backing field.
    pub fn new_object<N: AsRef<str>>(
        &mut self,
        class: ClassId,
        members: impl IntoIterator<Item = (N, Value)>,
    ) -> Result<HeapId, AccessError> {
        let mut object = self.blank_object(class);
        for (name, value) in members {
            let slot = self.member_slot(class, name.as_ref())?;
            object.slots[slot] = value;
        }
        self.allocate(HeapData::Object(object))
            .map_err(|err| self.allocation_error(class, AllocationError::Resource(err)))
    }

    /// Allocates an array from a row-major element buffer.
    pub fn new_array(
        &mut self,
        element_type: ElementType,
        dims: impl IntoIterator<Item = usize>,
        elements: Vec<Value>,
    ) -> Result<HeapId, AccessError> {
        let array = Array::from_parts(element_type, ArrayShape::new(dims)?, elements)?;
        for element in array.elements() {
            self.check_element(array.element_type(), element)?;
        }
        self.allocate_array(array)
    }

    /// Allocates an array whose elements all hold the element type's zero value.
    pub fn new_array_filled(
        &mut self,
        element_type: ElementType,
        dims: impl IntoIterator<Item = usize>,
    ) -> Result<HeapId, AccessError> {
        let shape = ArrayShape::new(dims)?;
        let rank = shape.rank();
        // refuse oversized arrays before their buffer is requested
        let array = self
            .tracker
            .check_large_result(Array::size_for(&shape))
            .map_err(AllocationError::Resource)
            .and_then(|()| Array::filled(element_type.clone(), shape))
            .map_err(|cause| AccessError::Allocation {
                type_name: self.array_type_name(&element_type, rank),
                cause,
            })?;
        self.allocate_array(array)
    }

    pub fn new_handle(&mut self, kind: HandleKind, raw: u64) -> Result<HeapId, ResourceError> {
        self.allocate(HeapData::Handle(Handle::new(kind, raw)))
    }

    /// Gets immutable reference to heap data.
    ///
    /// # Panics
    /// Panics if the id does not belong to this heap.
    #[must_use]
    #[track_caller]
    pub fn get(&self, id: HeapId) -> &HeapData {
        self.entries.get(id.index()).expect("Heap::get: id does not belong to this heap")
    }

    /// Like [`get`](Self::get) but returns `None` for foreign or rolled-back ids.
    #[must_use]
    pub fn get_if_live(&self, id: HeapId) -> Option<&HeapData> {
        self.entries.get(id.index())
    }

    #[track_caller]
    pub(crate) fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        self.entries
            .get_mut(id.index())
            .expect("Heap::get_mut: id does not belong to this heap")
    }

    /// Stores a copied value into a shell: through the class's accessor at
    /// `position` for objects, at row-major offset `position` for arrays.
    #[track_caller]
    pub(crate) fn fill_slot(&mut self, id: HeapId, position: usize, value: Value) {
        let entry = self
            .entries
            .get_mut(id.index())
            .expect("Heap::fill_slot: id does not belong to this heap");
        match entry {
            HeapData::Object(object) => {
                self.types.accessors(object.class)[position].set(object, value);
            }
            HeapData::Array(array) => array.elements_mut()[position] = value,
            HeapData::Handle(_) => unreachable!("handles never get shells"),
        }
    }

    pub fn object(&self, id: HeapId) -> Result<&Object, AccessError> {
        match self.get_if_live(id) {
            Some(HeapData::Object(object)) => Ok(object),
            _ => Err(AccessError::NotAnObject(id)),
        }
    }

    pub fn array(&self, id: HeapId) -> Result<&Array, AccessError> {
        match self.get_if_live(id) {
            Some(HeapData::Array(array)) => Ok(array),
            _ => Err(AccessError::NotAnArray(id)),
        }
    }

    /// Reads a field or computed member of an object.
    pub fn get_member(&self, id: HeapId, name: &str) -> Result<Value, AccessError> {
        let object = self.object(id)?;
        let slot = self.member_slot(object.class, name)?;
        Ok(object.slots[slot].clone())
    }

    /// Writes a field or computed member of an object, returning the old value.
    pub fn set_member(&mut self, id: HeapId, name: &str, value: Value) -> Result<Value, AccessError> {
        let class = self.object(id)?.class;
        let slot = self.member_slot(class, name)?;
        let HeapData::Object(object) = self.get_mut(id) else {
            unreachable!("object() already checked the entry kind");
        };
        Ok(mem::replace(&mut object.slots[slot], value))
    }

    pub fn get_element(&self, id: HeapId, index: &[usize]) -> Result<Value, AccessError> {
        self.array(id)?.get(index).cloned()
    }

    /// Writes an array element after checking it against the element type.
    pub fn set_element(&mut self, id: HeapId, index: &[usize], value: Value) -> Result<Value, AccessError> {
        let array = self.array(id)?;
        array.shape().offset(index)?;
        self.check_element(array.element_type(), &value)?;
        let HeapData::Array(array) = self.get_mut(id) else {
            unreachable!("array() already checked the entry kind");
        };
        array.set(index, value)
    }

    /// Human-readable type of a value: the class name for objects, `int[,]`
    /// style names for arrays, `handle<kind>` for handles.
    #[must_use]
    pub fn type_name_of(&self, value: &Value) -> String {
        let Value::Ref(id) = value else {
            return value.kind_name().to_owned();
        };
        match self.get_if_live(*id) {
            Some(HeapData::Object(object)) => self.types.name(object.class).to_owned(),
            Some(HeapData::Array(array)) => self.array_type_name(array.element_type(), array.rank()),
            Some(HeapData::Handle(handle)) => format!("handle<{}>", handle.kind),
            None => format!("dangling {id}"),
        }
    }

    /// Snapshot for before/after comparisons.
    #[must_use]
    pub fn heap_stats(&self) -> HeapStats {
        let mut entries_by_kind: BTreeMap<&'static str, usize> = BTreeMap::new();
        for data in &self.entries {
            *entries_by_kind.entry(data.variant_name()).or_insert(0) += 1;
        }
        HeapStats {
            live_entries: self.entries.len(),
            registered_types: self.types.len(),
            entries_by_kind,
            tracker_allocations: self.tracker.allocation_count(),
            tracker_memory_bytes: self.tracker.current_memory_bytes(),
        }
    }

    /// Drops every entry allocated at or after `len`, returning their budget to the tracker.
    pub(crate) fn truncate(&mut self, len: usize) {
        while self.entries.len() > len {
            if let Some(data) = self.entries.pop() {
                self.tracker.on_free(|| data.estimate_size());
            }
        }
    }

    pub(crate) fn allocation_error(&self, class: ClassId, cause: AllocationError) -> AccessError {
        AccessError::Allocation {
            type_name: self.types.name(class).to_owned(),
            cause,
        }
    }

    /// `int[]`, `Point[,]`, ...
    pub(crate) fn array_type_name(&self, element_type: &ElementType, rank: usize) -> String {
        let commas = ",".repeat(rank.saturating_sub(1));
        format!("{}[{commas}]", self.element_type_name(element_type))
    }

    fn allocate_array(&mut self, array: Array) -> Result<HeapId, AccessError> {
        let type_name = self.array_type_name(array.element_type(), array.rank());
        self.allocate(HeapData::Array(array)).map_err(|err| AccessError::Allocation {
            type_name,
            cause: AllocationError::Resource(err),
        })
    }

    fn blank_object(&self, class: ClassId) -> Object {
        Object {
            class,
            slots: vec![Value::None; self.types.slot_count(class)],
        }
    }

    fn member_slot(&self, class: ClassId, name: &str) -> Result<usize, AccessError> {
        self.types
            .resolve_member(class, name)
            .ok_or_else(|| AccessError::UnknownMember {
                type_name: self.types.name(class).to_owned(),
                member: name.to_owned(),
            })
    }

    fn check_element(&self, element_type: &ElementType, value: &Value) -> Result<(), AccessError> {
        let admitted = element_type.admits_inline(value).unwrap_or_else(|| {
            let Value::Ref(id) = value else { return false };
            match (element_type, self.get_if_live(*id)) {
                (ElementType::Object(class), Some(HeapData::Object(object))) => {
                    self.types.is_subtype(object.class, *class)
                }
                (ElementType::Array, Some(HeapData::Array(_))) => true,
                _ => false,
            }
        });
        if admitted {
            Ok(())
        } else {
            Err(AccessError::ElementType {
                expected: self.element_type_name(element_type),
                found: value.kind_name(),
            })
        }
    }

    fn element_type_name(&self, element_type: &ElementType) -> String {
        match element_type {
            ElementType::Object(class) => self.types.name(*class).to_owned(),
            other => other.to_string(),
        }
    }
}
