//! The deep-copy engine.
//!
//! A copy visits the graph reachable from its root(s) and, for every array or
//! composite original, allocates a *shell*: a same-shaped array or a zeroed
//! instance of the same class. The shell is registered in an identity-keyed
//! visited map before any of its children is copied, so a child that refers back
//! to an ancestor (a cycle) or to an already-copied sibling (sharing) resolves to
//! the existing shell instead of recursing.
//!
//! Children are not copied by native recursion. Each pending slot is a [`Fill`]
//! on an explicit work stack, pushed in reverse so slots are processed in member
//! order and row-major element order, depth first. Arbitrarily deep graphs copy in
//! constant call-stack space.

use std::slice;

use crate::{
    array::Array,
    classify::{Classification, Classifier, DefaultLeafPolicy, LeafPolicy},
    error::{AllocationError, CopyError},
    heap::{Heap, HeapData, HeapId},
    identity::{IdentityKey, IdentityMap},
    options::CopyOptions,
    resource::ResourceTracker,
    tracer::{CopyTracer, NoopTracer},
    value::Value,
};

/// Copies `value` with default options.
///
/// Returns `value` unchanged for leaves. For arrays and composites, returns a
/// reference to a newly allocated copy whose reachable graph is isomorphic to
/// the original's and shares no mutable node with it.
///
/// ```
/// use replica::{Heap, TypeDescriptor, Value, deep_copy};
///
/// let mut heap = Heap::new();
/// let node = heap.register_type(TypeDescriptor::new("Node").field("next")).unwrap();
/// let a = heap.new_object(node, [("next", Value::None)]).unwrap();
/// heap.set_member(a, "next", Value::Ref(a)).unwrap();
///
/// let copy = deep_copy(&mut heap, &Value::Ref(a)).unwrap();
/// let copy_id = copy.as_ref_id().unwrap();
/// assert_ne!(copy_id, a);
/// assert_eq!(heap.get_member(copy_id, "next").unwrap(), copy);
/// ```
pub fn deep_copy<T: ResourceTracker>(heap: &mut Heap<T>, value: &Value) -> Result<Value, CopyError> {
    DeepCopier::new().copy(heap, value)
}

impl<T: ResourceTracker> Heap<T> {
    /// Deep-copies `value` with default options. See [`deep_copy`].
    pub fn deep_copy(&mut self, value: &Value) -> Result<Value, CopyError> {
        deep_copy(self, value)
    }
}

/// Configurable deep copier: options, leaf policy and tracer.
///
/// ```
/// use replica::{CopyOptions, DeepCopier, HandleKind, HandlePolicy, Heap, Value};
///
/// let mut heap = Heap::new();
/// let file = Value::Ref(heap.new_handle(HandleKind::File, 3).unwrap());
///
/// assert!(DeepCopier::new().copy(&mut heap, &file).is_err());
///
/// let mut copier = DeepCopier::new().with_options(CopyOptions::new().with_handles(HandlePolicy::PassThrough));
/// assert_eq!(copier.copy(&mut heap, &file).unwrap(), file);
/// ```
#[derive(Debug, Default)]
pub struct DeepCopier<P: LeafPolicy = DefaultLeafPolicy, Tr: CopyTracer = NoopTracer> {
    options: CopyOptions,
    policy: P,
    tracer: Tr,
}

impl DeepCopier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<P: LeafPolicy, Tr: CopyTracer> DeepCopier<P, Tr> {
    #[must_use]
    pub fn with_options(mut self, options: CopyOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_leaf_policy<Q: LeafPolicy>(self, policy: Q) -> DeepCopier<Q, Tr> {
        DeepCopier {
            options: self.options,
            policy,
            tracer: self.tracer,
        }
    }

    #[must_use]
    pub fn with_tracer<U: CopyTracer>(self, tracer: U) -> DeepCopier<P, U> {
        DeepCopier {
            options: self.options,
            policy: self.policy,
            tracer,
        }
    }

    #[must_use]
    pub fn options(&self) -> &CopyOptions {
        &self.options
    }

    #[must_use]
    pub fn policy(&self) -> &P {
        &self.policy
    }

    #[must_use]
    pub fn tracer(&self) -> &Tr {
        &self.tracer
    }

    pub fn tracer_mut(&mut self) -> &mut Tr {
        &mut self.tracer
    }

    #[must_use]
    pub fn into_tracer(self) -> Tr {
        self.tracer
    }

    /// Deep-copies one value.
    ///
    /// On error the heap is left exactly as it was before the call.
    pub fn copy<T: ResourceTracker>(&mut self, heap: &mut Heap<T>, value: &Value) -> Result<Value, CopyError> {
        let mut copies = self.copy_many(heap, slice::from_ref(value))?;
        Ok(copies.pop().unwrap_or_default())
    }

    /// Deep-copies several roots in one traversal, so an object reachable from
    /// more than one root is copied once and shared between the copies.
    ///
    /// On error the heap is left exactly as it was before the call.
    pub fn copy_many<T: ResourceTracker>(
        &mut self,
        heap: &mut Heap<T>,
        values: &[Value],
    ) -> Result<Vec<Value>, CopyError> {
        let mark = heap.len();
        tracing::debug!(roots = values.len(), heap_len = mark, "deep copy started");
        self.tracer.on_begin(values.len());

        let mut session = Session {
            heap: &mut *heap,
            classifier: Classifier::new(&self.policy, self.options.handles),
            options: &self.options,
            tracer: &mut self.tracer,
            visited: IdentityMap::new(),
            work: Vec::new(),
        };
        let result: Result<Vec<Value>, CopyError> = values.iter().map(|value| session.copy_root(value)).collect();
        let shells = session.visited.len();

        match result {
            Ok(copies) => {
                let allocated = heap.len() - mark;
                tracing::debug!(allocated, shells, "deep copy finished");
                self.tracer.on_finish(allocated);
                Ok(copies)
            }
            Err(error) => {
                heap.truncate(mark);
                tracing::debug!(%error, discarded = shells, "deep copy failed, partial copy discarded");
                self.tracer.on_error(&error);
                Err(error)
            }
        }
    }
}

/// A slot of a shell still waiting for its copied value.
#[derive(Debug)]
struct Fill {
    target: HeapId,
    /// Accessor index for objects, row-major offset for arrays.
    position: usize,
    source: Value,
}

/// State of one copy call.
struct Session<'a, T: ResourceTracker, P: LeafPolicy, Tr: CopyTracer> {
    heap: &'a mut Heap<T>,
    classifier: Classifier<&'a P>,
    options: &'a CopyOptions,
    tracer: &'a mut Tr,
    /// original -> copy, keyed by identity.
    visited: IdentityMap<HeapId, HeapId>,
    work: Vec<Fill>,
}

impl<T: ResourceTracker, P: LeafPolicy, Tr: CopyTracer> Session<'_, T, P, Tr> {
    fn copy_root(&mut self, value: &Value) -> Result<Value, CopyError> {
        let copy = self.copy_value(value)?;
        while let Some(fill) = self.work.pop() {
            let copied = self.copy_value(&fill.source)?;
            self.heap.fill_slot(fill.target, fill.position, copied);
            self.tracer.on_fill(fill.target, fill.position);
        }
        Ok(copy)
    }

    /// Copies one value without descending: leaves and visited originals
    /// resolve immediately, new originals get a registered shell whose
    /// children are queued.
    fn copy_value(&mut self, value: &Value) -> Result<Value, CopyError> {
        self.heap.tracker_mut().on_step().map_err(CopyError::Interrupted)?;

        let kind = self.classifier.classify(&*self.heap, value)?;
        let Some(original) = value.as_ref_id().filter(|_| kind != Classification::Leaf) else {
            self.tracer.on_leaf(value);
            return Ok(value.clone());
        };
        if let Some(&copy) = self.visited.get(&IdentityKey(original)) {
            self.tracer.on_shared(original, copy);
            return Ok(Value::Ref(copy));
        }

        let copy = match kind {
            Classification::Array => self.array_shell(original)?,
            _ => self.object_shell(original)?,
        };
        Ok(Value::Ref(copy))
    }

    fn object_shell(&mut self, original: HeapId) -> Result<HeapId, CopyError> {
        let HeapData::Object(source) = self.heap.get(original) else {
            unreachable!("composite values are objects");
        };
        let class = source.class();
        let copy = self
            .heap
            .allocate_zeroed(class)
            .map_err(|cause| CopyError::AllocationFailure {
                type_name: self.heap.types().name(class).to_owned(),
                cause,
            })?;
        self.register(original, copy)?;

        let heap = &*self.heap;
        let HeapData::Object(source) = heap.get(original) else {
            unreachable!("composite values are objects");
        };
        for (position, accessor) in heap.types().accessors(class).iter().enumerate().rev() {
            if let Some(value) = accessor.get(source) {
                self.work.push(Fill {
                    target: copy,
                    position,
                    source: value.clone(),
                });
            }
        }
        self.tracer
            .on_shell(original, copy, Classification::Composite, self.work.len());
        Ok(copy)
    }

    fn array_shell(&mut self, original: HeapId) -> Result<HeapId, CopyError> {
        let HeapData::Array(source) = self.heap.get(original) else {
            unreachable!("array values are arrays");
        };
        let fast_path = self.options.leaf_array_fast_path && source.element_type().is_leaf_kind();
        let len = source.len();

        let shell = self
            .heap
            .tracker()
            .check_large_result(Array::size_for(source.shape()))
            .map_err(AllocationError::Resource)
            .and_then(|()| {
                if fast_path {
                    Ok(source.clone())
                } else {
                    Array::filled(source.element_type().clone(), source.shape().clone())
                }
            });
        let copy = match shell.and_then(|shell| {
            self.heap
                .allocate(HeapData::Array(shell))
                .map_err(AllocationError::Resource)
        }) {
            Ok(copy) => copy,
            Err(cause) => {
                return Err(CopyError::AllocationFailure {
                    type_name: self.heap.type_name_of(&Value::Ref(original)),
                    cause,
                });
            }
        };
        self.register(original, copy)?;

        if fast_path {
            self.tracer.on_fast_path(original, copy, len);
            return Ok(copy);
        }

        let HeapData::Array(source) = self.heap.get(original) else {
            unreachable!("array values are arrays");
        };
        // elements are stored row-major, so offsets follow index enumeration order
        for (offset, element) in source.elements().iter().enumerate().rev() {
            self.work.push(Fill {
                target: copy,
                position: offset,
                source: element.clone(),
            });
        }
        self.tracer
            .on_shell(original, copy, Classification::Array, self.work.len());
        Ok(copy)
    }

    fn register(&mut self, original: HeapId, copy: HeapId) -> Result<(), CopyError> {
        if self.visited.insert(IdentityKey(original), copy).is_some() {
            return Err(CopyError::CircularityNotResolved { original });
        }
        Ok(())
    }
}
