//! Leaf / array / composite classification of values.

use std::fmt;

use ahash::{AHashMap, AHashSet};

use crate::{
    error::CopyError,
    heap::{Heap, HeapData},
    options::HandlePolicy,
    resource::ResourceTracker,
    types::{ClassId, TypeDescriptor},
    value::Value,
};

/// How the copy engine treats a value. Exactly one applies to every value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Classification {
    /// Copy-transparent: returned as-is.
    Leaf,
    /// Copied element by element into a same-shaped array.
    Array,
    /// Copied member by member into a fresh instance of the same type.
    Composite,
}

/// Decides which registered types are copy-transparent.
pub trait LeafPolicy: fmt::Debug {
    fn is_leaf(&self, descriptor: &TypeDescriptor) -> bool;
}

impl<P: LeafPolicy + ?Sized> LeafPolicy for &P {
    #[inline]
    fn is_leaf(&self, descriptor: &TypeDescriptor) -> bool {
        (**self).is_leaf(descriptor)
    }
}

/// Treats exactly the types declared immutable as leaves.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultLeafPolicy;

impl LeafPolicy for DefaultLeafPolicy {
    #[inline]
    fn is_leaf(&self, descriptor: &TypeDescriptor) -> bool {
        descriptor.is_immutable()
    }
}

/// Immutable types plus an explicit list of type names.
#[derive(Debug, Clone, Default)]
pub struct NamedLeafPolicy {
    names: AHashSet<String>,
}

impl NamedLeafPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, type_name: impl Into<String>) -> Self {
        self.names.insert(type_name.into());
        self
    }
}

impl<S: Into<String>> FromIterator<S> for NamedLeafPolicy {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl LeafPolicy for NamedLeafPolicy {
    fn is_leaf(&self, descriptor: &TypeDescriptor) -> bool {
        descriptor.is_immutable() || self.names.contains(descriptor.name())
    }
}

/// Classifies values, caching the outcome per type.
#[derive(Debug)]
pub struct Classifier<P: LeafPolicy = DefaultLeafPolicy> {
    policy: P,
    handles: HandlePolicy,
    cache: AHashMap<ClassId, Classification>,
}

impl<P: LeafPolicy> Classifier<P> {
    pub fn new(policy: P, handles: HandlePolicy) -> Self {
        Self {
            policy,
            handles,
            cache: AHashMap::new(),
        }
    }

    #[must_use]
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Classifies `value`. Inline values are always leaves; handles are leaves
    /// under `HandlePolicy::PassThrough` and an error otherwise. A reference
    /// this heap never issued is an `UnsupportedType` error.
    pub fn classify<T: ResourceTracker>(&mut self, heap: &Heap<T>, value: &Value) -> Result<Classification, CopyError> {
        let Value::Ref(id) = value else {
            return Ok(Classification::Leaf);
        };
        match heap.get_if_live(*id) {
            None => Err(CopyError::UnsupportedType {
                type_name: heap.type_name_of(value),
            }),
            Some(HeapData::Array(_)) => Ok(Classification::Array),
            Some(HeapData::Object(object)) => Ok(self.classify_class(heap, object.class())),
            Some(HeapData::Handle(_)) => match self.handles {
                HandlePolicy::PassThrough => Ok(Classification::Leaf),
                HandlePolicy::Reject => Err(CopyError::UnsupportedType {
                    type_name: heap.type_name_of(value),
                }),
            },
        }
    }

    fn classify_class<T: ResourceTracker>(&mut self, heap: &Heap<T>, class: ClassId) -> Classification {
        if let Some(&cached) = self.cache.get(&class) {
            return cached;
        }
        let classification = if self.policy.is_leaf(heap.types().get(class)) {
            Classification::Leaf
        } else {
            Classification::Composite
        };
        self.cache.insert(class, classification);
        classification
    }
}
