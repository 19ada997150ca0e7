#![doc = include_str!("../../../README.md")]
mod array;
mod classify;
mod compare;
mod engine;
mod error;
mod heap;
pub mod identity;
mod options;
mod resource;
pub mod tracer;
mod types;
mod value;

pub use crate::{
    array::{Array, ArrayShape, ElementType, Index, Indices},
    classify::{Classification, Classifier, DefaultLeafPolicy, LeafPolicy, NamedLeafPolicy},
    engine::{DeepCopier, deep_copy},
    error::{AccessError, AllocationError, CopyError, TypeError},
    heap::{Handle, HandleKind, Heap, HeapData, HeapDiff, HeapId, HeapStats, Object},
    identity::{Identity, IdentityComparer, IdentityKey, IdentityMap, IdentitySet, identity_equals, identity_hash},
    options::{CopyOptions, HandlePolicy},
    resource::{LimitedTracker, NoLimitTracker, ResourceError, ResourceLimits, ResourceTracker},
    tracer::{CopyReport, CopyTracer, LogTracer, NoopTracer, ProfilingTracer, RecordingTracer, TraceEvent},
    types::{Accessor, ClassId, EqualityHook, HashHook, MemberDescriptor, TypeDescriptor, TypeRegistry, Visibility},
    value::Value,
};
