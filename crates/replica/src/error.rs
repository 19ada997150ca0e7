//! Error types for the heap, the type registry and the copy engine.

use std::fmt;

use crate::{heap::HeapId, resource::ResourceError, types::ClassId};

/// Why a fresh instance could not be allocated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    /// The type only admits instances built by its own construction logic.
    ConstructorRequired,
    /// The heap's resource tracker refused the allocation.
    Resource(ResourceError),
    /// The allocator could not provide the buffer.
    OutOfMemory { bytes: usize },
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConstructorRequired => f.write_str("instances can only be created by a constructor"),
            Self::Resource(err) => write!(f, "{err}"),
            Self::OutOfMemory { bytes } => write!(f, "could not reserve {bytes} bytes"),
        }
    }
}

impl std::error::Error for AllocationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConstructorRequired | Self::OutOfMemory { .. } => None,
            Self::Resource(err) => Some(err),
        }
    }
}

impl From<ResourceError> for AllocationError {
    fn from(err: ResourceError) -> Self {
        Self::Resource(err)
    }
}

/// Errors raised while registering a [`TypeDescriptor`](crate::TypeDescriptor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    /// A type with the same name is already registered.
    DuplicateType(String),
    /// The declared base type is not registered in this registry.
    UnknownBase { type_name: String, base: ClassId },
    /// Two members of one type share a name.
    DuplicateMember { type_name: String, member: String },
    /// A computed member names a backing field that does not exist.
    UnknownBacking {
        type_name: String,
        member: String,
        backing: String,
    },
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateType(name) => write!(f, "type '{name}' is already registered"),
            Self::UnknownBase { type_name, base } => {
                write!(f, "type '{type_name}' extends unregistered base {base}")
            }
            Self::DuplicateMember { type_name, member } => {
                write!(f, "type '{type_name}' declares member '{member}' twice")
            }
            Self::UnknownBacking {
                type_name,
                member,
                backing,
            } => write!(
                f,
                "computed member '{type_name}.{member}' is backed by unknown field '{backing}'"
            ),
        }
    }
}

impl std::error::Error for TypeError {}

/// Errors raised by member and element access on heap values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// The id does not point at an object.
    NotAnObject(HeapId),
    /// The id does not point at an array.
    NotAnArray(HeapId),
    /// The type has no member with this name.
    UnknownMember { type_name: String, member: String },
    /// An array index tuple has the wrong number of coordinates.
    RankMismatch { expected: usize, found: usize },
    /// An index coordinate is outside its dimension.
    IndexOutOfBounds { index: Vec<usize>, dims: Vec<usize> },
    /// A value does not fit the array's element type.
    ElementType { expected: String, found: &'static str },
    /// The element buffer length does not match the shape.
    ShapeMismatch { expected: usize, found: usize },
    /// Arrays must have at least one dimension.
    ZeroRank,
    /// The element count of these dimensions does not fit in a `usize`.
    ShapeOverflow { dims: Vec<usize> },
    /// Building a new value failed.
    Allocation { type_name: String, cause: AllocationError },
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnObject(id) => write!(f, "{id} is not an object"),
            Self::NotAnArray(id) => write!(f, "{id} is not an array"),
            Self::UnknownMember { type_name, member } => {
                write!(f, "'{type_name}' has no member '{member}'")
            }
            Self::RankMismatch { expected, found } => {
                write!(f, "expected an index of rank {expected}, got rank {found}")
            }
            Self::IndexOutOfBounds { index, dims } => {
                write!(f, "index {index:?} is out of bounds for dimensions {dims:?}")
            }
            Self::ElementType { expected, found } => {
                write!(f, "cannot store a {found} value in an array of {expected}")
            }
            Self::ShapeMismatch { expected, found } => {
                write!(f, "shape holds {expected} elements but {found} were supplied")
            }
            Self::ZeroRank => f.write_str("arrays need at least one dimension"),
            Self::ShapeOverflow { dims } => write!(f, "dimensions {dims:?} hold more elements than fit in memory"),
            Self::Allocation { type_name, cause } => {
                write!(f, "cannot allocate '{type_name}': {cause}")
            }
        }
    }
}

impl std::error::Error for AccessError {}

/// Errors surfaced by a deep copy. Each one is local to the failing call: the
/// original graph is never mutated and the partial copy is discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyError {
    /// The value's runtime shape is neither leaf, array nor composite and no
    /// pass-through policy applies (opaque handles under `HandlePolicy::Reject`).
    UnsupportedType { type_name: String },
    /// A shell for the given type could not be allocated.
    AllocationFailure { type_name: String, cause: AllocationError },
    /// An original was registered twice in the visited map. Only reachable
    /// through an engine bug.
    CircularityNotResolved { original: HeapId },
    /// The tracker's step or time budget ran out mid-copy.
    Interrupted(ResourceError),
}

impl fmt::Display for CopyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedType { type_name } => write!(f, "cannot copy value of type '{type_name}'"),
            Self::AllocationFailure { type_name, cause } => {
                write!(f, "cannot allocate copy of '{type_name}': {cause}")
            }
            Self::CircularityNotResolved { original } => {
                write!(f, "{original} was reached again before its copy was registered")
            }
            Self::Interrupted(err) => write!(f, "copy interrupted: {err}"),
        }
    }
}

impl std::error::Error for CopyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::AllocationFailure { cause, .. } => Some(cause),
            Self::Interrupted(err) => Some(err),
            Self::UnsupportedType { .. } | Self::CircularityNotResolved { .. } => None,
        }
    }
}
