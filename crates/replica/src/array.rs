//! N-dimensional arrays stored in row-major order.

use std::{fmt, mem};

use smallvec::SmallVec;

use crate::{
    error::{AccessError, AllocationError},
    types::ClassId,
    value::Value,
};

/// Index tuple into an array. Most arrays have rank 3 or less.
pub type Index = SmallVec<[usize; 3]>;

/// Rank and per-dimension lengths of an array.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArrayShape {
    dims: Index,
    /// Product of `dims`, known to fit in a `usize`.
    len: usize,
}

impl ArrayShape {
    /// Builds a shape from its dimension lengths. A zero-length dimension is
    /// allowed; zero dimensions are not, and neither is an element count that
    /// does not fit in a `usize`.
    pub fn new(dims: impl IntoIterator<Item = usize>) -> Result<Self, AccessError> {
        let dims: Index = dims.into_iter().collect();
        if dims.is_empty() {
            return Err(AccessError::ZeroRank);
        }
        let len = if dims.contains(&0) {
            0
        } else {
            dims.iter()
                .try_fold(1usize, |len, &dim| len.checked_mul(dim))
                .ok_or_else(|| AccessError::ShapeOverflow { dims: dims.to_vec() })?
        };
        Ok(Self { dims, len })
    }

    /// Shape of a one-dimensional array.
    #[must_use]
    pub fn vector(len: usize) -> Self {
        Self {
            dims: smallvec::smallvec![len],
            len,
        }
    }

    #[must_use]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    #[must_use]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Total number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Converts an index tuple into the row-major offset of the element buffer.
    pub fn offset(&self, index: &[usize]) -> Result<usize, AccessError> {
        if index.len() != self.rank() {
            return Err(AccessError::RankMismatch {
                expected: self.rank(),
                found: index.len(),
            });
        }
        let mut offset = 0;
        for (&i, &dim) in index.iter().zip(&self.dims) {
            if i >= dim {
                return Err(AccessError::IndexOutOfBounds {
                    index: index.to_vec(),
                    dims: self.dims.to_vec(),
                });
            }
            // stays below `len`, so it cannot overflow
            offset = offset * dim + i;
        }
        Ok(offset)
    }

    /// Every valid index tuple, last dimension varying fastest.
    #[must_use]
    pub fn indices(&self) -> Indices<'_> {
        Indices {
            dims: &self.dims,
            next: if self.is_empty() {
                None
            } else {
                Some(smallvec::smallvec![0; self.rank()])
            },
        }
    }
}

impl fmt::Display for ArrayShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, dim) in self.dims.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{dim}")?;
        }
        f.write_str("]")
    }
}

/// Row-major odometer over the index tuples of an [`ArrayShape`].
#[derive(Debug, Clone)]
pub struct Indices<'a> {
    dims: &'a [usize],
    next: Option<Index>,
}

impl Iterator for Indices<'_> {
    type Item = Index;

    fn next(&mut self) -> Option<Index> {
        let current = self.next.take()?;
        let mut following = current.clone();
        for axis in (0..following.len()).rev() {
            following[axis] += 1;
            if following[axis] < self.dims[axis] {
                self.next = Some(following);
                break;
            }
            following[axis] = 0;
        }
        Some(current)
    }
}

/// What an array's elements may hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// Any value, including handles.
    Any,
    Bool,
    Int,
    Float,
    Char,
    /// Text or `None`.
    Text,
    /// `None` or a reference to an instance of the class or one of its subtypes.
    Object(ClassId),
    /// `None` or a reference to another array (jagged arrays).
    Array,
}

impl ElementType {
    /// True when every element is an inline leaf value, so a memberwise copy
    /// of the buffer is already a deep copy.
    #[must_use]
    pub fn is_leaf_kind(&self) -> bool {
        matches!(self, Self::Bool | Self::Int | Self::Float | Self::Char | Self::Text)
    }

    /// The value a fresh array holds in every element.
    #[must_use]
    pub fn zero_value(&self) -> Value {
        match self {
            Self::Bool => Value::Bool(false),
            Self::Int => Value::Int(0),
            Self::Float => Value::Float(0.0),
            Self::Char => Value::Char('\0'),
            Self::Any | Self::Text | Self::Object(_) | Self::Array => Value::None,
        }
    }

    /// Checks an inline value against the element type. References are
    /// reported as `None` since only the heap can resolve what they point at.
    pub(crate) fn admits_inline(&self, value: &Value) -> Option<bool> {
        let admitted = match (self, value) {
            (Self::Any, _) => true,
            (_, Value::Ref(_)) => return None,
            (Self::Bool, Value::Bool(_))
            | (Self::Int, Value::Int(_))
            | (Self::Float, Value::Float(_))
            | (Self::Char, Value::Char(_))
            | (Self::Text | Self::Object(_) | Self::Array, Value::None)
            | (Self::Text, Value::Text(_)) => true,
            _ => false,
        };
        Some(admitted)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::Bool => f.write_str("bool"),
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::Char => f.write_str("char"),
            Self::Text => f.write_str("text"),
            Self::Object(class) => write!(f, "{class}"),
            Self::Array => f.write_str("array"),
        }
    }
}

/// A typed N-dimensional array.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    element_type: ElementType,
    shape: ArrayShape,
    elements: Vec<Value>,
}

impl Array {
    /// A new array with every element set to the element type's zero value.
    ///
    /// Fails with [`AllocationError::OutOfMemory`] instead of aborting when the
    /// buffer cannot be reserved.
    pub fn filled(element_type: ElementType, shape: ArrayShape) -> Result<Self, AllocationError> {
        let mut elements = Vec::new();
        elements
            .try_reserve_exact(shape.len())
            .map_err(|_| AllocationError::OutOfMemory {
                bytes: Self::size_for(&shape),
            })?;
        elements.resize(shape.len(), element_type.zero_value());
        Ok(Self {
            element_type,
            shape,
            elements,
        })
    }

    /// Approximate heap footprint of an array of this shape, saturating at
    /// `usize::MAX`. Known before the buffer exists.
    #[must_use]
    pub fn size_for(shape: &ArrayShape) -> usize {
        shape
            .len()
            .saturating_mul(mem::size_of::<Value>())
            .saturating_add(mem::size_of::<Self>())
    }

    /// Wraps a row-major element buffer. Element types are not checked here;
    /// [`Heap::new_array`](crate::Heap::new_array) does that.
    pub fn from_parts(element_type: ElementType, shape: ArrayShape, elements: Vec<Value>) -> Result<Self, AccessError> {
        if elements.len() != shape.len() {
            return Err(AccessError::ShapeMismatch {
                expected: shape.len(),
                found: elements.len(),
            });
        }
        Ok(Self {
            element_type,
            shape,
            elements,
        })
    }

    #[must_use]
    pub fn element_type(&self) -> &ElementType {
        &self.element_type
    }

    #[must_use]
    pub fn shape(&self) -> &ArrayShape {
        &self.shape
    }

    #[must_use]
    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    #[must_use]
    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, index: &[usize]) -> Result<&Value, AccessError> {
        let offset = self.shape.offset(index)?;
        Ok(&self.elements[offset])
    }

    /// Row-major element buffer.
    #[must_use]
    pub fn elements(&self) -> &[Value] {
        &self.elements
    }

    /// Every valid index tuple in row-major order.
    #[must_use]
    pub fn indices(&self) -> Indices<'_> {
        self.shape.indices()
    }

    pub(crate) fn set(&mut self, index: &[usize], value: Value) -> Result<Value, AccessError> {
        let offset = self.shape.offset(index)?;
        Ok(mem::replace(&mut self.elements[offset], value))
    }

    pub(crate) fn elements_mut(&mut self) -> &mut [Value] {
        &mut self.elements
    }

    pub(crate) fn estimate_size(&self) -> usize {
        Self::size_for(&self.shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_are_row_major() {
        let shape = ArrayShape::new([2, 3]).unwrap();
        let all: Vec<Vec<usize>> = shape.indices().map(|i| i.to_vec()).collect();
        assert_eq!(
            all,
            [[0, 0], [0, 1], [0, 2], [1, 0], [1, 1], [1, 2]].map(|i| i.to_vec())
        );
        for (n, index) in shape.indices().enumerate() {
            assert_eq!(shape.offset(&index).unwrap(), n);
        }
    }

    #[test]
    fn empty_dimension_has_no_indices() {
        let shape = ArrayShape::new([3, 0, 2]).unwrap();
        assert_eq!(shape.len(), 0);
        assert_eq!(shape.indices().count(), 0);
    }

    #[test]
    fn zero_rank_is_rejected() {
        assert_eq!(ArrayShape::new([]), Err(AccessError::ZeroRank));
    }

    #[test]
    fn offset_checks_rank_and_bounds() {
        let shape = ArrayShape::new([2, 2]).unwrap();
        assert_eq!(
            shape.offset(&[1]),
            Err(AccessError::RankMismatch { expected: 2, found: 1 })
        );
        assert!(matches!(shape.offset(&[0, 2]), Err(AccessError::IndexOutOfBounds { .. })));
    }

    #[test]
    fn filled_uses_zero_values() {
        let ints = Array::filled(ElementType::Int, ArrayShape::vector(3)).unwrap();
        assert_eq!(ints.elements(), [Value::Int(0), Value::Int(0), Value::Int(0)]);
        let texts = Array::filled(ElementType::Text, ArrayShape::vector(1)).unwrap();
        assert_eq!(texts.elements(), [Value::None]);
    }

    #[test]
    fn overflowing_shape_is_rejected() {
        assert_eq!(
            ArrayShape::new([usize::MAX, 2]),
            Err(AccessError::ShapeOverflow {
                dims: vec![usize::MAX, 2]
            })
        );
        assert!(ArrayShape::new([1 << 63, 2]).is_err());

        let empty = ArrayShape::new([usize::MAX, 0, 2]).unwrap();
        assert_eq!(empty.len(), 0);
        assert_eq!(empty.offset(&[0, 0, 0]).map(|_| ()), Err(AccessError::IndexOutOfBounds {
            index: vec![0, 0, 0],
            dims: vec![usize::MAX, 0, 2],
        }));
    }

    #[test]
    fn unreservable_buffer_is_an_error() {
        let shape = ArrayShape::new([1 << 60]).unwrap();
        assert_eq!(Array::size_for(&shape), usize::MAX);
        assert_eq!(
            Array::filled(ElementType::Any, shape),
            Err(AllocationError::OutOfMemory { bytes: usize::MAX })
        );
    }
}
