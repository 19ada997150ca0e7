//! The dynamically-shaped value the copy engine operates on.

use std::sync::Arc;

use crate::heap::HeapId;

/// A value of a shape unknown at compile time.
///
/// Inline variants are immutable and copy-transparent: copying one returns it
/// unchanged (`Text` keeps pointing at the same shared buffer). Every mutable
/// object lives on the [`Heap`](crate::Heap) and is reached through `Ref`, whose
/// `HeapId` is the object's identity.
#[derive(Debug, Clone, PartialEq, Default, strum::IntoStaticStr)]
pub enum Value {
    /// The absent value (`null`).
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Char(char),
    Text(Arc<str>),
    /// Reference to an array, object or handle on the heap.
    Ref(HeapId),
}

impl Value {
    /// Builds a text value.
    #[must_use]
    pub fn text(text: impl Into<Arc<str>>) -> Self {
        Self::Text(text.into())
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Returns true for every inline variant, i.e. anything that is not a heap reference.
    #[must_use]
    pub fn is_inline(&self) -> bool {
        !matches!(self, Self::Ref(_))
    }

    #[must_use]
    pub fn as_ref_id(&self) -> Option<HeapId> {
        match self {
            Self::Ref(id) => Some(*id),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Name of the variant, used in error messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        self.into()
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<char> for Value {
    fn from(value: char) -> Self {
        Self::Char(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(Arc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(Arc::from(value))
    }
}

impl From<Arc<str>> for Value {
    fn from(value: Arc<str>) -> Self {
        Self::Text(value)
    }
}

impl From<HeapId> for Value {
    fn from(value: HeapId) -> Self {
        Self::Ref(value)
    }
}

impl<V: Into<Self>> From<Option<V>> for Value {
    fn from(value: Option<V>) -> Self {
        value.map_or(Self::None, Into::into)
    }
}
