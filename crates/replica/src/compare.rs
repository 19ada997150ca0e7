//! Type-aware equality and hashing, and structural comparison of two graphs.
//!
//! `values_equal` and `value_hash` honour a type's registered equality and hash
//! hooks, which is exactly what [`IdentityComparer`](crate::IdentityComparer)
//! ignores.

use ahash::AHashSet;

use crate::{
    heap::{Heap, HeapData, HeapId},
    identity::{fixed_hash, identity_hash},
    resource::ResourceTracker,
    value::Value,
};

impl<T: ResourceTracker> Heap<T> {
    /// Equality as the values' types define it.
    ///
    /// Two objects are compared with the first one's equality hook when its type
    /// registers one; every other reference compares by identity and inline
    /// values compare by value.
    #[must_use]
    pub fn values_equal(&self, a: &Value, b: &Value) -> bool {
        if let (Value::Ref(x), Value::Ref(y)) = (a, b)
            && let (Some(HeapData::Object(left)), Some(HeapData::Object(right))) =
                (self.get_if_live(*x), self.get_if_live(*y))
            && let Some(equality) = self.types().get(left.class()).equality()
        {
            return equality(left, right);
        }
        a == b
    }

    /// Hash as the value's type defines it: the hash hook for objects whose
    /// type registers one, the identity hash for other references.
    #[must_use]
    pub fn value_hash(&self, value: &Value) -> u64 {
        match value {
            Value::Ref(id) => {
                if let Some(HeapData::Object(object)) = self.get_if_live(*id)
                    && let Some(hash) = self.types().get(object.class()).hash()
                {
                    return hash(object);
                }
                identity_hash(id)
            }
            Value::None => fixed_hash(0u8),
            Value::Bool(b) => fixed_hash((1u8, b)),
            Value::Int(i) => fixed_hash((2u8, i)),
            Value::Float(f) => fixed_hash((3u8, f.to_bits())),
            Value::Char(c) => fixed_hash((4u8, c)),
            Value::Text(text) => fixed_hash((5u8, &**text)),
        }
    }

    /// Deep structural equality of the graphs reachable from `a` and `b`.
    ///
    /// Objects must have the same class and arrays the same element type and
    /// shape, with pairwise structurally-equal slots; inline values compare by
    /// value and handles by kind and raw value. Cycles are handled by assuming a
    /// pair of nodes already under comparison is equal. Sharing is not compared:
    /// a tree and a DAG with the same unfolding are structurally equal.
    #[must_use]
    pub fn structurally_equal(&self, a: &Value, b: &Value) -> bool {
        let mut seen: AHashSet<(HeapId, HeapId)> = AHashSet::new();
        let mut pending: Vec<(Value, Value)> = vec![(a.clone(), b.clone())];

        while let Some((left, right)) = pending.pop() {
            let (Value::Ref(x), Value::Ref(y)) = (&left, &right) else {
                if left != right {
                    return false;
                }
                continue;
            };
            if x == y || !seen.insert((*x, *y)) {
                continue;
            }
            let (Some(left), Some(right)) = (self.get_if_live(*x), self.get_if_live(*y)) else {
                return false;
            };
            match (left, right) {
                (HeapData::Object(l), HeapData::Object(r)) => {
                    if l.class() != r.class() {
                        return false;
                    }
                    pending.extend(l.slots().iter().cloned().zip(r.slots().iter().cloned()));
                }
                (HeapData::Array(l), HeapData::Array(r)) => {
                    if l.element_type() != r.element_type() || l.shape() != r.shape() {
                        return false;
                    }
                    pending.extend(l.elements().iter().cloned().zip(r.elements().iter().cloned()));
                }
                (HeapData::Handle(l), HeapData::Handle(r)) => {
                    if l != r {
                        return false;
                    }
                }
                _ => return false,
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{array::ElementType, heap::Object, types::TypeDescriptor};

    fn always_equal(_: &Object, _: &Object) -> bool {
        true
    }

    fn forty_two(_: &Object) -> u64 {
        42
    }

    #[test]
    fn hooks_drive_type_aware_comparison() {
        let mut heap = Heap::new();
        let class = heap
            .register_type(
                TypeDescriptor::new("OverriddenHash")
                    .with_equality(always_equal)
                    .with_hash(forty_two),
            )
            .unwrap();
        let a = Value::Ref(heap.new_object(class, [] as [(&str, Value); 0]).unwrap());
        let b = Value::Ref(heap.new_object(class, [] as [(&str, Value); 0]).unwrap());

        assert!(heap.values_equal(&a, &b));
        assert_eq!(heap.value_hash(&a), 42);
        assert_eq!(heap.value_hash(&b), 42);
    }

    #[test]
    fn references_without_hooks_compare_by_identity() {
        let mut heap = Heap::new();
        let a = Value::Ref(heap.new_array_filled(ElementType::Int, [1]).unwrap());
        let b = Value::Ref(heap.new_array_filled(ElementType::Int, [1]).unwrap());
        assert!(!heap.values_equal(&a, &b));
        assert!(heap.values_equal(&a, &a.clone()));
        assert!(heap.structurally_equal(&a, &b));
        assert_eq!(heap.value_hash(&Value::from("x")), heap.value_hash(&Value::from("x")));
    }

    #[test]
    fn structural_equality_follows_cycles() {
        let mut heap = Heap::new();
        let a = heap.new_array_filled(ElementType::Any, [1]).unwrap();
        heap.set_element(a, &[0], Value::Ref(a)).unwrap();
        let b = heap.new_array_filled(ElementType::Any, [1]).unwrap();
        heap.set_element(b, &[0], Value::Ref(b)).unwrap();
        let c = heap.new_array_filled(ElementType::Any, [1]).unwrap();

        assert!(heap.structurally_equal(&Value::Ref(a), &Value::Ref(b)));
        assert!(!heap.structurally_equal(&Value::Ref(a), &Value::Ref(c)));
    }
}
