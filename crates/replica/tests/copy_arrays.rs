//! Tests for deep copies of arrays.
//!
//! Arrays of rank 1 to 3 with leaf and composite elements, self-referencing
//! arrays, jagged arrays, empty dimensions and the leaf-element fast path.

use pretty_assertions::assert_eq;
use replica::{
    ClassId, CopyOptions, DeepCopier, ElementType, Heap, HeapId, Object, ProfilingTracer, TypeDescriptor, Value,
    identity_equals,
};

fn copy_ref(heap: &mut Heap, id: HeapId) -> HeapId {
    heap.deep_copy(&Value::Ref(id))
        .unwrap()
        .as_ref_id()
        .expect("an array copies to a reference")
}

// =============================================================================
// 1. Self-Reference
// =============================================================================

/// `arr[0] = arr` copies to an array whose first element is the copy itself.
#[test]
fn self_referencing_array() {
    let mut heap = Heap::new();
    let arr = heap.new_array_filled(ElementType::Any, [1]).unwrap();
    heap.set_element(arr, &[0], Value::Ref(arr)).unwrap();

    let copy = copy_ref(&mut heap, arr);
    assert_ne!(copy, arr);
    assert_eq!(heap.get_element(copy, &[0]).unwrap(), Value::Ref(copy));
    assert_eq!(heap.get_element(arr, &[0]).unwrap(), Value::Ref(arr));
}

// =============================================================================
// 2. Leaf Elements, Rank 1-3
// =============================================================================

fn int_array(heap: &mut Heap, dims: &[usize]) -> HeapId {
    let len: usize = dims.iter().product();
    let elements = (0..len).map(|i| Value::Int(i64::try_from(i).unwrap() * 10)).collect();
    heap.new_array(ElementType::Int, dims.iter().copied(), elements).unwrap()
}

/// Copies keep rank, every dimension length and every element.
#[test]
fn int_arrays_of_rank_one_to_three() {
    let mut heap = Heap::new();
    for dims in [&[5][..], &[2, 3][..], &[2, 3, 4][..]] {
        let original = int_array(&mut heap, dims);
        let copy = copy_ref(&mut heap, original);

        assert_ne!(copy, original);
        let (a, b) = (heap.array(original).unwrap(), heap.array(copy).unwrap());
        assert_eq!(b.rank(), dims.len());
        assert_eq!(b.dims(), dims);
        assert_eq!(b.elements(), a.elements());
    }
}

/// Writes to the copy do not show through in the original.
#[test]
fn int_array_copy_is_independent() {
    let mut heap = Heap::new();
    let original = int_array(&mut heap, &[2, 2]);
    let copy = copy_ref(&mut heap, original);

    heap.set_element(copy, &[1, 1], Value::Int(-1)).unwrap();
    assert_eq!(heap.get_element(original, &[1, 1]).unwrap(), Value::Int(30));
    assert_eq!(heap.get_element(copy, &[1, 1]).unwrap(), Value::Int(-1));
}

/// The fast path and the per-element path produce the same copy.
#[test]
fn fast_path_matches_per_element_copy() {
    let mut heap = Heap::new();
    let original = int_array(&mut heap, &[3, 4]);

    let mut fast = DeepCopier::new().with_tracer(ProfilingTracer::new());
    let fast_copy = fast.copy(&mut heap, &Value::Ref(original)).unwrap();
    let mut slow = DeepCopier::new()
        .with_options(CopyOptions::new().with_leaf_array_fast_path(false))
        .with_tracer(ProfilingTracer::new());
    let slow_copy = slow.copy(&mut heap, &Value::Ref(original)).unwrap();

    assert!(heap.structurally_equal(&fast_copy, &slow_copy));
    assert!(heap.structurally_equal(&fast_copy, &Value::Ref(original)));
    assert_eq!(fast.tracer().report().fast_path_arrays, 1);
    assert_eq!(fast.tracer().report().fills, 0);
    assert_eq!(slow.tracer().report().fast_path_arrays, 0);
    assert_eq!(slow.tracer().report().fills, 12);
}

/// A dimension of length zero is preserved.
#[test]
fn empty_dimension_is_preserved() {
    let mut heap = Heap::new();
    let original = heap.new_array_filled(ElementType::Any, [3, 0]).unwrap();
    let copy = copy_ref(&mut heap, original);
    assert_ne!(copy, original);
    assert_eq!(heap.array(copy).unwrap().dims(), [3, 0]);
    assert!(heap.array(copy).unwrap().is_empty());
}

// =============================================================================
// 3. Composite Elements
// =============================================================================

fn wrapper_equals(a: &Object, b: &Object) -> bool {
    a.slots() == b.slots()
}

fn wrapper_hash(object: &Object) -> u64 {
    object.slot(0).and_then(Value::as_int).map_or(0, i64::unsigned_abs)
}

fn wrapper_type(heap: &mut Heap) -> ClassId {
    heap.register_type(
        TypeDescriptor::new("Wrapper")
            .field("value")
            .with_equality(wrapper_equals)
            .with_hash(wrapper_hash),
    )
    .unwrap()
}

fn wrapper_array(heap: &mut Heap, class: ClassId, dims: &[usize]) -> HeapId {
    let len: usize = dims.iter().product();
    let mut elements = Vec::with_capacity(len);
    for i in 0..len {
        let value = Value::Int(i64::try_from(i).unwrap());
        elements.push(Value::Ref(heap.new_object(class, [("value", value)]).unwrap()));
    }
    heap.new_array(ElementType::Object(class), dims.iter().copied(), elements)
        .unwrap()
}

/// Every element of a composite array is a fresh instance that still compares
/// equal under the type's own equality.
#[test]
fn wrapper_arrays_of_rank_one_to_three() {
    let mut heap = Heap::new();
    let wrapper = wrapper_type(&mut heap);

    for dims in [&[4][..], &[2, 2][..], &[2, 2, 2][..]] {
        let original = wrapper_array(&mut heap, wrapper, dims);
        let copy = copy_ref(&mut heap, original);
        assert_eq!(heap.array(copy).unwrap().dims(), dims);

        let indices: Vec<_> = heap.array(original).unwrap().indices().collect();
        for index in indices {
            let a = heap.get_element(original, &index).unwrap();
            let b = heap.get_element(copy, &index).unwrap();
            assert!(heap.values_equal(&a, &b), "element {index:?} should equal its copy");
            assert_eq!(heap.value_hash(&a), heap.value_hash(&b));
            assert!(
                !identity_equals(&a.as_ref_id(), &b.as_ref_id()),
                "element {index:?} must be a new instance"
            );
        }
    }
}

/// An object stored at two positions is copied once.
#[test]
fn repeated_elements_stay_shared() {
    let mut heap = Heap::new();
    let wrapper = wrapper_type(&mut heap);
    let item = heap.new_object(wrapper, [("value", Value::Int(1))]).unwrap();
    let original = heap
        .new_array(ElementType::Object(wrapper), [2], vec![Value::Ref(item), Value::Ref(item)])
        .unwrap();

    let copy = copy_ref(&mut heap, original);
    let first = heap.get_element(copy, &[0]).unwrap();
    assert_eq!(heap.get_element(copy, &[1]).unwrap(), first);
    assert_ne!(first, Value::Ref(item));
}

// =============================================================================
// 4. Jagged Arrays
// =============================================================================

/// Inner arrays of a jagged array are arrays in their own right: each gets its
/// own copy, and an inner array listed twice is copied once.
#[test]
fn jagged_arrays_copy_each_inner_array() {
    let mut heap = Heap::new();
    let short = int_array(&mut heap, &[1]);
    let long = int_array(&mut heap, &[3]);
    let original = heap
        .new_array(
            ElementType::Array,
            [3],
            vec![Value::Ref(short), Value::Ref(long), Value::Ref(short)],
        )
        .unwrap();

    let copy = copy_ref(&mut heap, original);
    let rows: Vec<HeapId> = heap
        .array(copy)
        .unwrap()
        .elements()
        .iter()
        .map(|row| row.as_ref_id().unwrap())
        .collect();

    assert_ne!(rows[0], short);
    assert_ne!(rows[1], long);
    assert_eq!(rows[0], rows[2]);
    assert_eq!(heap.array(rows[0]).unwrap().dims(), [1]);
    assert_eq!(heap.array(rows[1]).unwrap().dims(), [3]);
    assert_eq!(heap.type_name_of(&Value::Ref(copy)), "array[]");
}
