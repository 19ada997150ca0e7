//! Tests for leaf, handle and allocation policies and for their configuration.

use std::{str::FromStr, sync::Arc};

use pretty_assertions::assert_eq;
use replica::{
    AllocationError, CopyError, CopyOptions, DeepCopier, HandleKind, HandlePolicy, Heap, NamedLeafPolicy,
    ResourceLimits, TypeDescriptor, Value, deep_copy,
};

// =============================================================================
// 1. Leaves
// =============================================================================

/// Inline values come back unchanged; text keeps pointing at the same buffer.
#[test]
fn builtins_are_returned_as_is() {
    let mut heap = Heap::new();

    let text = Value::from("hello there");
    let copy = deep_copy(&mut heap, &text).unwrap();
    assert_eq!(copy, text);
    let (Value::Text(a), Value::Text(b)) = (&text, &copy) else {
        panic!("expected text");
    };
    assert!(Arc::ptr_eq(a, b));

    assert_eq!(deep_copy(&mut heap, &Value::Int(123)).unwrap(), Value::Int(123));
    assert_eq!(deep_copy(&mut heap, &Value::None).unwrap(), Value::None);
    assert!(heap.is_empty());
}

/// Whitelisted type names are treated as leaves.
#[test]
fn named_leaf_policy() {
    let mut heap = Heap::new();
    let config = heap.register_type(TypeDescriptor::new("Config").field("path")).unwrap();
    let service = heap.register_type(TypeDescriptor::new("Service").field("config")).unwrap();
    let shared = heap.new_object(config, [("path", Value::from("/etc"))]).unwrap();
    let original = heap.new_object(service, [("config", Value::Ref(shared))]).unwrap();

    let mut copier = DeepCopier::new().with_leaf_policy(NamedLeafPolicy::from_iter(["Config"]));
    let copy = copier.copy(&mut heap, &Value::Ref(original)).unwrap();
    let copy = copy.as_ref_id().unwrap();

    assert_ne!(copy, original);
    assert_eq!(heap.get_member(copy, "config").unwrap(), Value::Ref(shared));
}

// =============================================================================
// 2. Handles
// =============================================================================

fn holder_with_file(heap: &mut Heap) -> (Value, Value) {
    let holder = heap
        .register_type(TypeDescriptor::new("LogSink").field("name").field("file"))
        .unwrap();
    let file = Value::Ref(heap.new_handle(HandleKind::File, 7).unwrap());
    let sink = heap
        .new_object(holder, [("name", Value::from("audit")), ("file", file.clone())])
        .unwrap();
    (Value::Ref(sink), file)
}

/// Under the default policy a handle anywhere in the graph fails the copy and
/// nothing is left behind.
#[test]
fn handles_are_rejected_by_default() {
    let mut heap = Heap::new();
    let (sink, _) = holder_with_file(&mut heap);
    let before = heap.heap_stats();

    let err = deep_copy(&mut heap, &sink).unwrap_err();
    assert_eq!(
        err,
        CopyError::UnsupportedType {
            type_name: "handle<file>".to_owned()
        }
    );
    assert!(before.diff(&heap.heap_stats()).is_empty());
}

/// Under `PassThrough` the copy refers to the original handle.
#[test]
fn handles_pass_through_when_configured() {
    let mut heap = Heap::new();
    let (sink, file) = holder_with_file(&mut heap);

    let options = CopyOptions::new().with_handles(HandlePolicy::PassThrough);
    let copy = DeepCopier::new().with_options(options).copy(&mut heap, &sink).unwrap();
    let copy = copy.as_ref_id().unwrap();

    assert_ne!(Value::Ref(copy), sink);
    assert_eq!(heap.get_member(copy, "file").unwrap(), file);
}

// =============================================================================
// 3. Constructor-Only Types
// =============================================================================

/// A type that cannot be allocated without its constructor fails the copy with
/// `AllocationFailure`, even when nested, and the heap is unchanged.
#[test]
fn constructor_only_types_fail_cleanly() {
    let mut heap = Heap::new();
    let token = heap
        .register_type(TypeDescriptor::new("Token").field("secret").constructor_only())
        .unwrap();
    let session = heap
        .register_type(TypeDescriptor::new("Session").field("user").field("token"))
        .unwrap();
    let tok = heap.new_object(token, [("secret", Value::Int(9))]).unwrap();
    let root = heap
        .new_object(session, [("user", Value::from("ada")), ("token", Value::Ref(tok))])
        .unwrap();
    let before = heap.heap_stats();

    let expected = CopyError::AllocationFailure {
        type_name: "Token".to_owned(),
        cause: AllocationError::ConstructorRequired,
    };
    assert_eq!(deep_copy(&mut heap, &Value::Ref(tok)), Err(expected.clone()));
    assert_eq!(deep_copy(&mut heap, &Value::Ref(root)), Err(expected));
    assert!(before.diff(&heap.heap_stats()).is_empty());
    assert_eq!(heap.get_member(root, "token").unwrap(), Value::Ref(tok));
}

// =============================================================================
// 4. Configuration
// =============================================================================

#[test]
fn copy_options_from_json() {
    let options: CopyOptions = serde_json::from_str("{}").unwrap();
    assert_eq!(options, CopyOptions::default());

    let options: CopyOptions =
        serde_json::from_str(r#"{"handles": "pass_through", "leaf_array_fast_path": false}"#).unwrap();
    assert_eq!(
        options,
        CopyOptions::new()
            .with_handles(HandlePolicy::PassThrough)
            .with_leaf_array_fast_path(false)
    );

    assert_eq!(
        serde_json::to_string(&CopyOptions::default()).unwrap(),
        r#"{"handles":"reject","leaf_array_fast_path":true}"#
    );
}

#[test]
fn handle_policy_from_str() {
    assert_eq!(HandlePolicy::from_str("reject").unwrap(), HandlePolicy::Reject);
    assert_eq!(HandlePolicy::from_str("pass_through").unwrap(), HandlePolicy::PassThrough);
    assert_eq!(HandlePolicy::PassThrough.to_string(), "pass_through");
    assert!(HandlePolicy::from_str("deep").is_err());
}

#[test]
fn resource_limits_from_json() {
    let limits: ResourceLimits = serde_json::from_str(r#"{"max_allocations": 10}"#).unwrap();
    assert_eq!(limits, ResourceLimits::new().max_allocations(10));
}
