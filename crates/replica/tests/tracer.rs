//! Tests for the copy tracers.

use pretty_assertions::assert_eq;
use replica::{
    Classification, CopyReport, DeepCopier, ElementType, Heap, HeapId, LogTracer, ProfilingTracer, RecordingTracer,
    TraceEvent, TypeDescriptor, Value,
};

fn nested(heap: &mut Heap) -> HeapId {
    let single = heap.register_type(TypeDescriptor::new("MySingleObject").field("One")).unwrap();
    let nested = heap
        .register_type(TypeDescriptor::new("MyNestedObject").field("Meta").field("Single"))
        .unwrap();
    let inner = heap.new_object(single, [("One", Value::from("single_one"))]).unwrap();
    heap.new_object(nested, [("Meta", Value::from("metadata")), ("Single", Value::Ref(inner))])
        .unwrap()
}

#[test]
fn profiling_report_counts_work() {
    let mut heap = Heap::new();
    let root = nested(&mut heap);

    let mut profiler = ProfilingTracer::new();
    let mut copier = DeepCopier::new().with_tracer(&mut profiler);
    copier.copy(&mut heap, &Value::Ref(root)).unwrap();
    copier.copy(&mut heap, &Value::Ref(root)).unwrap();
    drop(copier);

    let report = profiler.report();
    assert_eq!(
        report,
        CopyReport {
            calls: 2,
            failures: 0,
            leaves: 4,
            shared: 0,
            array_shells: 0,
            object_shells: 4,
            fast_path_arrays: 0,
            fills: 6,
            allocated: 4,
            max_pending: 2,
        }
    );
    assert!(report.to_string().contains("Object shells:    4"));
}

/// Elements are filled in row-major order.
#[test]
fn recording_shows_row_major_fills() {
    let mut heap = Heap::new();
    let grid = heap.new_array_filled(ElementType::Any, [2, 2]).unwrap();

    let mut copier = DeepCopier::new().with_tracer(RecordingTracer::new());
    let copy = copier.copy(&mut heap, &Value::Ref(grid)).unwrap().as_ref_id().unwrap();

    let events = copier.into_tracer().into_events();
    assert_eq!(
        events.first(),
        Some(&TraceEvent::Begin { roots: 1 })
    );
    assert_eq!(
        events[1],
        TraceEvent::Shell {
            original: grid,
            copy,
            kind: Classification::Array,
            pending: 4,
        }
    );
    let positions: Vec<usize> = events
        .iter()
        .filter_map(|event| match event {
            TraceEvent::Fill { position, .. } => Some(*position),
            _ => None,
        })
        .collect();
    assert_eq!(positions, [0, 1, 2, 3]);
    assert_eq!(events.last(), Some(&TraceEvent::Finish { allocated: 1 }));
}

#[test]
fn recording_limit_caps_events() {
    let mut heap = Heap::new();
    let root = nested(&mut heap);

    let mut copier = DeepCopier::new().with_tracer(RecordingTracer::with_limit(2));
    copier.copy(&mut heap, &Value::Ref(root)).unwrap();
    assert_eq!(copier.tracer().events().len(), 2);
}

#[test]
fn failures_are_recorded() {
    let mut heap = Heap::new();
    let file = Value::Ref(heap.new_handle(replica::HandleKind::File, 1).unwrap());

    let mut copier = DeepCopier::new().with_tracer(RecordingTracer::new());
    let err = copier.copy(&mut heap, &file).unwrap_err();
    assert_eq!(
        copier.tracer().events().last(),
        Some(&TraceEvent::Error { error: err })
    );
}

/// The log tracer only observes; the copy is unchanged with a subscriber installed.
#[test]
fn log_tracer_emits_without_changing_result() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter("replica=trace")
        .with_test_writer()
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let mut heap = Heap::new();
        let root = nested(&mut heap);
        let mut copier = DeepCopier::new().with_tracer(LogTracer::with_limit(1));
        let copy = copier.copy(&mut heap, &Value::Ref(root)).unwrap();
        assert!(heap.structurally_equal(&copy, &Value::Ref(root)));
    });
}
