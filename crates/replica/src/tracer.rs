//! Deep-copy tracing infrastructure.
//!
//! The copy engine is generic over a [`CopyTracer`] and calls its hooks at each
//! traversal event. Hooks default to no-ops, so with [`NoopTracer`] every call
//! compiles away via monomorphization, the same way
//! [`NoLimitTracker`](crate::NoLimitTracker) removes resource checks.
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | Zero-cost no-op (default) |
//! | [`LogTracer`] | Emits a `tracing` event per traversal step |
//! | [`ProfilingTracer`] | Counters summarized in a [`CopyReport`] |
//! | [`RecordingTracer`] | Full event list for post-mortem inspection |
//!
//! ```
//! use replica::{DeepCopier, ElementType, Heap, ProfilingTracer, Value};
//!
//! let mut heap = Heap::new();
//! let grid = heap.new_array_filled(ElementType::Any, [2, 2]).unwrap();
//! let mut copier = DeepCopier::new().with_tracer(ProfilingTracer::new());
//! copier.copy(&mut heap, &Value::Ref(grid)).unwrap();
//! assert_eq!(copier.tracer().report().array_shells, 1);
//! ```

use std::fmt;

use crate::{classify::Classification, error::CopyError, heap::HeapId, value::Value};

/// Trace event emitted during a deep copy.
///
/// Used by [`RecordingTracer`] to capture a full traversal.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    /// A copy call started.
    Begin { roots: usize },
    /// A value was returned unchanged.
    Leaf { value: Value },
    /// An already-copied original was reached again.
    Shared { original: HeapId, copy: HeapId },
    /// A shell was allocated and registered for an original.
    Shell {
        original: HeapId,
        copy: HeapId,
        kind: Classification,
        /// Work stack length once the shell's children are queued.
        pending: usize,
    },
    /// A leaf-element array was copied with a single buffer clone.
    FastPath { original: HeapId, copy: HeapId, elements: usize },
    /// A slot of a shell was written.
    Fill { target: HeapId, position: usize },
    /// The copy call succeeded.
    Finish { allocated: usize },
    /// The copy call failed and its allocations were rolled back.
    Error { error: CopyError },
}

/// Trait for deep-copy tracing.
///
/// All methods have default no-op implementations; implementations only
/// override the hooks they care about.
pub trait CopyTracer: fmt::Debug {
    /// Called once when a copy call starts.
    #[inline(always)]
    fn on_begin(&mut self, _roots: usize) {}

    /// Called when a value is returned unchanged (inline values, leaf types,
    /// passed-through handles).
    #[inline(always)]
    fn on_leaf(&mut self, _value: &Value) {}

    /// Called when an original that already has a copy is reached again.
    #[inline(always)]
    fn on_shared(&mut self, _original: HeapId, _copy: HeapId) {}

    /// Called after a shell is allocated, registered and its children queued.
    ///
    /// # Arguments
    /// * `kind` - `Array` or `Composite`
    /// * `pending` - Work stack length once the shell's children are queued
    #[inline(always)]
    fn on_shell(&mut self, _original: HeapId, _copy: HeapId, _kind: Classification, _pending: usize) {}

    /// Called when an array of leaf elements is copied in one step.
    #[inline(always)]
    fn on_fast_path(&mut self, _original: HeapId, _copy: HeapId, _elements: usize) {}

    /// Called after a slot of a shell receives its copied value. This is the
    /// hottest hook, called once per member or element.
    #[inline(always)]
    fn on_fill(&mut self, _target: HeapId, _position: usize) {}

    /// Called when a copy call succeeds.
    ///
    /// # Arguments
    /// * `allocated` - Number of heap entries the call allocated
    #[inline(always)]
    fn on_finish(&mut self, _allocated: usize) {}

    /// Called when a copy call fails, after its allocations are rolled back.
    #[inline(always)]
    fn on_error(&mut self, _error: &CopyError) {}
}

impl<Tr: CopyTracer + ?Sized> CopyTracer for &mut Tr {
    fn on_begin(&mut self, roots: usize) {
        (**self).on_begin(roots);
    }

    fn on_leaf(&mut self, value: &Value) {
        (**self).on_leaf(value);
    }

    fn on_shared(&mut self, original: HeapId, copy: HeapId) {
        (**self).on_shared(original, copy);
    }

    fn on_shell(&mut self, original: HeapId, copy: HeapId, kind: Classification, pending: usize) {
        (**self).on_shell(original, copy, kind, pending);
    }

    fn on_fast_path(&mut self, original: HeapId, copy: HeapId, elements: usize) {
        (**self).on_fast_path(original, copy, elements);
    }

    fn on_fill(&mut self, target: HeapId, position: usize) {
        (**self).on_fill(target, position);
    }

    fn on_finish(&mut self, allocated: usize) {
        (**self).on_finish(allocated);
    }

    fn on_error(&mut self, error: &CopyError) {
        (**self).on_error(error);
    }
}

/// Tracer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl CopyTracer for NoopTracer {}

// ============================================================================
// LogTracer — tracing events
// ============================================================================

/// Tracer that emits a `tracing` event at `TRACE` level for every traversal
/// step, under the `replica::trace` target.
///
/// Install any `tracing` subscriber and filter with
/// `RUST_LOG=replica::trace=trace` to see the output.
#[derive(Debug, Default)]
pub struct LogTracer {
    /// Maximum number of fill events to log before going quiet. None = unlimited.
    limit: Option<usize>,
    fills: usize,
}

impl LogTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops logging fills after `limit` of them; begin/finish/error are always logged.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            fills: 0,
        }
    }

    fn quiet(&self) -> bool {
        self.limit.is_some_and(|limit| self.fills >= limit)
    }
}

impl CopyTracer for LogTracer {
    fn on_begin(&mut self, roots: usize) {
        self.fills = 0;
        tracing::trace!(target: "replica::trace", roots, "begin");
    }

    fn on_leaf(&mut self, value: &Value) {
        if !self.quiet() {
            tracing::trace!(target: "replica::trace", kind = value.kind_name(), "leaf");
        }
    }

    fn on_shared(&mut self, original: HeapId, copy: HeapId) {
        if !self.quiet() {
            tracing::trace!(target: "replica::trace", %original, %copy, "shared");
        }
    }

    fn on_shell(&mut self, original: HeapId, copy: HeapId, kind: Classification, pending: usize) {
        if !self.quiet() {
            tracing::trace!(target: "replica::trace", %original, %copy, %kind, pending, "shell");
        }
    }

    fn on_fast_path(&mut self, original: HeapId, copy: HeapId, elements: usize) {
        if !self.quiet() {
            tracing::trace!(target: "replica::trace", %original, %copy, elements, "fast path");
        }
    }

    fn on_fill(&mut self, target: HeapId, position: usize) {
        if self.quiet() {
            return;
        }
        tracing::trace!(target: "replica::trace", %target, position, "fill");
        self.fills += 1;
        if let Some(limit) = self.limit
            && self.fills >= limit
        {
            tracing::trace!(target: "replica::trace", limit, "fill limit reached, going quiet");
        }
    }

    fn on_finish(&mut self, allocated: usize) {
        tracing::trace!(target: "replica::trace", allocated, "finish");
    }

    fn on_error(&mut self, error: &CopyError) {
        tracing::trace!(target: "replica::trace", %error, "error");
    }
}

// ============================================================================
// ProfilingTracer — counters
// ============================================================================

/// Tracer that counts traversal events across any number of copy calls.
///
/// Retrieve results via [`ProfilingTracer::report`].
#[derive(Debug, Default)]
pub struct ProfilingTracer {
    report: CopyReport,
}

/// Summary of the work done by one or more copy calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyReport {
    /// Copy calls started.
    pub calls: u64,
    /// Copy calls that failed.
    pub failures: u64,
    /// Values returned unchanged.
    pub leaves: u64,
    /// Revisits of already-copied originals (shared references and cycles).
    pub shared: u64,
    /// Array shells allocated, fast-path arrays included.
    pub array_shells: u64,
    /// Object shells allocated.
    pub object_shells: u64,
    /// Arrays copied with a single buffer clone.
    pub fast_path_arrays: u64,
    /// Slots written.
    pub fills: u64,
    /// Heap entries allocated by successful calls.
    pub allocated: u64,
    /// Largest work stack seen.
    pub max_pending: usize,
}

impl ProfilingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn report(&self) -> CopyReport {
        self.report.clone()
    }
}

impl CopyTracer for ProfilingTracer {
    fn on_begin(&mut self, _roots: usize) {
        self.report.calls += 1;
    }

    #[inline]
    fn on_leaf(&mut self, _value: &Value) {
        self.report.leaves += 1;
    }

    #[inline]
    fn on_shared(&mut self, _original: HeapId, _copy: HeapId) {
        self.report.shared += 1;
    }

    fn on_shell(&mut self, _original: HeapId, _copy: HeapId, kind: Classification, pending: usize) {
        match kind {
            Classification::Array => self.report.array_shells += 1,
            _ => self.report.object_shells += 1,
        }
        self.report.max_pending = self.report.max_pending.max(pending);
    }

    fn on_fast_path(&mut self, _original: HeapId, _copy: HeapId, _elements: usize) {
        self.report.fast_path_arrays += 1;
        self.report.array_shells += 1;
    }

    #[inline]
    fn on_fill(&mut self, _target: HeapId, _position: usize) {
        self.report.fills += 1;
    }

    fn on_finish(&mut self, allocated: usize) {
        self.report.allocated += allocated as u64;
    }

    fn on_error(&mut self, _error: &CopyError) {
        self.report.failures += 1;
    }
}

impl fmt::Display for CopyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Deep Copy Report ===")?;
        writeln!(f, "Calls:            {} ({} failed)", self.calls, self.failures)?;
        writeln!(f, "Allocated:        {}", self.allocated)?;
        writeln!(f, "Object shells:    {}", self.object_shells)?;
        writeln!(
            f,
            "Array shells:     {} ({} fast path)",
            self.array_shells, self.fast_path_arrays
        )?;
        writeln!(f, "Fills:            {}", self.fills)?;
        writeln!(f, "Leaves:           {}", self.leaves)?;
        writeln!(f, "Shared:           {}", self.shared)?;
        write!(f, "Max pending:      {}", self.max_pending)
    }
}

// ============================================================================
// RecordingTracer — full event list
// ============================================================================

/// Tracer that records every event in order.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    events: Vec<TraceEvent>,
    /// Optional limit on number of events recorded.
    limit: Option<usize>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a recording tracer that stops recording after `limit` events.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            events: Vec::with_capacity(limit.min(1024)),
            limit: Some(limit),
        }
    }

    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    #[must_use]
    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }

    fn record(&mut self, event: TraceEvent) {
        if self.limit.is_some_and(|limit| self.events.len() >= limit) {
            return;
        }
        self.events.push(event);
    }
}

impl CopyTracer for RecordingTracer {
    fn on_begin(&mut self, roots: usize) {
        self.record(TraceEvent::Begin { roots });
    }

    fn on_leaf(&mut self, value: &Value) {
        self.record(TraceEvent::Leaf { value: value.clone() });
    }

    fn on_shared(&mut self, original: HeapId, copy: HeapId) {
        self.record(TraceEvent::Shared { original, copy });
    }

    fn on_shell(&mut self, original: HeapId, copy: HeapId, kind: Classification, pending: usize) {
        self.record(TraceEvent::Shell {
            original,
            copy,
            kind,
            pending,
        });
    }

    fn on_fast_path(&mut self, original: HeapId, copy: HeapId, elements: usize) {
        self.record(TraceEvent::FastPath {
            original,
            copy,
            elements,
        });
    }

    fn on_fill(&mut self, target: HeapId, position: usize) {
        self.record(TraceEvent::Fill { target, position });
    }

    fn on_finish(&mut self, allocated: usize) {
        self.record(TraceEvent::Finish { allocated });
    }

    fn on_error(&mut self, error: &CopyError) {
        self.record(TraceEvent::Error { error: error.clone() });
    }
}
