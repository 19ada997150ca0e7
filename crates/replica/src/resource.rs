//! Allocation and step budgets for a [`Heap`](crate::Heap).
//!
//! Every allocation goes through the heap's [`ResourceTracker`], and the copy
//! engine reports one step per visited value. A [`LimitedTracker`] turns either
//! into an error once its [`ResourceLimits`] are used up; [`NoLimitTracker`]
//! compiles down to nothing.

use std::{
    fmt,
    time::{Duration, Instant},
};

/// A budget was used up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// Too many live allocations.
    Allocation { limit: usize, count: usize },
    /// Too many copy steps.
    Steps { limit: usize, count: usize },
    /// Wall-clock budget spent.
    Time { limit: Duration, elapsed: Duration },
    /// Approximate live bytes over budget.
    Memory { limit: usize, used: usize },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allocation { limit, count } => write!(f, "allocation budget of {limit} exceeded ({count} requested)"),
            Self::Steps { limit, count } => write!(f, "step budget of {limit} exceeded at step {count}"),
            Self::Time { limit, elapsed } => write!(f, "time budget of {limit:?} exceeded after {elapsed:?}"),
            Self::Memory { limit, used } => write!(f, "memory budget of {limit} bytes exceeded ({used} bytes)"),
        }
    }
}

impl std::error::Error for ResourceError {}

impl ResourceError {
    /// True for the errors raised on the allocation path (count or memory).
    #[must_use]
    pub fn is_allocation(&self) -> bool {
        matches!(self, Self::Allocation { .. } | Self::Memory { .. })
    }
}

/// Accounting hooks a [`Heap`](crate::Heap) calls as it grows and shrinks.
pub trait ResourceTracker: fmt::Debug {
    /// Called before an entry is pushed onto the heap. `size` is evaluated lazily
    /// so trackers that ignore memory never pay for the estimate.
    fn on_allocate(&mut self, size: impl FnOnce() -> usize) -> Result<(), ResourceError>;

    /// Called before a buffer of roughly `estimated_bytes` is built, so an
    /// oversized array is refused before its memory is requested. Charges
    /// nothing; `on_allocate` still runs once the entry exists.
    fn check_large_result(&self, estimated_bytes: usize) -> Result<(), ResourceError>;

    /// Called for each entry dropped when a failed copy is rolled back.
    fn on_free(&mut self, size: impl FnOnce() -> usize);

    /// Called once per value the copy engine visits.
    fn on_step(&mut self) -> Result<(), ResourceError>;

    /// Live allocations, for trackers that count them.
    fn allocation_count(&self) -> Option<usize> {
        None
    }

    /// Approximate live bytes, for trackers that count them.
    fn current_memory_bytes(&self) -> Option<usize> {
        None
    }
}

/// Tracker that never refuses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoLimitTracker;

impl ResourceTracker for NoLimitTracker {
    #[inline]
    fn on_allocate(&mut self, _size: impl FnOnce() -> usize) -> Result<(), ResourceError> {
        Ok(())
    }

    #[inline]
    fn check_large_result(&self, _estimated_bytes: usize) -> Result<(), ResourceError> {
        Ok(())
    }

    #[inline]
    fn on_free(&mut self, _size: impl FnOnce() -> usize) {}

    #[inline]
    fn on_step(&mut self) -> Result<(), ResourceError> {
        Ok(())
    }
}

/// Budgets for a [`LimitedTracker`]. `None` disables a budget.
///
/// ```
/// use std::time::Duration;
/// use replica::ResourceLimits;
///
/// let limits = ResourceLimits::new().max_allocations(10_000).max_duration(Duration::from_secs(1));
/// let from_config: ResourceLimits = serde_json::from_str(r#"{"max_allocations": 10000, "max_duration": {"secs": 1, "nanos": 0}}"#).unwrap();
/// assert_eq!(limits, from_config);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    pub max_allocations: Option<usize>,
    /// Approximate, see `HeapData::estimate_size`.
    pub max_memory: Option<usize>,
    pub max_steps: Option<usize>,
    /// Measured from tracker creation.
    pub max_duration: Option<Duration>,
}

impl ResourceLimits {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn max_allocations(mut self, limit: usize) -> Self {
        self.max_allocations = Some(limit);
        self
    }

    #[must_use]
    pub fn max_memory(mut self, bytes: usize) -> Self {
        self.max_memory = Some(bytes);
        self
    }

    #[must_use]
    pub fn max_steps(mut self, limit: usize) -> Self {
        self.max_steps = Some(limit);
        self
    }

    #[must_use]
    pub fn max_duration(mut self, limit: Duration) -> Self {
        self.max_duration = Some(limit);
        self
    }
}

/// Tracker enforcing a set of [`ResourceLimits`].
///
/// The clock starts when the tracker is created.
#[derive(Debug, Clone)]
pub struct LimitedTracker {
    limits: ResourceLimits,
    started: Instant,
    live_allocations: usize,
    live_bytes: usize,
    steps: usize,
}

impl LimitedTracker {
    #[must_use]
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            started: Instant::now(),
            live_allocations: 0,
            live_bytes: 0,
            steps: 0,
        }
    }

    #[must_use]
    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    #[must_use]
    pub fn allocation_count(&self) -> usize {
        self.live_allocations
    }

    #[must_use]
    pub fn current_memory(&self) -> usize {
        self.live_bytes
    }

    /// Steps taken by every copy run against this tracker so far.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl ResourceTracker for LimitedTracker {
    fn on_allocate(&mut self, size: impl FnOnce() -> usize) -> Result<(), ResourceError> {
        let count = self.live_allocations + 1;
        if let Some(limit) = self.limits.max_allocations
            && count > limit
        {
            return Err(ResourceError::Allocation { limit, count });
        }

        let used = self.live_bytes.saturating_add(size());
        if let Some(limit) = self.limits.max_memory
            && used > limit
        {
            return Err(ResourceError::Memory { limit, used });
        }

        self.live_allocations = count;
        self.live_bytes = used;
        Ok(())
    }

    fn check_large_result(&self, estimated_bytes: usize) -> Result<(), ResourceError> {
        if let Some(limit) = self.limits.max_memory {
            let used = self.live_bytes.saturating_add(estimated_bytes);
            if used > limit {
                return Err(ResourceError::Memory { limit, used });
            }
        }
        Ok(())
    }

    fn on_free(&mut self, size: impl FnOnce() -> usize) {
        self.live_allocations = self.live_allocations.saturating_sub(1);
        self.live_bytes = self.live_bytes.saturating_sub(size());
    }

    fn on_step(&mut self) -> Result<(), ResourceError> {
        self.steps += 1;
        if let Some(limit) = self.limits.max_steps
            && self.steps > limit
        {
            return Err(ResourceError::Steps {
                limit,
                count: self.steps,
            });
        }

        if let Some(limit) = self.limits.max_duration {
            let elapsed = self.started.elapsed();
            if elapsed > limit {
                return Err(ResourceError::Time { limit, elapsed });
            }
        }
        Ok(())
    }

    fn allocation_count(&self) -> Option<usize> {
        Some(self.live_allocations)
    }

    fn current_memory_bytes(&self) -> Option<usize> {
        Some(self.live_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_budget() {
        let mut tracker = LimitedTracker::new(ResourceLimits::new().max_allocations(2));
        assert!(tracker.on_allocate(|| 8).is_ok());
        assert!(tracker.on_allocate(|| 8).is_ok());
        let err = tracker.on_allocate(|| 8).unwrap_err();
        assert_eq!(err, ResourceError::Allocation { limit: 2, count: 3 });
        assert!(err.is_allocation());
        assert_eq!(tracker.allocation_count(), 2);
    }

    #[test]
    fn freeing_returns_budget() {
        let mut tracker = LimitedTracker::new(ResourceLimits::new().max_allocations(1).max_memory(16));
        tracker.on_allocate(|| 16).unwrap();
        tracker.on_free(|| 16);
        assert_eq!(tracker.current_memory(), 0);
        assert!(tracker.on_allocate(|| 16).is_ok());
    }

    #[test]
    fn memory_is_counted_without_a_budget() {
        let mut tracker = LimitedTracker::new(ResourceLimits::new());
        tracker.on_allocate(|| 64).unwrap();
        assert_eq!(tracker.current_memory(), 64);
        assert_eq!(ResourceTracker::current_memory_bytes(&NoLimitTracker), None);
    }

    #[test]
    fn step_budget() {
        let mut tracker = LimitedTracker::new(ResourceLimits::new().max_steps(1));
        assert!(tracker.on_step().is_ok());
        assert_eq!(tracker.on_step(), Err(ResourceError::Steps { limit: 1, count: 2 }));
        assert_eq!(
            ResourceError::Steps { limit: 1, count: 2 }.to_string(),
            "step budget of 1 exceeded at step 2"
        );
    }

    #[test]
    fn large_results_are_checked_without_charging() {
        let mut tracker = LimitedTracker::new(ResourceLimits::new().max_memory(100));
        tracker.on_allocate(|| 40).unwrap();
        assert!(tracker.check_large_result(60).is_ok());
        assert_eq!(
            tracker.check_large_result(usize::MAX),
            Err(ResourceError::Memory {
                limit: 100,
                used: usize::MAX
            })
        );
        assert_eq!(tracker.current_memory(), 40);
        assert!(NoLimitTracker.check_large_result(usize::MAX).is_ok());
    }

    #[test]
    fn steps_and_clock_are_reported() {
        let mut tracker = LimitedTracker::new(ResourceLimits::new());
        for _ in 0..3 {
            tracker.on_step().unwrap();
        }
        assert_eq!(tracker.step_count(), 3);
        assert_eq!(tracker.limits(), &ResourceLimits::new());
        let first = tracker.elapsed();
        assert!(tracker.elapsed() >= first);
    }
}
