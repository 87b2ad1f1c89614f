//! Shared completion counters for a single dispatch run.

use std::{
    fmt,
    num::NonZeroUsize,
    sync::{Mutex, PoisonError},
};

/// Snapshot of the counters, taken right after an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressState {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl ProgressState {
    pub fn completed(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Share of completed items, in `0.0..=100.0`.
    pub fn percent(&self) -> f64 {
        // `total` is never zero, see [`ProgressTracker::new`].
        self.completed() as f64 / self.total as f64 * 100.0
    }

    pub fn is_done(&self) -> bool {
        self.completed() == self.total
    }
}

impl fmt::Display for ProgressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:5.1}%]", self.percent())
    }
}

/// Thread safe success/failure counters.
///
/// Every update happens inside a single critical section, so concurrent completions
/// never lose an increment and every returned [`ProgressState`] is consistent.
#[derive(Debug)]
pub struct ProgressTracker {
    state: Mutex<ProgressState>,
}

impl ProgressTracker {
    /// A tracker expecting exactly `total` completions. There is no tracker for an
    /// empty run, which keeps [`ProgressState::percent`] well defined.
    pub fn new(total: NonZeroUsize) -> Self {
        Self {
            state: Mutex::new(ProgressState {
                total: total.get(),
                succeeded: 0,
                failed: 0,
            }),
        }
    }

    pub fn record_success(&self) -> ProgressState {
        self.update(|s| s.succeeded += 1)
    }

    pub fn record_failure(&self) -> ProgressState {
        self.update(|s| s.failed += 1)
    }

    pub fn snapshot(&self) -> ProgressState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, f: impl FnOnce(&mut ProgressState)) -> ProgressState {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state);
        debug_assert!(
            state.completed() <= state.total,
            "more completions than items: {state:?}"
        );
        *state
    }
}
