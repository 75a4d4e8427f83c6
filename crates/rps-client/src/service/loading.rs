//! In-flight tracking for the view's loading indicator.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Counts in-flight remote calls. Loading while the count is non-zero.
#[derive(Debug, Default)]
pub struct LoadingFlag {
    in_flight: AtomicUsize,
}

impl LoadingFlag {
    /// Idle flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a call in flight until the guard drops (including on error paths).
    pub fn begin(&self) -> LoadingGuard<'_> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        LoadingGuard { flag: self }
    }

    /// True while any call is in flight.
    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }
}

/// Clears its share of the loading flag on drop.
#[must_use = "loading is cleared as soon as the guard is dropped"]
pub struct LoadingGuard<'a> {
    flag: &'a LoadingFlag,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.flag.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
