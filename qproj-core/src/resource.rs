//! Cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cloneable cancellation flag polled by long-running operations.
///
/// The engine polls the flag at the top of literal linearization and at
/// the start of per-variable processing; once set, the running call
/// returns `false` with its outputs in an indeterminate but memory-safe
/// state. Wall-clock limits are the caller's responsibility.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create a fresh, unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_shared() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_canceled());
        flag.cancel();
        assert!(other.is_canceled());
    }
}
