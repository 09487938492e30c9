//! Execution context.
//!
//! This module contains the context that bounds the fetch/extract pipeline in time and allows to cancel it from elsewhere.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// The context a fetch or an extraction is bound to.
#[derive(Clone, Debug)]
pub(crate) struct Context {
    // The point in time after which all work has to stop.
    deadline: Option<Instant>,
    // Shared with every [CancelHandle] created for this context.
    cancelled: Arc<AtomicBool>,
}

impl Context {
    /// Creates a context that has no deadline and is never cancelled (unless via a [CancelHandle]).
    pub(crate) fn background() -> Self {
        Self {
            deadline: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Creates a context that expires after the given duration.
    pub(crate) fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            ..Self::background()
        }
    }

    /// Creates a context with an optional timeout.
    pub(crate) fn with_optional_timeout(timeout: Option<Duration>) -> Self {
        timeout.map_or_else(Self::background, Self::with_timeout)
    }

    /// Returns a handle that cancels this context.
    pub(crate) fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancelled: self.cancelled.clone(),
        }
    }

    /// Returns the time left until the deadline, if there is one.
    pub(crate) fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Whether the context was cancelled via a [CancelHandle] (regardless of the deadline).
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Whether the context was cancelled or its deadline has passed.
    pub(crate) fn is_done(&self) -> bool {
        self.is_cancelled() || self.remaining().is_some_and(|remaining| remaining.is_zero())
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

/// Handle to cancel a [Context] (possibly from another thread).
#[derive(Clone, Debug)]
pub(crate) struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Cancels the associated context.
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use test_log::test;

    #[test]
    fn background_is_never_done() {
        let ctx = Context::background();
        assert!(!ctx.is_done());
        assert_eq!(ctx.remaining(), None);
    }

    #[test]
    fn expired_timeout_is_done() {
        let ctx = Context::with_timeout(Duration::ZERO);
        assert!(ctx.is_done());
        assert!(!ctx.is_cancelled());
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn pending_timeout_is_not_done() {
        let ctx = Context::with_timeout(Duration::from_secs(3600));
        assert!(!ctx.is_done());
        assert!(ctx.remaining().unwrap() > Duration::from_secs(3000));
    }

    #[test]
    fn cancel_from_other_thread() {
        let ctx = Context::background();
        let handle = ctx.cancel_handle();
        std::thread::spawn(move || handle.cancel()).join().unwrap();
        assert!(ctx.is_cancelled());
        assert!(ctx.is_done());
    }

    #[test]
    fn clones_share_cancellation() {
        let ctx = Context::with_optional_timeout(None);
        let clone = ctx.clone();
        ctx.cancel_handle().cancel();
        assert!(clone.is_done());
    }
}
