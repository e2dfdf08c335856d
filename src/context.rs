//! Cooperative deadline and cancellation.
//!
//! The ingestion core is single-threaded; long-running work (the xref walk,
//! object iteration, filter stages, the revision-6 hash loop) checks a
//! [`Context`] at every loop boundary instead of relying on ambient timers.
//! On expiry the in-flight call returns [`Error::Cancelled`] and leaves no
//! partially populated result behind.

use crate::error::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Deadline and cancellation token threaded through every call that may do
/// work.
///
/// Cloning is cheap; clones share the cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancel: Option<Arc<AtomicBool>>,
}

/// Handle that cancels the [`Context`] it was created with.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Cancel the associated context. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

impl Context {
    /// A context with no deadline and no cancellation.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that expires after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            cancel: None,
        }
    }

    /// A cancellable context and its cancellation handle.
    pub fn cancellable() -> (Self, CancelHandle) {
        let flag = Arc::new(AtomicBool::new(false));
        let ctx = Self {
            deadline: None,
            cancel: Some(flag.clone()),
        };
        (ctx, CancelHandle(flag))
    }

    /// A child context whose deadline is the tighter of the parent's and
    /// `now + timeout`. Cancellation is shared with the parent.
    pub fn tightened(&self, timeout: Duration) -> Self {
        let child = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(d) => Some(d.min(child)),
            None => Some(child),
        };
        Self {
            deadline,
            cancel: self.cancel.clone(),
        }
    }

    /// True once the context is cancelled or its deadline has passed.
    pub fn is_done(&self) -> bool {
        if let Some(flag) = &self.cancel {
            if flag.load(Ordering::Relaxed) {
                return true;
            }
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return true;
            }
        }
        false
    }

    /// Checkpoint: `Err(Cancelled)` once the context is done.
    pub fn check(&self) -> Result<()> {
        if self.is_done() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_never_done() {
        let ctx = Context::background();
        assert!(ctx.check().is_ok());
        assert!(!ctx.is_done());
    }

    #[test]
    fn test_cancel_handle() {
        let (ctx, handle) = Context::cancellable();
        assert!(ctx.check().is_ok());
        handle.cancel();
        assert!(matches!(ctx.check(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_expired_deadline() {
        let ctx = Context::with_timeout(Duration::ZERO);
        assert!(matches!(ctx.check(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_tightened_keeps_cancel_flag() {
        let (ctx, handle) = Context::cancellable();
        let child = ctx.tightened(Duration::from_secs(60));
        handle.cancel();
        assert!(child.is_done());
    }

    #[test]
    fn test_tightened_takes_minimum() {
        let parent = Context::with_timeout(Duration::ZERO);
        let child = parent.tightened(Duration::from_secs(60));
        assert!(child.is_done());
    }
}
