//! Run context passed to evaluators, backends and schedulers

use crate::error::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cancellation handle shared by everything taking part in one run
///
/// Clones observe the same flag. Once cancelled, schedulers stop issuing
/// new work and let in-flight nodes finish; backends may poll
/// [`Context::is_cancelled`] to abort long calls.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancelled: Arc<AtomicBool>,
}

impl Context {
    /// Create a fresh, uncancelled context
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with `Error::Cancelled` if cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
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
    fn test_clones_share_cancellation() {
        let ctx = Context::new();
        let worker = ctx.clone();
        assert!(worker.check().is_ok());

        ctx.cancel();
        assert!(worker.is_cancelled());
        assert!(matches!(worker.check(), Err(Error::Cancelled)));
    }
}
