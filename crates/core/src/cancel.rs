//! Cooperative cancellation
//!
//! A cancel callback is registered per filesystem handle and consulted
//! before each expensive step (per-revision scan, per-entry walk,
//! per-chunk read). Cancellation surfaces as [`FsError::Cancelled`] and
//! unwinds normally; no partial commit becomes visible.

use crate::error::{FsError, Result};
use std::sync::Arc;

/// The cancellation callback type: returns true to cancel
pub type CancelFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// A possibly-absent cancellation hook
#[derive(Clone, Default)]
pub struct Cancel(Option<CancelFn>);

impl Cancel {
    /// A hook that never cancels
    pub fn never() -> Self {
        Cancel(None)
    }

    /// Wrap a callback
    pub fn new(f: CancelFn) -> Self {
        Cancel(Some(f))
    }

    /// Consult the callback, surfacing `Cancelled` when it fires
    pub fn check(&self) -> Result<()> {
        match &self.0 {
            Some(f) if f() => Err(FsError::Cancelled),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for Cancel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Cancel")
            .field(&self.0.as_ref().map(|_| "fn"))
            .finish()
    }
}
