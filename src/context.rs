//! Cancellation and deadlines for sync operations.
//!
//! `SyncContext` is a small cloneable handle passed down the fetch path. A
//! child created with `with_timeout` inherits its parent's cancellation, so
//! cancelling the caller's context aborts every sync derived from it, while
//! each sync gets its own deadline from the repository's configured timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Cancellation flag chain plus an optional deadline.
#[derive(Debug, Clone)]
pub struct SyncContext {
    deadline: Option<Instant>,
    // Own flag last; earlier entries belong to ancestors.
    flags: Vec<Arc<AtomicBool>>,
}

impl Default for SyncContext {
    fn default() -> Self {
        Self::background()
    }
}

impl SyncContext {
    /// A root context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self {
            deadline: None,
            flags: vec![Arc::new(AtomicBool::new(false))],
        }
    }

    /// Derive a child whose deadline is `timeout` from now, or the parent's
    /// deadline if that is sooner.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now().checked_add(timeout);
        let deadline = match (self.deadline, candidate) {
            (Some(parent), Some(own)) => Some(parent.min(own)),
            (Some(parent), None) => Some(parent),
            (None, own) => own,
        };
        let mut flags = self.flags.clone();
        flags.push(Arc::new(AtomicBool::new(false)));
        Self { deadline, flags }
    }

    /// Cancel this context and every context derived from it.
    pub fn cancel(&self) {
        if let Some(own) = self.flags.last() {
            own.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flags.iter().any(|flag| flag.load(Ordering::SeqCst))
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline. `None` means unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Fail if the context was cancelled or its deadline has passed.
    ///
    /// `context` names what was being attempted, usually a URL.
    pub fn check(&self, context: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled {
                context: context.to_string(),
            });
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Error::DeadlineExceeded {
                    context: context.to_string(),
                });
            }
        }
        Ok(())
    }
}
