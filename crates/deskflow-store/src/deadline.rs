//! Request deadlines carried into write transactions.
//!
//! The server runs store calls on the blocking pool, where they keep going
//! after the request that started them has given up.  A [`Deadline`] lets
//! those writes notice and roll back instead of committing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::error::{Result, StoreError};

/// Expiry instant plus a shared cancellation flag.  Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct Deadline {
    expires_at: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl Deadline {
    /// Never expires unless cancelled.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn at(expires_at: Instant) -> Self {
        Self {
            expires_at: Some(expires_at),
            cancelled: Arc::default(),
        }
    }

    /// Mark every clone of this deadline as passed.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn has_passed(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
            || self.expires_at.is_some_and(|at| Instant::now() >= at)
    }

    /// [`StoreError::DeadlineExceeded`] once the deadline has passed.
    pub fn check(&self) -> Result<()> {
        if self.has_passed() {
            return Err(StoreError::DeadlineExceeded);
        }
        Ok(())
    }
}
