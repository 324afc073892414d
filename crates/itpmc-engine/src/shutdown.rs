//! Cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Analysis cancelled: {reason}")]
pub struct Cancelled {
    pub reason: String,
}

/// Shared stop flag with an optional wall-clock deadline.
///
/// Clones share the flag: a request on any clone is seen by all of them.
#[derive(Debug, Clone, Default)]
pub struct ShutdownNotifier {
    requested: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl ShutdownNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose deadline is `timeout_secs` from now; 0 means none.
    pub fn with_timeout_secs(timeout_secs: u64) -> Self {
        let deadline = if timeout_secs == 0 {
            None
        } else {
            Instant::now().checked_add(Duration::from_secs(timeout_secs))
        };
        Self {
            requested: Arc::default(),
            deadline,
        }
    }

    pub fn request_shutdown(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn should_shutdown(&self) -> bool {
        self.requested.load(Ordering::SeqCst) || self.deadline_exceeded()
    }

    pub fn check(&self) -> Result<(), Cancelled> {
        if self.requested.load(Ordering::SeqCst) {
            return Err(Cancelled {
                reason: "shutdown requested".into(),
            });
        }
        if self.deadline_exceeded() {
            return Err(Cancelled {
                reason: "timeout reached".into(),
            });
        }
        Ok(())
    }

    fn deadline_exceeded(&self) -> bool {
        match self.deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }
}
