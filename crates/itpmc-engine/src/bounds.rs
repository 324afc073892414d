//! Loop-bound adjustment.

use tracing::debug;

use crate::shutdown::ShutdownNotifier;

/// Owner of the current loop bound.
///
/// Implementations must start at bound 1 and raise it by exactly 1 on every
/// successful [`BoundAdjuster::try_increase_bound`]. A round only searches for
/// errors at its own bound, so a skipped bound could hide a reachable error
/// behind a SAFE verdict. [`crate::imc::ImcDriver`] rejects any other
/// sequence with [`crate::error::ImcError::NonSequentialBound`].
pub trait BoundAdjuster {
    fn current_bound(&self) -> u32;

    /// Raises the bound; `false` means the budget is exhausted.
    fn try_increase_bound(&mut self) -> bool;
}

/// Starts at 1 and steps by exactly 1 up to `max_bound`.
#[derive(Debug, Clone)]
pub struct LoopBoundAdjuster {
    bound: u32,
    max_bound: u32,
    shutdown: ShutdownNotifier,
}

impl LoopBoundAdjuster {
    pub fn new(max_bound: u32, shutdown: ShutdownNotifier) -> Self {
        Self {
            bound: 1,
            max_bound,
            shutdown,
        }
    }

    pub fn max_bound(&self) -> u32 {
        self.max_bound
    }
}

impl BoundAdjuster for LoopBoundAdjuster {
    fn current_bound(&self) -> u32 {
        self.bound
    }

    fn try_increase_bound(&mut self) -> bool {
        if self.shutdown.should_shutdown() {
            debug!(bound = self.bound, "not increasing bound: shutdown requested");
            return false;
        }
        if self.bound >= self.max_bound {
            debug!(bound = self.bound, max = self.max_bound, "loop bound budget exhausted");
            return false;
        }
        self.bound += 1;
        debug!(bound = self.bound, "increased loop bound");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_by_one_until_max() {
        let mut adj = LoopBoundAdjuster::new(3, ShutdownNotifier::new());
        assert_eq!(adj.current_bound(), 1);
        assert!(adj.try_increase_bound());
        assert!(adj.try_increase_bound());
        assert_eq!(adj.current_bound(), 3);
        assert!(!adj.try_increase_bound());
        assert_eq!(adj.current_bound(), 3);
    }

    #[test]
    fn refuses_after_shutdown() {
        let shutdown = ShutdownNotifier::new();
        let mut adj = LoopBoundAdjuster::new(10, shutdown.clone());
        shutdown.request_shutdown();
        assert!(!adj.try_increase_bound());
        assert_eq!(adj.current_bound(), 1);
    }
}
