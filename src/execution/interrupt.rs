//! Operator Interrupts
//!
//! Two independent signals reach the engine:
//! - **skip**: terminate the in-flight step and carry on with the next one
//! - **abort**: terminate the in-flight step and stop the run
//!
//! Handles are cheap to clone; a signal handler keeps one clone and the
//! engine polls another.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Which signal interrupted a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Skip,
    Abort,
}

/// Shared skip/abort flags.
#[derive(Debug, Clone, Default)]
pub struct Interrupts {
    skip: Arc<AtomicBool>,
    abort: Arc<AtomicBool>,
}

impl Interrupts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the engine to give up on the current step only.
    pub fn request_skip(&self) {
        self.skip.store(true, Ordering::SeqCst);
    }

    /// Asks the engine to stop the whole run.
    pub fn request_abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    pub fn abort_requested(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// Returns the pending interrupt, consuming a skip request.
    ///
    /// Abort wins when both are pending and stays set once raised.
    pub fn poll(&self) -> Option<Interrupt> {
        if self.abort_requested() {
            return Some(Interrupt::Abort);
        }
        if self.skip.swap(false, Ordering::SeqCst) {
            return Some(Interrupt::Skip);
        }
        None
    }

    /// Drops a skip request that arrived while no step was running.
    pub fn clear_skip(&self) {
        self.skip.store(false, Ordering::SeqCst);
    }
}
