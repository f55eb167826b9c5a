//! Cooperative run control: one shared "is running" flag per run.
//!
//! The CLI flips it from its Ctrl-C watcher; workers poll it at the top of
//! every orchestrator iteration and before every chunk write. Nothing is
//! interrupted forcibly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct RunFlag(Arc<AtomicBool>);

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl RunFlag {
    /// New flag in the running state.
    pub fn new() -> Self {
        RunFlag(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Request a cooperative stop. Idempotent.
    pub fn stop(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}
