//! Cooperative cancellation for discovery rounds.
//!
//! A round is abandoned when the process shuts down or when a newer pair-set
//! change issues a fresh signal. Workers are never preempted; they poll
//! [`AbortSignal::should_abort`] between steps.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Issues abort signals and supersedes older ones.
#[derive(Debug, Default)]
pub struct AbortController {
    shutdown: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
}

impl AbortController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a signal for a new round, aborting every earlier one.
    #[must_use]
    pub fn issue(&self) -> AbortSignal {
        let issued = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        AbortSignal {
            shutdown: Arc::clone(&self.shutdown),
            generation: Arc::clone(&self.generation),
            issued,
        }
    }

    /// Aborts every outstanding and future signal.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

/// Checked-flag cancellation handed to one discovery round.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    shutdown: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
    issued: u64,
}

impl AbortSignal {
    /// A signal that never fires, for standalone discovery.
    #[must_use]
    pub fn never() -> Self {
        Self {
            shutdown: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            issued: 0,
        }
    }

    /// True once shut down or superseded by a newer signal.
    #[must_use]
    pub fn should_abort(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst) || self.is_superseded()
    }

    #[must_use]
    pub fn is_superseded(&self) -> bool {
        self.generation.load(Ordering::SeqCst) != self.issued
    }
}
