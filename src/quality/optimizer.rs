//! Debounce and re-entrancy bookkeeping for optimization passes.

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::AbortHandle;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationState {
    Idle,
    Scheduled { deadline: Instant },
    Running,
}

/// What one optimization or recommendation pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OptimizationReport {
    pub fps_triggered: bool,
    pub memory_triggered: bool,
    pub downgraded: usize,
    pub unloaded: usize,
    pub evicted: usize,
}

struct PendingRun {
    deadline: Instant,
    generation: u64,
    abort: AbortHandle,
}

#[derive(Default)]
pub(crate) struct Optimizer {
    running: bool,
    generation: u64,
    pending: Option<PendingRun>,
}

impl Optimizer {
    pub(crate) fn state(&self) -> OptimizationState {
        if self.running {
            OptimizationState::Running
        } else if let Some(pending) = &self.pending {
            OptimizationState::Scheduled {
                deadline: pending.deadline,
            }
        } else {
            OptimizationState::Idle
        }
    }

    /// Cancel any pending run and reserve a generation for the next one.
    pub(crate) fn reschedule(&mut self) -> u64 {
        if let Some(previous) = self.pending.take() {
            previous.abort.abort();
        }
        self.generation += 1;
        self.generation
    }

    pub(crate) fn set_pending(&mut self, generation: u64, deadline: Instant, abort: AbortHandle) {
        if generation == self.generation {
            self.pending = Some(PendingRun {
                deadline,
                generation,
                abort,
            });
        } else {
            abort.abort();
        }
    }

    /// Called by the timer when it fires. Returns false if it was superseded.
    pub(crate) fn fire(&mut self, generation: u64) -> bool {
        match &self.pending {
            Some(pending) if pending.generation == generation => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort.abort();
        }
    }
}

/// Holds the running flag for the duration of a pass.
pub(crate) struct RunGuard<'a> {
    optimizer: &'a Mutex<Optimizer>,
}

impl<'a> RunGuard<'a> {
    pub(crate) fn acquire(optimizer: &'a Mutex<Optimizer>) -> Option<Self> {
        let mut state = optimizer.lock();
        if state.running {
            return None;
        }
        state.running = true;
        Some(Self { optimizer })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.optimizer.lock().running = false;
    }
}
