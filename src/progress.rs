use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Receives progress notifications from the clustering phases. Implementations are called from
/// worker threads, so they must tolerate concurrent `increment` calls.
pub trait ProgressSink: Send + Sync {
    /// Starts a new phase with the given number of steps.
    fn reset(&self, label: &str, total_steps: usize);

    /// Marks one step of the current phase as done.
    fn increment(&self);

    /// Ends the current phase.
    fn done(&self) {
        self.reset("Done", 0);
    }
}

/// Discards all progress notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuppressProgress;

impl ProgressSink for SuppressProgress {
    fn reset(&self, _label: &str, _total_steps: usize) {}

    fn increment(&self) {}
}

/// Counts progress and reports each phase through `tracing`.
#[derive(Debug, Default)]
pub struct TracingProgress {
    label: Mutex<String>,
    total: AtomicUsize,
    completed: AtomicUsize,
}

impl TracingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(&self) -> String {
        self.label.lock().map(|label| label.clone()).unwrap_or_default()
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }
}

impl ProgressSink for TracingProgress {
    fn reset(&self, label: &str, total_steps: usize) {
        let previous = self.completed.swap(0, Ordering::Relaxed);
        self.total.store(total_steps, Ordering::Relaxed);
        if let Ok(mut current) = self.label.lock() {
            if !current.is_empty() {
                tracing::trace!(phase = %current, steps = previous, "phase finished");
            }
            *current = label.to_string();
        }
        tracing::debug!(total_steps, "{label}");
    }

    fn increment(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }
}
