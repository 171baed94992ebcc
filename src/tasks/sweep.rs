//! Expiry Sweep Task
//!
//! Background task that periodically removes expired entries, independent of
//! read activity, so keys that are never read again do not pile up.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

// == Sweep ==
/// Something holding entries that can expire.
///
/// Implementations must purge through the same lock as their foreground
/// reads and writes.
pub trait Sweep: Send + Sync {
    /// Name used in logs.
    fn label(&self) -> &str;

    /// Removes every expired entry and returns how many were removed.
    fn sweep(&self) -> usize;
}

// == Sweep Handle ==
/// Cancellable handle to a running sweep task.
///
/// The task is aborted when the handle is stopped or dropped.
#[derive(Debug)]
pub struct SweepHandle {
    label: String,
    handle: JoinHandle<()>,
}

impl SweepHandle {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Stops the task. Safe to call more than once.
    pub fn stop(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Spawns a task that calls `target.sweep()` every `interval`.
///
/// # Example
/// ```ignore
/// let handle = spawn_sweep_task(manager.cache(Category::Users).clone(), Duration::from_secs(300));
/// // Later, during shutdown:
/// handle.stop();
/// ```
pub fn spawn_sweep_task(target: Arc<dyn Sweep>, interval: Duration) -> SweepHandle {
    let label = target.label().to_string();

    let handle = tokio::spawn(async move {
        info!(target_name = %target.label(), ?interval, "Starting expiry sweep task");

        loop {
            tokio::time::sleep(interval).await;

            let removed = target.sweep();
            if removed > 0 {
                info!(target_name = %target.label(), removed, "Expiry sweep removed entries");
            } else {
                debug!(target_name = %target.label(), "Expiry sweep found nothing to remove");
            }
        }
    });

    SweepHandle { label, handle }
}
