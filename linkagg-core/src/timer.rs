//! Monotonic one-shot deadlines for task event loops
//!
//! Every state machine owns its timers as `Deadline` values. A stopped
//! deadline pends forever, so a task can always keep the timer arm in its
//! `select!` without guarding it.

use std::future::pending;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// A restartable one-shot deadline on the monotonic clock
#[derive(Debug, Default)]
pub struct Deadline {
    when: Option<Instant>,
}

impl Deadline {
    pub fn new() -> Self {
        Self { when: None }
    }

    /// Arm (or re-arm) the deadline `after` from now
    pub fn start(&mut self, after: Duration) {
        self.when = Some(Instant::now() + after);
    }

    /// Disarm the deadline
    pub fn stop(&mut self) {
        self.when = None;
    }

    pub fn is_running(&self) -> bool {
        self.when.is_some()
    }

    /// Resolve when the deadline fires; pends forever while disarmed.
    ///
    /// The caller must disarm or re-arm after a fire, otherwise the next
    /// poll resolves immediately again.
    pub async fn wait(&self) {
        match self.when {
            Some(when) => sleep_until(when).await,
            None => pending().await,
        }
    }
}
