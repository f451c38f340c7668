//! Background eviction of expired rate limit windows.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use super::gate::RateLimitGate;
use crate::error::Result;

/// Handle to the periodic sweep task.
///
/// The task runs until the shutdown channel it was spawned with flips to
/// `true` or its sender is dropped.
pub struct Sweeper {
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Spawn a task that sweeps `gate` every `interval`.
    ///
    /// The first sweep happens one full interval after spawning.
    pub fn spawn(
        gate: Arc<RateLimitGate>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(interval_secs = interval.as_secs(), "Rate limit sweeper started");

            while !*shutdown.borrow() {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = gate.sweep();
                        debug!(
                            evicted = evicted,
                            tracked = gate.tracked_identities(),
                            "Sweep cycle finished"
                        );
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Rate limit sweeper stopped");
        });

        Self { handle }
    }

    /// Whether the sweep task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the sweep task to exit.
    ///
    /// Only returns once shutdown has been signalled.
    pub async fn join(self) -> Result<()> {
        self.handle.await?;
        Ok(())
    }
}
