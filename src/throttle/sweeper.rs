//! Background reclamation of expired throttle entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use super::store::ThrottleStore;

/// A periodic sweep task that removes expired entries from a store.
///
/// The sweeper bounds memory growth from keys that stop being used; it is
/// invisible to `check` semantics, which already treat expired entries as
/// absent. It is owned by whoever owns the store's lifecycle: started
/// explicitly, stopped on teardown, and simply not started in tests that
/// need deterministic state.
pub struct Sweeper {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl Sweeper {
    /// Spawn a sweep task over `store`, ticking every `interval`.
    ///
    /// The interval is independent of any policy's window; the first sweep
    /// runs one full interval after start.
    pub fn start(store: Arc<ThrottleStore>, interval: Duration) -> Self {
        let (shutdown, mut rx) = watch::channel(false);

        info!(interval_ms = interval.as_millis() as u64, "Starting throttle sweeper");

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        store.sweep();
                    }
                    _ = rx.changed() => {
                        debug!("Throttle sweeper shutting down");
                        break;
                    }
                }
            }
        });

        Self { handle, shutdown }
    }

    /// Stop the sweep task and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}
