//! Periodic driver for [`UpdateCore::refresh`].
//!
//! One timer per core. Missed ticks are delayed rather than burst, so a charger that
//! was unreachable for a while is not hammered with catch-up requests when it returns.

use crate::coordinator::UpdateCore;
use crate::telemetry::Transport;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Shortest period the poller will run at; zero would spin the timer.
pub const MIN_PERIOD: Duration = Duration::from_secs(1);

/// When the first scheduled refresh happens.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FirstTick {
    /// Refresh as soon as the poller starts
    Immediate,
    /// Wait one full period; use when the caller already refreshed
    AfterPeriod,
}

/// Owns the polling task. Dropping the handle stops polling.
pub struct PollerHandle {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop polling and wait for the task to exit.
    ///
    /// A refresh already in progress is allowed to finish (it is bounded by the
    /// configured timeout).
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    warn!("poller task panicked: {e}");
                }
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Spawn a task that refreshes `core` every `period`.
///
/// Refresh failures are already logged by the core; the poller just keeps going
/// until the next tick. A `period` shorter than [`MIN_PERIOD`] is raised to it.
/// Must be called from within a tokio runtime.
pub fn spawn_poller<T: Transport>(
    core: UpdateCore<T>,
    period: Duration,
    first_tick: FirstTick,
) -> PollerHandle {
    if period < MIN_PERIOD {
        warn!(?period, min = ?MIN_PERIOD, "poll period too short, using minimum");
    }
    let period = period.max(MIN_PERIOD);
    let (stop_tx, mut stop_rx) = oneshot::channel();

    let start = match first_tick {
        FirstTick::Immediate => Instant::now(),
        FirstTick::AfterPeriod => Instant::now() + period,
    };
    let mut ticker = time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let task = tokio::spawn(async move {
        debug!(host = %core.config().host, ?period, "poller started");
        loop {
            tokio::select! {
                biased;
                _ = &mut stop_rx => break,
                _ = ticker.tick() => {
                    // Outcome is logged and recorded by the core
                    let _ = core.refresh().await;
                }
            }
        }
        debug!(host = %core.config().host, "poller stopped");
    });

    PollerHandle {
        stop: Some(stop_tx),
        task: Some(task),
    }
}
