//! Timer-driven cooperative scheduler.

use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tracing::trace;

use super::{Tick, TickScheduler, TickTask};

/// Default tick period. Comparable to a display frame so inbound latency
/// stays in the single-digit-millisecond range.
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(10);

/// [`TickScheduler`] backed by a `tokio::time::interval` per task.
///
/// Each scheduled task gets its own tokio task that ticks it at the
/// configured period until it reports [`Tick::Done`]. Requires a tokio
/// runtime context at schedule time.
#[derive(Debug, Clone, Copy)]
pub struct IntervalScheduler {
    period: Duration,
}

impl IntervalScheduler {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Default for IntervalScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_PERIOD)
    }
}

impl TickScheduler for IntervalScheduler {
    fn schedule_recurring(&self, mut task: Box<dyn TickTask>) {
        let period = self.period;
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if task.tick() == Tick::Done {
                    trace!("recurring task finished");
                    break;
                }
            }
        });
    }
}
