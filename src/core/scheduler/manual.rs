//! Manually advanced scheduler for deterministic tests.

use parking_lot::Mutex;

use super::{Tick, TickScheduler, TickTask};

/// [`TickScheduler`] advanced only by explicit [`tick`](ManualScheduler::tick)
/// calls, on the caller's own thread.
///
/// Scheduled tasks accumulate until ticked; finished tasks are removed. This
/// makes connector delivery fully deterministic in tests: nothing reaches a
/// subscriber until the test decides to advance the "frame".
#[derive(Default)]
pub struct ManualScheduler {
    tasks: Mutex<Vec<Box<dyn TickTask>>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance every live task exactly once.
    pub fn tick(&self) {
        let mut tasks = self.tasks.lock();
        tasks.retain_mut(|task| task.tick() == Tick::Continue);
    }

    /// Advance all tasks `n` times.
    pub fn tick_many(&self, n: usize) {
        for _ in 0..n {
            self.tick();
        }
    }

    /// Number of tasks still scheduled.
    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }

    /// True once every scheduled task has finished.
    pub fn is_idle(&self) -> bool {
        self.tasks.lock().is_empty()
    }
}

impl TickScheduler for ManualScheduler {
    fn schedule_recurring(&self, task: Box<dyn TickTask>) {
        self.tasks.lock().push(task);
    }
}
