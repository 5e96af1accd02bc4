/*
    Scheduler - shared facility for recurring background tasks

    Tasks run with fixed-delay semantics: the next run is scheduled only
    after the previous one completed, so a slow pass never overlaps the
    next. Cancelling a task aborts it at its next suspension point.
*/

use std::future::Future;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

#[derive(Debug, Clone)]
pub struct Scheduler {
    handle: Handle,
}

impl Scheduler {
    pub fn new(handle: Handle) -> Self {
        Scheduler { handle }
    }

    /// Scheduler on the runtime the caller is running in.
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Run a one-off future on the scheduler's runtime
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    /// Run `task` after `initial_delay`, then again `delay` after each run completes
    pub fn schedule_with_fixed_delay<F, Fut>(
        &self,
        name: &str,
        initial_delay: Duration,
        delay: Duration,
        mut task: F,
    ) -> ScheduledTask
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let task_name = name.to_string();
        let handle = self.handle.spawn(async move {
            tokio::time::sleep(initial_delay).await;
            loop {
                trace!(task = %task_name, "Running scheduled task");
                task().await;
                tokio::time::sleep(delay).await;
            }
        });

        ScheduledTask { name: name.to_string(), handle }
    }
}

/// Handle to a recurring task. Dropping it cancels the task.
#[derive(Debug)]
pub struct ScheduledTask {
    name: String,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the task. Calling this more than once has no further effect.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_runs() {
        let scheduler = Scheduler::current();
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = runs.clone();
        let task = scheduler.schedule_with_fixed_delay(
            "counter",
            Duration::from_secs(1),
            Duration::from_secs(10),
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
        );

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(task.name(), "counter");
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_counts_from_end_of_run() {
        let scheduler = Scheduler::current();
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = runs.clone();
        let _task = scheduler.schedule_with_fixed_delay(
            "slow",
            Duration::ZERO,
            Duration::from_secs(1),
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(4)).await;
                }
            },
        );

        // Runs start at 0s, 5s, 10s
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent() {
        let scheduler = Scheduler::current();
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = runs.clone();
        let task = scheduler.schedule_with_fixed_delay(
            "cancelled",
            Duration::from_secs(1),
            Duration::from_secs(1),
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
        );

        task.cancel();
        task.cancel();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(task.is_finished());
    }
}
