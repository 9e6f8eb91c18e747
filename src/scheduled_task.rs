use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::{sync::Notify, task::JoinHandle, time::Duration};

/// A task scheduled for a specific point in the future.
/// It will automatically execute at that point, or can be aborted beforehand.
///
/// Dropping a `ScheduledTask` detaches it: the task still runs at its time.
#[derive(Debug)]
pub struct ScheduledTask {
    task_handle: JoinHandle<()>,
    wait_handle: JoinHandle<()>,
    run_at: DateTime<Utc>,
}

impl ScheduledTask {
    /// Schedule the given task to execute at time `run_at`.
    /// If `run_at` is in the past, the task will execute immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<Fut>(task: Fut, run_at: DateTime<Utc>) -> Self
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        // Create the synchronisation signal.
        let signal = Arc::new(Notify::new());

        // Schedule the task to wait on the signal.
        let task_signal = signal.clone();
        let task_handle = tokio::spawn(async move {
            task_signal.notified().await;
            task.await
        });

        // Spawn another task to give the signal at the appropriate time.
        let sleep_duration = datetime_to_duration(run_at, Utc::now());
        let wait_handle = tokio::spawn(async move {
            tokio::time::sleep(sleep_duration).await;
            signal.notify_one();
        });

        Self {
            task_handle,
            wait_handle,
            run_at,
        }
    }

    /// When the task is due to run.
    pub fn run_at(&self) -> DateTime<Utc> {
        self.run_at
    }

    /// Abort the task, whether or not it has started.
    pub fn abort(self) {
        self.wait_handle.abort();
        self.task_handle.abort();
    }

    /// Has the task run to completion (or been aborted)?
    pub fn is_finished(&self) -> bool {
        self.task_handle.is_finished()
    }
}

/// Convert a `DateTime` into a duration from `now`.
/// A `DateTime` in the past will produce a duration of zero.
fn datetime_to_duration(datetime: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    let target_timestamp = datetime.timestamp_millis();
    let now_timestamp = now.timestamp_millis();
    let time_diff = u64::try_from(target_timestamp - now_timestamp).unwrap_or(0);
    Duration::from_millis(time_diff)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn durations() {
        let now = Utc::now();
        assert_eq!(
            datetime_to_duration(now + chrono::Duration::seconds(90), now),
            Duration::from_secs(90)
        );
        assert_eq!(
            datetime_to_duration(now - chrono::Duration::seconds(90), now),
            Duration::ZERO
        );
    }

    #[tokio::test(start_paused = true)]
    async fn runs_at_its_time() {
        let counter = Arc::new(AtomicUsize::new(0));
        let task_counter = counter.clone();
        let task = ScheduledTask::new(
            async move {
                task_counter.fetch_add(1, Ordering::SeqCst);
            },
            Utc::now() + chrono::Duration::seconds(60),
        );

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(!task.is_finished());

        tokio::time::sleep(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_task_never_runs() {
        let counter = Arc::new(AtomicUsize::new(0));
        let task_counter = counter.clone();
        let task = ScheduledTask::new(
            async move {
                task_counter.fetch_add(1, Ordering::SeqCst);
            },
            Utc::now() + chrono::Duration::seconds(10),
        );
        task.abort();

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
