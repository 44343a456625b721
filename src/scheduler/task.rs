//! Deferred units of work accepted by the scheduler.

use std::future::Future;
use std::pin::Pin;

/// Boxed future a [`ScheduledTask`] runs to completion.
pub type TaskFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

/// A named, not-yet-started asynchronous operation.
///
/// Nothing runs until the scheduler polls it; dropping a task before then
/// cancels it.
pub struct ScheduledTask {
    name: String,
    future: TaskFuture,
}

impl ScheduledTask {
    pub fn new<F>(name: impl Into<String>, future: F) -> Self
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            future: Box::pin(future),
        }
    }

    /// Human-readable name used in logs and the quiet-task filter.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn into_parts(self) -> (String, TaskFuture) {
        (self.name, self.future)
    }
}

impl std::fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<ScheduledTask>();
    }

    #[tokio::test]
    async fn task_runs_only_when_awaited() {
        let flag = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag_clone = std::sync::Arc::clone(&flag);
        let task = ScheduledTask::new("flip", async move {
            flag_clone.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(task.name(), "flip");
        assert!(!flag.load(std::sync::atomic::Ordering::SeqCst));

        let (_, fut) = task.into_parts();
        fut.await.unwrap();
        assert!(flag.load(std::sync::atomic::Ordering::SeqCst));
    }
}
