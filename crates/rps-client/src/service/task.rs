//! Cancellable background tasks (push subscription, poll timer).

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

/// Handle to a spawned loop that stops on request.
///
/// [`BackgroundTask::stop`] signals the loop and waits for it, so no callback
/// runs after it returns. Dropping the handle aborts the loop instead.
pub struct BackgroundTask {
    name: &'static str,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl BackgroundTask {
    /// Spawn `body`, handing it the stop signal to select on.
    pub fn spawn<F, Fut>(name: &'static str, body: F) -> Self
    where
        F: FnOnce(oneshot::Receiver<()>) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(body(stop_rx));
        debug!(task = name, "Background task started");
        Self {
            name,
            stop: Some(stop_tx),
            task: Some(task),
        }
    }

    /// Task name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Signal the loop and wait for it to exit.
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        debug!(task = self.name, "Background task stopped");
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(task = self.name, "Background task aborted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_stop_waits_for_exit() {
        let counter = Arc::new(AtomicU64::new(0));
        let seen = counter.clone();
        let task = BackgroundTask::spawn("counter", move |mut stop| async move {
            let mut tick = tokio::time::interval(Duration::from_millis(1));
            loop {
                tokio::select! {
                    _ = &mut stop => break,
                    _ = tick.tick() => { seen.fetch_add(1, Ordering::SeqCst); }
                }
            }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        task.stop().await;
        let after_stop = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(counter.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn test_drop_aborts() {
        let task = BackgroundTask::spawn("idle", |stop| async move {
            let _ = stop.await;
        });
        assert!(!task.is_finished());
        assert_eq!(task.name(), "idle");
        drop(task);
    }
}
