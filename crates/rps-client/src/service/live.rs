//! The two long-lived resources of a session, owned and released together.

use tracing::info;

use crate::service::task::BackgroundTask;

/// Push subscription plus poll timer for the active session.
pub struct LiveUpdates {
    subscription: Option<BackgroundTask>,
    poller: BackgroundTask,
}

impl LiveUpdates {
    /// Bundle both resources. A missing subscription leaves the poller as
    /// the only source of updates.
    pub fn new(subscription: Option<BackgroundTask>, poller: BackgroundTask) -> Self {
        Self {
            subscription,
            poller,
        }
    }

    /// Whether the push channel is attached and still delivering. A feed
    /// that gave up reconnecting ends its task and no longer counts.
    pub fn has_subscription(&self) -> bool {
        self.subscription
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Stop both. No callback fires after this returns.
    pub async fn close(self) {
        if let Some(subscription) = self.subscription {
            subscription.stop().await;
        }
        self.poller.stop().await;
        info!("Live updates stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn idle(name: &'static str) -> BackgroundTask {
        BackgroundTask::spawn(name, |stop| async move {
            let _ = stop.await;
        })
    }

    #[tokio::test]
    async fn test_ended_feed_is_not_attached() {
        let ended = BackgroundTask::spawn("feed", |_stop| async {});
        let live = LiveUpdates::new(Some(ended), idle("poller"));
        tokio::time::timeout(Duration::from_secs(1), async {
            while live.has_subscription() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        live.close().await;
    }

    #[tokio::test]
    async fn test_running_feed_is_attached() {
        let live = LiveUpdates::new(Some(idle("feed")), idle("poller"));
        assert!(live.has_subscription());
        live.close().await;

        let polling_only = LiveUpdates::new(None, idle("poller"));
        assert!(!polling_only.has_subscription());
        polling_only.close().await;
    }
}
