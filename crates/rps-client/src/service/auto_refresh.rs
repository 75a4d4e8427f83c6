//! Periodic history and leaderboard poll, independent of the push channel.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::ports::outbound::RemoteStore;
use crate::service::auth::AuthService;
use crate::service::game::GameService;
use crate::service::task::BackgroundTask;

/// Start polling every `period`. The first poll fires one period from now.
pub fn start_auto_refresh<S: RemoteStore + 'static>(
    auth: Arc<AuthService<S>>,
    games: Arc<GameService<S>>,
    period: Duration,
) -> BackgroundTask {
    BackgroundTask::spawn("auto-refresh", move |mut stop| async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut stop => break,
                _ = ticker.tick() => {
                    debug!(period_secs = period.as_secs(), "Auto-refresh tick");
                    if let Some(session) = auth.current_session() {
                        if let Err(e) = games.fetch_user_history(&session.user_id).await {
                            warn!(error = %e, "Auto-refresh of history failed");
                        }
                    }
                    if let Err(e) = games.fetch_leaderboard().await {
                        warn!(error = %e, "Auto-refresh of leaderboard failed");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::in_memory::InMemoryStore;
    use crate::config::LeaderboardSettings;

    #[tokio::test(start_paused = true)]
    async fn test_polls_each_period_until_stopped() {
        let store = Arc::new(InMemoryStore::new());
        let auth = Arc::new(AuthService::new(store.clone()));
        let games = Arc::new(GameService::new(store, LeaderboardSettings::default()));
        let period = Duration::from_secs(30);

        let task = start_auto_refresh(auth, games.clone(), period);
        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(games.refresh_count(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(games.refresh_count(), 1);

        tokio::time::sleep(period).await;
        assert_eq!(games.refresh_count(), 2);

        task.stop().await;
        tokio::time::sleep(period * 3).await;
        assert_eq!(games.refresh_count(), 2);
    }
}
