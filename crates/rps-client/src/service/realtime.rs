//! Realtime Sync
//!
//! Applies pushed row changes: inserted rounds reach the owner's history and
//! every change refreshes the leaderboard.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::{ActionResult, ClientError, GameResult};
use crate::ports::outbound::{
    ChangeEvent, ChangeKind, ChangeSpec, ChangeSubscription, RemoteStore, GAME_RESULTS_TABLE,
    USER_STATS_TABLE,
};
use crate::service::auth::AuthService;
use crate::service::game::GameService;
use crate::service::task::BackgroundTask;

/// Channel name used for the game-results subscription.
pub const GAME_RESULTS_CHANNEL: &str = "game_results_changes";

/// Changes the client listens for: new rounds and statistics updates.
///
/// Not filtered by user: other players' rounds must still refresh standings.
pub fn game_change_specs() -> Vec<ChangeSpec> {
    vec![
        ChangeSpec::inserts(GAME_RESULTS_TABLE),
        ChangeSpec::updates(USER_STATS_TABLE),
    ]
}

/// Push-channel consumer for one session.
pub struct RealtimeSync<S: RemoteStore> {
    auth: Arc<AuthService<S>>,
    games: Arc<GameService<S>>,
}

impl<S: RemoteStore + 'static> RealtimeSync<S> {
    /// Consumer writing into `games`, reading the session from `auth`.
    pub fn new(auth: Arc<AuthService<S>>, games: Arc<GameService<S>>) -> Self {
        Self { auth, games }
    }

    /// Open the channel and start applying its events.
    ///
    /// Stopping the returned task releases the channel.
    pub async fn start(self) -> ActionResult<BackgroundTask> {
        let subscription = self
            .auth
            .store()
            .subscribe(GAME_RESULTS_CHANNEL, game_change_specs())
            .await
            .map_err(|e| {
                warn!(channel = GAME_RESULTS_CHANNEL, error = %e, "Subscription failed");
                ClientError::from(e)
            })?;
        info!(channel = GAME_RESULTS_CHANNEL, "Subscribed to game results");

        Ok(BackgroundTask::spawn("realtime-sync", move |mut stop| async move {
            let mut subscription: ChangeSubscription = subscription;
            loop {
                tokio::select! {
                    _ = &mut stop => break,
                    event = subscription.recv() => match event {
                        Some(event) => self.handle(event).await,
                        None => {
                            warn!(channel = GAME_RESULTS_CHANNEL, "Change channel closed");
                            break;
                        }
                    }
                }
            }
            subscription.unsubscribe();
        }))
    }

    /// Apply one change event.
    pub async fn handle(&self, event: ChangeEvent) {
        match (event.kind, event.table.as_str()) {
            (ChangeKind::Insert, GAME_RESULTS_TABLE) => match event.record_as::<GameResult>() {
                Ok(game) => {
                    let session = self.auth.current_session();
                    let applied = self
                        .games
                        .apply_pushed_result(game, session.as_ref().map(|s| &s.user_id));
                    debug!(applied, "Pushed round received");
                }
                Err(e) => warn!(error = %e, "Malformed pushed round"),
            },
            (_, USER_STATS_TABLE) => debug!(kind = ?event.kind, "Statistics change received"),
            (kind, table) => {
                debug!(?kind, table, "Ignoring change");
                return;
            }
        }

        if let Err(e) = self.games.fetch_leaderboard().await {
            warn!(error = %e, "Leaderboard refresh after push failed");
        }
    }
}
