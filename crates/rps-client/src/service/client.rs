//! Game Client Facade
//!
//! Single entry point for the view layer. Owns the session, the game state and
//! the live-update resources, and implements [`GameClientApi`].

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

use crate::algorithms::{random_computer_choice, resolve_outcome};
use crate::config::ClientSettings;
use crate::domain::{
    ActionResult, Choice, GameResult, LeaderboardEntry, Outcome, Session, UserId, UserStats,
};
use crate::ports::inbound::GameClientApi;
use crate::ports::outbound::{Query, RemoteStore, TableStore, USER_STATS_TABLE};
use crate::service::auth::AuthService;
use crate::service::auto_refresh::start_auto_refresh;
use crate::service::game::GameService;
use crate::service::live::LiveUpdates;
use crate::service::realtime::RealtimeSync;
use crate::service::task::BackgroundTask;

/// Client state for one application instance.
pub struct GameClient<S: RemoteStore + 'static> {
    auth: Arc<AuthService<S>>,
    games: Arc<GameService<S>>,
    settings: ClientSettings,
    live: Mutex<Option<LiveUpdates>>,
}

impl<S: RemoteStore + 'static> GameClient<S> {
    /// Client over `store` with no session.
    pub fn new(store: Arc<S>, settings: ClientSettings) -> Self {
        Self {
            auth: Arc::new(AuthService::new(store.clone())),
            games: Arc::new(GameService::new(store, settings.leaderboard)),
            settings,
            live: Mutex::new(None),
        }
    }

    /// Probe the store with a one-row select.
    pub async fn check_connection(&self) -> bool {
        let query = Query::select("user_id").limit(1);
        match self.auth.store().select(USER_STATS_TABLE, &query).await {
            Ok(_) => {
                info!("Remote store reachable");
                true
            }
            Err(e) => {
                warn!(error = %e, "Remote store unreachable");
                false
            }
        }
    }

    /// Play one round against a random computer move as the current user.
    pub async fn play_round(&self, choice: Choice) -> ActionResult<GameResult> {
        let session = self.auth.require_session()?;
        let computer = random_computer_choice();
        let outcome = resolve_outcome(choice, computer);
        self.games
            .save_game_result(&session.user_id, &session.username, choice, computer, outcome)
            .await
    }

    /// Attach the push channel and the poll timer for the current session,
    /// replacing any previous pair.
    ///
    /// Returns whether the push channel could be attached. Without it the
    /// poller keeps the view eventually consistent on its own.
    pub async fn start_live_updates(&self) -> ActionResult<bool> {
        self.auth.require_session()?;
        self.stop_live_updates().await;

        let subscription = match self.subscribe_to_game_results().await {
            Ok(task) => Some(task),
            Err(e) => {
                warn!(error = %e, "Continuing with polling only");
                None
            }
        };
        let live = LiveUpdates::new(subscription, self.start_auto_refresh());
        let attached = live.has_subscription();

        if let Some(stale) = self.live.lock().replace(live) {
            // Lost a race with another start; the older pair goes.
            tokio::spawn(stale.close());
        }
        Ok(attached)
    }

    /// Release the push channel and the poll timer.
    pub async fn stop_live_updates(&self) {
        let live = self.live.lock().take();
        if let Some(live) = live {
            live.close().await;
        }
    }

    /// Whether live updates are running.
    pub fn is_live(&self) -> bool {
        self.live.lock().is_some()
    }

    /// Whether pushed changes are still arriving. Turns false once the feed
    /// gives up reconnecting; the poller keeps running.
    pub fn has_push_channel(&self) -> bool {
        self.live
            .lock()
            .as_ref()
            .is_some_and(LiveUpdates::has_subscription)
    }

    /// Current session, if any.
    pub fn session(&self) -> Option<Session> {
        self.auth.current_session()
    }

    /// Newest-first local history.
    pub fn history(&self) -> Vec<GameResult> {
        self.games.history()
    }

    /// Last computed ranking.
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        self.games.leaderboard()
    }

    /// Leaderboard refreshes started so far.
    pub fn refresh_count(&self) -> u64 {
        self.games.refresh_count()
    }

    /// True while any remote call is in flight.
    pub fn is_loading(&self) -> bool {
        self.auth.is_loading() || self.games.is_loading()
    }

    /// Settings in use.
    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }
}

#[async_trait]
impl<S: RemoteStore + 'static> GameClientApi for GameClient<S> {
    async fn sign_up(&self, email: &str, password: &str, username: &str) -> ActionResult<Session> {
        self.auth.sign_up(email, password, username).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> ActionResult<Session> {
        self.auth.sign_in(email, password).await
    }

    async fn sign_out(&self) -> ActionResult {
        self.stop_live_updates().await;
        self.games.clear_history();
        self.auth.sign_out().await
    }

    async fn get_current_user(&self) -> ActionResult<Option<Session>> {
        self.auth.get_current_user().await
    }

    async fn ensure_user_stats(&self, user_id: &UserId, username: &str) -> ActionResult<UserStats> {
        self.auth.ensure_user_stats(user_id, username).await
    }

    async fn save_game_result(
        &self,
        user_id: &UserId,
        username: &str,
        player_choice: Choice,
        computer_choice: Choice,
        result: Outcome,
    ) -> ActionResult<GameResult> {
        self.games
            .save_game_result(user_id, username, player_choice, computer_choice, result)
            .await
    }

    async fn fetch_user_history(&self, user_id: &UserId) -> ActionResult<Vec<GameResult>> {
        self.games.fetch_user_history(user_id).await
    }

    async fn fetch_leaderboard(&self) -> ActionResult<Vec<LeaderboardEntry>> {
        self.games.fetch_leaderboard().await
    }

    async fn fetch_user_stats(&self, user_id: &UserId) -> ActionResult<Option<UserStats>> {
        self.games.fetch_user_stats(user_id).await
    }

    async fn subscribe_to_game_results(&self) -> ActionResult<BackgroundTask> {
        self.auth.require_session()?;
        RealtimeSync::new(self.auth.clone(), self.games.clone())
            .start()
            .await
    }

    fn start_auto_refresh(&self) -> BackgroundTask {
        start_auto_refresh(
            self.auth.clone(),
            self.games.clone(),
            self.settings.poll_interval,
        )
    }
}
