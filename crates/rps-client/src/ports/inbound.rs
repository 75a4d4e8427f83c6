//! # Inbound Ports
//!
//! The surface the view layer calls. Every operation returns an
//! [`ActionResult`]; nothing panics or escapes as an unhandled failure.

use async_trait::async_trait;

use crate::domain::{
    ActionResult, Choice, GameResult, LeaderboardEntry, Outcome, Session, UserId, UserStats,
};
use crate::service::BackgroundTask;

/// Game client API - inbound port.
#[async_trait]
pub trait GameClientApi: Send + Sync {
    /// Create an account, open a session and make sure a statistics row exists.
    async fn sign_up(&self, email: &str, password: &str, username: &str) -> ActionResult<Session>;

    /// Open a session with existing credentials.
    async fn sign_in(&self, email: &str, password: &str) -> ActionResult<Session>;

    /// Close the session. Local state is cleared even if the remote call fails.
    async fn sign_out(&self) -> ActionResult;

    /// Re-read the session from the remote store.
    async fn get_current_user(&self) -> ActionResult<Option<Session>>;

    /// Create a zeroed statistics row unless one exists.
    async fn ensure_user_stats(&self, user_id: &UserId, username: &str) -> ActionResult<UserStats>;

    /// Persist one round, prepend it to the local history and refresh standings.
    async fn save_game_result(
        &self,
        user_id: &UserId,
        username: &str,
        player_choice: Choice,
        computer_choice: Choice,
        result: Outcome,
    ) -> ActionResult<GameResult>;

    /// Replace the local history with the user's ten most recent rounds.
    async fn fetch_user_history(&self, user_id: &UserId) -> ActionResult<Vec<GameResult>>;

    /// Recompute the leaderboard.
    async fn fetch_leaderboard(&self) -> ActionResult<Vec<LeaderboardEntry>>;

    /// Statistics row for a user, if one exists.
    async fn fetch_user_stats(&self, user_id: &UserId) -> ActionResult<Option<UserStats>>;

    /// Start applying pushed inserts/updates for the current session.
    async fn subscribe_to_game_results(&self) -> ActionResult<BackgroundTask>;

    /// Start the periodic history/leaderboard poll.
    fn start_auto_refresh(&self) -> BackgroundTask;
}
