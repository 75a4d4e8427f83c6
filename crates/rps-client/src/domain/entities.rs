//! # Domain Entities
//!
//! Rows persisted by the remote store and the client-side values derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::value_objects::{Choice, Outcome, RowId, UserId};

/// Identity returned by the remote auth service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthUser {
    /// Remote user id.
    pub id: UserId,
    /// Account e-mail, when exposed.
    pub email: Option<String>,
    /// `username` from the user metadata, when set at sign-up.
    pub username: Option<String>,
}

impl AuthUser {
    /// Display name: metadata username, else the e-mail local part, else the id.
    pub fn display_name(&self) -> String {
        if let Some(name) = self.username.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.trim().to_string();
        }
        match self.email.as_deref().and_then(|e| e.split('@').next()) {
            Some(local) if !local.is_empty() => local.to_string(),
            _ => self.id.to_string(),
        }
    }
}

/// The signed-in actor. Gameplay is only possible while one exists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    /// Remote user id.
    pub user_id: UserId,
    /// Name shown on the leaderboard.
    pub username: String,
    /// Account e-mail.
    pub email: Option<String>,
}

impl From<AuthUser> for Session {
    fn from(user: AuthUser) -> Self {
        let username = user.display_name();
        Self {
            user_id: user.id,
            username,
            email: user.email,
        }
    }
}

/// One played round. Created once, never mutated or deleted by the client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameResult {
    /// Server-assigned row id (absent before insert).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RowId>,
    /// Owner.
    pub user_id: UserId,
    /// Owner's display name at play time.
    pub username: String,
    /// Player move.
    pub player_choice: Choice,
    /// Computer move.
    pub computer_choice: Choice,
    /// Outcome for the player.
    pub result: Outcome,
    /// When the round was played.
    pub played_at: DateTime<Utc>,
}

impl GameResult {
    /// Build an unsaved record stamped with the current time.
    pub fn new(
        user_id: UserId,
        username: impl Into<String>,
        player_choice: Choice,
        computer_choice: Choice,
        result: Outcome,
    ) -> Self {
        Self {
            id: None,
            user_id,
            username: username.into(),
            player_choice,
            computer_choice,
            result,
            played_at: Utc::now(),
        }
    }
}

/// Projection used by raw leaderboard aggregation (`username, result, played_at`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    /// Owner's display name.
    pub username: String,
    /// Outcome for that user.
    pub result: Outcome,
    /// When the round was played.
    #[serde(default)]
    pub played_at: Option<DateTime<Utc>>,
}

impl From<&GameResult> for ResultRow {
    fn from(game: &GameResult) -> Self {
        Self {
            username: game.username.clone(),
            result: game.result,
            played_at: Some(game.played_at),
        }
    }
}

/// Per-user aggregate counters (one row per user).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    /// Owner.
    pub user_id: UserId,
    /// Display name.
    pub username: String,
    /// Rounds won.
    #[serde(default)]
    pub wins: u64,
    /// Rounds lost.
    #[serde(default)]
    pub losses: u64,
    /// Rounds drawn.
    #[serde(default)]
    pub draws: u64,
    /// All rounds.
    #[serde(default)]
    pub total_games: u64,
    /// Percentage of rounds won, maintained by the store.
    #[serde(default)]
    pub win_rate: Option<f64>,
}

impl UserStats {
    /// Zeroed counters for a user seen for the first time.
    pub fn empty(user_id: UserId, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
            wins: 0,
            losses: 0,
            draws: 0,
            total_games: 0,
            win_rate: Some(0.0),
        }
    }

    /// Fold one outcome into the counters and recompute the win rate.
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Win => self.wins += 1,
            Outcome::Loss => self.losses += 1,
            Outcome::Draw => self.draws += 1,
        }
        self.total_games += 1;
        self.win_rate = Some(crate::algorithms::win_rate_percent(self.wins, self.total_games));
    }
}

/// Derived ranking row; never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    /// Display name.
    pub username: String,
    /// Rounds won.
    pub wins: u64,
    /// Rounds played.
    pub total: u64,
    /// Win rate rounded to one decimal, e.g. `"66.7"`.
    #[serde(rename = "winRate")]
    pub win_rate: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(username: Option<&str>, email: Option<&str>) -> AuthUser {
        AuthUser {
            id: UserId::new("u-1"),
            email: email.map(str::to_string),
            username: username.map(str::to_string),
        }
    }

    #[test]
    fn test_display_name_prefers_metadata() {
        assert_eq!(user(Some("alice"), Some("a@x.io")).display_name(), "alice");
    }

    #[test]
    fn test_display_name_falls_back_to_email() {
        assert_eq!(user(None, Some("bob@x.io")).display_name(), "bob");
        assert_eq!(user(Some("  "), Some("bob@x.io")).display_name(), "bob");
        assert_eq!(user(None, None).display_name(), "u-1");
    }

    #[test]
    fn test_game_result_row_shape() {
        let game = GameResult::new(
            UserId::new("u-1"),
            "alice",
            Choice::Rock,
            Choice::Scissors,
            Outcome::Win,
        );
        let json = serde_json::to_value(&game).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["player_choice"], "rock");
        assert_eq!(json["result"], "win");

        let back: GameResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, game);
    }

    #[test]
    fn test_user_stats_record() {
        let mut stats = UserStats::empty(UserId::new("u-1"), "alice");
        stats.record(Outcome::Win);
        stats.record(Outcome::Loss);
        stats.record(Outcome::Win);
        assert_eq!(stats.total_games, 3);
        assert_eq!(stats.wins, 2);
        assert_eq!(stats.win_rate, Some(66.7));
    }

    #[test]
    fn test_user_stats_missing_counters_default() {
        let stats: UserStats =
            serde_json::from_str(r#"{"user_id":"u-9","username":"zed","win_rate":null}"#).unwrap();
        assert_eq!(stats.total_games, 0);
        assert_eq!(stats.win_rate, None);
    }
}
