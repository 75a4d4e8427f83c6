//! Game Record Service
//!
//! Saves rounds, keeps the local history window and recomputes the
//! leaderboard. Each refresh computes a full replacement list and swaps it in
//! under one write lock, so concurrent refreshes never interleave.

use parking_lot::RwLock;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::algorithms::{aggregate_results, rank_user_stats};
use crate::config::LeaderboardSettings;
use crate::domain::{
    invariant_outcome_matches, ActionResult, Choice, ClientError, GameResult, LeaderboardEntry,
    LeaderboardMode, LocalHistory, Outcome, ResultRow, StoreError, UserId, UserStats,
    HISTORY_LIMIT,
};
use crate::ports::outbound::{
    Query, RemoteStore, TableStore, TableStoreExt, GAME_RESULTS_TABLE, USER_STATS_TABLE,
};
use crate::service::loading::LoadingFlag;

/// The row the store echoed for an insert, or `local` when it echoed none or
/// one that does not decode. The insert has already succeeded either way.
fn confirmed_record(echoed: Vec<Value>, local: GameResult) -> GameResult {
    let Some(row) = echoed.into_iter().next() else {
        return local;
    };
    match serde_json::from_value::<GameResult>(row) {
        Ok(stored) => stored,
        Err(e) => {
            warn!(error = %e, "Stored round did not decode, keeping local record");
            local
        }
    }
}

/// Round history and standings over a [`RemoteStore`].
pub struct GameService<S: RemoteStore> {
    store: Arc<S>,
    settings: LeaderboardSettings,
    history: RwLock<LocalHistory>,
    leaderboard: RwLock<Vec<LeaderboardEntry>>,
    loading: LoadingFlag,
    refreshes: AtomicU64,
}

impl<S: RemoteStore> GameService<S> {
    /// Service with empty history and standings.
    pub fn new(store: Arc<S>, settings: LeaderboardSettings) -> Self {
        Self {
            store,
            settings,
            history: RwLock::new(LocalHistory::new()),
            leaderboard: RwLock::new(Vec::new()),
            loading: LoadingFlag::new(),
            refreshes: AtomicU64::new(0),
        }
    }

    /// Persist one round.
    ///
    /// After the insert succeeds the stored record (or the local one when the
    /// store echoes nothing) is prepended to the history, then the leaderboard
    /// is refreshed once. A failed insert changes nothing locally.
    pub async fn save_game_result(
        &self,
        user_id: &UserId,
        username: &str,
        player_choice: Choice,
        computer_choice: Choice,
        result: Outcome,
    ) -> ActionResult<GameResult> {
        invariant_outcome_matches(player_choice, computer_choice, result)?;
        let _loading = self.loading.begin();

        let game = GameResult::new(user_id.clone(), username, player_choice, computer_choice, result);
        let row = serde_json::to_value(&game).map_err(|e| StoreError::Parse(e.to_string()))?;
        let echoed = self
            .store
            .insert(GAME_RESULTS_TABLE, vec![row])
            .await
            .map_err(|e| {
                warn!(%user_id, error = %e, "Failed to save round");
                ClientError::from(e)
            })?;
        let stored = confirmed_record(echoed, game);

        self.history.write().prepend(stored.clone());
        info!(
            %user_id,
            player = %player_choice,
            computer = %computer_choice,
            result = %result,
            id = ?stored.id,
            "Round saved"
        );

        if let Err(e) = self.fetch_leaderboard().await {
            warn!(error = %e, "Leaderboard refresh after save failed");
        }
        Ok(stored)
    }

    /// Replace the history with the user's most recent rounds, newest first.
    ///
    /// On failure the previous history stays in place.
    pub async fn fetch_user_history(&self, user_id: &UserId) -> ActionResult<Vec<GameResult>> {
        let _loading = self.loading.begin();

        let query = Query::select("*")
            .eq("user_id", user_id)
            .order("played_at", false)
            .limit(HISTORY_LIMIT);
        let games: Vec<GameResult> = self
            .store
            .select_as(GAME_RESULTS_TABLE, &query)
            .await
            .map_err(|e| {
                warn!(%user_id, error = %e, "Failed to fetch history");
                ClientError::from(e)
            })?;

        debug!(%user_id, count = games.len(), "History fetched");
        let mut history = self.history.write();
        history.replace(games);
        Ok(history.entries().to_vec())
    }

    /// Recompute the leaderboard in the configured mode.
    ///
    /// On failure the previous ranking stays in place.
    pub async fn fetch_leaderboard(&self) -> ActionResult<Vec<LeaderboardEntry>> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        let _loading = self.loading.begin();

        let ranked = match self.settings.mode {
            LeaderboardMode::Raw => self.rank_raw().await,
            LeaderboardMode::Stats => self.rank_stats().await,
        }
        .map_err(|e| {
            warn!(mode = %self.settings.mode, error = %e, "Failed to fetch leaderboard");
            e
        })?;

        debug!(mode = %self.settings.mode, entries = ranked.len(), "Leaderboard refreshed");
        *self.leaderboard.write() = ranked.clone();
        Ok(ranked)
    }

    async fn rank_raw(&self) -> ActionResult<Vec<LeaderboardEntry>> {
        let mut query = Query::select("username, result, played_at").order("played_at", false);
        if let Some(sample) = self.settings.sample_limit {
            query = query.limit(sample);
        }
        let rows: Vec<ResultRow> = self.store.select_as(GAME_RESULTS_TABLE, &query).await?;
        Ok(aggregate_results(&rows, self.settings.size))
    }

    async fn rank_stats(&self) -> ActionResult<Vec<LeaderboardEntry>> {
        let query = Query::select("*")
            .gt("total_games", 0)
            .order("win_rate", false)
            .nulls_last()
            .order("total_games", false)
            .limit(self.settings.size);
        let rows: Vec<UserStats> = self.store.select_as(USER_STATS_TABLE, &query).await?;
        Ok(rank_user_stats(rows, self.settings.size))
    }

    /// Statistics row for a user; `None` when the user has none yet.
    pub async fn fetch_user_stats(&self, user_id: &UserId) -> ActionResult<Option<UserStats>> {
        let _loading = self.loading.begin();

        let query = Query::select("*").eq("user_id", user_id);
        match self
            .store
            .select_single_as::<UserStats>(USER_STATS_TABLE, &query)
            .await
        {
            Ok(stats) => Ok(Some(stats)),
            Err(e) if e.is_no_rows() => Ok(None),
            Err(e) => {
                warn!(%user_id, error = %e, "Failed to fetch statistics");
                Err(e.into())
            }
        }
    }

    /// Apply a pushed round. Only the session owner's rounds enter the
    /// history; returns whether it changed.
    pub fn apply_pushed_result(&self, game: GameResult, session_user: Option<&UserId>) -> bool {
        if session_user != Some(&game.user_id) {
            return false;
        }
        self.history.write().prepend(game)
    }

    /// Newest-first history snapshot.
    pub fn history(&self) -> Vec<GameResult> {
        self.history.read().entries().to_vec()
    }

    /// Current ranking snapshot.
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        self.leaderboard.read().clone()
    }

    /// Number of leaderboard refreshes started so far.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// Leaderboard settings in use.
    pub fn settings(&self) -> LeaderboardSettings {
        self.settings
    }

    /// True while a game call is in flight.
    pub fn is_loading(&self) -> bool {
        self.loading.is_loading()
    }

    /// Forget the signed-out user's history.
    pub fn clear_history(&self) {
        self.history.write().clear();
    }
}
