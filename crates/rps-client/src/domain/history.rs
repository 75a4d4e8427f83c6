//! # Local History
//!
//! Newest-first window over the signed-in user's most recent rounds.

use super::entities::GameResult;

/// Maximum number of rounds kept locally.
pub const HISTORY_LIMIT: usize = 10;

/// Bounded, newest-first sequence of [`GameResult`]s.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LocalHistory {
    entries: Vec<GameResult>,
}

impl LocalHistory {
    /// Empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a round at the front and drop anything past [`HISTORY_LIMIT`].
    ///
    /// Returns `false` without changing anything when a record with the same
    /// server id is already present (a push echo of a local save).
    pub fn prepend(&mut self, game: GameResult) -> bool {
        if let Some(id) = &game.id {
            if self.entries.iter().any(|g| g.id.as_ref() == Some(id)) {
                return false;
            }
        }
        self.entries.insert(0, game);
        self.entries.truncate(HISTORY_LIMIT);
        true
    }

    /// Replace the whole window (e.g. after a remote fetch).
    pub fn replace(&mut self, games: Vec<GameResult>) {
        self.entries = games;
        self.entries.truncate(HISTORY_LIMIT);
    }

    /// Drop everything (sign-out).
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Newest-first view.
    pub fn entries(&self) -> &[GameResult] {
        &self.entries
    }

    /// Most recent round.
    pub fn latest(&self) -> Option<&GameResult> {
        self.entries.first()
    }

    /// Number of rounds held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no rounds are held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
