//! # Domain Invariants
//!
//! Rules every saved round and every published ranking must satisfy.

use super::entities::LeaderboardEntry;
use super::errors::GameError;
use super::value_objects::{Choice, Outcome};
use crate::algorithms::resolve_outcome;

/// Invariant: the recorded outcome follows from the two moves.
pub fn invariant_outcome_matches(
    player: Choice,
    computer: Choice,
    recorded: Outcome,
) -> Result<(), GameError> {
    if resolve_outcome(player, computer) != recorded {
        return Err(GameError::OutcomeMismatch {
            player: player.to_string(),
            computer: computer.to_string(),
            recorded: recorded.to_string(),
        });
    }
    Ok(())
}

/// Invariant: no leaderboard row for a user without games.
pub fn invariant_no_empty_entries(entries: &[LeaderboardEntry]) -> bool {
    entries.iter().all(|e| e.total > 0 && e.wins <= e.total)
}

/// Invariant: rows are ordered by win rate, highest first.
pub fn invariant_sorted_by_win_rate(entries: &[LeaderboardEntry]) -> bool {
    entries.windows(2).all(|pair| {
        let a: f64 = pair[0].win_rate.parse().unwrap_or(0.0);
        let b: f64 = pair[1].win_rate.parse().unwrap_or(0.0);
        a >= b
    })
}
