//! # Leaderboard Aggregation
//!
//! Two ways to rank players:
//!
//! - **Raw**: group `game_results` rows by username and compute win rates here.
//! - **Stats**: rank `user_stats` rows maintained by the store, breaking win-rate
//!   ties by games played.
//!
//! Both produce a complete replacement list; callers swap it in whole.

use std::collections::HashMap;

use crate::domain::{LeaderboardEntry, Outcome, ResultRow, UserStats};

/// Default number of ranked players.
pub const DEFAULT_LEADERBOARD_SIZE: usize = 20;

/// Round to one decimal place.
pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// `100 * wins / total` rounded to one decimal; `0.0` when `total` is zero.
pub fn win_rate_percent(wins: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_one_decimal(wins as f64 * 100.0 / total as f64)
}

/// Display form with exactly one decimal.
pub fn format_win_rate(rate: f64) -> String {
    format!("{:.1}", round_one_decimal(rate))
}

#[derive(Default)]
struct Tally {
    wins: u64,
    total: u64,
}

/// Rank players from raw round rows.
///
/// Groups are only created for usernames that appear in `rows`, so every
/// entry has at least one game. Ties keep first-seen order.
pub fn aggregate_results(rows: &[ResultRow], top_k: usize) -> Vec<LeaderboardEntry> {
    let mut order: Vec<&str> = Vec::new();
    let mut tallies: HashMap<&str, Tally> = HashMap::new();

    for row in rows {
        let tally = tallies.entry(row.username.as_str()).or_insert_with(|| {
            order.push(row.username.as_str());
            Tally::default()
        });
        tally.total += 1;
        if row.result == Outcome::Win {
            tally.wins += 1;
        }
    }

    let mut ranked: Vec<(f64, LeaderboardEntry)> = order
        .into_iter()
        .filter_map(|name| {
            let tally = tallies.get(name)?;
            let rate = win_rate_percent(tally.wins, tally.total);
            Some((
                rate,
                LeaderboardEntry {
                    username: name.to_string(),
                    wins: tally.wins,
                    total: tally.total,
                    win_rate: format_win_rate(rate),
                },
            ))
        })
        .collect();

    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
    ranked.truncate(top_k);
    ranked.into_iter().map(|(_, entry)| entry).collect()
}

/// Rank players from precomputed statistics rows.
///
/// Order: win rate descending, then total games descending. Rows without any
/// games are skipped; a missing win rate counts as `0.0`.
pub fn rank_user_stats(stats: Vec<UserStats>, top_k: usize) -> Vec<LeaderboardEntry> {
    let mut rows: Vec<UserStats> = stats.into_iter().filter(|s| s.total_games > 0).collect();

    rows.sort_by(|a, b| {
        let rate_a = a.win_rate.unwrap_or(0.0);
        let rate_b = b.win_rate.unwrap_or(0.0);
        rate_b
            .total_cmp(&rate_a)
            .then_with(|| b.total_games.cmp(&a.total_games))
    });
    rows.truncate(top_k);

    rows.into_iter()
        .map(|s| LeaderboardEntry {
            win_rate: format_win_rate(s.win_rate.unwrap_or(0.0)),
            username: s.username,
            wins: s.wins,
            total: s.total_games,
        })
        .collect()
}
