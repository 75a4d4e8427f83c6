//! # Algorithms Module
//!
//! Pure logic: round resolution and leaderboard aggregation.

pub mod leaderboard;
pub mod round;

pub use leaderboard::{
    aggregate_results, format_win_rate, rank_user_stats, round_one_decimal, win_rate_percent,
    DEFAULT_LEADERBOARD_SIZE,
};
pub use round::{computer_choice, random_computer_choice, resolve_outcome};
