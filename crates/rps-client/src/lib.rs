//! # RPS Client
//!
//! Client-side state layer for a rock-paper-scissors game backed by a hosted
//! database, auth and realtime service.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! - Session lifecycle with a lazily created statistics row per user
//! - Round persistence with a ten-entry, newest-first local history
//! - Leaderboard from raw rounds or from precomputed statistics
//! - Push-channel sync plus a cancellable periodic poll
//!
//! ## Consistency
//!
//! | Source | Effect |
//! |--------|--------|
//! | Local save | history prepend, one leaderboard refresh |
//! | Pushed insert | owner's history prepend, leaderboard refresh |
//! | Pushed stats update | leaderboard refresh |
//! | Poll tick | history and leaderboard re-fetch |
//!
//! ## Module Structure
//!
//! ```text
//! rps-client/
//! ├── domain/          # Session, GameResult, UserStats, LocalHistory, errors
//! ├── algorithms/      # Outcome resolution, leaderboard aggregation
//! ├── ports/           # GameClientApi, AuthProvider, TableStore, ChangeFeed
//! ├── adapters/        # SupabaseStore, InMemoryStore
//! ├── service/         # AuthService, GameService, RealtimeSync, GameClient
//! └── config.rs        # StoreConfig from the environment
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

// Re-exports
pub use adapters::{FailPoint, InMemoryStore, SupabaseStore};
pub use algorithms::{
    aggregate_results, computer_choice, random_computer_choice, rank_user_stats, resolve_outcome,
    win_rate_percent, DEFAULT_LEADERBOARD_SIZE,
};
pub use config::{ClientSettings, Environment, LeaderboardSettings, StoreConfig};
pub use domain::{
    invariant_no_empty_entries, invariant_outcome_matches, invariant_sorted_by_win_rate,
    ActionResult, AuthUser, Choice, ClientError, ConfigError, GameError, GameResult,
    LeaderboardEntry, LeaderboardMode, LocalHistory, Outcome, ResultRow, RowId, Session,
    StoreError, UserId, UserStats, HISTORY_LIMIT,
};
pub use ports::{
    AuthProvider, ChangeEvent, ChangeFeed, ChangeKind, ChangeSpec, ChangeSubscription,
    GameClientApi, Query, RemoteStore, TableStore, TableStoreExt, GAME_RESULTS_TABLE,
    USER_STATS_TABLE,
};
pub use service::{
    AuthService, BackgroundTask, GameClient, GameService, LiveUpdates, RealtimeSync,
    GAME_RESULTS_CHANNEL,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
