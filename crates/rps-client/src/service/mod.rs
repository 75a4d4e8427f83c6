//! # Service Module
//!
//! Stateful components wired over a [`crate::ports::RemoteStore`]:
//!
//! - [`AuthService`]: session lifecycle and the statistics row
//! - [`GameService`]: rounds, local history, leaderboard
//! - [`RealtimeSync`] and [`start_auto_refresh`]: the two update sources
//! - [`GameClient`]: facade implementing [`crate::ports::GameClientApi`]

pub mod auth;
pub mod auto_refresh;
pub mod client;
pub mod game;
pub mod live;
pub mod loading;
pub mod realtime;
pub mod task;

pub use auth::AuthService;
pub use auto_refresh::start_auto_refresh;
pub use client::GameClient;
pub use game::GameService;
pub use live::LiveUpdates;
pub use loading::{LoadingFlag, LoadingGuard};
pub use realtime::{game_change_specs, RealtimeSync, GAME_RESULTS_CHANNEL};
pub use task::BackgroundTask;
