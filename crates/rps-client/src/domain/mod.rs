//! # Domain Module
//!
//! Core types: sessions, rounds, statistics, rankings and the local history window.

pub mod entities;
pub mod errors;
pub mod history;
pub mod invariants;
pub mod value_objects;

pub use entities::*;
pub use errors::*;
pub use history::{LocalHistory, HISTORY_LIMIT};
pub use invariants::*;
pub use value_objects::*;
