//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implements the outbound remote store ports.

pub mod in_memory;
pub mod supabase;

pub use in_memory::{FailPoint, InMemoryStore};
pub use supabase::SupabaseStore;
