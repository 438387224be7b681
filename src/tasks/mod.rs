//! Background Tasks Module
//!
//! Contains background tasks that run periodically alongside the cache.
//!
//! # Tasks
//! - TTL Prune: Removes expired local entries at configured intervals
//!
//! The write-behind flush and refresh-ahead sweep timers live with their
//! strategies in [`crate::strategies`].

mod prune;

pub use prune::spawn_prune_task;
