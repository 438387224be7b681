//! Remote Tier Module
//!
//! Adapter for a shared Redis-compatible store, plus the connectivity events
//! it publishes.

mod events;
mod store;

pub use events::ConnectionEvent;
pub use store::{sockets_available, RemoteStats, RemoteStore};
