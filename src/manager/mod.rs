//! Cache Manager Module
//!
//! The layered local + remote cache that every strategy and the HTTP
//! middleware build on.

mod layered;

pub use layered::{CacheManager, ManagerStats};
