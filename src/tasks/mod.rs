//! Background Tasks Module
//!
//! Contains background tasks that run periodically for the cache's lifetime.
//!
//! # Tasks
//! - Janitor: purges expired entries from both tiers at a fixed interval

mod cleanup;

pub use cleanup::{spawn_janitor, JanitorHandle};
