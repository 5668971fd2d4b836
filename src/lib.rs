//! Tiered Cache - memoization behind a memory tier and a durable disk tier
//!
//! Provides TTL expiration, soft capacity bounds, read-through promotion,
//! write-through persistence, namespace invalidation, single-flight
//! memoization and a background janitor.
//!
//! The cache is an explicit instance owned by the host application:
//!
//! ```ignore
//! let config = Config::from_env();
//! let cache = Arc::new(TieredCache::from_config(&config));
//! let janitor = spawn_janitor(cache.clone(), config.cleanup_interval);
//!
//! let listing = with_cache(cache.clone(), load_listing, MemoOptions::new("blog:list"));
//! let page = listing.call((category, page_no)).await?;
//!
//! Invalidator::new(cache.clone()).invalidate_blog().await;
//! janitor.shutdown().await;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod invalidation;
pub mod memoize;
pub mod tasks;
pub mod telemetry;

pub use cache::{generate_key, TieredCache};
pub use config::Config;
pub use error::{CacheError, Result};
pub use invalidation::{CacheDomain, Invalidator};
pub use memoize::{with_cache, MemoOptions, Memoized};
pub use tasks::{spawn_janitor, JanitorHandle};
pub use telemetry::init_tracing;
