//! Memoization Module
//!
//! Wraps an idempotent async function so repeated calls with the same
//! arguments are answered from the cache.
//!
//! Concurrent calls for an uncached key share one computation through
//! [`SingleFlight`]: the first caller runs the function and writes the
//! cache, the rest wait and read the result.

mod single_flight;

pub use single_flight::{FlightGuard, SingleFlight};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::cache::{generate_key, TieredCache};
use crate::error::CacheError;

// == Memo Options ==
/// How a memoized function is keyed and stored.
#[derive(Debug, Clone)]
pub struct MemoOptions {
    /// Prefix of every key derived for this function
    pub key_prefix: String,
    /// TTL for stored results; the cache default when `None`
    pub ttl: Option<Duration>,
    /// Whether results are also persisted to the disk tier
    pub use_file_cache: bool,
}

impl MemoOptions {
    pub fn new(key_prefix: impl Into<String>) -> Self {
        Self {
            key_prefix: key_prefix.into(),
            ttl: None,
            use_file_cache: true,
        }
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn memory_only(mut self) -> Self {
        self.use_file_cache = false;
        self
    }
}

#[derive(Serialize)]
struct CallParams<'a, A> {
    args: &'a A,
}

// == Memoized ==
/// A cached view of `func`. Call it through [`Memoized::call`].
///
/// `func` must be referentially transparent; errors are returned to the
/// caller and never cached.
pub struct Memoized<F> {
    cache: Arc<TieredCache>,
    func: F,
    options: MemoOptions,
    flights: SingleFlight,
}

/// Wraps `func` with the cache.
pub fn with_cache<F>(cache: Arc<TieredCache>, func: F, options: MemoOptions) -> Memoized<F> {
    Memoized::new(cache, func, options)
}

impl<F> Memoized<F> {
    pub fn new(cache: Arc<TieredCache>, func: F, options: MemoOptions) -> Self {
        Self::with_flights(cache, func, options, SingleFlight::new())
    }

    /// Like [`new`](Self::new) but sharing an existing in-flight registry.
    pub fn with_flights(
        cache: Arc<TieredCache>,
        func: F,
        options: MemoOptions,
        flights: SingleFlight,
    ) -> Self {
        Self {
            cache,
            func,
            options,
            flights,
        }
    }

    pub fn options(&self) -> &MemoOptions {
        &self.options
    }

    /// Cache key for a given argument set.
    pub fn key_for<A>(&self, args: &A) -> Result<String, CacheError>
    where
        A: Serialize,
    {
        generate_key(&self.options.key_prefix, &CallParams { args })
    }

    // == Call ==
    /// Returns the cached result for `args`, invoking `func` on a miss.
    pub async fn call<A, T, E, Fut>(&self, args: A) -> Result<T, E>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        A: Serialize,
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
    {
        let key = self.key_for(&args)?;

        if let Some(hit) = self.lookup::<T>(&key).await? {
            return Ok(hit);
        }

        let _flight = self.flights.acquire(&key).await;

        // Another caller may have filled the key while we waited
        if let Some(hit) = self.lookup::<T>(&key).await? {
            debug!(key = %key, "Joined in-flight computation");
            return Ok(hit);
        }

        debug!(key = %key, "Computing memoized value");
        let value = (self.func)(args).await?;
        self.store(&key, &value).await?;

        Ok(value)
    }

    async fn lookup<T>(&self, key: &str) -> Result<Option<T>, CacheError>
    where
        T: DeserializeOwned,
    {
        if self.options.use_file_cache {
            self.cache.get(key).await
        } else {
            self.cache.get_memory_only(key)
        }
    }

    async fn store<T>(&self, key: &str, value: &T) -> Result<bool, CacheError>
    where
        T: Serialize,
    {
        if self.options.use_file_cache {
            self.cache.set(key, value, self.options.ttl).await
        } else {
            self.cache.set_memory_only(key, value, self.options.ttl)
        }
    }
}
