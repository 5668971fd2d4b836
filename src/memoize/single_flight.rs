//! Per-key in-flight registry.
//!
//! Callers for the same key serialize on one async mutex. The holder computes
//! and writes the cache; waiters wake afterwards and read the cached value.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One key's lock and the number of callers holding or waiting on it.
#[derive(Debug, Default)]
struct Flight {
    lock: Arc<Mutex<()>>,
    users: usize,
}

/// Registry of in-flight computations keyed by cache key.
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    flights: Arc<DashMap<String, Flight>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other caller holds `key`, then claims it.
    ///
    /// The caller is registered before it starts waiting, so dropping this
    /// future mid-wait still unregisters it.
    pub async fn acquire(&self, key: &str) -> FlightGuard {
        let lock = {
            let mut flight = self.flights.entry(key.to_owned()).or_default();
            flight.users += 1;
            Arc::clone(&flight.lock)
        };

        let mut claim = FlightGuard {
            key: key.to_owned(),
            guard: None,
            flights: Arc::clone(&self.flights),
        };
        claim.guard = Some(lock.lock_owned().await);
        claim
    }

    /// Number of keys with a holder or waiters.
    pub fn in_flight(&self) -> usize {
        self.flights.len()
    }
}

/// Claim on a key; released on drop.
pub struct FlightGuard {
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
    flights: Arc<DashMap<String, Flight>>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.guard.take();

        if let Entry::Occupied(mut flight) = self.flights.entry(self.key.clone()) {
            let users = &mut flight.get_mut().users;
            *users = users.saturating_sub(1);
            if *users == 0 {
                flight.remove();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_guard_removes_idle_entry() {
        let flights = SingleFlight::new();

        let guard = flights.acquire("k").await;
        assert_eq!(flights.in_flight(), 1);

        drop(guard);
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_same_key_is_serialized() {
        let flights = SingleFlight::new();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let work = |flights: SingleFlight, active: Arc<AtomicUsize>, peak: Arc<AtomicUsize>| async move {
            let _guard = flights.acquire("same").await;
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            active.fetch_sub(1, Ordering::SeqCst);
        };

        tokio::join!(
            work(flights.clone(), active.clone(), peak.clone()),
            work(flights.clone(), active.clone(), peak.clone()),
            work(flights.clone(), active.clone(), peak.clone()),
        );

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let flights = SingleFlight::new();

        let _a = flights.acquire("a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), flights.acquire("b")).await;

        assert!(b.is_ok(), "Unrelated key must not wait");
        assert_eq!(flights.in_flight(), 2);
    }

    #[tokio::test]
    async fn test_timed_out_waiter_unregisters() {
        let flights = SingleFlight::new();

        let holder = flights.acquire("k").await;
        let waiter = tokio::time::timeout(Duration::from_millis(20), flights.acquire("k")).await;
        assert!(waiter.is_err());

        drop(holder);
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_waiter_dropped_after_holder_unregisters() {
        let flights = SingleFlight::new();

        let holder = flights.acquire("k").await;
        let mut waiter = Box::pin(flights.acquire("k"));
        tokio::select! {
            biased;
            _ = &mut waiter => panic!("Waiter must block while the key is held"),
            _ = std::future::ready(()) => {}
        }

        drop(holder);
        assert_eq!(flights.in_flight(), 1, "Pending waiter keeps the entry");

        drop(waiter);
        assert_eq!(flights.in_flight(), 0);
    }
}
