// ABOUTME: Process-wide key/value cache with time-to-live and single-flight get-or-compute.
// ABOUTME: Concurrent misses for one key share one computation and its outcome; different keys never wait on each other.

//! Get-or-compute cache.
//!
//! Every key has a slot holding its stored entry and, while a computation is
//! running, a flight: the receiving end of a watch channel the computing
//! caller publishes its outcome on. A caller that finds a fresh entry returns
//! it. A caller that finds a flight waits on it and receives the same
//! outcome, success or error. Otherwise the caller opens a flight and
//! computes. The map is guarded by one synchronous mutex that is never held
//! across an await point.
//!
//! Errors are handed to the callers that waited on the failed computation
//! and are never stored, so the next caller computes again. A computation
//! that is cancelled closes its flight without writing anything, and one of
//! its waiters takes over.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

type Outcome<V, E> = Result<Arc<V>, E>;

struct Entry<V> {
    value: Arc<V>,
    expires_at: Instant,
}

impl<V> Entry<V> {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

struct Flight<V, E> {
    id: u64,
    outcome: watch::Receiver<Option<Outcome<V, E>>>,
}

struct Slot<V, E> {
    entry: Option<Entry<V>>,
    flight: Option<Flight<V, E>>,
}

impl<V, E> Default for Slot<V, E> {
    fn default() -> Self {
        Self {
            entry: None,
            flight: None,
        }
    }
}

impl<V, E> Slot<V, E> {
    fn fresh_value(&self, now: Instant) -> Option<Arc<V>> {
        self.entry
            .as_ref()
            .filter(|e| e.is_fresh(now))
            .map(|e| Arc::clone(&e.value))
    }

    /// A slot with no computation and no fresh value carries nothing worth keeping.
    fn is_idle(&self, now: Instant) -> bool {
        self.flight.is_none() && self.fresh_value(now).is_none()
    }
}

struct Slots<V, E> {
    map: HashMap<String, Slot<V, E>>,
    next_flight: u64,
}

/// Key/value store with TTL-based freshness and per-key single-flight computation.
///
/// `E` is the computation's error type. It is cloned to every caller that
/// waited on a failed computation.
pub struct CacheStore<V, E> {
    slots: Mutex<Slots<V, E>>,
}

impl<V, E> Default for CacheStore<V, E> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(Slots {
                map: HashMap::new(),
                next_flight: 0,
            }),
        }
    }
}

impl<V, E> std::fmt::Debug for CacheStore<V, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("keys", &self.lock_slots().map.len())
            .finish()
    }
}

/// What a caller does after inspecting the slot.
enum Role<V, E> {
    Hit(Arc<V>),
    Wait(watch::Receiver<Option<Outcome<V, E>>>),
    Compute(u64, watch::Sender<Option<Outcome<V, E>>>),
}

/// Held by the computing caller. Dropping it unfinished closes the flight
/// without storing anything.
struct FlightGuard<'a, V, E> {
    store: &'a CacheStore<V, E>,
    key: &'a str,
    id: u64,
    publish: watch::Sender<Option<Outcome<V, E>>>,
    finished: bool,
}

impl<V, E: Clone> FlightGuard<'_, V, E> {
    fn finish(mut self, outcome: &Outcome<V, E>, ttl: Duration) {
        {
            let mut slots = self.store.lock_slots();
            let slot = slots.map.entry(self.key.to_string()).or_default();
            if let Ok(value) = outcome {
                slot.entry = Some(Entry {
                    value: Arc::clone(value),
                    expires_at: Instant::now() + ttl,
                });
            }
            if slot.flight.as_ref().is_some_and(|f| f.id == self.id) {
                slot.flight = None;
            }
        }
        self.finished = true;
        // Waiters that already gave up are fine to miss.
        let _ = self.publish.send(Some(outcome.clone()));
    }
}

impl<V, E> Drop for FlightGuard<'_, V, E> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut slots = self.store.lock_slots();
        if let Some(slot) = slots.map.get_mut(self.key) {
            if slot.flight.as_ref().is_some_and(|f| f.id == self.id) {
                slot.flight = None;
            }
        }
        debug!(key = self.key, "computation abandoned");
        // `publish` drops after this, waking waiters to find the flight closed.
    }
}

impl<V, E> CacheStore<V, E> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_slots(&self) -> MutexGuard<'_, Slots<V, E>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn role(&self, key: &str) -> Role<V, E> {
        let mut slots = self.lock_slots();
        let id = slots.next_flight;
        let slot = slots.map.entry(key.to_string()).or_default();

        if let Some(value) = slot.fresh_value(Instant::now()) {
            return Role::Hit(value);
        }
        if let Some(flight) = &slot.flight {
            return Role::Wait(flight.outcome.clone());
        }

        let stale = slot.entry.is_some();
        let (publish, outcome) = watch::channel(None);
        slot.flight = Some(Flight { id, outcome });
        slots.next_flight += 1;
        debug!(key, stale, "cache miss, computing");
        Role::Compute(id, publish)
    }

    /// Returns the value for `key` if fresh, computing and storing it otherwise.
    ///
    /// While one caller computes, other callers for the same key wait and then
    /// receive its outcome, including its error. A zero `ttl` bypasses the
    /// cache entirely. Errors are never stored.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: Clone,
    {
        if ttl.is_zero() {
            debug!(key, "cache disabled, computing");
            return compute().await.map(Arc::new);
        }

        loop {
            match self.role(key) {
                Role::Hit(value) => {
                    debug!(key, "cache hit");
                    return Ok(value);
                }
                Role::Wait(mut outcome) => {
                    debug!(key, "waiting on in-flight computation");
                    let shared = match outcome.wait_for(Option::is_some).await {
                        Ok(published) => (*published).clone(),
                        Err(_) => None,
                    };
                    match shared {
                        Some(result) => return result,
                        // The computing caller was cancelled; try again.
                        None => continue,
                    }
                }
                Role::Compute(id, publish) => {
                    let guard = FlightGuard {
                        store: self,
                        key,
                        id,
                        publish,
                        finished: false,
                    };
                    let outcome = compute().await.map(Arc::new);
                    guard.finish(&outcome, ttl);
                    match &outcome {
                        Ok(_) => info!(key, ttl_secs = ttl.as_secs(), "cache entry refreshed"),
                        Err(_) => debug!(key, "computation failed, nothing stored"),
                    }
                    return outcome;
                }
            }
        }
    }

    /// Returns the fresh value for `key`, waiting for any in-flight computation.
    pub async fn get(&self, key: &str) -> Option<Arc<V>> {
        let flight = {
            let slots = self.lock_slots();
            let slot = slots.map.get(key)?;
            slot.flight.as_ref().map(|f| f.outcome.clone())
        };
        if let Some(mut outcome) = flight {
            let _ = outcome.wait_for(Option::is_some).await;
        }
        let now = Instant::now();
        self.lock_slots().map.get(key)?.fresh_value(now)
    }

    /// Drops the stored value for `key`. Returns true if there was one.
    ///
    /// A computation in flight for `key` keeps running, still serves its
    /// waiters, and stores its result.
    pub fn invalidate(&self, key: &str) -> bool {
        let mut slots = self.lock_slots();
        let Some(slot) = slots.map.get_mut(key) else {
            return false;
        };
        let dropped = slot.entry.take().is_some();
        if slot.flight.is_none() {
            slots.map.remove(key);
        }
        dropped
    }

    /// Removes slots with neither a fresh value nor a computation in flight.
    /// Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut slots = self.lock_slots();
        let before = slots.map.len();
        slots.map.retain(|_, slot| !slot.is_idle(now));
        let removed = before - slots.map.len();
        if removed > 0 {
            debug!(removed, "purged expired cache entries");
        }
        removed
    }

    /// Drops every stored value. Used at shutdown.
    ///
    /// Computations in flight are left to finish.
    pub fn flush(&self) {
        let mut slots = self.lock_slots();
        let count = slots.map.len();
        slots.map.retain(|_, slot| {
            slot.entry = None;
            slot.flight.is_some()
        });
        debug!(count, "cache flushed");
    }

    /// Number of fresh entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock_slots()
            .map
            .values()
            .filter(|slot| slot.fresh_value(now).is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
