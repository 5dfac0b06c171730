//! Memoizing result cache with TTL expiry and single-flight computation.
//!
//! One mutex guards both the stored entries and the registry of in-flight
//! computations, so "return the live entry, else join the running flight, else
//! start one" is a single atomic decision. The computation itself runs outside
//! that mutex, inside a per-key `OnceCell`, so distinct keys never contend.

use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::OnceCell;
use tracing::{debug, warn};

const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
            .lock()
            .map(|now| *now)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Slot {
    cache_type: String,
    key: String,
}

impl Slot {
    fn new(cache_type: &str, key: &str) -> Self {
        Self {
            cache_type: cache_type.to_string(),
            key: key.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    key: String,
    value: V,
    cache_type: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

type Flight<V, E> = Arc<OnceCell<Result<V, E>>>;

struct State<V, E> {
    entries: HashMap<Slot, CacheEntry<V>>,
    in_flight: HashMap<Slot, Flight<V, E>>,
}

pub struct ResultCache<V, E> {
    state: Mutex<State<V, E>>,
    clock: Arc<dyn Clock>,
}

impl<V: Clone, E: Clone> Default for ResultCache<V, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone, E: Clone> ResultCache<V, E> {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(State {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
            }),
            clock,
        }
    }

    /// Returns the live value for `(cache_type, key)` or runs `compute` to
    /// produce one.
    ///
    /// Concurrent callers for the same slot share a single `compute` call and
    /// all observe its outcome. Failures are handed to every waiter but never
    /// stored. If the cache state is unusable the value is computed directly.
    pub fn get_or_compute<F>(&self, key: &str, ttl_secs: u64, cache_type: &str, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let slot = Slot::new(cache_type, key);
        let flight = {
            let Ok(mut state) = self.state.lock() else {
                warn!(cache_type, key, "cache unavailable, computing directly");
                return compute();
            };
            let now = self.clock.now();
            match state.entries.get(&slot) {
                Some(entry) if entry.is_live(now) => {
                    debug!(cache_type, key, "cache hit");
                    return Ok(entry.value.clone());
                }
                Some(_) => {
                    debug!(cache_type, key, "cache entry expired");
                    state.entries.remove(&slot);
                }
                None => {}
            }
            state
                .in_flight
                .entry(slot.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let outcome = flight.get_or_init(|| {
            debug!(cache_type, key, "cache miss, computing");
            let outcome = compute();
            self.settle(&slot, &flight, &outcome, ttl_secs);
            outcome
        });
        outcome.clone()
    }

    fn settle(&self, slot: &Slot, flight: &Flight<V, E>, outcome: &Result<V, E>, ttl_secs: u64) {
        let Ok(mut state) = self.state.lock() else {
            warn!(cache_type = %slot.cache_type, key = %slot.key, "cache unavailable, result not stored");
            return;
        };
        if let Ok(value) = outcome {
            let created_at = self.clock.now();
            let ttl = i64::try_from(ttl_secs.min(MAX_TTL_SECS)).unwrap_or(i64::MAX);
            state.entries.insert(
                slot.clone(),
                CacheEntry {
                    key: slot.key.clone(),
                    value: value.clone(),
                    cache_type: slot.cache_type.clone(),
                    created_at,
                    expires_at: created_at + Duration::seconds(ttl),
                },
            );
        }
        if state
            .in_flight
            .get(slot)
            .is_some_and(|current| Arc::ptr_eq(current, flight))
        {
            state.in_flight.remove(slot);
        }
    }

    /// Live value without computing anything.
    pub fn peek(&self, key: &str, cache_type: &str) -> Option<V> {
        let state = self.state.lock().ok()?;
        let now = self.clock.now();
        state
            .entries
            .get(&Slot::new(cache_type, key))
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone())
    }

    /// Age of a live entry.
    pub fn age(&self, key: &str, cache_type: &str) -> Option<Duration> {
        let state = self.state.lock().ok()?;
        let now = self.clock.now();
        state
            .entries
            .get(&Slot::new(cache_type, key))
            .filter(|entry| entry.is_live(now))
            .map(|entry| now - entry.created_at)
    }

    pub fn invalidate(&self, key: &str, cache_type: &str) -> bool {
        self.remove_where(|entry| entry.key == key && entry.cache_type == cache_type) > 0
    }

    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        self.remove_where(|entry| entry.key.starts_with(prefix))
    }

    pub fn invalidate_type(&self, cache_type: &str) -> usize {
        self.remove_where(|entry| entry.cache_type == cache_type)
    }

    /// Drops every expired entry; returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let removed = self.remove_where(|entry| !entry.is_live(now));
        if removed > 0 {
            debug!(removed, "swept expired cache entries");
        }
        removed
    }

    fn remove_where(&self, mut pred: impl FnMut(&CacheEntry<V>) -> bool) -> usize {
        let Ok(mut state) = self.state.lock() else {
            warn!("cache unavailable, nothing removed");
            return 0;
        };
        let before = state.entries.len();
        state.entries.retain(|_, entry| !pred(entry));
        before - state.entries.len()
    }

    /// Stored entries, expired ones included until swept or touched.
    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V, E> ResultCache<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Runs `sweep_expired` every `interval` until the handle is dropped or the
    /// cache itself goes away.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: std::time::Duration) -> SweeperHandle {
        let cache: Weak<Self> = Arc::downgrade(self);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let join = thread::spawn(move || {
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let Some(cache) = cache.upgrade() else {
                            break;
                        };
                        cache.sweep_expired();
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        });
        SweeperHandle {
            stop: Some(stop_tx),
            join: Some(join),
        }
    }
}

pub struct SweeperHandle {
    stop: Option<mpsc::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> (Arc<ManualClock>, ResultCache<u32, String>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = ResultCache::with_clock(clock.clone());
        (clock, cache)
    }

    #[test]
    fn failures_are_not_stored() {
        let (_, cache) = cache();
        let err = cache.get_or_compute("k", 60, "t", || Err::<u32, _>("boom".to_string()));
        assert_eq!(err, Err("boom".to_string()));
        assert!(cache.is_empty());
        let ok = cache.get_or_compute("k", 60, "t", || Ok(7));
        assert_eq!(ok, Ok(7));
    }

    #[test]
    fn sweep_drops_only_expired() {
        let (clock, cache) = cache();
        cache.get_or_compute("short", 10, "t", || Ok(1)).unwrap();
        cache.get_or_compute("long", 100, "t", || Ok(2)).unwrap();
        clock.advance(Duration::seconds(11));
        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.peek("long", "t"), Some(2));
        assert_eq!(cache.peek("short", "t"), None);
    }

    #[test]
    fn invalidation_by_prefix_and_type() {
        let (_, cache) = cache();
        cache.get_or_compute("optimize_7x7_a", 60, "optimization", || Ok(1)).unwrap();
        cache.get_or_compute("optimize_4x2_b", 60, "optimization", || Ok(2)).unwrap();
        cache.get_or_compute("matrix_c", 60, "matrix", || Ok(3)).unwrap();

        assert_eq!(cache.invalidate_prefix("optimize_7x7"), 1);
        assert_eq!(cache.invalidate_type("optimization"), 1);
        assert!(cache.invalidate("matrix_c", "matrix"));
        assert!(!cache.invalidate("matrix_c", "matrix"));
        assert!(cache.is_empty());
    }

    #[test]
    fn age_tracks_clock() {
        let (clock, cache) = cache();
        cache.get_or_compute("k", 60, "t", || Ok(1)).unwrap();
        clock.advance(Duration::seconds(5));
        assert_eq!(cache.age("k", "t"), Some(Duration::seconds(5)));
    }
}
