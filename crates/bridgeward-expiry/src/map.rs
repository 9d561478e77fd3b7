//! The core expiring map and its sweeper.
//!
//! Internally each container keeps two structures under one lock:
//!
//! - `entries`: key → (value, inserted_at, lifetime). This is the truth —
//!   a key is present iff it is in this map and its deadline hasn't passed.
//! - `heap`: a min-heap of (deadline, sequence, key). The sweeper pops the
//!   earliest deadlines off the top instead of scanning every entry.
//!
//! Refreshing a key pushes a *new* heap entry but does not remove the old
//! one (a binary heap can't remove from the middle cheaply). The old entry
//! becomes "stale": when it is popped, the sweeper sees the key's real
//! deadline is still in the future and leaves it alone. Stale entries are
//! counted, and once they pile up the heap is rebuilt.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::ExpiryError;

/// Stale pops tolerated before a rebuild is even considered.
const CLEANUP_THRESHOLD: usize = 1_000;
/// Rebuild only when the heap is this many times larger than live entries.
const CLEANUP_RATIO: usize = 2;
/// Hard ceiling above which the heap is always rebuilt from scratch.
const HEAP_SIZE_LIMIT: usize = 100_000;
/// Fraction of live entries that raises the stale-pop threshold.
const ADAPTIVE_CLEANUP_FACTOR: f64 = 0.1;
/// Upper bound on the sweeper's sleep between passes.
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// ExpiryMode
// ---------------------------------------------------------------------------

/// How expired entries get removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpiryMode {
    /// A dedicated OS thread sweeps on an interval of `min(ttl / 10, 1s)`.
    #[default]
    Eager,
    /// No thread. Every read sweeps synchronously before answering.
    Lazy,
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    /// `ttl` normally, `ttl + extra` after [`ExpiringMap::extend`].
    lifetime: Duration,
}

impl<V> Entry<V> {
    fn deadline(&self) -> Instant {
        self.inserted_at + self.lifetime
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.deadline() <= now
    }
}

/// A scheduled expiry check. Ordered by `(expires_at, seq)` only, so the
/// key type doesn't need to be `Ord`.
struct HeapEntry<K> {
    expires_at: Instant,
    seq: u64,
    key: K,
}

impl<K> PartialEq for HeapEntry<K> {
    fn eq(&self, other: &Self) -> bool {
        self.expires_at == other.expires_at && self.seq == other.seq
    }
}

impl<K> Eq for HeapEntry<K> {}

impl<K> PartialOrd for HeapEntry<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for HeapEntry<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.expires_at
            .cmp(&other.expires_at)
            .then(self.seq.cmp(&other.seq))
    }
}

struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    /// `Reverse` turns std's max-heap into a min-heap.
    heap: BinaryHeap<Reverse<HeapEntry<K>>>,
    seq: u64,
    stale_pops: usize,
}

impl<K: Eq + Hash + Clone, V> Inner<K, V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            heap: BinaryHeap::new(),
            seq: 0,
            stale_pops: 0,
        }
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn schedule(&mut self, key: K, expires_at: Instant) {
        let seq = self.next_seq();
        self.heap.push(Reverse(HeapEntry { expires_at, seq, key }));
    }

    fn live(&self, key: &K, now: Instant) -> Option<&Entry<V>> {
        self.entries.get(key).filter(|e| !e.is_expired(now))
    }

    /// Pops every heap entry whose deadline has passed and deletes the
    /// matching map entry only if the map agrees it is really expired.
    fn sweep(&mut self, now: Instant) -> usize {
        let mut removed = 0;

        while let Some(Reverse(top)) = self.heap.peek() {
            if top.expires_at > now {
                break;
            }
            let Some(Reverse(popped)) = self.heap.pop() else {
                break;
            };

            let really_expired = self
                .entries
                .get(&popped.key)
                .is_some_and(|e| e.is_expired(now));

            if really_expired {
                self.entries.remove(&popped.key);
                removed += 1;
            } else {
                // Refreshed, extended, or already removed.
                self.stale_pops += 1;
            }
        }

        if self.stale_pops > CLEANUP_THRESHOLD
            && self.heap.len() > self.entries.len() * CLEANUP_RATIO
        {
            self.rebuild(now, false);
        }

        if removed > 0 {
            debug!(removed, "expired entries swept");
        }
        removed
    }

    /// Drops stale heap entries. Returns `true` if a rebuild happened.
    ///
    /// Presence of keys is decided by `entries` alone, so this never
    /// changes what callers observe.
    fn rebuild(&mut self, now: Instant, force: bool) -> bool {
        let live = self.entries.len();
        let heap_len = self.heap.len();

        let adaptive_threshold = CLEANUP_THRESHOLD.max(
            ((live as f64 * ADAPTIVE_CLEANUP_FACTOR) as usize)
                .min(HEAP_SIZE_LIMIT / 10),
        );

        if !force
            && self.stale_pops <= adaptive_threshold
            && heap_len <= live * CLEANUP_RATIO
        {
            return false;
        }

        let started = Instant::now();

        if heap_len < 1_000 || heap_len > live * 3 || heap_len > HEAP_SIZE_LIMIT
        {
            // Small or badly skewed: one fresh entry per live key.
            let mut fresh = Vec::with_capacity(live);
            let mut seq = self.seq;
            for (key, entry) in &self.entries {
                seq += 1;
                fresh.push(Reverse(HeapEntry {
                    expires_at: entry.deadline(),
                    seq,
                    key: key.clone(),
                }));
            }
            self.seq = seq;
            self.heap = BinaryHeap::from(fresh);
        } else {
            // Large: a single filter pass keeps one entry per live key,
            // the one carrying its current deadline, then re-heapifies.
            let mut kept = std::mem::take(&mut self.heap).into_vec();
            let mut seen = HashSet::with_capacity(live);
            kept.retain(|Reverse(e)| {
                self.entries
                    .get(&e.key)
                    .is_some_and(|entry| entry.deadline() == e.expires_at)
                    && seen.insert(e.key.clone())
            });
            self.heap = BinaryHeap::from(kept);
        }

        self.stale_pops = 0;

        trace!(
            before = heap_len,
            after = self.heap.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            now = ?now,
            "expiration heap rebuilt"
        );
        true
    }
}

struct Shared<K, V> {
    ttl: Duration,
    mode: ExpiryMode,
    inner: Mutex<Inner<K, V>>,
    wake: Condvar,
    shutdown: AtomicBool,
}

impl<K: Eq + Hash + Clone, V> Shared<K, V> {
    /// Locks the state, sweeping first when in lazy mode.
    fn lock_for_read(&self) -> parking_lot::MutexGuard<'_, Inner<K, V>> {
        let mut inner = self.inner.lock();
        if self.mode == ExpiryMode::Lazy {
            inner.sweep(Instant::now());
        }
        inner
    }
}

fn sweep_interval(ttl: Duration) -> Duration {
    (ttl / 10).min(MAX_SWEEP_INTERVAL)
}

fn run_sweeper<K, V>(shared: Arc<Shared<K, V>>)
where
    K: Eq + Hash + Clone,
{
    let interval = sweep_interval(shared.ttl);
    let mut inner = shared.inner.lock();
    while !shared.shutdown.load(AtomicOrdering::Acquire) {
        inner.sweep(Instant::now());
        shared.wake.wait_for(&mut inner, interval);
    }
    trace!("expiry sweeper stopped");
}

// ---------------------------------------------------------------------------
// ExpiringMap
// ---------------------------------------------------------------------------

/// A map whose entries disappear `ttl` after they were last inserted.
///
/// All methods take `&self` and are safe to call from any thread or task.
/// Dropping the map stops its sweeper thread.
///
/// ```rust
/// use std::time::Duration;
/// use bridgeward_expiry::ExpiringMap;
///
/// let uuids = ExpiringMap::lazy(Duration::from_secs(10)).unwrap();
/// uuids.insert("Steve".to_string(), "u-1".to_string());
/// assert_eq!(uuids.get(&"Steve".to_string()).as_deref(), Some("u-1"));
/// ```
pub struct ExpiringMap<K, V> {
    shared: Arc<Shared<K, V>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<K, V> ExpiringMap<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Send + 'static,
{
    /// Creates a map with the given TTL and expiration mode.
    ///
    /// # Errors
    /// Returns [`ExpiryError::InvalidTtl`] if `ttl` is zero.
    pub fn new(ttl: Duration, mode: ExpiryMode) -> Result<Self, ExpiryError> {
        if ttl.is_zero() {
            return Err(ExpiryError::InvalidTtl(ttl));
        }

        let shared = Arc::new(Shared {
            ttl,
            mode,
            inner: Mutex::new(Inner::new()),
            wake: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });

        let worker = match mode {
            ExpiryMode::Eager => {
                let worker_shared = Arc::clone(&shared);
                let spawned = thread::Builder::new()
                    .name("expiry-sweeper".into())
                    .spawn(move || run_sweeper(worker_shared));
                match spawned {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        // Reads still filter by deadline, so the map stays
                        // correct; memory is only reclaimed on access.
                        warn!(error = %e, "failed to spawn expiry sweeper");
                        None
                    }
                }
            }
            ExpiryMode::Lazy => None,
        };

        debug!(ttl_ms = ttl.as_millis() as u64, ?mode, "expiring map created");

        Ok(Self {
            shared,
            worker: Mutex::new(worker),
        })
    }

    /// Shorthand for an [`ExpiryMode::Eager`] map.
    pub fn eager(ttl: Duration) -> Result<Self, ExpiryError> {
        Self::new(ttl, ExpiryMode::Eager)
    }

    /// Shorthand for an [`ExpiryMode::Lazy`] map.
    pub fn lazy(ttl: Duration) -> Result<Self, ExpiryError> {
        Self::new(ttl, ExpiryMode::Lazy)
    }

    /// The configured time-to-live.
    pub fn ttl(&self) -> Duration {
        self.shared.ttl
    }

    /// The configured expiration mode.
    pub fn mode(&self) -> ExpiryMode {
        self.shared.mode
    }

    /// Inserts or refreshes `key`. The countdown restarts from now.
    pub fn insert(&self, key: K, value: V) {
        let now = Instant::now();
        let ttl = self.shared.ttl;
        let mut inner = self.shared.inner.lock();
        inner.entries.insert(
            key.clone(),
            Entry {
                value,
                inserted_at: now,
                lifetime: ttl,
            },
        );
        inner.schedule(key, now + ttl);
    }

    /// Inserts several entries under one lock acquisition.
    pub fn insert_many(&self, items: impl IntoIterator<Item = (K, V)>) {
        let now = Instant::now();
        let ttl = self.shared.ttl;
        let items: Vec<(K, V)> = items.into_iter().collect();
        let batch = items.len();

        let mut inner = self.shared.inner.lock();
        if batch <= 10 {
            for (key, value) in items {
                inner.entries.insert(
                    key.clone(),
                    Entry {
                        value,
                        inserted_at: now,
                        lifetime: ttl,
                    },
                );
                inner.schedule(key, now + ttl);
            }
        } else {
            // Large batches: append, then re-heapify once.
            let mut heap = std::mem::take(&mut inner.heap).into_vec();
            heap.reserve(batch);
            for (key, value) in items {
                let seq = inner.next_seq();
                heap.push(Reverse(HeapEntry {
                    expires_at: now + ttl,
                    seq,
                    key: key.clone(),
                }));
                inner.entries.insert(
                    key,
                    Entry {
                        value,
                        inserted_at: now,
                        lifetime: ttl,
                    },
                );
            }
            inner.heap = BinaryHeap::from(heap);
        }
        trace!(batch, "batch inserted");
    }

    /// Returns `true` if `key` is present and not expired.
    pub fn contains(&self, key: &K) -> bool {
        let inner = self.shared.lock_for_read();
        inner.live(key, Instant::now()).is_some()
    }

    /// Returns a clone of the value stored under `key`, if still live.
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let inner = self.shared.lock_for_read();
        inner.live(key, Instant::now()).map(|e| e.value.clone())
    }

    /// Removes `key` immediately. Returns its value if it was live.
    pub fn remove(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut inner = self.shared.inner.lock();
        inner
            .entries
            .remove(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value)
    }

    /// Removes several keys. Returns how many were present.
    ///
    /// Removing a large share of the map leaves many heap entries behind,
    /// so this may trigger a rebuild.
    pub fn remove_many<'a>(&self, keys: impl IntoIterator<Item = &'a K>) -> usize
    where
        K: 'a,
    {
        let now = Instant::now();
        let mut inner = self.shared.inner.lock();
        let mut removed = 0;
        for key in keys {
            if inner.entries.remove(key).is_some() {
                removed += 1;
            }
        }
        if removed > 100.min(inner.entries.len() / 10) {
            inner.rebuild(now, false);
        }
        removed
    }

    /// Resets `key`'s countdown and grants `extra` time on top of the TTL.
    ///
    /// Returns `false` (and changes nothing) if the key is absent or
    /// `extra` is zero.
    pub fn extend(&self, key: &K, extra: Duration) -> bool {
        if extra.is_zero() {
            return false;
        }
        let now = Instant::now();
        let lifetime = self.shared.ttl + extra;

        let mut inner = self.shared.inner.lock();
        match inner.entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.inserted_at = now;
                entry.lifetime = lifetime;
            }
            _ => return false,
        }
        inner.schedule(key.clone(), now + lifetime);

        if inner.stale_pops > CLEANUP_THRESHOLD {
            inner.rebuild(now, false);
        }
        true
    }

    /// Time left before `key` expires, or `None` if it isn't present.
    pub fn time_remaining(&self, key: &K) -> Option<Duration> {
        let now = Instant::now();
        let inner = self.shared.lock_for_read();
        inner
            .live(key, now)
            .map(|e| e.deadline().saturating_duration_since(now))
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let inner = self.shared.lock_for_read();
        inner.entries.values().filter(|e| !e.is_expired(now)).count()
    }

    /// Returns `true` if there are no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the live keys.
    pub fn keys(&self) -> Vec<K> {
        let now = Instant::now();
        let inner = self.shared.lock_for_read();
        inner
            .entries
            .iter()
            .filter(|(_, e)| !e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Snapshot of live entries along with the instant each one expires.
    pub fn entries_with_expiry(&self) -> Vec<(K, V, Instant)>
    where
        V: Clone,
    {
        let now = Instant::now();
        let inner = self.shared.lock_for_read();
        inner
            .entries
            .iter()
            .filter(|(_, e)| !e.is_expired(now))
            .map(|(k, e)| (k.clone(), e.value.clone(), e.deadline()))
            .collect()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let mut inner = self.shared.inner.lock();
        let count = inner.entries.len();
        inner.entries.clear();
        inner.heap.clear();
        inner.stale_pops = 0;
        inner.seq = 0;
        debug!(count, "expiring map cleared");
    }

    /// Forces a heap rebuild. Observable contents are unchanged.
    pub fn compact(&self) {
        let mut inner = self.shared.inner.lock();
        inner.rebuild(Instant::now(), true);
    }

    /// Number of scheduled expiry checks, stale ones included.
    pub fn heap_len(&self) -> usize {
        self.shared.inner.lock().heap.len()
    }

    /// Stops the sweeper thread and waits for it to exit.
    ///
    /// The map keeps answering correctly afterwards (reads filter by
    /// deadline), but expired entries are no longer reclaimed in the
    /// background. Idempotent; also runs on drop.
    pub fn shutdown(&self) {
        {
            // Flip the flag under the lock so the sweeper can't miss the
            // notification between its check and its wait.
            let _inner = self.shared.inner.lock();
            self.shared.shutdown.store(true, AtomicOrdering::Release);
            self.shared.wake.notify_all();
        }
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                warn!("expiry sweeper panicked");
            }
        }
    }
}

impl<K, V> Drop for ExpiringMap<K, V> {
    fn drop(&mut self) {
        {
            let _inner = self.shared.inner.lock();
            self.shared.shutdown.store(true, AtomicOrdering::Release);
            self.shared.wake.notify_all();
        }
        if let Some(handle) = self.worker.get_mut().take() {
            let _ = handle.join();
        }
    }
}

impl<K, V> fmt::Debug for ExpiringMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("ExpiringMap")
            .field("ttl", &self.shared.ttl)
            .field("mode", &self.shared.mode)
            .field("entries", &inner.entries.len())
            .field("heap", &inner.heap.len())
            .finish()
    }
}

// =========================================================================
// Tests
// =========================================================================
