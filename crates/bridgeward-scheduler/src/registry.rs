//! The task registry: at most one live timer per key.
//!
//! # Three ways to drop an entry
//!
//! | Call | Entry removed | Task aborted | Used when |
//! |------|---------------|--------------|-----------|
//! | [`arm`](TaskRegistry::arm) on an existing key | yes | yes | a new schedule replaces the old one |
//! | [`remove`](TaskRegistry::remove) | yes | no | the task finished on its own |
//! | [`cancel`](TaskRegistry::cancel) | yes | yes | something outside invalidated the schedule |
//!
//! # Generations
//!
//! Each armed task gets a generation number. A finishing task removes its
//! entry with [`remove_if_current`](TaskRegistry::remove_if_current), so it
//! can't accidentally drop a newer task that replaced it in the meantime.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::task::AbortHandle;

struct Slot {
    generation: u64,
    handle: AbortHandle,
}

pub struct TaskRegistry<K> {
    slots: Mutex<HashMap<K, Slot>>,
    next_generation: AtomicU64,
}

impl<K> TaskRegistry<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Spawns `make(generation)` and stores it under `key`, aborting any
    /// task already stored there. Returns the new generation.
    ///
    /// The slot lock is held while spawning, so the task can't look
    /// itself up before it is registered.
    pub fn arm<F, Fut>(&self, key: K, make: F) -> u64
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let mut slots = self.slots.lock();
        let handle = tokio::spawn(make(generation)).abort_handle();
        if let Some(old) = slots.insert(key, Slot { generation, handle }) {
            old.handle.abort();
        }
        generation
    }

    /// Like [`arm`](Self::arm) but leaves an existing task alone.
    /// Returns `None` if the key was taken.
    pub fn arm_if_absent<F, Fut>(&self, key: K, make: F) -> Option<u64>
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slots = self.slots.lock();
        if slots.contains_key(&key) {
            return None;
        }
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let handle = tokio::spawn(make(generation)).abort_handle();
        slots.insert(key, Slot { generation, handle });
        Some(generation)
    }

    /// Forgets the task without aborting it.
    pub fn remove(&self, key: &K) -> bool {
        self.slots.lock().remove(key).is_some()
    }

    /// Forgets the task only if it is still generation `generation`.
    pub fn remove_if_current(&self, key: &K, generation: u64) -> bool {
        let mut slots = self.slots.lock();
        match slots.get(key) {
            Some(slot) if slot.generation == generation => {
                slots.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Aborts and forgets the task.
    pub fn cancel(&self, key: &K) -> bool {
        match self.slots.lock().remove(key) {
            Some(slot) => {
                slot.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Aborts every task.
    pub fn cancel_all(&self) {
        for (_, slot) in self.slots.lock().drain() {
            slot.handle.abort();
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.slots.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

impl<K: Eq + Hash + Clone> Default for TaskRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> std::fmt::Debug for TaskRegistry<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.slots.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn counter_task(
        counter: &Arc<AtomicUsize>,
        delay: Duration,
    ) -> impl FnOnce(u64) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>> {
        let counter = Arc::clone(counter);
        move |_| {
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                counter.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_arm_replaces_and_aborts_previous_task() {
        let registry = TaskRegistry::new();
        let fired = Arc::new(AtomicUsize::new(0));

        registry.arm("k", counter_task(&fired, Duration::from_secs(10)));
        registry.arm("k", counter_task(&fired, Duration::from_secs(10)));
        assert_eq!(registry.len(), 1);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_arm_if_absent_keeps_existing_task() {
        let registry = TaskRegistry::new();
        let fired = Arc::new(AtomicUsize::new(0));

        assert!(registry.arm_if_absent("k", counter_task(&fired, Duration::from_secs(1))).is_some());
        assert!(registry.arm_if_absent("k", counter_task(&fired, Duration::from_secs(1))).is_none());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_task_from_firing() {
        let registry = TaskRegistry::new();
        let fired = Arc::new(AtomicUsize::new(0));

        registry.arm("k", counter_task(&fired, Duration::from_secs(5)));
        assert!(registry.cancel(&"k"));
        assert!(!registry.cancel(&"k"));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_forgets_without_aborting() {
        let registry = TaskRegistry::new();
        let fired = Arc::new(AtomicUsize::new(0));

        registry.arm("k", counter_task(&fired, Duration::from_secs(5)));
        assert!(registry.remove(&"k"));
        assert!(!registry.contains(&"k"));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_if_current_ignores_stale_generation() {
        let registry = TaskRegistry::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let old = registry.arm("k", counter_task(&fired, Duration::from_secs(5)));
        let new = registry.arm("k", counter_task(&fired, Duration::from_secs(5)));

        assert!(!registry.remove_if_current(&"k", old));
        assert!(registry.contains(&"k"));
        assert!(registry.remove_if_current(&"k", new));
        assert!(registry.is_empty());
    }
}
