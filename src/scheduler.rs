//! Keyed task scheduler with debounce and cooperative cancellation.
//!
//! At most one task is live per key. Scheduling a key cancels whatever is pending or in flight
//! for it, so bursts collapse into the last request and an older task can never finish after a
//! newer one.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct Slot {
    generation: u64,
    token: CancellationToken,
}

pub struct KeyedScheduler<K> {
    debounce: Duration,
    slots: Arc<Mutex<HashMap<K, Slot>>>,
    generation: AtomicU64,
}

fn lock<K>(slots: &Mutex<HashMap<K, Slot>>) -> MutexGuard<'_, HashMap<K, Slot>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<K> KeyedScheduler<K>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
{
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            slots: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// No debounce: tasks start immediately but still supersede each other.
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Run `task` for `key` once the debounce window passes without another schedule for the
    /// same key. The handle resolves to `None` when the task was cancelled or superseded.
    ///
    /// The task receives its cancellation token so it can stop cooperatively; it is also
    /// dropped at its next await point once the token fires.
    pub fn schedule<F, Fut, T>(&self, key: K, task: F) -> JoinHandle<Option<T>>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancellationToken::new();
        {
            let mut slots = lock(&self.slots);
            let previous = slots.insert(
                key.clone(),
                Slot {
                    generation,
                    token: token.clone(),
                },
            );
            if let Some(previous) = previous {
                debug!(?key, "superseding scheduled task");
                previous.token.cancel();
            }
        }

        let slots = Arc::clone(&self.slots);
        let delay = self.debounce;
        let child = token.clone();
        tokio::spawn(async move {
            let work = async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                task(child).await
            };
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                out = work => Some(out),
            };

            let mut slots = lock(&slots);
            if slots.get(&key).is_some_and(|s| s.generation == generation) {
                slots.remove(&key);
            }
            result
        })
    }

    /// Cancel the pending or in-flight task for `key`. Returns true if one existed.
    pub fn cancel(&self, key: &K) -> bool {
        match lock(&self.slots).remove(key) {
            Some(slot) => {
                slot.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for (_, slot) in lock(&self.slots).drain() {
            slot.token.cancel();
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        lock(&self.slots).contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.slots).len()
    }
}

impl<K> Drop for KeyedScheduler<K> {
    fn drop(&mut self) {
        for (_, slot) in lock(&self.slots).drain() {
            slot.token.cancel();
        }
    }
}
