//! Time-bounded cache with coalescing of concurrent misses.
//!
//! Each key maps to a slot holding a `tokio::sync::OnceCell`. The first caller
//! that finds no live slot installs a fresh one and runs the loader; every other
//! caller arriving while that load is in flight awaits the same cell instead of
//! issuing its own query. Failed loads leave the cell empty, so errors are never
//! cached and the next waiter retries.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OnceCell};
use tokio::time::Instant;

struct Slot<V> {
    cell: OnceCell<(V, Instant)>,
}

impl<V> Slot<V> {
    fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// A slot still loading is never expired.
    fn is_expired(&self, now: Instant) -> bool {
        self.cell
            .get()
            .is_some_and(|(_, expires_at)| now >= *expires_at)
    }
}

/// Process-local TTL cache keyed by `K`.
pub struct TtlCache<K, V> {
    ttl: Duration,
    slots: Mutex<HashMap<K, Arc<Slot<V>>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached value for `key`, or run `load` to produce it.
    ///
    /// Concurrent callers for the same key share one `load` invocation while
    /// the caller running it stays alive; if that caller is dropped mid-load,
    /// the next waiter starts a fresh `load`. The loaded value lives for the
    /// cache TTL, measured from when it was loaded. A failed load drops the
    /// key's slot so failing keys do not accumulate.
    pub async fn get_or_try_load<F, Fut, E>(&self, key: K, load: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let slot = self.slot_for(key.clone()).await;
        let ttl = self.ttl;
        let loaded = slot
            .cell
            .get_or_try_init(|| async move {
                let value = load().await?;
                Ok::<_, E>((value, Instant::now() + ttl))
            })
            .await;
        match loaded {
            Ok((value, _)) => Ok(value.clone()),
            Err(e) => {
                self.discard_failed(&key, &slot).await;
                Err(e)
            }
        }
    }

    /// Remove `key` if it still maps to `slot` and nothing has filled it.
    async fn discard_failed(&self, key: &K, slot: &Arc<Slot<V>>) {
        let mut slots = self.slots.lock().await;
        let unchanged = slots
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot) && !current.cell.initialized());
        if unchanged {
            slots.remove(key);
        }
    }

    /// Return a live cached value without loading.
    pub async fn get(&self, key: &K) -> Option<V> {
        let slots = self.slots.lock().await;
        let slot = slots.get(key)?;
        match slot.cell.get() {
            Some((value, expires_at)) if Instant::now() < *expires_at => Some(value.clone()),
            _ => None,
        }
    }

    /// Number of slots currently held, including expired ones not yet purged.
    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn slot_for(&self, key: K) -> Arc<Slot<V>> {
        let mut slots = self.slots.lock().await;
        let now = Instant::now();
        if let Some(slot) = slots.get(&key) {
            if !slot.is_expired(now) {
                return slot.clone();
            }
        }
        // New slot needed: drop every other expired slot while we hold the lock.
        slots.retain(|_, slot| !slot.is_expired(now));
        let slot = Arc::new(Slot::new());
        slots.insert(key, slot.clone());
        slot
    }
}
