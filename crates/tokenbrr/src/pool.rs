use std::{
    ops::Deref,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use rand::Rng;

/// Unordered collection of ready agents shared by the load generator and its
/// in-flight transfers. The lock is held only while the vector is mutated.
#[derive(Debug, Default)]
pub struct AgentPool<T> {
    items: Mutex<Vec<T>>,
}

impl<T> AgentPool<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items: Mutex::new(items),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn put(&self, item: T) {
        self.lock().push(item);
    }

    /// Removes a random item (swap with the last one, then pop).
    pub fn take_random<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<T> {
        let mut items = self.lock();
        if items.is_empty() {
            return None;
        }
        let index = rng.gen_range(0..items.len());
        Some(items.swap_remove(index))
    }
}

impl<T: Clone> AgentPool<T> {
    /// Returns a copy of a random item without removing it.
    pub fn peek_random<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<T> {
        let items = self.lock();
        if items.is_empty() {
            return None;
        }
        Some(items[rng.gen_range(0..items.len())].clone())
    }

    /// Takes a random item out under a lease that puts it back when dropped.
    pub fn lease_random<R: Rng + ?Sized>(self: &Arc<Self>, rng: &mut R) -> Option<PoolLease<T>> {
        let item = self.take_random(rng)?;
        Some(PoolLease {
            pool: Arc::clone(self),
            item,
        })
    }

    /// Leases a random sender and, from what remains, peeks a random receiver.
    /// Both picks happen under one lock. Returns `None` with fewer than two
    /// items.
    pub fn take_pair<R: Rng + ?Sized>(self: &Arc<Self>, rng: &mut R) -> Option<(PoolLease<T>, T)> {
        let mut items = self.lock();
        if items.len() < 2 {
            return None;
        }
        let index = rng.gen_range(0..items.len());
        let sender = items.swap_remove(index);
        let receiver = items[rng.gen_range(0..items.len())].clone();
        drop(items);
        let lease = PoolLease {
            pool: Arc::clone(self),
            item: sender,
        };
        Some((lease, receiver))
    }
}

/// Exclusive hold on an item taken from an [`AgentPool`]. The item returns to
/// the pool when the lease is dropped, on every exit path.
#[derive(Debug)]
pub struct PoolLease<T: Clone> {
    pool: Arc<AgentPool<T>>,
    item: T,
}

impl<T: Clone> Deref for PoolLease<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.item
    }
}

impl<T: Clone> Drop for PoolLease<T> {
    fn drop(&mut self) {
        self.pool.put(self.item.clone());
    }
}
