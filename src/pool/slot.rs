use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

use crate::error::ConfigError;

struct PoolInner {
    capacity: usize,
    permits: Arc<Semaphore>,
    in_use: AtomicUsize,
    /// Signalled on every release.
    released: Notify,
}

/// Fixed-capacity pool of [`Slot`]s.
///
/// Cheap to clone; clones share the same capacity.
#[derive(Clone)]
pub struct SlotPool {
    inner: Arc<PoolInner>,
}

impl fmt::Debug for SlotPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotPool")
            .field("capacity", &self.inner.capacity)
            .field("in_use", &self.in_use())
            .finish()
    }
}

impl SlotPool {
    /// Creates a pool with `capacity` slots.
    ///
    /// Returns [`ConfigError::ZeroConcurrency`] when `capacity == 0`.
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(Self {
            inner: Arc::new(PoolInner {
                capacity,
                permits: Arc::new(Semaphore::new(capacity)),
                in_use: AtomicUsize::new(0),
                released: Notify::new(),
            }),
        })
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of slots currently held.
    pub fn in_use(&self) -> usize {
        self.inner.in_use.load(Ordering::Acquire)
    }

    /// Number of free slots (`capacity - in_use`); may be stale by the time it is read.
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    /// Takes a slot if one is free right now.
    pub fn try_acquire(&self) -> Option<Slot> {
        let permit = Arc::clone(&self.inner.permits).try_acquire_owned().ok()?;
        self.inner.in_use.fetch_add(1, Ordering::AcqRel);
        Some(Slot {
            pool: Arc::clone(&self.inner),
            permit: Some(permit),
        })
    }

    /// Waits until a slot is free and takes it.
    pub async fn acquire(&self) -> Slot {
        loop {
            let released = self.inner.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            if let Some(slot) = self.try_acquire() {
                return slot;
            }
            released.await;
        }
    }

    /// Waits until no slot is held.
    ///
    /// Returns immediately if the pool is already idle.
    pub async fn await_idle(&self) {
        loop {
            let released = self.inner.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            if self.in_use() == 0 {
                return;
            }
            released.await;
        }
    }
}

/// One unit of pool capacity.
///
/// Dropping the slot releases it; this happens exactly once.
pub struct Slot {
    pool: Arc<PoolInner>,
    permit: Option<OwnedSemaphorePermit>,
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("capacity", &self.pool.capacity)
            .finish()
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        // Counter first so in_use never reads above capacity, permit before
        // notifying so woken acquirers find it.
        self.pool.in_use.fetch_sub(1, Ordering::AcqRel);
        drop(self.permit.take());
        self.pool.released.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn zero_capacity_is_rejected() {
        assert_eq!(SlotPool::new(0).unwrap_err(), ConfigError::ZeroConcurrency);
    }

    #[tokio::test]
    async fn try_acquire_respects_capacity() {
        let pool = SlotPool::new(2).unwrap();
        let a = pool.try_acquire().unwrap();
        let _b = pool.try_acquire().unwrap();

        assert!(pool.try_acquire().is_none());
        assert_eq!(pool.available(), 0);
        assert_eq!(pool.in_use(), 2);

        drop(a);
        assert_eq!(pool.in_use(), 1);
        assert_eq!(pool.available(), 1);
        assert!(pool.try_acquire().is_some());
    }

    #[tokio::test]
    async fn acquire_waits_for_release() {
        let pool = SlotPool::new(1).unwrap();
        let held = pool.try_acquire().unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        let slot = timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert_eq!(pool.in_use(), 1);
        drop(slot);
        assert_eq!(pool.in_use(), 0);
    }

    #[tokio::test]
    async fn await_idle_returns_immediately_when_idle() {
        let pool = SlotPool::new(3).unwrap();
        timeout(Duration::from_millis(50), pool.await_idle())
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn await_idle_waits_for_every_slot() {
        let pool = SlotPool::new(3).unwrap();
        let slots: Vec<Slot> = (0..3).map(|_| pool.try_acquire().unwrap()).collect();

        for (i, slot) in slots.into_iter().enumerate() {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10 * (i as u64 + 1))).await;
                drop(slot);
            });
        }

        timeout(Duration::from_secs(1), pool.await_idle())
            .await
            .unwrap();
        assert_eq!(pool.in_use(), 0);
    }

    #[tokio::test]
    async fn slot_is_released_when_holder_panics() {
        let pool = SlotPool::new(1).unwrap();
        let slot = pool.try_acquire().unwrap();

        let res = tokio::spawn(async move {
            let _slot = slot;
            panic!("holder failed");
        })
        .await;

        assert!(res.is_err());
        assert_eq!(pool.in_use(), 0);
        assert_eq!(pool.available(), 1);
    }
}
