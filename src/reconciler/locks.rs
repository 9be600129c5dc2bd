use crate::crd::PageKey;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = Arc<Mutex<HashMap<PageKey, Arc<AsyncMutex<()>>>>>;

/// One async lock per page key, so at most one reconcile runs for a page
/// no matter which path triggered it.
#[derive(Clone, Default)]
pub struct KeyLocks {
    inner: LockMap,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other holder has `key`, then takes it.
    pub async fn lock(&self, key: &PageKey) -> KeyGuard {
        let lock = self.inner.lock().entry(key.clone()).or_default().clone();
        let guard = lock.lock_owned().await;
        KeyGuard {
            guard: Some(guard),
            key: key.clone(),
            locks: self.inner.clone(),
        }
    }

    pub fn is_locked(&self, key: &PageKey) -> bool {
        self.inner
            .lock()
            .get(key)
            .is_some_and(|lock| lock.try_lock().is_err())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct KeyGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: PageKey,
    locks: LockMap,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        let mut locks = self.locks.lock();
        self.guard.take();
        // Only the map still holds the lock once nobody is waiting on it.
        if locks
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.key);
        }
    }
}
