use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use reserva_domain::{Clock, Hold, HoldKey, HoldStore, SharedClock, StoreError};

/// Process-local hold arena. Not durable across restarts; swap in
/// [`crate::RedisHoldStore`] behind the same trait when holds must be
/// shared between processes.
pub struct MemoryHoldStore {
    holds: RwLock<HashMap<HoldKey, Hold>>,
    clock: SharedClock,
}

impl MemoryHoldStore {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            holds: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub async fn len(&self) -> usize {
        self.holds.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.holds.read().await.is_empty()
    }
}

#[async_trait]
impl HoldStore for MemoryHoldStore {
    async fn put(&self, hold: Hold) -> Result<(), StoreError> {
        let key = hold.key();
        let previous = self.holds.write().await.insert(key.clone(), hold);
        if previous.is_some() {
            debug!(customer = %key.customer_id, tenant = %key.tenant_id, "hold superseded");
        }
        Ok(())
    }

    async fn get(&self, key: &HoldKey) -> Result<Option<Hold>, StoreError> {
        let now = self.clock.now();
        {
            let holds = self.holds.read().await;
            match holds.get(key) {
                None => return Ok(None),
                Some(hold) if !hold.is_expired(now) => return Ok(Some(hold.clone())),
                Some(_) => {}
            }
        }

        // Lazy eviction. Re-check under the write lock: a fresh hold
        // may have been written for this key in the meantime.
        let mut holds = self.holds.write().await;
        if holds.get(key).is_some_and(|h| h.is_expired(now)) {
            holds.remove(key);
            debug!(customer = %key.customer_id, tenant = %key.tenant_id, "expired hold evicted");
        }
        Ok(None)
    }

    async fn remove(&self, key: &HoldKey) -> Result<(), StoreError> {
        self.holds.write().await.remove(key);
        Ok(())
    }

    async fn sweep(&self) -> Result<usize, StoreError> {
        let now = self.clock.now();
        let mut holds = self.holds.write().await;
        let before = holds.len();
        holds.retain(|_, hold| !hold.is_expired(now));
        Ok(before - holds.len())
    }
}

/// Periodic background sweep, independent of request handling.
pub fn spawn_sweeper(store: Arc<dyn HoldStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick fires immediately; skip it.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.sweep().await {
                Ok(0) => {}
                Ok(evicted) => debug!(evicted, "hold sweep completed"),
                Err(e) => warn!("hold sweep failed: {}", e),
            }
        }
    })
}
