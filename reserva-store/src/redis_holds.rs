use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::info;

use reserva_domain::{Hold, HoldKey, HoldStore, StoreError};

/// Hold arena backed by a shared Redis, for deployments where several
/// engine processes must see the same holds. Same contract as
/// [`crate::MemoryHoldStore`]; expiry is delegated to Redis key TTLs.
#[derive(Clone)]
pub struct RedisHoldStore {
    client: redis::Client,
}

fn hold_key(key: &HoldKey) -> String {
    format!("hold:{}:{}", key.tenant_id, key.customer_id)
}

fn map_redis(e: redis::RedisError) -> StoreError {
    StoreError::Connection(e.to_string())
}

impl RedisHoldStore {
    pub async fn new(connection_string: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(connection_string).map_err(map_redis)?;
        info!("Redis hold store ready");
        Ok(Self { client })
    }
}

#[async_trait]
impl HoldStore for RedisHoldStore {
    async fn put(&self, hold: Hold) -> Result<(), StoreError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(map_redis)?;

        let key = hold_key(&hold.key());
        let ttl = (hold.expires_at - hold.created_at).num_seconds().max(1) as u64;
        let payload =
            serde_json::to_string(&hold).map_err(|e| StoreError::Encoding(e.to_string()))?;

        // SET EX overwrites any prior hold and resets the TTL in one
        // round trip (last-hold-wins).
        conn.set_ex::<_, _, ()>(key, payload, ttl)
            .await
            .map_err(map_redis)?;
        Ok(())
    }

    async fn get(&self, key: &HoldKey) -> Result<Option<Hold>, StoreError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(map_redis)?;

        let payload: Option<String> = conn.get(hold_key(key)).await.map_err(map_redis)?;
        match payload {
            None => Ok(None),
            Some(raw) => {
                let hold =
                    serde_json::from_str(&raw).map_err(|e| StoreError::Encoding(e.to_string()))?;
                Ok(Some(hold))
            }
        }
    }

    async fn remove(&self, key: &HoldKey) -> Result<(), StoreError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(map_redis)?;

        conn.del::<_, ()>(hold_key(key)).await.map_err(map_redis)?;
        Ok(())
    }

    async fn sweep(&self) -> Result<usize, StoreError> {
        // Redis evicts expired keys natively; nothing to do.
        Ok(0)
    }
}
