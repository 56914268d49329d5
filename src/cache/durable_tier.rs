//! Durable (out-of-process) cache tier: a narrow `DurableStore` trait plus a
//! Redis-backed implementation and two test doubles.

use std::time::Duration;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum DurableStoreError {
    #[error("durable store unavailable: {0}")]
    Unavailable(String),
    #[error("durable store operation timed out")]
    Timeout,
}

/// Outbound interface the multi-tier cache drives the durable backend through.
/// Deliberately narrow: a `MultiTierCache` never needs more than
/// get/set/del/ping from its backing store.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DurableStoreError>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), DurableStoreError>;
    async fn del(&self, key: &str) -> Result<(), DurableStoreError>;
    async fn ping(&self) -> Result<(), DurableStoreError>;
}

/// Always misses. Used when `durable_tier_enabled` is false so the
/// `MultiTierCache` doesn't need an `Option<Box<dyn DurableStore>>` at every
/// call site.
pub struct NullDurableStore;

#[async_trait]
impl DurableStore for NullDurableStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, DurableStoreError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), DurableStoreError> {
        Ok(())
    }

    async fn del(&self, _key: &str) -> Result<(), DurableStoreError> {
        Ok(())
    }

    async fn ping(&self) -> Result<(), DurableStoreError> {
        Ok(())
    }
}

/// Redis-backed durable tier over a `ConnectionManager`, which transparently
/// reconnects on connection loss instead of requiring callers to pool
/// connections themselves.
pub struct RedisDurableStore {
    conn: redis::aio::ConnectionManager,
    timeout: Duration,
}

impl RedisDurableStore {
    pub async fn connect(redis_url: &str, timeout: Duration) -> Result<Self, DurableStoreError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| DurableStoreError::Unavailable(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| DurableStoreError::Unavailable(e.to_string()))?;
        Ok(Self { conn, timeout })
    }
}

#[async_trait]
impl DurableStore for RedisDurableStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DurableStoreError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        tokio::time::timeout(self.timeout, conn.get::<_, Option<Vec<u8>>>(key))
            .await
            .map_err(|_| DurableStoreError::Timeout)?
            .map_err(|e| DurableStoreError::Unavailable(e.to_string()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), DurableStoreError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let secs = ttl.as_secs().max(1);
        tokio::time::timeout(self.timeout, conn.set_ex::<_, _, ()>(key, value, secs))
            .await
            .map_err(|_| DurableStoreError::Timeout)?
            .map_err(|e| DurableStoreError::Unavailable(e.to_string()))
    }

    async fn del(&self, key: &str) -> Result<(), DurableStoreError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        tokio::time::timeout(self.timeout, conn.del::<_, ()>(key))
            .await
            .map_err(|_| DurableStoreError::Timeout)?
            .map_err(|e| DurableStoreError::Unavailable(e.to_string()))
    }

    async fn ping(&self) -> Result<(), DurableStoreError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let _: String = tokio::time::timeout(self.timeout, redis::cmd("PING").query_async(&mut conn))
            .await
            .map_err(|_| DurableStoreError::Timeout)?
            .map_err(|e| DurableStoreError::Unavailable(e.to_string()))?;
        Ok(())
    }
}

/// In-memory stand-in for integration tests that want a real async round trip
/// through the `DurableStore` trait without a Redis server.
#[derive(Default)]
pub struct TestDurableStore {
    inner: parking_lot::Mutex<std::collections::HashMap<String, Vec<u8>>>,
}

impl TestDurableStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableStore for TestDurableStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DurableStoreError> {
        Ok(self.inner.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>, _ttl: Duration) -> Result<(), DurableStoreError> {
        self.inner.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), DurableStoreError> {
        self.inner.lock().remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), DurableStoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_store_always_misses() {
        let store = NullDurableStore;
        store.set("k", vec![1], Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_store_round_trips() {
        let store = TestDurableStore::new();
        store.set("k", vec![1, 2, 3], Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(vec![1, 2, 3]));
        store.del("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
