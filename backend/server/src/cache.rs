//! TTL key-value cache holding pending signups.
//!
//! Production talks to Redis. [`MemoryCache`] keeps entries in a map and checks expiry
//! against the tokio clock, so a paused test runtime can jump past a TTL.
use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use redis::{AsyncCommands, RedisError, aio::ConnectionManager};
use thiserror::Error;
use tokio::{sync::Mutex, time::Instant};

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),
}

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Overwrites any existing value and restarts its expiry.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

pub struct RedisCache {
    connection: ConnectionManager,
}

impl RedisCache {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut connection = self.connection.clone();
        Ok(connection.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut connection = self.connection.clone();
        let _: () = connection
            .set_ex(key, value, ttl.as_secs().max(1))
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut connection = self.connection.clone();
        let _: () = connection.del(key).await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.entries.lock().await;

        match entries.get(key) {
            Some((value, expires_at)) if Instant::now() < *expires_at => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_memory_expiry() {
        let cache = MemoryCache::new();
        cache
            .set("signup:a@b.com", "pending", Duration::from_secs(600))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(599)).await;
        assert_eq!(
            cache.get("signup:a@b.com").await.unwrap().as_deref(),
            Some("pending")
        );

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("signup:a@b.com").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_refreshes_ttl() {
        let cache = MemoryCache::new();
        cache.set("k", "v1", Duration::from_secs(10)).await.unwrap();

        tokio::time::advance(Duration::from_secs(8)).await;
        cache.set("k", "v2", Duration::from_secs(10)).await.unwrap();

        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_delete() {
        let cache = MemoryCache::new();
        cache.set("k", "v", Duration::from_secs(10)).await.unwrap();
        cache.delete("k").await.unwrap();
        cache.delete("missing").await.unwrap();

        assert_eq!(cache.get("k").await.unwrap(), None);
    }
}
