//! Redis-backed [`Datastore`].
//!
//! The protocol names Redis-shaped operations directly (`sadd`, `hset`,
//! `xadd`, `zincrby`, `lpush`/`ltrim`, ...), so a thin `redis-rs` wrapper is
//! the natural production backend; [`d4_core::memory::InMemoryDatastore`]
//! stays the one used in tests.
//!
//! [`redis::aio::ConnectionManager`] reconnects transparently on the first
//! command issued after a dropped connection, so a single clone is handed to
//! every connection task the way [`Datastore::clone`] expects.

use async_trait::async_trait;
use d4_core::{Datastore, StoreError};
use redis::{aio::ConnectionManager, AsyncCommands};

/// Handle to a Redis connection, implementing [`Datastore`].
#[derive(Clone)]
pub struct RedisDatastore {
    conn: ConnectionManager,
}

impl RedisDatastore {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379/0`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unreachable`] if the initial connection fails.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(|e| StoreError::Unreachable(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        Ok(Self { conn })
    }
}

fn op_err(err: redis::RedisError) -> StoreError {
    StoreError::Operation(err.to_string())
}

#[async_trait]
impl Datastore for RedisDatastore {
    async fn sadd(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(key, member).await.map_err(op_err)
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.srem::<_, _, ()>(key, member).await.map_err(op_err)
    }

    async fn ismember(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        conn.sismember(key, member).await.map_err(op_err)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(key, field, value).await.map_err(op_err)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.hget(key, field).await.map_err(op_err)
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.hdel::<_, _, ()>(key, field).await.map_err(op_err)
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        conn.hexists(key, field).await.map_err(op_err)
    }

    async fn xadd(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.xadd::<_, _, _, _, ()>(key, "*", &[("data", value)]).await.map_err(op_err)
    }

    async fn xlen(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        conn.xlen(key).await.map_err(op_err)
    }

    async fn xdel_stream(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(op_err)
    }

    async fn zincrby(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.zincr::<_, _, _, ()>(key, member, 1).await.map_err(op_err)
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(key, value).await.map_err(op_err)
    }

    async fn ltrim(&self, key: &str, len: usize) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.ltrim::<_, ()>(key, 0, len as isize - 1).await.map_err(op_err)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value).await.map_err(op_err)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(op_err)
    }

    async fn hsetnx(&self, key: &str, field: &str, value: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        conn.hset_nx(key, field, value).await.map_err(op_err)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(op_err)
    }
}
