//! Redis remote backend
//!
//! Implements [`RemoteBackend`] over a multiplexed async connection. Batch
//! calls use `MGET` and a pipelined `SET ... EX` so each is one round trip.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::{debug, info};

use crate::domain::ports::RemoteBackend;
use crate::error::{Error, Result};

const SCAN_COUNT: u64 = 500;

/// Redis-backed remote store
pub struct RedisBackend {
    client: redis::Client,
    url: String,
    conn: Mutex<Option<MultiplexedConnection>>,
}

impl RedisBackend {
    /// Create a client for `url` (no connection is made yet)
    pub fn new(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| Error::Config(format!("invalid redis url {}: {}", url, e)))?;
        Ok(Self {
            client,
            url: url.to_string(),
            conn: Mutex::new(None),
        })
    }

    fn conn(&self) -> Result<MultiplexedConnection> {
        self.conn
            .lock()
            .clone()
            .ok_or_else(|| Error::BackendUnavailable("redis not connected".into()))
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<String>> {
        let mut conn = self.conn()?;
        let pattern = format!("{}*", prefix);
        let mut cursor: u64 = 0;
        let mut found = Vec::new();

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await?;
            found.extend(keys);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl RemoteBackend for RedisBackend {
    fn name(&self) -> &str {
        "redis"
    }

    async fn connect(&self) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        *self.conn.lock() = Some(conn);
        info!(component = "remote", url = %self.url, "redis connected");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let mut conn = self.conn()?;
        let data: Option<Vec<u8>> = conn.get(key).await?;
        Ok(data.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl_secs: u64) -> Result<()> {
        let mut conn = self.conn()?;
        conn.set_ex::<_, _, ()>(key, value.as_ref(), ttl_secs.max(1))
            .await?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: Bytes, ttl_secs: u64) -> Result<bool> {
        let mut conn = self.conn()?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value.as_ref())
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs.max(1))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn()?;
        let deleted: i64 = conn.del(key).await?;
        Ok(deleted > 0)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Bytes>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn()?;
        let values: Vec<Option<Vec<u8>>> = redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut conn)
            .await?;
        Ok(values.into_iter().map(|v| v.map(Bytes::from)).collect())
    }

    async fn mset(&self, items: Vec<(String, Bytes, u64)>) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn()?;
        let mut pipe = redis::pipe();
        for (key, value, ttl_secs) in &items {
            pipe.cmd("SET")
                .arg(key)
                .arg(value.as_ref())
                .arg("EX")
                .arg((*ttl_secs).max(1))
                .ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;
        debug!(component = "remote", count = items.len(), "pipelined mset");
        Ok(())
    }

    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>> {
        self.scan(prefix).await
    }

    async fn flush(&self, prefix: &str) -> Result<u64> {
        let keys = self.scan(prefix).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn()?;
        let mut total = 0u64;
        for chunk in keys.chunks(SCAN_COUNT as usize) {
            let deleted: i64 = conn.del(chunk).await?;
            total += deleted.max(0) as u64;
        }
        Ok(total)
    }

    async fn close(&self) -> Result<()> {
        self.conn.lock().take();
        Ok(())
    }
}
