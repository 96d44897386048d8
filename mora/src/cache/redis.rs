//! Redis-backed response store

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::Mutex;

use super::key::CacheKey;
use super::ResponseStore;
use crate::{Error, Result};

/// Redis response store. Every call is bounded by `op_timeout`; the
/// multiplexed connection is opened lazily and dropped after a failure so the
/// next call reconnects.
pub struct RedisStore {
    client: redis::Client,
    prefix: String,
    op_timeout: Duration,
    conn: Mutex<Option<MultiplexedConnection>>,
}

impl RedisStore {
    pub fn new(url: &str, prefix: &str, op_timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            prefix: prefix.to_string(),
            op_timeout,
            conn: Mutex::new(None),
        })
    }

    fn make_key(&self, key: &CacheKey) -> String {
        format!("{}{}", self.prefix, key)
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self.client.get_multiplexed_async_connection().await?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    async fn reset(&self) {
        *self.conn.lock().await = None;
    }

    /// Run one operation under the per-call timeout.
    async fn bounded<T, F>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        let outcome = match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(res) => res,
            Err(_) => Err(Error::Timeout(self.op_timeout)),
        };
        if outcome.is_err() {
            self.reset().await;
        }
        outcome
    }

    /// Reachability check used when choosing the cache mode at startup
    pub async fn ping(&self, budget: Duration) -> Result<()> {
        let ping = async {
            let mut conn = self.connection().await?;
            let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
            tracing::debug!(reply = %pong, "Redis PING");
            Ok(())
        };
        match tokio::time::timeout(budget, ping).await {
            Ok(res) => {
                if res.is_err() {
                    self.reset().await;
                }
                res
            }
            Err(_) => {
                self.reset().await;
                Err(Error::Timeout(budget))
            }
        }
    }
}

#[async_trait]
impl ResponseStore for RedisStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>> {
        let redis_key = self.make_key(key);
        self.bounded(async {
            let mut conn = self.connection().await?;
            let value: Option<String> = conn.get(&redis_key).await?;
            Ok(value)
        })
        .await
    }

    async fn set(&self, key: &CacheKey, value: &str, ttl: Duration) -> Result<()> {
        let redis_key = self.make_key(key);
        let secs = ttl.as_secs().max(1);
        self.bounded(async {
            let mut conn = self.connection().await?;
            conn.set_ex::<_, _, ()>(&redis_key, value, secs).await?;
            Ok(())
        })
        .await
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
