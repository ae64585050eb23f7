//! Redis lease store using a bb8 connection pool.

use std::time::Duration;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisError, Script};

use crate::lease::{LeaseError, LeaseStore};
use crate::config::settings::RedisLeaseConfig;

type RedisPool = Pool<Client>;

/// Deletes the key only when it still carries the caller's token.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Lease store shared by every worker process that talks to the same Redis.
pub struct RedisLeaseStore {
    pool: RedisPool,
    key_prefix: String,
    release_script: Script,
}

impl RedisLeaseStore {
    pub async fn new(config: &RedisLeaseConfig) -> Result<Self, LeaseError> {
        let client =
            Client::open(config.url.as_str()).map_err(|e| LeaseError::Connection(e.to_string()))?;

        let pool = Pool::builder()
            .max_size(config.pool_size)
            .connection_timeout(Duration::from_secs(config.connection_timeout))
            .build(client)
            .await
            .map_err(|e| LeaseError::Connection(e.to_string()))?;

        Ok(Self {
            pool,
            key_prefix: format!("{}:lease", config.key_prefix),
            release_script: Script::new(RELEASE_SCRIPT),
        })
    }

    fn prefixed_key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }

    async fn get_conn(&self) -> Result<PooledConnection<'_, Client>, LeaseError> {
        self.pool
            .get()
            .await
            .map_err(|e| LeaseError::Connection(e.to_string()))
    }
}

#[async_trait]
impl LeaseStore for RedisLeaseStore {
    async fn try_obtain(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, LeaseError> {
        let mut conn: PooledConnection<'_, Client> = self.get_conn().await?;
        let prefixed = self.prefixed_key(key);
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);

        let conn_ref: &mut MultiplexedConnection = &mut conn;
        let reply: Option<String> = redis::cmd("SET")
            .arg(&prefixed)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(conn_ref)
            .await
            .map_err(|e: RedisError| LeaseError::Operation(e.to_string()))?;

        Ok(reply.is_some())
    }

    async fn release(&self, key: &str, token: &str) -> Result<bool, LeaseError> {
        let mut conn: PooledConnection<'_, Client> = self.get_conn().await?;
        let prefixed = self.prefixed_key(key);

        let conn_ref: &mut MultiplexedConnection = &mut conn;
        let deleted: i64 = self
            .release_script
            .key(&prefixed)
            .arg(token)
            .invoke_async(conn_ref)
            .await
            .map_err(|e: RedisError| LeaseError::Operation(e.to_string()))?;

        Ok(deleted == 1)
    }

    async fn holder(&self, key: &str) -> Result<Option<String>, LeaseError> {
        let mut conn: PooledConnection<'_, Client> = self.get_conn().await?;
        let prefixed = self.prefixed_key(key);

        let conn_ref: &mut MultiplexedConnection = &mut conn;
        conn_ref
            .get(&prefixed)
            .await
            .map_err(|e: RedisError| LeaseError::Operation(e.to_string()))
    }
}
