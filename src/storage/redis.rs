// Redis-backed session provider
// Records carry a native expiry, so GC is left to Redis

use super::SessionProvider;
use crate::error::{SessionError, SessionResult};
use crate::session::codec;
use crate::session::store::{SessionRecord, SessionStore};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

pub const DEFAULT_POOL_SIZE: usize = 100;

/// Parsed `host:port,poolSize,password,dbIndex,idleTimeoutSeconds` config
#[derive(Debug, Clone, PartialEq)]
pub struct RedisConfig {
    pub address: String,
    pub pool_size: usize,
    pub password: Option<String>,
    pub db_index: i64,
    pub idle_timeout: Option<Duration>,
}

impl RedisConfig {
    /// Parse the comma separated config. Only the address is required;
    /// unparseable optional fields fall back to their defaults.
    pub fn parse(config: &str) -> SessionResult<Self> {
        let mut parts = config.split(',').map(str::trim);

        let address = parts.next().unwrap_or_default().to_string();
        if address.is_empty() {
            return Err(SessionError::Config(
                "remote-cache provider requires host:port".to_string(),
            ));
        }

        let pool_size = parts
            .next()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_POOL_SIZE);

        let password = parts
            .next()
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());

        let db_index = parts
            .next()
            .and_then(|s| s.parse::<i64>().ok())
            .filter(|i| *i >= 0)
            .unwrap_or(0);

        let idle_timeout = parts
            .next()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Ok(Self {
            address,
            pool_size,
            password,
            db_index,
            idle_timeout,
        })
    }

    pub fn url(&self) -> String {
        let auth = match &self.password {
            Some(password) => format!(":{}@", urlencoding::encode(password)),
            None => String::new(),
        };
        format!("redis://{}{}/{}", auth, self.address, self.db_index)
    }
}

fn ttl_secs(lifetime: Duration) -> u64 {
    lifetime.as_secs().max(1)
}

/// Store handle for the Redis provider; release writes the record with SETEX
pub struct RedisSessionStore {
    record: SessionRecord,
    conn: MultiplexedConnection,
    lifetime: Duration,
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    fn record(&self) -> &SessionRecord {
        &self.record
    }

    async fn release(&self) {
        let id = self.record.id();
        let result = async {
            let bytes = codec::encode(&self.record.snapshot()?)?;
            let mut conn = self.conn.clone();
            let _: () = conn.set_ex(&id, bytes, ttl_secs(self.lifetime)).await?;
            Ok::<(), SessionError>(())
        }
        .await;

        if let Err(e) = result {
            error!("Failed to persist Redis session {}: {}", id, e);
        }
    }
}

/// Session provider backed by a Redis server
pub struct RedisProvider {
    conn: MultiplexedConnection,
    max_lifetime: Duration,
}

impl RedisProvider {
    pub async fn connect(max_lifetime: Duration, config: &str) -> SessionResult<Self> {
        let parsed = RedisConfig::parse(config)?;

        let client = redis::Client::open(parsed.url())
            .map_err(|e| SessionError::Config(format!("Invalid Redis config: {}", e)))?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| SessionError::Config(format!("Failed to connect to Redis: {}", e)))?;

        debug!(
            "Connected to Redis at {} (db {}, pool size {}, idle timeout {:?})",
            parsed.address, parsed.db_index, parsed.pool_size, parsed.idle_timeout
        );

        Ok(Self { conn, max_lifetime })
    }

    fn store(
        &self,
        id: &str,
        values: crate::session::SessionValues,
        lifetime: Duration,
    ) -> Arc<dyn SessionStore> {
        Arc::new(RedisSessionStore {
            record: SessionRecord::with_values(id, values),
            conn: self.conn.clone(),
            lifetime,
        })
    }

    async fn fetch(&self, id: &str) -> SessionResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let data: Option<Vec<u8>> = conn.get(id).await?;
        Ok(data)
    }
}

#[async_trait]
impl SessionProvider for RedisProvider {
    fn name(&self) -> &'static str {
        "remote-cache"
    }

    async fn create(
        &self,
        id: &str,
        lifetime: Option<Duration>,
    ) -> SessionResult<Arc<dyn SessionStore>> {
        let lifetime = lifetime.unwrap_or(self.max_lifetime);
        let values = match self.fetch(id).await? {
            Some(data) => codec::decode(&data)?,
            None => Default::default(),
        };
        Ok(self.store(id, values, lifetime))
    }

    async fn read(&self, id: &str) -> SessionResult<Arc<dyn SessionStore>> {
        match self.fetch(id).await? {
            Some(data) => Ok(self.store(id, codec::decode(&data)?, self.max_lifetime)),
            None => Err(SessionError::NotFound(id.to_string())),
        }
    }

    async fn exists(&self, id: &str) -> bool {
        let mut conn = self.conn.clone();
        match conn.exists::<_, bool>(id).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Failed to look up Redis session {}: {}", id, e);
                false
            }
        }
    }

    async fn regenerate(
        &self,
        old_id: &str,
        new_id: &str,
        lifetime: Option<Duration>,
    ) -> SessionResult<Arc<dyn SessionStore>> {
        let lifetime = lifetime.unwrap_or(self.max_lifetime);
        let mut conn = self.conn.clone();

        if !conn.exists::<_, bool>(old_id).await? {
            return self.create(new_id, Some(lifetime)).await;
        }

        if old_id != new_id {
            let _: () = conn.rename(old_id, new_id).await?;
        }
        let _: () = conn.expire(new_id, ttl_secs(lifetime) as i64).await?;

        let values = match self.fetch(new_id).await? {
            Some(data) => codec::decode(&data)?,
            None => Default::default(),
        };

        debug!("Regenerated Redis session {} -> {}", old_id, new_id);
        Ok(self.store(new_id, values, lifetime))
    }

    async fn destroy(&self, id: &str) {
        let mut conn = self.conn.clone();
        if let Err(e) = conn.del::<_, ()>(id).await {
            warn!("Failed to destroy Redis session {}: {}", id, e);
        }
    }

    async fn enumerate(&self) -> SessionResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut iter = conn.scan::<String>().await?;

        let mut ids = Vec::new();
        while let Some(id) = iter.next_item().await {
            ids.push(id);
        }
        Ok(ids)
    }

    async fn gc(&self) {}
}
