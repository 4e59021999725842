// PostgreSQL session provider
// Uses sqlx for async database operations

use super::SessionProvider;
use crate::error::{SessionError, SessionResult};
use crate::session::codec;
use crate::session::store::{SessionRecord, SessionStore};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS session (
    session_key VARCHAR(128) NOT NULL PRIMARY KEY,
    session_data BYTEA,
    session_expiry BIGINT NOT NULL
)";

fn expiry_from_now(lifetime: Duration) -> i64 {
    let secs = i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX);
    Utc::now().timestamp().saturating_add(secs)
}

/// Store handle for the PostgreSQL provider
pub struct PostgresSessionStore {
    record: SessionRecord,
    pool: PgPool,
    lifetime: Duration,
}

#[async_trait]
impl SessionStore for PostgresSessionStore {
    fn record(&self) -> &SessionRecord {
        &self.record
    }

    async fn release(&self) {
        let id = self.record.id();
        let result = async {
            let bytes = codec::encode(&self.record.snapshot()?)?;
            sqlx::query(
                "INSERT INTO session (session_key, session_data, session_expiry) \
                 VALUES ($1, $2, $3) \
                 ON CONFLICT (session_key) DO UPDATE \
                 SET session_data = EXCLUDED.session_data, session_expiry = EXCLUDED.session_expiry",
            )
            .bind(&id)
            .bind(bytes)
            .bind(expiry_from_now(self.lifetime))
            .execute(&self.pool)
            .await?;
            Ok::<(), SessionError>(())
        }
        .await;

        if let Err(e) = result {
            error!("Failed to persist database session {}: {}", id, e);
        }
    }
}

/// Session provider storing one row per session in PostgreSQL
pub struct PostgresProvider {
    pool: PgPool,
    max_lifetime: Duration,
}

impl PostgresProvider {
    /// Connect with `config` as the connection string and create the table if needed
    pub async fn connect(max_lifetime: Duration, config: &str) -> SessionResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(config)
            .await
            .map_err(|e| SessionError::Config(format!("Failed to connect to database: {}", e)))?;

        sqlx::query(CREATE_TABLE)
            .execute(&pool)
            .await
            .map_err(|e| SessionError::Config(format!("Failed to create session table: {}", e)))?;

        Ok(Self { pool, max_lifetime })
    }

    fn store(
        &self,
        id: &str,
        values: crate::session::SessionValues,
        lifetime: Duration,
    ) -> Arc<dyn SessionStore> {
        Arc::new(PostgresSessionStore {
            record: SessionRecord::with_values(id, values),
            pool: self.pool.clone(),
            lifetime,
        })
    }

    async fn fetch(&self, id: &str) -> SessionResult<Option<Vec<u8>>> {
        let row: Option<(Option<Vec<u8>>,)> =
            sqlx::query_as("SELECT session_data FROM session WHERE session_key = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(data,)| data.unwrap_or_default()))
    }

    async fn insert_empty(&self, id: &str, lifetime: Duration) -> SessionResult<()> {
        sqlx::query(
            "INSERT INTO session (session_key, session_data, session_expiry) VALUES ($1, $2, $3) \
             ON CONFLICT (session_key) DO NOTHING",
        )
        .bind(id)
        .bind(Vec::<u8>::new())
        .bind(expiry_from_now(lifetime))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SessionProvider for PostgresProvider {
    fn name(&self) -> &'static str {
        "sql"
    }

    async fn create(
        &self,
        id: &str,
        lifetime: Option<Duration>,
    ) -> SessionResult<Arc<dyn SessionStore>> {
        let lifetime = lifetime.unwrap_or(self.max_lifetime);

        let values = match self.fetch(id).await? {
            Some(data) => codec::decode(&data)?,
            None => {
                self.insert_empty(id, lifetime).await?;
                Default::default()
            }
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
        match self.fetch(id).await {
            Ok(row) => row.is_some(),
            Err(e) => {
                warn!("Failed to look up database session {}: {}", id, e);
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

        let Some(data) = self.fetch(old_id).await? else {
            return self.create(new_id, Some(lifetime)).await;
        };
        let values = codec::decode(&data)?;

        if old_id != new_id {
            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM session WHERE session_key = $1")
                .bind(new_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "UPDATE session SET session_key = $1, session_expiry = $2 WHERE session_key = $3",
            )
            .bind(new_id)
            .bind(expiry_from_now(lifetime))
            .bind(old_id)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
        }

        debug!("Regenerated database session {} -> {}", old_id, new_id);
        Ok(self.store(new_id, values, lifetime))
    }

    async fn destroy(&self, id: &str) {
        if let Err(e) = sqlx::query("DELETE FROM session WHERE session_key = $1")
            .bind(id)
            .execute(&self.pool)
            .await
        {
            warn!("Failed to destroy database session {}: {}", id, e);
        }
    }

    async fn enumerate(&self) -> SessionResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT session_key FROM session")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn gc(&self) {
        match sqlx::query("DELETE FROM session WHERE session_expiry < $1")
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await
        {
            Ok(result) if result.rows_affected() > 0 => {
                debug!("Removed {} expired database sessions", result.rows_affected())
            }
            Ok(_) => {}
            Err(e) => error!("Database session GC failed: {}", e),
        }
    }
}
