// Session provider abstraction
// Provides pluggable storage backends for session records

pub mod file;
pub mod memory;
pub mod postgres;
pub mod recency;
pub mod redis;

use crate::error::{SessionError, SessionResult};
use crate::session::store::SessionStore;
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub use file::FileProvider;
pub use memory::MemoryProvider;
pub use postgres::PostgresProvider;
pub use redis::RedisProvider;

/// Lifecycle contract every session backend satisfies.
///
/// A lifetime of `None` means "use the provider's configured max lifetime".
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Backend name, as used in configuration
    fn name(&self) -> &'static str;

    /// Return the record for `id`, creating an empty one if absent.
    /// Calling this for an id that already exists returns the existing record.
    async fn create(
        &self,
        id: &str,
        lifetime: Option<Duration>,
    ) -> SessionResult<Arc<dyn SessionStore>>;

    /// Return the record for `id`, or `SessionError::NotFound`
    async fn read(&self, id: &str) -> SessionResult<Arc<dyn SessionStore>>;

    /// Pure lookup, never refreshes the record
    async fn exists(&self, id: &str) -> bool;

    /// Move the record at `old_id` to `new_id`, keeping its values.
    /// Behaves like `create(new_id, lifetime)` when `old_id` is absent.
    async fn regenerate(
        &self,
        old_id: &str,
        new_id: &str,
        lifetime: Option<Duration>,
    ) -> SessionResult<Arc<dyn SessionStore>>;

    /// Remove the record. Idempotent; failures are logged.
    async fn destroy(&self, id: &str);

    /// Best-effort snapshot of resident session ids
    async fn enumerate(&self) -> SessionResult<Vec<String>>;

    /// Evict expired records. Failures are logged.
    async fn gc(&self);
}

/// Available provider backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum ProviderKind {
    #[default]
    Memory,
    File,
    Sql,
    RemoteCache,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Memory => "memory",
            ProviderKind::File => "file",
            ProviderKind::Sql => "sql",
            ProviderKind::RemoteCache => "remote-cache",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(ProviderKind::Memory),
            "file" => Ok(ProviderKind::File),
            "sql" => Ok(ProviderKind::Sql),
            "remote-cache" => Ok(ProviderKind::RemoteCache),
            other => Err(SessionError::Config(format!("unknown provider {}", other))),
        }
    }
}

impl TryFrom<String> for ProviderKind {
    type Error = SessionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Factory that builds and initializes a provider for the given backend
pub async fn create_provider(
    kind: ProviderKind,
    max_lifetime: Duration,
    config: &str,
) -> SessionResult<Arc<dyn SessionProvider>> {
    let provider: Arc<dyn SessionProvider> = match kind {
        ProviderKind::Memory => Arc::new(MemoryProvider::new(max_lifetime)),
        ProviderKind::File => Arc::new(FileProvider::new(max_lifetime, config).await?),
        ProviderKind::Sql => Arc::new(PostgresProvider::connect(max_lifetime, config).await?),
        ProviderKind::RemoteCache => {
            Arc::new(RedisProvider::connect(max_lifetime, config).await?)
        }
    };

    tracing::info!(
        "Initialized {} session provider (max lifetime {}s)",
        provider.name(),
        max_lifetime.as_secs()
    );

    Ok(provider)
}
