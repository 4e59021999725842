// Session store handles
// A store is a handle to one session's value mapping, returned by a provider

use super::types::{SessionValue, SessionValues};
use crate::error::{SessionError, SessionResult};
use async_trait::async_trait;
use std::sync::RwLock;

/// In-memory state of one session record: its id and value mapping,
/// each behind its own lock so value traffic never waits on a relabel.
#[derive(Debug)]
pub struct SessionRecord {
    id: RwLock<String>,
    values: RwLock<SessionValues>,
}

impl SessionRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_values(id, SessionValues::new())
    }

    pub fn with_values(id: impl Into<String>, values: SessionValues) -> Self {
        Self {
            id: RwLock::new(id.into()),
            values: RwLock::new(values),
        }
    }

    pub fn id(&self) -> String {
        match self.id.read() {
            Ok(id) => id.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Relabel the record in place (used by regenerate)
    pub(crate) fn set_id(&self, id: &str) {
        let mut guard = match self.id.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = id.to_string();
    }

    pub fn set(&self, key: &str, value: SessionValue) -> SessionResult<()> {
        let mut values = self.values.write().map_err(SessionError::poisoned)?;
        values.insert(key.to_string(), value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> SessionResult<Option<SessionValue>> {
        let values = self.values.read().map_err(SessionError::poisoned)?;
        Ok(values.get(key).cloned())
    }

    pub fn delete(&self, key: &str) -> SessionResult<()> {
        let mut values = self.values.write().map_err(SessionError::poisoned)?;
        values.remove(key);
        Ok(())
    }

    pub fn flush(&self) -> SessionResult<()> {
        let mut values = self.values.write().map_err(SessionError::poisoned)?;
        values.clear();
        Ok(())
    }

    pub fn snapshot(&self) -> SessionResult<SessionValues> {
        let values = self.values.read().map_err(SessionError::poisoned)?;
        Ok(values.clone())
    }
}

/// Handle to one session, as seen by request-handling code.
///
/// Mutations only touch the in-memory mapping. Call [`SessionStore::release`]
/// once per request that wrote to the store to persist the mapping to the
/// backing provider; read-only usage does not need it.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The record state behind this handle
    fn record(&self) -> &SessionRecord;

    /// Persist the value mapping. Failures are logged, never returned.
    async fn release(&self);

    fn session_id(&self) -> String {
        self.record().id()
    }

    fn set(&self, key: &str, value: SessionValue) -> SessionResult<()> {
        self.record().set(key, value)
    }

    fn get(&self, key: &str) -> SessionResult<Option<SessionValue>> {
        self.record().get(key)
    }

    fn delete(&self, key: &str) -> SessionResult<()> {
        self.record().delete(key)
    }

    /// Remove every key
    fn flush(&self) -> SessionResult<()> {
        self.record().flush()
    }

    /// Copy of the current value mapping
    fn values(&self) -> SessionResult<SessionValues> {
        self.record().snapshot()
    }
}
