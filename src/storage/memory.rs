// In-memory session provider
// Records live in a recency-ordered index guarded by one structural lock;
// each record's value mapping carries its own lock

use super::SessionProvider;
use super::recency::RecencyList;
use crate::error::{SessionError, SessionResult};
use crate::session::store::{SessionRecord, SessionStore};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Index entry for one resident session
#[derive(Debug)]
struct MemoryEntry {
    record: Arc<SessionRecord>,
    last_access: Instant,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant, lifetime: Duration) -> bool {
        match self.last_access.checked_add(lifetime) {
            Some(deadline) => deadline < now,
            None => false,
        }
    }
}

/// Store handle for the memory provider.
/// Shares the record with the index; eviction only drops the index entry.
pub struct MemorySessionStore {
    record: Arc<SessionRecord>,
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    fn record(&self) -> &SessionRecord {
        &self.record
    }

    async fn release(&self) {}
}

/// In-memory session provider with LRU-ordered expiry.
///
/// Every record lives for the provider's max lifetime; per-call lifetime
/// overrides are ignored so recency order stays expiry order.
pub struct MemoryProvider {
    sessions: Mutex<RecencyList<MemoryEntry>>,
    max_lifetime: Duration,
}

impl MemoryProvider {
    pub fn new(max_lifetime: Duration) -> Self {
        Self {
            sessions: Mutex::new(RecencyList::new()),
            max_lifetime,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sessions(&self) -> SessionResult<MutexGuard<'_, RecencyList<MemoryEntry>>> {
        self.sessions.lock().map_err(SessionError::poisoned)
    }

    fn handle(record: &Arc<SessionRecord>) -> Arc<dyn SessionStore> {
        Arc::new(MemorySessionStore {
            record: Arc::clone(record),
        })
    }

    fn insert_new(&self, sessions: &mut RecencyList<MemoryEntry>, id: &str) -> Arc<dyn SessionStore> {
        let record = Arc::new(SessionRecord::new(id));
        sessions.push_front(
            id.to_string(),
            MemoryEntry {
                record: Arc::clone(&record),
                last_access: Instant::now(),
            },
        );
        debug!("Created memory session {}", id);
        Self::handle(&record)
    }

    /// Evict every record that expired before `now`, walking from the
    /// least recent end and stopping at the first live record.
    fn gc_at(&self, now: Instant) -> SessionResult<usize> {
        let mut sessions = self.sessions()?;
        let mut evicted = 0;

        while let Some((_, entry)) = sessions.back() {
            if !entry.is_expired(now, self.max_lifetime) {
                break;
            }
            sessions.pop_back();
            evicted += 1;
        }

        Ok(evicted)
    }
}

#[async_trait]
impl SessionProvider for MemoryProvider {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn create(
        &self,
        id: &str,
        _lifetime: Option<Duration>,
    ) -> SessionResult<Arc<dyn SessionStore>> {
        let mut sessions = self.sessions()?;

        if let Some(entry) = sessions.touch(id) {
            entry.last_access = Instant::now();
            return Ok(Self::handle(&entry.record));
        }

        Ok(self.insert_new(&mut sessions, id))
    }

    async fn read(&self, id: &str) -> SessionResult<Arc<dyn SessionStore>> {
        let mut sessions = self.sessions()?;

        match sessions.touch(id) {
            Some(entry) => {
                entry.last_access = Instant::now();
                Ok(Self::handle(&entry.record))
            }
            None => Err(SessionError::NotFound(id.to_string())),
        }
    }

    async fn exists(&self, id: &str) -> bool {
        match self.sessions() {
            Ok(sessions) => sessions.contains(id),
            Err(e) => {
                warn!("Failed to look up session {}: {}", id, e);
                false
            }
        }
    }

    async fn regenerate(
        &self,
        old_id: &str,
        new_id: &str,
        _lifetime: Option<Duration>,
    ) -> SessionResult<Arc<dyn SessionStore>> {
        let mut sessions = self.sessions()?;

        if sessions.rename(old_id, new_id) {
            if let Some(entry) = sessions.get_mut(new_id) {
                entry.record.set_id(new_id);
                debug!("Regenerated memory session {} -> {}", old_id, new_id);
                return Ok(Self::handle(&entry.record));
            }
        }

        Ok(self.insert_new(&mut sessions, new_id))
    }

    async fn destroy(&self, id: &str) {
        match self.sessions() {
            Ok(mut sessions) => {
                if sessions.remove(id).is_some() {
                    debug!("Destroyed memory session {}", id);
                }
            }
            Err(e) => warn!("Failed to destroy session {}: {}", id, e),
        }
    }

    async fn enumerate(&self) -> SessionResult<Vec<String>> {
        Ok(self.sessions()?.keys())
    }

    async fn gc(&self) {
        match self.gc_at(Instant::now()) {
            Ok(0) => {}
            Ok(count) => debug!("Evicted {} expired memory sessions", count),
            Err(e) => warn!("Memory session GC failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::SessionValue;

    fn provider() -> MemoryProvider {
        MemoryProvider::new(Duration::from_secs(60))
    }

    fn last_access(provider: &MemoryProvider, id: &str) -> Instant {
        provider.sessions().unwrap().get(id).unwrap().last_access
    }

    fn pause() {
        std::thread::sleep(Duration::from_millis(5));
    }

    #[tokio::test]
    async fn test_create_then_read_shares_values() {
        let provider = provider();
        let store = provider.create("a", None).await.unwrap();
        store.set("k", SessionValue::from("v")).unwrap();

        let read = provider.read("a").await.unwrap();
        assert_eq!(read.session_id(), "a");
        assert_eq!(read.values().unwrap(), store.values().unwrap());
    }

    #[tokio::test]
    async fn test_create_existing_returns_same_record() {
        let provider = provider();
        let first = provider.create("a", None).await.unwrap();
        first.set("n", 1.into()).unwrap();

        let second = provider.create("a", None).await.unwrap();
        assert_eq!(second.get("n").unwrap(), Some(SessionValue::Int(1)));
        assert_eq!(provider.len(), 1);
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let provider = provider();
        let err = provider.read("ghost").await.err().unwrap();
        assert!(err.is_not_found());
        assert!(provider.is_empty());
    }

    #[tokio::test]
    async fn test_exists_does_not_touch_recency() {
        let provider = provider();
        provider.create("a", None).await.unwrap();
        provider.create("b", None).await.unwrap();

        assert!(provider.exists("a").await);
        assert!(!provider.exists("c").await);

        let order = provider.sessions().unwrap().keys_by_recency();
        assert_eq!(order, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_gc_evicts_only_least_recent_expired() {
        let provider = provider();
        provider.create("a", None).await.unwrap();
        pause();
        provider.create("b", None).await.unwrap();
        pause();
        provider.create("c", None).await.unwrap();
        pause();
        provider.read("a").await.unwrap();

        // Window that has passed for b but not yet for c
        let now = last_access(&provider, "c") + Duration::from_secs(60);
        assert_eq!(provider.gc_at(now).unwrap(), 1);

        assert!(provider.exists("a").await);
        assert!(!provider.exists("b").await);
        assert!(provider.exists("c").await);
    }

    #[tokio::test]
    async fn test_gc_is_idempotent() {
        let provider = MemoryProvider::new(Duration::from_secs(1));
        provider.create("a", None).await.unwrap();
        provider.create("b", None).await.unwrap();

        let now = Instant::now() + Duration::from_secs(5);
        assert_eq!(provider.gc_at(now).unwrap(), 2);
        assert_eq!(provider.gc_at(now).unwrap(), 0);
        assert!(provider.is_empty());
    }

    #[tokio::test]
    async fn test_gc_keeps_live_records() {
        let provider = provider();
        provider.create("a", None).await.unwrap();
        provider.gc().await;
        assert!(provider.exists("a").await);
    }

    #[tokio::test]
    async fn test_regenerate_preserves_values() {
        let provider = provider();
        let store = provider.create("a", None).await.unwrap();
        store.set("k", SessionValue::from("v")).unwrap();

        let regenerated = provider.regenerate("a", "b", None).await.unwrap();
        assert_eq!(regenerated.session_id(), "b");
        assert_eq!(store.session_id(), "b");

        let read = provider.read("b").await.unwrap();
        assert_eq!(read.get("k").unwrap(), Some(SessionValue::from("v")));
        assert!(!provider.exists("a").await);
    }

    #[tokio::test]
    async fn test_regenerate_keeps_recency_position() {
        let provider = provider();
        provider.create("a", None).await.unwrap();
        provider.create("b", None).await.unwrap();

        provider.regenerate("a", "z", None).await.unwrap();
        let order = provider.sessions().unwrap().keys_by_recency();
        assert_eq!(order, vec!["b", "z"]);
    }

    #[tokio::test]
    async fn test_regenerate_missing_source_creates_empty() {
        let provider = provider();
        let store = provider.regenerate("nonexistent", "b", None).await.unwrap();

        assert_eq!(store.session_id(), "b");
        assert!(store.values().unwrap().is_empty());
        assert!(provider.exists("b").await);
        assert!(!provider.exists("nonexistent").await);
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let provider = provider();
        provider.create("a", None).await.unwrap();

        provider.destroy("a").await;
        provider.destroy("a").await;
        assert!(!provider.exists("a").await);
    }

    #[tokio::test]
    async fn test_handle_survives_eviction() {
        let provider = provider();
        let store = provider.create("a", None).await.unwrap();
        provider.destroy("a").await;

        store.set("k", 1.into()).unwrap();
        store.release().await;
        assert!(!provider.exists("a").await);
    }

    #[tokio::test]
    async fn test_long_override_does_not_shield_expired_records() {
        let provider = provider();
        provider
            .create("token", Some(Duration::from_secs(86_400)))
            .await
            .unwrap();
        for i in 0..100 {
            provider.create(&format!("s{}", i), None).await.unwrap();
        }

        let now = Instant::now() + Duration::from_secs(3600);
        assert_eq!(provider.gc_at(now).unwrap(), 101);
        assert!(provider.is_empty());
    }

    #[tokio::test]
    async fn test_short_override_expires_with_its_neighbours() {
        let provider = MemoryProvider::new(Duration::from_secs(3600));
        provider.create("web", None).await.unwrap();
        provider
            .create("token", Some(Duration::from_secs(5)))
            .await
            .unwrap();

        // Override ignored: the token lives as long as the default record
        let soon = Instant::now() + Duration::from_secs(60);
        assert_eq!(provider.gc_at(soon).unwrap(), 0);
        assert!(provider.exists("web").await);
        assert!(provider.exists("token").await);

        let later = Instant::now() + Duration::from_secs(3601);
        assert_eq!(provider.gc_at(later).unwrap(), 2);
        assert!(!provider.exists("token").await);
    }

    #[tokio::test]
    async fn test_enumerate_lists_resident_ids() {
        let provider = provider();
        provider.create("a", None).await.unwrap();
        provider.create("b", None).await.unwrap();

        let mut ids = provider.enumerate().await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_create_yields_single_record() {
        let provider = Arc::new(provider());

        let mut handles = Vec::new();
        for i in 0..16i64 {
            let provider = Arc::clone(&provider);
            handles.push(tokio::spawn(async move {
                let store = provider.create("shared", None).await.unwrap();
                store.set(&format!("k{}", i), i.into()).unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(provider.len(), 1);
        let store = provider.read("shared").await.unwrap();
        assert_eq!(store.values().unwrap().len(), 16);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sets_on_different_ids() {
        let provider = Arc::new(provider());

        let mut handles = Vec::new();
        for i in 0..8 {
            let provider = Arc::clone(&provider);
            handles.push(tokio::spawn(async move {
                let id = format!("session-{}", i);
                let store = provider.create(&id, None).await.unwrap();
                for n in 0..100 {
                    store.set("counter", SessionValue::Int(n)).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for i in 0..8 {
            let store = provider.read(&format!("session-{}", i)).await.unwrap();
            assert_eq!(store.get("counter").unwrap(), Some(SessionValue::Int(99)));
        }
    }
}
