// File-backed session provider
// One file per session, sharded two levels deep by the first two id characters

use super::SessionProvider;
use crate::error::{SessionError, SessionResult};
use crate::session::codec;
use crate::session::store::{SessionRecord, SessionStore};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

struct FileInner {
    base_dir: PathBuf,
    max_lifetime: Duration,
    // Serializes every read-modify-write on the session tree
    lock: Mutex<()>,
}

impl FileInner {
    fn session_path(&self, id: &str) -> SessionResult<PathBuf> {
        validate_id(id)?;
        let mut chars = id.chars();
        let (first, second) = match (chars.next(), chars.next()) {
            (Some(a), Some(b)) => (a, b),
            _ => return Err(SessionError::InvalidId(id.to_string())),
        };

        Ok(self
            .base_dir
            .join(first.to_string())
            .join(second.to_string())
            .join(id))
    }
}

fn validate_id(id: &str) -> SessionResult<()> {
    if id.contains(['.', '/', '\\']) {
        return Err(SessionError::InvalidId(format!(
            "{} contains path characters",
            id
        )));
    }
    if id.chars().count() < 2 {
        return Err(SessionError::InvalidId(format!(
            "{} is shorter than 2 characters",
            id
        )));
    }
    Ok(())
}

async fn ensure_parent(path: &Path) -> SessionResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    Ok(())
}

async fn touch(path: &Path) -> SessionResult<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let file = std::fs::OpenOptions::new().write(true).open(&path)?;
        file.set_modified(SystemTime::now())
    })
    .await
    .map_err(|e| SessionError::Backend(format!("Touch task failed: {}", e)))??;
    Ok(())
}

/// Store handle for the file provider; release rewrites the session file
pub struct FileSessionStore {
    record: SessionRecord,
    inner: Arc<FileInner>,
}

#[async_trait]
impl SessionStore for FileSessionStore {
    fn record(&self) -> &SessionRecord {
        &self.record
    }

    async fn release(&self) {
        let id = self.record.id();
        let result = async {
            let bytes = codec::encode(&self.record.snapshot()?)?;
            let path = self.inner.session_path(&id)?;
            let _guard = self.inner.lock.lock().await;
            ensure_parent(&path).await?;
            fs::write(&path, bytes).await?;
            Ok::<(), SessionError>(())
        }
        .await;

        if let Err(e) = result {
            error!("Failed to persist file session {}: {}", id, e);
        }
    }
}

/// Session provider that keeps one encoded file per session under a base directory
pub struct FileProvider {
    inner: Arc<FileInner>,
}

impl FileProvider {
    /// Initialize the provider; `config` is the base directory
    pub async fn new(max_lifetime: Duration, config: &str) -> SessionResult<Self> {
        let base_dir = config.trim();
        if base_dir.is_empty() {
            return Err(SessionError::Config(
                "file provider requires a base directory".to_string(),
            ));
        }

        fs::create_dir_all(base_dir).await.map_err(|e| {
            SessionError::Config(format!(
                "Failed to create session directory '{}': {}",
                base_dir, e
            ))
        })?;

        Ok(Self {
            inner: Arc::new(FileInner {
                base_dir: PathBuf::from(base_dir),
                max_lifetime,
                lock: Mutex::new(()),
            }),
        })
    }

    fn store(&self, id: &str, values: crate::session::SessionValues) -> Arc<dyn SessionStore> {
        Arc::new(FileSessionStore {
            record: SessionRecord::with_values(id, values),
            inner: Arc::clone(&self.inner),
        })
    }

    /// Load the session file at `path`, creating it empty if missing.
    /// Caller holds the tree lock.
    async fn load_or_create(&self, path: &Path) -> SessionResult<crate::session::SessionValues> {
        ensure_parent(path).await?;

        let values = if fs::try_exists(path).await? {
            codec::decode(&fs::read(path).await?)?
        } else {
            fs::write(path, b"").await?;
            Default::default()
        };

        touch(path).await?;
        Ok(values)
    }

    /// Every session file with its modification time
    async fn session_files(&self) -> SessionResult<Vec<(PathBuf, SystemTime)>> {
        let mut files = Vec::new();
        let mut level1 = fs::read_dir(&self.inner.base_dir).await?;

        while let Some(shard1) = level1.next_entry().await? {
            if !shard1.file_type().await?.is_dir() {
                continue;
            }
            let mut level2 = fs::read_dir(shard1.path()).await?;
            while let Some(shard2) = level2.next_entry().await? {
                if !shard2.file_type().await?.is_dir() {
                    continue;
                }
                let mut entries = fs::read_dir(shard2.path()).await?;
                while let Some(entry) = entries.next_entry().await? {
                    let metadata = entry.metadata().await?;
                    if metadata.is_file() {
                        files.push((entry.path(), metadata.modified()?));
                    }
                }
            }
        }

        Ok(files)
    }
}

#[async_trait]
impl SessionProvider for FileProvider {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn create(
        &self,
        id: &str,
        lifetime: Option<Duration>,
    ) -> SessionResult<Arc<dyn SessionStore>> {
        let path = self.inner.session_path(id)?;
        if lifetime.is_some() {
            debug!("File provider ignores per-session lifetime for {}", id);
        }

        let _guard = self.inner.lock.lock().await;
        let values = self.load_or_create(&path).await?;
        Ok(self.store(id, values))
    }

    async fn read(&self, id: &str) -> SessionResult<Arc<dyn SessionStore>> {
        let path = self.inner.session_path(id)?;

        let _guard = self.inner.lock.lock().await;
        if !fs::try_exists(&path).await? {
            return Err(SessionError::NotFound(id.to_string()));
        }

        let values = codec::decode(&fs::read(&path).await?)?;
        touch(&path).await?;
        Ok(self.store(id, values))
    }

    async fn exists(&self, id: &str) -> bool {
        let Ok(path) = self.inner.session_path(id) else {
            return false;
        };

        let _guard = self.inner.lock.lock().await;
        fs::try_exists(&path).await.unwrap_or(false)
    }

    async fn regenerate(
        &self,
        old_id: &str,
        new_id: &str,
        lifetime: Option<Duration>,
    ) -> SessionResult<Arc<dyn SessionStore>> {
        let new_path = self.inner.session_path(new_id)?;
        let old_path = match self.inner.session_path(old_id) {
            Ok(path) => path,
            Err(_) => return self.create(new_id, lifetime).await,
        };

        let _guard = self.inner.lock.lock().await;

        if !fs::try_exists(&old_path).await? {
            let values = self.load_or_create(&new_path).await?;
            return Ok(self.store(new_id, values));
        }

        let bytes = fs::read(&old_path).await?;
        let values = codec::decode(&bytes)?;

        if old_path != new_path {
            ensure_parent(&new_path).await?;
            fs::write(&new_path, &bytes).await?;
            fs::remove_file(&old_path).await?;
        }
        touch(&new_path).await?;

        debug!("Regenerated file session {} -> {}", old_id, new_id);
        Ok(self.store(new_id, values))
    }

    async fn destroy(&self, id: &str) {
        let path = match self.inner.session_path(id) {
            Ok(path) => path,
            Err(e) => {
                warn!("Skipping destroy of {}: {}", id, e);
                return;
            }
        };

        let _guard = self.inner.lock.lock().await;
        match fs::remove_file(&path).await {
            Ok(()) => debug!("Destroyed file session {}", id),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove session file {}: {}", path.display(), e),
        }
    }

    async fn enumerate(&self) -> SessionResult<Vec<String>> {
        let files = self.session_files().await?;
        Ok(files
            .into_iter()
            .filter_map(|(path, _)| path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect())
    }

    async fn gc(&self) {
        let _guard = self.inner.lock.lock().await;

        let files = match self.session_files().await {
            Ok(files) => files,
            Err(e) => {
                error!("File session GC could not scan {}: {}", self.inner.base_dir.display(), e);
                return;
            }
        };

        let now = SystemTime::now();
        let mut removed = 0;
        for (path, modified) in files {
            let expired = modified
                .checked_add(self.inner.max_lifetime)
                .map(|deadline| deadline < now)
                .unwrap_or(false);
            if !expired {
                continue;
            }
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove expired session {}: {}", path.display(), e),
            }
        }

        if removed > 0 {
            debug!("Removed {} expired file sessions", removed);
        }
    }
}
