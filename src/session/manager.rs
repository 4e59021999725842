// Session manager for high-level session operations

use super::store::SessionStore;
use super::transport;
use super::types::SessionValue;
use crate::config::ManagerConfig;
use crate::error::{SessionError, SessionResult};
use crate::storage::{SessionProvider, create_provider};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use rand::RngCore;
use rand::rngs::OsRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

/// Key under which a principal's token is kept in the secondary provider
pub const TOKEN_KEY: &str = "token";

/// Session manager: issues ids, binds them to the transport and drives GC
pub struct SessionManager {
    provider: Arc<dyn SessionProvider>,
    secondary: Option<Arc<dyn SessionProvider>>,
    config: ManagerConfig,
}

impl SessionManager {
    /// Build the configured provider(s) and a manager over them
    pub async fn new(config: ManagerConfig) -> SessionResult<Self> {
        let config = config.normalized()?;

        let provider =
            create_provider(config.provider, config.max_lifetime(), &config.provider_config)
                .await?;

        let secondary = match config.provider_config_secondary.as_deref() {
            Some(secondary_config) if !secondary_config.is_empty() => Some(
                create_provider(config.provider, config.max_lifetime(), secondary_config).await?,
            ),
            _ => None,
        };

        Ok(Self {
            provider,
            secondary,
            config,
        })
    }

    /// Manager over already constructed providers
    pub fn with_providers(
        config: ManagerConfig,
        provider: Arc<dyn SessionProvider>,
        secondary: Option<Arc<dyn SessionProvider>>,
    ) -> SessionResult<Self> {
        Ok(Self {
            provider,
            secondary,
            config: config.normalized()?,
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn SessionProvider> {
        &self.provider
    }

    /// Generate a fresh id: prefix + hex of N bytes from the OS random source.
    /// Never falls back to a weaker source.
    pub fn generate_session_id(&self) -> SessionResult<String> {
        let mut bytes = vec![0u8; self.config.session_id_length];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| SessionError::Entropy(e.to_string()))?;

        Ok(format!("{}{}", self.config.session_id_prefix, hex::encode(bytes)))
    }

    /// Resolve the request's session, or start a new one and bind its id
    /// to the response
    pub async fn start(
        &self,
        parts: &mut Parts,
        response: &mut HeaderMap,
    ) -> SessionResult<Arc<dyn SessionStore>> {
        let candidate = transport::extract_session_id(&self.config, parts)?;

        if let Some(id) = candidate.as_deref()
            && self.provider.exists(id).await
        {
            match self.provider.read(id).await {
                Ok(store) => return Ok(store),
                // Evicted between the lookup and the read
                Err(e) if e.is_not_found() => debug!("Session {} vanished during start", id),
                Err(e) => return Err(e),
            }
        }

        let id = self.generate_session_id()?;
        let store = self.provider.create(&id, None).await?;
        transport::bind_session_id(&self.config, &id, parts, response)?;

        debug!("Started session {}", id);
        Ok(store)
    }

    /// Destroy the request's session and clear the client's copy of the id.
    /// A request without an id is a no-op.
    pub async fn destroy(&self, parts: &mut Parts, response: &mut HeaderMap) {
        let id = transport::extract_session_id(&self.config, parts);
        transport::clear_header(&self.config, parts, response);

        let id = match id {
            Ok(Some(id)) => id,
            Ok(None) => return,
            Err(e) => {
                warn!("Ignoring unreadable session id on destroy: {}", e);
                return;
            }
        };

        self.provider.destroy(&id).await;
        if let Err(e) = transport::expire_cookie(&self.config, response) {
            warn!("Failed to expire session cookie: {}", e);
        }

        debug!("Destroyed session {}", id);
    }

    /// Issue a new id for the request's session, keeping its values if
    /// the request carried a known id
    pub async fn regenerate_id(
        &self,
        parts: &mut Parts,
        response: &mut HeaderMap,
    ) -> SessionResult<Arc<dyn SessionStore>> {
        let new_id = self.generate_session_id()?;

        let store = match transport::extract_session_id(&self.config, parts)? {
            Some(old_id) => self.provider.regenerate(&old_id, &new_id, None).await?,
            None => self.provider.create(&new_id, None).await?,
        };

        transport::bind_session_id(&self.config, &new_id, parts, response)?;
        Ok(store)
    }

    /// Start a bearer-token session with the provider's default lifetime
    pub async fn token_start(&self) -> SessionResult<Arc<dyn SessionStore>> {
        let id = self.generate_session_id()?;
        self.provider.create(&id, None).await
    }

    /// Start a bearer-token session living `ttl`; a zero ttl means the default.
    /// The memory and file providers keep one lifetime for every record and ignore `ttl`.
    pub async fn token_start_expired(&self, ttl: Duration) -> SessionResult<Arc<dyn SessionStore>> {
        let id = self.generate_session_id()?;
        let lifetime = Some(ttl).filter(|ttl| !ttl.is_zero());
        self.provider.create(&id, lifetime).await
    }

    pub async fn token_destroy(&self, token: &str) {
        self.provider.destroy(token).await;
    }

    /// Look up an existing session by id
    pub async fn get_session_store(&self, id: &str) -> SessionResult<Arc<dyn SessionStore>> {
        self.provider.read(id).await
    }

    fn secondary(&self) -> SessionResult<&Arc<dyn SessionProvider>> {
        self.secondary.as_ref().ok_or_else(|| {
            SessionError::Config("no secondary provider configured".to_string())
        })
    }

    /// Record `token` as the current token of `principal_id`
    pub async fn link_principal(
        &self,
        principal_id: &str,
        token: &str,
    ) -> SessionResult<Arc<dyn SessionStore>> {
        let store = self.secondary()?.create(principal_id, None).await?;
        store.set(TOKEN_KEY, SessionValue::from(token))?;
        store.release().await;

        debug!("Linked principal {} to a token", principal_id);
        Ok(store)
    }

    /// Destroy the principal's token record, then the mapping itself
    pub async fn destroy_principal_token(&self, principal_id: &str) -> SessionResult<()> {
        let secondary = self.secondary()?;

        let mapping = match secondary.read(principal_id).await {
            Ok(store) => store,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };

        if let Some(SessionValue::Text(token)) = mapping.get(TOKEN_KEY)? {
            self.provider.destroy(&token).await;
        }
        secondary.destroy(principal_id).await;

        info!("Destroyed token mapping for principal {}", principal_id);
        Ok(())
    }

    /// Ids of all sessions in the primary provider
    pub async fn active_sessions(&self) -> SessionResult<Vec<String>> {
        self.provider.enumerate().await
    }

    /// One GC pass over every provider
    pub async fn gc(&self) {
        self.provider.gc().await;
        if let Some(secondary) = &self.secondary {
            secondary.gc().await;
        }
    }

    /// Spawn the periodic GC task. It runs one pass immediately, then once
    /// per `gc_lifetime_secs`; a slow pass delays the next tick.
    pub fn start_gc(self: &Arc<Self>) -> GcHandle {
        let manager = Arc::clone(self);
        let period = self.config.gc_interval();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        info!("Starting session GC every {}s", period.as_secs());

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => manager.gc().await,
                }
            }

            debug!("Session GC stopped");
        });

        GcHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

/// Owner of the background GC task. Dropping it also stops the task.
pub struct GcHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl GcHandle {
    /// Stop the task and wait for an in-flight pass to finish
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            warn!("Session GC task ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
