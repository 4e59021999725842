// Session manager configuration
// Loaded from YAML, normalized once and immutable afterwards

use crate::error::{SessionError, SessionResult};
use crate::storage::ProviderKind;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_SESSION_ID_LENGTH: usize = 16;

/// Configuration for a [`crate::session::SessionManager`]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Backend name: memory, file, sql or remote-cache
    pub provider: ProviderKind,
    /// Cookie name; also the URL query parameter name
    pub cookie_name: String,
    /// Write the session cookie on responses
    pub enable_set_cookie: bool,
    /// Seconds between GC sweeps
    pub gc_lifetime_secs: u64,
    /// Seconds a record lives without being touched (0 = gc lifetime)
    pub max_lifetime_secs: u64,
    pub disable_http_only: bool,
    /// Mark the cookie Secure on https requests
    pub secure: bool,
    /// Cookie Max-Age in seconds (0 = browser session cookie)
    pub cookie_lifetime_secs: u64,
    /// Backend specific connection string
    pub provider_config: String,
    /// Connection string for the principal-to-token provider
    pub provider_config_secondary: Option<String>,
    pub domain: Option<String>,
    /// Random bytes per generated id (0 = 16)
    pub session_id_length: usize,
    /// Also carry the id in a response/request header
    pub enable_id_in_header: bool,
    /// Header name in canonical form, e.g. X-Session-Id
    pub header_name: String,
    /// Accept the id from a URL query parameter
    pub enable_id_in_url_query: bool,
    pub session_id_prefix: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Memory,
            cookie_name: "sessionid".to_string(),
            enable_set_cookie: true,
            gc_lifetime_secs: 3600,
            max_lifetime_secs: 0,
            disable_http_only: false,
            secure: false,
            cookie_lifetime_secs: 0,
            provider_config: String::new(),
            provider_config_secondary: None,
            domain: None,
            session_id_length: DEFAULT_SESSION_ID_LENGTH,
            enable_id_in_header: false,
            header_name: String::new(),
            enable_id_in_url_query: false,
            session_id_prefix: String::new(),
        }
    }
}

impl ManagerConfig {
    /// Apply defaults and validate. Fails with `SessionError::Config`.
    pub fn normalized(mut self) -> SessionResult<Self> {
        if self.max_lifetime_secs == 0 {
            self.max_lifetime_secs = self.gc_lifetime_secs;
        }
        if self.session_id_length == 0 {
            self.session_id_length = DEFAULT_SESSION_ID_LENGTH;
        }
        if self.cookie_name.is_empty() {
            return Err(SessionError::Config("cookie_name is empty".to_string()));
        }
        if self.gc_lifetime_secs == 0 {
            return Err(SessionError::Config(
                "gc_lifetime_secs must be greater than zero".to_string(),
            ));
        }

        if self.enable_id_in_header {
            if self.header_name.is_empty() {
                return Err(SessionError::Config("header_name is empty".to_string()));
            }
            let canonical = canonical_header_key(&self.header_name);
            if self.header_name != canonical {
                return Err(SessionError::Config(format!(
                    "header_name ({}) has the wrong format, it should be like this: {}",
                    self.header_name, canonical
                )));
            }
            if axum::http::HeaderName::from_bytes(self.header_name.as_bytes()).is_err() {
                return Err(SessionError::Config(format!(
                    "header_name ({}) is not a valid header name",
                    self.header_name
                )));
            }
        }

        Ok(self)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_lifetime_secs)
    }
}

/// Canonical MIME header form: first letter and letters after '-' upper case
pub fn canonical_header_key(name: &str) -> String {
    let mut upper = true;
    name.chars()
        .map(|c| {
            let mapped = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            mapped
        })
        .collect()
}

/// Load configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> SessionResult<ManagerConfig> {
    let path = path.as_ref();
    info!("Loading session configuration from: {}", path.display());

    let contents = fs::read_to_string(path).map_err(|e| {
        SessionError::Config(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    let config: ManagerConfig = serde_yaml::from_str(&contents)
        .map_err(|e| SessionError::Config(format!("Failed to parse YAML config: {}", e)))?;

    let config = config.normalized()?;
    info!(
        "Session configuration loaded: provider={}, cookie={}, gc every {}s",
        config.provider, config.cookie_name, config.gc_lifetime_secs
    );

    Ok(config)
}

/// Load configuration with fallback options
pub fn load_config_with_fallback() -> SessionResult<ManagerConfig> {
    if let Ok(config_path) = std::env::var("SESSION_CONFIG_PATH") {
        match load_config(&config_path) {
            Ok(config) => return Ok(config),
            Err(e) => warn!(
                "Failed to load config from SESSION_CONFIG_PATH ({}): {}",
                config_path, e
            ),
        }
    }

    for path in ["session.yaml", "session.yml"] {
        if Path::new(path).exists() {
            match load_config(path) {
                Ok(config) => return Ok(config),
                Err(e) => warn!("Failed to load config from '{}': {}", path, e),
            }
        }
    }

    Err(SessionError::Config(
        "No session configuration found. Create session.yaml or set SESSION_CONFIG_PATH."
            .to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yaml_config() {
        let yaml = r#"
provider: file
cookie_name: sid
gc_lifetime_secs: 120
provider_config: /tmp/sessions
enable_id_in_header: true
header_name: X-Session-Id
session_id_prefix: "app-"
"#;

        let config: ManagerConfig = serde_yaml::from_str(yaml).unwrap();
        let config = config.normalized().unwrap();

        assert_eq!(config.provider, ProviderKind::File);
        assert_eq!(config.cookie_name, "sid");
        assert_eq!(config.max_lifetime_secs, 120);
        assert_eq!(config.session_id_length, 16);
        assert!(config.enable_set_cookie);
        assert_eq!(config.session_id_prefix, "app-");
    }

    #[test]
    fn test_unknown_provider_fails_to_parse() {
        let result: Result<ManagerConfig, _> = serde_yaml::from_str("provider: couchdb");
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_lengths_take_defaults() {
        let config = ManagerConfig {
            gc_lifetime_secs: 30,
            max_lifetime_secs: 0,
            session_id_length: 0,
            ..Default::default()
        }
        .normalized()
        .unwrap();

        assert_eq!(config.max_lifetime(), Duration::from_secs(30));
        assert_eq!(config.session_id_length, DEFAULT_SESSION_ID_LENGTH);
    }

    #[test]
    fn test_header_name_must_be_canonical() {
        let config = ManagerConfig {
            enable_id_in_header: true,
            header_name: "x-session-id".to_string(),
            ..Default::default()
        };

        let err = config.normalized().unwrap_err();
        assert!(err.to_string().contains("X-Session-Id"));
    }

    #[test]
    fn test_header_name_required_when_enabled() {
        let config = ManagerConfig {
            enable_id_in_header: true,
            ..Default::default()
        };
        assert!(matches!(config.normalized(), Err(SessionError::Config(_))));
    }

    #[test]
    fn test_canonical_header_key() {
        assert_eq!(canonical_header_key("x-session-id"), "X-Session-Id");
        assert_eq!(canonical_header_key("AUTHORIZATION"), "Authorization");
        assert_eq!(canonical_header_key("X-Session-Id"), "X-Session-Id");
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
    }
}
