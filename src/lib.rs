// Library exports
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod session;
pub mod storage;

pub use config::ManagerConfig;
pub use error::{SessionError, SessionResult};
pub use session::{SessionManager, SessionStore, SessionValue, SessionValues};
pub use storage::{ProviderKind, SessionProvider};
