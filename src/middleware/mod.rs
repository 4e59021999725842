pub mod session;

pub use session::{Session, session_middleware};
