// Session module
// Values, records, id transport and the manager tying them to a provider

pub mod codec;
pub mod manager;
pub mod store;
pub mod transport;
pub mod types;

pub use manager::{GcHandle, SessionManager, TOKEN_KEY};
pub use store::{SessionRecord, SessionStore};
pub use types::{SessionValue, SessionValues};
