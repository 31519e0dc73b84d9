//! Server-side sessions keyed by an opaque cookie token.

pub mod data;
pub mod manager;
pub mod store;

pub use data::{SessionData, SessionKey, SessionRecord, TextKey};
pub use manager::{generate_token, session_middleware, Session, SessionConfig, SessionManager};
pub use store::{MemorySessionStore, SessionStore};
