pub mod gate;
pub mod middleware;
pub mod pw;

pub use gate::{AuthGate, Identity, DEFAULT_LOGIN_REDIRECT, LOGIN_FLASH, LOGOUT_FLASH};
pub use middleware::{require_authentication, LOGIN_PATH};
pub use pw::{dummy_verify, hash_password, verify_password};
