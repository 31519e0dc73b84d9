pub mod snippet;
pub mod user;

pub use snippet::Snippet;
pub use user::{AccountView, Credential, User};
