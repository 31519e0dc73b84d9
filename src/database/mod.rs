pub mod memory;
pub mod psql;
pub mod redis;

use async_trait::async_trait;

use crate::errors::Result;
use crate::models::{Snippet, User};

/// Account storage consulted by the auth gate and the signup handler.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn get_by_id(&self, id: i32) -> Result<Option<User>>;

    /// Insert a new account and return its id. Fails with
    /// [`AppError::DuplicateEmail`](crate::errors::AppError::DuplicateEmail)
    /// when the address is taken.
    async fn insert(&self, name: &str, email: &str, hashed_password: &str) -> Result<i32>;
}

#[async_trait]
pub trait SnippetStore: Send + Sync {
    async fn insert(&self, title: &str, content: &str, expires_days: i32) -> Result<i32>;

    /// Unexpired snippet by id.
    async fn get(&self, id: i32) -> Result<Option<Snippet>>;

    /// Ten most recent unexpired snippets, newest first.
    async fn latest(&self) -> Result<Vec<Snippet>>;
}

pub use memory::{MemorySnippetStore, MemoryUserStore};
pub use psql::{create_pool, run_migrations, DbPool, PgSnippetStore, PgUserStore};
pub use self::redis::RedisSessionStore;
