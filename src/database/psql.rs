use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use std::time::Duration;
use tracing::info;

use crate::config::Config;
use crate::errors::{AppError, Result};
use crate::models::{Snippet, User};
use super::{SnippetStore, UserStore};

pub type DbPool = Pool<Postgres>;

const EMAIL_CONSTRAINT: &str = "users_uc_email";

pub async fn create_pool(config: &Config) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations applied");
    Ok(())
}

#[derive(Clone)]
pub struct PgUserStore {
    pool: DbPool,
}

impl PgUserStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, name, email, hashed_password, created FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get_by_id(&self, id: i32) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, name, email, hashed_password, created FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn insert(&self, name: &str, email: &str, hashed_password: &str) -> Result<i32> {
        let inserted = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO users (name, email, hashed_password, created)
            VALUES ($1, $2, $3, NOW())
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(email)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok(id) => Ok(id),
            Err(sqlx::Error::Database(db_err))
                if db_err.is_unique_violation()
                    && db_err.constraint() == Some(EMAIL_CONSTRAINT) =>
            {
                Err(AppError::DuplicateEmail(email.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Clone)]
pub struct PgSnippetStore {
    pool: DbPool,
}

impl PgSnippetStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnippetStore for PgSnippetStore {
    async fn insert(&self, title: &str, content: &str, expires_days: i32) -> Result<i32> {
        let id = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO snippets (title, content, created, expires)
            VALUES ($1, $2, NOW(), NOW() + make_interval(days => $3))
            RETURNING id
            "#,
        )
        .bind(title)
        .bind(content)
        .bind(expires_days)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn get(&self, id: i32) -> Result<Option<Snippet>> {
        let snippet = sqlx::query_as::<_, Snippet>(
            r#"
            SELECT id, title, content, created, expires FROM snippets
            WHERE expires > NOW() AND id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(snippet)
    }

    async fn latest(&self) -> Result<Vec<Snippet>> {
        let snippets = sqlx::query_as::<_, Snippet>(
            r#"
            SELECT id, title, content, created, expires FROM snippets
            WHERE expires > NOW() ORDER BY id DESC LIMIT 10
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(snippets)
    }
}
