use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use std::time::Duration;
use tracing::{error, info};

use crate::config::Config;
use crate::errors::{AppError, Result};
use crate::session::SessionStore;

const KEY_PREFIX: &str = "session:";

fn session_key(token: &str) -> String {
    format!("{}{}", KEY_PREFIX, token)
}

// SET EX rejects zero; a record with under a second left still gets one.
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// Session records in Redis under `session:<token>`, expired by Redis itself.
#[derive(Clone)]
pub struct RedisSessionStore {
    conn: ConnectionManager,
}

impl RedisSessionStore {
    pub async fn new(config: &Config) -> Result<Self> {
        info!("Connecting session store to {}", redact_url(&config.redis_url));

        let client = Client::open(config.redis_url.as_str()).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            AppError::config(format!("Invalid REDIS_URL: {}", e))
        })?;

        let conn = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to connect to Redis: {}", e);
            AppError::store_unavailable(format!("Redis connection failed: {}", e))
        })?;

        let store = Self { conn };
        store.health_check().await?;
        info!("Session store connected");
        Ok(store)
    }

    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| {
                error!("Redis health check failed: {}", e);
                AppError::store_unavailable(format!("Redis health check failed: {}", e))
            })
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn find(&self, token: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let record: Option<String> = conn.get(session_key(token)).await?;
        Ok(record)
    }

    async fn commit(&self, token: &str, record: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(session_key(token), record, ttl_seconds(ttl))
            .await?;
        Ok(())
    }

    async fn delete(&self, token: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(session_key(token)).await?;
        Ok(())
    }

    async fn rotate(
        &self,
        old_token: Option<&str>,
        new_token: &str,
        record: &str,
        ttl: Duration,
    ) -> Result<()> {
        let mut pipe = redis::pipe();
        pipe.atomic()
            .set_ex(session_key(new_token), record, ttl_seconds(ttl))
            .ignore();
        if let Some(old) = old_token {
            pipe.del(session_key(old)).ignore();
        }

        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }
}

/// Hide credentials in a connection URL before logging it.
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}
