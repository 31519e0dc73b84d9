use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::Result;

/// Durable key-value storage for serialized session records.
///
/// Implementations own expiry: a record written with `ttl` must stop being
/// returned by `find` once `ttl` has elapsed.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn find(&self, token: &str) -> Result<Option<String>>;

    async fn commit(&self, token: &str, record: &str, ttl: Duration) -> Result<()>;

    async fn delete(&self, token: &str) -> Result<()>;

    /// Move a record to `new_token` and drop `old_token`.
    ///
    /// The default is two separate calls; a crash between them leaves the old
    /// token alive until its TTL runs out.
    async fn rotate(
        &self,
        old_token: Option<&str>,
        new_token: &str,
        record: &str,
        ttl: Duration,
    ) -> Result<()> {
        self.commit(new_token, record, ttl).await?;
        if let Some(old) = old_token {
            self.delete(old).await?;
        }
        Ok(())
    }
}

#[derive(Clone)]
struct MemoryEntry {
    record: String,
    expires_at: Instant,
}

/// In-process store, used by tests and single-node development runs.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    entries: Arc<RwLock<HashMap<String, MemoryEntry>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live records.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.read().await;
        entries.values().filter(|entry| entry.expires_at > now).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn find(&self, token: &str) -> Result<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(token)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.record.clone()))
    }

    async fn commit(&self, token: &str, record: &str, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            token.to_string(),
            MemoryEntry {
                record: record.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, token: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.remove(token);
        Ok(())
    }

    // One write lock covers both halves, so the swap is atomic here.
    async fn rotate(
        &self,
        old_token: Option<&str>,
        new_token: &str,
        record: &str,
        ttl: Duration,
    ) -> Result<()> {
        let mut entries = self.entries.write().await;
        if let Some(old) = old_token {
            entries.remove(old);
        }
        entries.insert(
            new_token.to_string(),
            MemoryEntry {
                record: record.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }
}
