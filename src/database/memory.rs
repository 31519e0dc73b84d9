use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::errors::{AppError, Result};
use crate::models::{Snippet, User};
use super::{SnippetStore, UserStore};

/// In-process account table for tests and local runs without Postgres.
#[derive(Clone, Default)]
pub struct MemoryUserStore {
    users: Arc<RwLock<Vec<User>>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.email == email).cloned())
    }

    async fn get_by_id(&self, id: i32) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.id == id).cloned())
    }

    async fn insert(&self, name: &str, email: &str, hashed_password: &str) -> Result<i32> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.email == email) {
            return Err(AppError::DuplicateEmail(email.to_string()));
        }
        let id = users.len() as i32 + 1;
        users.push(User {
            id,
            name: name.to_string(),
            email: email.to_string(),
            hashed_password: hashed_password.to_string(),
            created: Utc::now(),
        });
        Ok(id)
    }
}

#[derive(Clone, Default)]
pub struct MemorySnippetStore {
    snippets: Arc<RwLock<Vec<Snippet>>>,
}

impl MemorySnippetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnippetStore for MemorySnippetStore {
    async fn insert(&self, title: &str, content: &str, expires_days: i32) -> Result<i32> {
        let mut snippets = self.snippets.write().await;
        let id = snippets.len() as i32 + 1;
        let created = Utc::now();
        snippets.push(Snippet {
            id,
            title: title.to_string(),
            content: content.to_string(),
            created,
            expires: created + Duration::days(expires_days as i64),
        });
        Ok(id)
    }

    async fn get(&self, id: i32) -> Result<Option<Snippet>> {
        let snippets = self.snippets.read().await;
        Ok(snippets
            .iter()
            .find(|s| s.id == id && !s.is_expired())
            .cloned())
    }

    async fn latest(&self) -> Result<Vec<Snippet>> {
        let snippets = self.snippets.read().await;
        Ok(snippets
            .iter()
            .rev()
            .filter(|s| !s.is_expired())
            .take(10)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = MemoryUserStore::new();
        let id = store.insert("Alice", "alice@example.com", "hash").await.unwrap();
        assert_eq!(id, 1);

        let err = store.insert("Other", "alice@example.com", "hash").await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateEmail(_)));
        assert_eq!(store.get_by_id(1).await.unwrap().unwrap().name, "Alice");
    }

    #[tokio::test]
    async fn expired_snippets_are_hidden() {
        let store = MemorySnippetStore::new();
        let gone = store.insert("old", "text", 0).await.unwrap();
        let live = store.insert("new", "text", 7).await.unwrap();

        assert!(store.get(gone).await.unwrap().is_none());
        assert_eq!(store.get(live).await.unwrap().unwrap().title, "new");

        let latest = store.latest().await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].id, live);
    }

    #[tokio::test]
    async fn latest_is_capped_and_newest_first() {
        let store = MemorySnippetStore::new();
        for n in 0..12 {
            store.insert(&format!("s{}", n), "text", 1).await.unwrap();
        }
        let latest = store.latest().await.unwrap();
        assert_eq!(latest.len(), 10);
        assert_eq!(latest[0].title, "s11");
    }
}
