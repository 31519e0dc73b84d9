use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A stored account. Only the storage layer creates these.
#[derive(Serialize, Deserialize, Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub created: DateTime<Utc>,
}

/// Login input. Never persisted.
#[derive(Clone, Deserialize)]
pub struct Credential {
    pub email: String,
    pub password: String,
}

impl Credential {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// What the account page shows about the signed-in user.
#[derive(Serialize, Debug, Clone)]
pub struct AccountView {
    pub name: String,
    pub email: String,
    pub joined: DateTime<Utc>,
}

impl From<User> for AccountView {
    fn from(user: User) -> Self {
        AccountView {
            name: user.name,
            email: user.email,
            joined: user.created,
        }
    }
}
