use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, sqlx::FromRow)]
pub struct Snippet {
    pub id: i32,
    pub title: String,
    pub content: String,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

impl Snippet {
    pub fn is_expired(&self) -> bool {
        self.expires <= Utc::now()
    }
}
