use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Keys holding text values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKey {
    /// One-shot notice shown on the next rendered page.
    Flash,
    /// Email the user signed in with.
    Email,
    /// Where to send the user after login.
    Path,
}

/// Every key a session can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKey {
    AuthenticatedUserId,
    Text(TextKey),
    CsrfToken,
}

impl From<TextKey> for SessionKey {
    fn from(key: TextKey) -> Self {
        SessionKey::Text(key)
    }
}

/// Per-session state. Field names on the wire match the cookie-era keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    #[serde(rename = "authenticatedUserID", default, skip_serializing_if = "Option::is_none")]
    pub authenticated_user_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csrf_token: Option<String>,
}

impl SessionData {
    pub fn text(&self, key: TextKey) -> Option<&str> {
        self.text_slot(key).as_deref()
    }

    pub fn text_mut(&mut self, key: TextKey) -> &mut Option<String> {
        match key {
            TextKey::Flash => &mut self.flash,
            TextKey::Email => &mut self.email,
            TextKey::Path => &mut self.path,
        }
    }

    fn text_slot(&self, key: TextKey) -> &Option<String> {
        match key {
            TextKey::Flash => &self.flash,
            TextKey::Email => &self.email,
            TextKey::Path => &self.path,
        }
    }

    pub fn contains(&self, key: SessionKey) -> bool {
        match key {
            SessionKey::AuthenticatedUserId => self.authenticated_user_id.is_some(),
            SessionKey::Text(key) => self.text_slot(key).is_some(),
            SessionKey::CsrfToken => self.csrf_token.is_some(),
        }
    }

    /// Clear `key`, returning whether anything was there.
    pub fn clear(&mut self, key: SessionKey) -> bool {
        match key {
            SessionKey::AuthenticatedUserId => self.authenticated_user_id.take().is_some(),
            SessionKey::Text(key) => self.text_mut(key).take().is_some(),
            SessionKey::CsrfToken => self.csrf_token.take().is_some(),
        }
    }
}

/// What the backing store holds under a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub data: SessionData,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}
