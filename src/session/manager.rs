use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use rand::{thread_rng, RngCore};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::Config;
use crate::errors::{AppError, Result};
use super::data::{SessionData, SessionKey, SessionRecord, TextKey};
use super::store::SessionStore;

const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Fixed lifetime counted from creation or the last renewal.
    pub lifetime: Duration,
    pub cookie_name: String,
    pub cookie_secure: bool,
    /// Deadline for each individual store call.
    pub store_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SessionConfig {
    fn from(config: &Config) -> Self {
        Self {
            lifetime: config.session_lifetime,
            cookie_name: config.session_cookie_name.clone(),
            cookie_secure: config.session_cookie_secure,
            store_timeout: config.store_timeout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Unmodified,
    Modified,
}

#[derive(Debug)]
struct SessionState {
    token: Option<String>,
    data: SessionData,
    expires_at: DateTime<Utc>,
    status: Status,
    issue_cookie: bool,
}

impl SessionState {
    fn mark_modified(&mut self) {
        self.status = Status::Modified;
    }
}

/// Request-scoped handle to one session.
///
/// Cloning shares the same state; the session middleware keeps one clone to
/// commit after the handler has run.
#[derive(Debug, Clone)]
pub struct Session {
    state: Arc<Mutex<SessionState>>,
}

impl Session {
    fn new(token: Option<String>, data: SessionData, expires_at: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState {
                token,
                data,
                expires_at,
                status: Status::Unmodified,
                issue_cookie: false,
            })),
        }
    }

    /// Current token, if the session has been persisted.
    pub async fn token(&self) -> Option<String> {
        self.state.lock().await.token.clone()
    }

    /// Copy of the current data.
    pub async fn snapshot(&self) -> SessionData {
        self.state.lock().await.data.clone()
    }
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| AppError::internal("session middleware is not installed"))
    }
}

/// Token lifecycle and typed access to session data.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    config: Arc<SessionConfig>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, config: SessionConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Resolve a cookie token to a session. Unknown, expired or undecodable
    /// tokens yield a fresh, unsaved session.
    pub async fn load(&self, token: Option<&str>) -> Result<Session> {
        let token = match token.filter(|t| !t.is_empty()) {
            Some(token) => token,
            None => return self.fresh(),
        };

        let raw = match self.with_deadline("find", self.store.find(token)).await? {
            Some(raw) => raw,
            None => return self.fresh(),
        };

        match serde_json::from_str::<SessionRecord>(&raw) {
            Ok(record) if !record.is_expired() => {
                Ok(Session::new(Some(token.to_string()), record.data, record.expires_at))
            }
            Ok(_) => self.fresh(),
            Err(e) => {
                warn!("Discarding undecodable session record: {}", e);
                self.fresh()
            }
        }
    }

    pub async fn get_user_id(&self, session: &Session) -> Option<i32> {
        session.state.lock().await.data.authenticated_user_id
    }

    pub async fn put_user_id(&self, session: &Session, user_id: i32) {
        let mut state = session.state.lock().await;
        state.data.authenticated_user_id = Some(user_id);
        state.mark_modified();
    }

    pub async fn get_string(&self, session: &Session, key: TextKey) -> Option<String> {
        session.state.lock().await.data.text(key).map(str::to_string)
    }

    pub async fn put_string(&self, session: &Session, key: TextKey, value: impl Into<String>) {
        let mut state = session.state.lock().await;
        *state.data.text_mut(key) = Some(value.into());
        state.mark_modified();
    }

    pub async fn exists(&self, session: &Session, key: impl Into<SessionKey>) -> bool {
        session.state.lock().await.data.contains(key.into())
    }

    pub async fn remove(&self, session: &Session, key: impl Into<SessionKey>) {
        let mut state = session.state.lock().await;
        if state.data.clear(key.into()) {
            state.mark_modified();
        }
    }

    /// Read and delete in one step. Returns an empty string when absent.
    pub async fn pop_string(&self, session: &Session, key: TextKey) -> String {
        let mut state = session.state.lock().await;
        match state.data.text_mut(key).take() {
            Some(value) => {
                state.mark_modified();
                value
            }
            None => String::new(),
        }
    }

    pub(crate) async fn csrf_secret(&self, session: &Session) -> Option<String> {
        session.state.lock().await.data.csrf_token.clone()
    }

    pub(crate) async fn ensure_csrf_secret(&self, session: &Session) -> String {
        let mut state = session.state.lock().await;
        if let Some(secret) = &state.data.csrf_token {
            return secret.clone();
        }
        let secret = generate_token();
        state.data.csrf_token = Some(secret.clone());
        state.mark_modified();
        secret
    }

    /// Move the session's data to a new token and invalidate the old one.
    ///
    /// The new record is written immediately; the cookie is reissued when the
    /// response is finalised. On failure the session keeps its old token.
    pub async fn renew_token(&self, session: &Session) -> Result<()> {
        let mut state = session.state.lock().await;

        let new_token = generate_token();
        let expires_at = self.expiry_from_now()?;
        let record = encode_record(&state.data, expires_at)?;

        self.with_deadline(
            "rotate",
            self.store.rotate(state.token.as_deref(), &new_token, &record, self.config.lifetime),
        )
        .await?;

        debug!("Session token rotated");
        state.token = Some(new_token);
        state.expires_at = expires_at;
        state.issue_cookie = true;
        state.mark_modified();
        Ok(())
    }

    /// Renew the token, then record the signed-in identity on the new token.
    ///
    /// Returns the redirect path stored before login, if any.
    pub async fn promote_session(
        &self,
        session: &Session,
        user_id: i32,
        email: &str,
    ) -> Result<Option<String>> {
        self.renew_token(session).await?;

        let mut state = session.state.lock().await;
        let path = state.data.path.take();
        state.data.email = Some(email.to_string());
        state.data.authenticated_user_id = Some(user_id);
        state.mark_modified();
        Ok(path)
    }

    /// Renew the token, then drop the signed-in identity.
    pub async fn demote_session(&self, session: &Session) -> Result<()> {
        self.renew_token(session).await?;
        self.remove(session, SessionKey::AuthenticatedUserId).await;
        Ok(())
    }

    /// Persist pending changes. Returns the cookie to send when the client
    /// needs a new token.
    pub async fn commit(&self, session: &Session) -> Result<Option<Cookie<'static>>> {
        let mut state = session.state.lock().await;
        if state.status == Status::Unmodified {
            return Ok(None);
        }

        let ttl = match (state.expires_at - Utc::now()).to_std() {
            Ok(ttl) if !ttl.is_zero() => ttl,
            _ => return Ok(None),
        };

        let token = match &state.token {
            Some(token) => token.clone(),
            None => {
                let token = generate_token();
                state.token = Some(token.clone());
                state.issue_cookie = true;
                token
            }
        };

        let record = encode_record(&state.data, state.expires_at)?;
        self.with_deadline("commit", self.store.commit(&token, &record, ttl)).await?;
        state.status = Status::Unmodified;

        if state.issue_cookie {
            state.issue_cookie = false;
            Ok(Some(self.session_cookie(token, ttl)))
        } else {
            Ok(None)
        }
    }

    fn fresh(&self) -> Result<Session> {
        Ok(Session::new(None, SessionData::default(), self.expiry_from_now()?))
    }

    fn expiry_from_now(&self) -> Result<DateTime<Utc>> {
        chrono::Duration::from_std(self.config.lifetime)
            .ok()
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| {
                AppError::config(format!(
                    "session lifetime {:?} is out of range",
                    self.config.lifetime
                ))
            })
    }

    fn session_cookie(&self, token: String, ttl: Duration) -> Cookie<'static> {
        Cookie::build((self.config.cookie_name.clone(), token))
            .http_only(true)
            .secure(self.config.cookie_secure)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(ttl.as_secs() as i64))
            .path("/")
            .build()
    }

    async fn with_deadline<T>(&self, op: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.config.store_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(AppError::StoreUnavailable(msg))) => Err(AppError::StoreUnavailable(msg)),
            Ok(Err(e)) => Err(AppError::store_unavailable(format!("{}: {}", op, e))),
            Err(_) => Err(AppError::store_unavailable(format!(
                "{} timed out after {:?}",
                op, self.config.store_timeout
            ))),
        }
    }
}

fn encode_record(data: &SessionData, expires_at: DateTime<Utc>) -> Result<String> {
    serde_json::to_string(&SessionRecord {
        data: data.clone(),
        expires_at,
    })
    .map_err(|e| AppError::internal(format!("Session serialization failed: {}", e)))
}

/// Random URL-safe token for session ids and CSRF secrets.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Loads the session named by the cookie, exposes it to handlers and commits
/// it once the response is built.
pub async fn session_middleware(
    State(manager): State<SessionManager>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let token = jar
        .get(&manager.config.cookie_name)
        .map(|cookie| cookie.value().to_string());

    let session = match manager.load(token.as_deref()).await {
        Ok(session) => session,
        Err(e) => return e.into_response(),
    };
    request.extensions_mut().insert(session.clone());

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("Cookie"));

    match manager.commit(&session).await {
        Ok(Some(cookie)) => (jar.add(cookie), response).into_response(),
        Ok(None) => response,
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::store::MemorySessionStore;
    use async_trait::async_trait;

    fn manager_with(store: Arc<dyn SessionStore>) -> SessionManager {
        SessionManager::new(store, SessionConfig::default())
    }

    #[tokio::test]
    async fn untouched_session_is_never_stored() {
        let store = MemorySessionStore::new();
        let manager = manager_with(Arc::new(store.clone()));

        let session = manager.load(None).await.unwrap();
        assert_eq!(manager.pop_string(&session, TextKey::Flash).await, "");
        assert!(manager.commit(&session).await.unwrap().is_none());
        assert!(session.token().await.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn first_write_mints_token_and_cookie() {
        let store = MemorySessionStore::new();
        let manager = manager_with(Arc::new(store.clone()));

        let session = manager.load(None).await.unwrap();
        manager.put_string(&session, TextKey::Flash, "hi").await;
        let cookie = manager.commit(&session).await.unwrap().expect("cookie");

        assert_eq!(cookie.name(), "session");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(Some(cookie.value().to_string()), session.token().await);

        let reloaded = manager.load(Some(cookie.value())).await.unwrap();
        assert_eq!(manager.get_string(&reloaded, TextKey::Flash).await.as_deref(), Some("hi"));

        // Later commits on the same token do not resend the cookie.
        manager.put_string(&reloaded, TextKey::Email, "a@b.c").await;
        assert!(manager.commit(&reloaded).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pop_string_returns_value_once() {
        let manager = manager_with(Arc::new(MemorySessionStore::new()));
        let session = manager.load(None).await.unwrap();

        manager.put_string(&session, TextKey::Flash, "Saved!").await;
        assert_eq!(manager.pop_string(&session, TextKey::Flash).await, "Saved!");
        assert_eq!(manager.pop_string(&session, TextKey::Flash).await, "");
        assert!(!manager.exists(&session, TextKey::Flash).await);
    }

    #[tokio::test]
    async fn renew_invalidates_old_token_and_carries_data() {
        let manager = manager_with(Arc::new(MemorySessionStore::new()));

        let session = manager.load(None).await.unwrap();
        manager.put_user_id(&session, 42).await;
        manager.put_string(&session, TextKey::Path, "/account/view").await;
        manager.commit(&session).await.unwrap();
        let old_token = session.token().await.unwrap();

        manager.renew_token(&session).await.unwrap();
        let cookie = manager.commit(&session).await.unwrap().expect("rotated cookie");
        let new_token = session.token().await.unwrap();
        assert_ne!(old_token, new_token);
        assert_eq!(cookie.value(), new_token);

        let stale = manager.load(Some(&old_token)).await.unwrap();
        assert_eq!(stale.snapshot().await, SessionData::default());
        assert!(stale.token().await.is_none());

        let current = manager.load(Some(&new_token)).await.unwrap();
        assert_eq!(manager.get_user_id(&current).await, Some(42));
        assert_eq!(
            manager.get_string(&current, TextKey::Path).await.as_deref(),
            Some("/account/view")
        );
    }

    #[tokio::test]
    async fn promote_then_demote() {
        let manager = manager_with(Arc::new(MemorySessionStore::new()));
        let session = manager.load(None).await.unwrap();
        manager.put_string(&session, TextKey::Path, "/snippet/create").await;
        manager.commit(&session).await.unwrap();
        let anonymous_token = session.token().await.unwrap();

        let path = manager.promote_session(&session, 1, "alice@example.com").await.unwrap();
        assert_eq!(path.as_deref(), Some("/snippet/create"));
        assert_eq!(manager.get_user_id(&session).await, Some(1));
        assert_eq!(
            manager.get_string(&session, TextKey::Email).await.as_deref(),
            Some("alice@example.com")
        );
        assert!(!manager.exists(&session, TextKey::Path).await);
        let signed_in_token = session.token().await.unwrap();
        assert_ne!(anonymous_token, signed_in_token);

        manager.demote_session(&session).await.unwrap();
        assert!(!manager.exists(&session, SessionKey::AuthenticatedUserId).await);
        assert_ne!(session.token().await.unwrap(), signed_in_token);
    }

    #[tokio::test]
    async fn oversized_lifetime_is_an_error_not_a_panic() {
        let config = SessionConfig {
            lifetime: Duration::from_secs(10_000_000_000_000),
            ..SessionConfig::default()
        };
        let manager = SessionManager::new(Arc::new(MemorySessionStore::new()), config);

        let err = manager.load(None).await.unwrap_err();
        assert!(matches!(err, AppError::ConfigurationError(_)));
    }

    struct BrokenStore;

    #[async_trait]
    impl SessionStore for BrokenStore {
        async fn find(&self, _token: &str) -> Result<Option<String>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(None)
        }

        async fn commit(&self, _token: &str, _record: &str, _ttl: Duration) -> Result<()> {
            Err(AppError::database("connection reset"))
        }

        async fn delete(&self, _token: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn slow_or_failing_store_is_unavailable() {
        let config = SessionConfig {
            store_timeout: Duration::from_millis(50),
            ..SessionConfig::default()
        };
        let manager = SessionManager::new(Arc::new(BrokenStore), config);

        let err = manager.load(Some("abc")).await.unwrap_err();
        assert!(matches!(err, AppError::StoreUnavailable(_)));

        let session = manager.load(None).await.unwrap();
        let err = manager.renew_token(&session).await.unwrap_err();
        assert!(matches!(err, AppError::StoreUnavailable(_)));
        assert!(session.token().await.is_none());
    }
}
