use std::sync::Arc;

use tracing::{info, warn};

use crate::database::UserStore;
use crate::errors::{AppError, Result};
use crate::models::Credential;
use crate::session::{Session, SessionManager, TextKey};
use super::pw::{dummy_verify, verify_password};

pub const DEFAULT_LOGIN_REDIRECT: &str = "/snippet/create";
pub const LOGIN_FLASH: &str = "You have successfully logged in...";
pub const LOGOUT_FLASH: &str = "You've been logged out successfully!";

/// Who the current request belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i32,
    pub email: Option<String>,
}

/// Credential checks and the anonymous/authenticated transitions of a session.
#[derive(Clone)]
pub struct AuthGate {
    users: Arc<dyn UserStore>,
    sessions: SessionManager,
}

impl AuthGate {
    pub fn new(users: Arc<dyn UserStore>, sessions: SessionManager) -> Self {
        Self { users, sessions }
    }

    /// Resolve credentials to a user id.
    ///
    /// Unknown email and wrong password both end in
    /// [`AppError::InvalidCredentials`], and both pay for one hash
    /// verification. Storage and hash failures pass through as internal errors.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<i32> {
        let user = self.users.get_by_email(email).await?;
        let password = password.to_string();

        let user = match user {
            Some(user) => user,
            None => {
                run_blocking(move || {
                    dummy_verify(&password);
                    Ok(())
                })
                .await?;
                return Err(AppError::InvalidCredentials);
            }
        };

        let hash = user.hashed_password.clone();
        let matches = run_blocking(move || verify_password(&password, &hash)).await?;
        if matches {
            Ok(user.id)
        } else {
            Err(AppError::InvalidCredentials)
        }
    }

    pub async fn is_authenticated(&self, session: &Session) -> bool {
        self.sessions.get_user_id(session).await.is_some()
    }

    pub async fn current_identity(&self, session: &Session) -> Option<Identity> {
        let user_id = self.sessions.get_user_id(session).await?;
        let email = self.sessions.get_string(session, TextKey::Email).await;
        Some(Identity { user_id, email })
    }

    /// Verify, renew, record identity, set the flash. Returns where to send
    /// the user next. On rejected credentials the session is left untouched.
    pub async fn log_in(&self, session: &Session, credential: &Credential) -> Result<String> {
        let user_id = match self.authenticate(&credential.email, &credential.password).await {
            Ok(id) => id,
            Err(AppError::InvalidCredentials) => {
                warn!("Rejected login attempt");
                return Err(AppError::InvalidCredentials);
            }
            Err(e) => return Err(e),
        };

        let path = self
            .sessions
            .promote_session(session, user_id, &credential.email)
            .await?;
        self.sessions.put_string(session, TextKey::Flash, LOGIN_FLASH).await;
        info!(user_id, "User logged in");

        Ok(local_redirect(path))
    }

    pub async fn log_out(&self, session: &Session) -> Result<()> {
        let user_id = self.sessions.get_user_id(session).await;
        self.sessions.demote_session(session).await?;
        self.sessions.put_string(session, TextKey::Flash, LOGOUT_FLASH).await;
        info!(?user_id, "User logged out");
        Ok(())
    }
}

// Only same-site absolute paths are followed after login.
fn local_redirect(path: Option<String>) -> String {
    match path {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path,
        _ => DEFAULT_LOGIN_REDIRECT.to_string(),
    }
}

async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AppError::internal(format!("Password task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::pw::hash_password;
    use crate::database::MemoryUserStore;
    use crate::models::User;
    use crate::session::{MemorySessionStore, SessionConfig, SessionKey};
    use async_trait::async_trait;

    async fn gate_with_alice() -> (AuthGate, SessionManager, i32) {
        let users = MemoryUserStore::new();
        let hash = hash_password("pa$$word").unwrap();
        let id = users.insert("Alice", "alice@example.com", &hash).await.unwrap();
        let sessions =
            SessionManager::new(Arc::new(MemorySessionStore::new()), SessionConfig::default());
        (AuthGate::new(Arc::new(users), sessions.clone()), sessions, id)
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_look_the_same() {
        let (gate, _, id) = gate_with_alice().await;

        assert_eq!(gate.authenticate("alice@example.com", "pa$$word").await.unwrap(), id);

        let missing = gate.authenticate("bob@example.com", "pa$$word").await.unwrap_err();
        let wrong = gate.authenticate("alice@example.com", "password").await.unwrap_err();
        assert!(matches!(missing, AppError::InvalidCredentials));
        assert!(matches!(wrong, AppError::InvalidCredentials));
        assert_eq!(missing.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn log_in_rotates_token_and_follows_stored_path() {
        let (gate, sessions, id) = gate_with_alice().await;
        let session = sessions.load(None).await.unwrap();
        sessions.put_string(&session, TextKey::Path, "/account/view").await;
        sessions.commit(&session).await.unwrap();
        let before = session.token().await;

        let credential = Credential::new("alice@example.com", "pa$$word");
        let target = gate.log_in(&session, &credential).await.unwrap();

        assert_eq!(target, "/account/view");
        assert_ne!(session.token().await, before);
        assert!(gate.is_authenticated(&session).await);
        assert_eq!(
            gate.current_identity(&session).await,
            Some(Identity { user_id: id, email: Some("alice@example.com".into()) })
        );
        assert_eq!(sessions.pop_string(&session, TextKey::Flash).await, LOGIN_FLASH);
    }

    #[tokio::test]
    async fn failed_log_in_leaves_session_alone() {
        let (gate, sessions, _) = gate_with_alice().await;
        let session = sessions.load(None).await.unwrap();

        let credential = Credential::new("alice@example.com", "nope");
        let err = gate.log_in(&session, &credential).await.unwrap_err();

        assert!(matches!(err, AppError::InvalidCredentials));
        assert!(session.token().await.is_none());
        assert!(sessions.commit(&session).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn default_redirect_and_offsite_paths() {
        assert_eq!(local_redirect(None), DEFAULT_LOGIN_REDIRECT);
        assert_eq!(local_redirect(Some("//evil.example".into())), DEFAULT_LOGIN_REDIRECT);
        assert_eq!(local_redirect(Some("https://evil.example".into())), DEFAULT_LOGIN_REDIRECT);
        assert_eq!(local_redirect(Some("/snippet/view/3".into())), "/snippet/view/3");
    }

    #[tokio::test]
    async fn log_out_clears_identity() {
        let (gate, sessions, _) = gate_with_alice().await;
        let session = sessions.load(None).await.unwrap();
        let credential = Credential::new("alice@example.com", "pa$$word");
        gate.log_in(&session, &credential).await.unwrap();
        sessions.pop_string(&session, TextKey::Flash).await;
        let signed_in = session.token().await;

        gate.log_out(&session).await.unwrap();

        assert!(!gate.is_authenticated(&session).await);
        assert!(!sessions.exists(&session, SessionKey::AuthenticatedUserId).await);
        assert_ne!(session.token().await, signed_in);
        assert_eq!(sessions.pop_string(&session, TextKey::Flash).await, LOGOUT_FLASH);
    }

    struct CorruptUsers;

    #[async_trait]
    impl UserStore for CorruptUsers {
        async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
            Ok(Some(User {
                id: 9,
                name: "Broken".into(),
                email: email.into(),
                hashed_password: "plaintext-oops".into(),
                created: chrono::Utc::now(),
            }))
        }

        async fn get_by_id(&self, _id: i32) -> Result<Option<User>> {
            Ok(None)
        }

        async fn insert(&self, _: &str, _: &str, _: &str) -> Result<i32> {
            Err(AppError::database("read only"))
        }
    }

    #[tokio::test]
    async fn malformed_stored_hash_is_internal() {
        let sessions =
            SessionManager::new(Arc::new(MemorySessionStore::new()), SessionConfig::default());
        let gate = AuthGate::new(Arc::new(CorruptUsers), sessions);

        let err = gate.authenticate("x@example.com", "pa$$word").await.unwrap_err();
        assert!(matches!(err, AppError::MalformedHash(_)));
        assert!(err.is_internal());
    }
}
