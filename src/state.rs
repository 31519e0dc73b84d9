use minijinja::Environment;
use std::sync::Arc;

use crate::auth::AuthGate;
use crate::config::Config;
use crate::database::{SnippetStore, UserStore};
use crate::middleware::CsrfGuard;
use crate::session::{SessionConfig, SessionManager, SessionStore};
use crate::templates::create_environment;

/// Handles shared by every request. Stores arrive as trait objects so tests
/// can swap in the in-memory implementations.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub snippets: Arc<dyn SnippetStore>,
    pub sessions: SessionManager,
    pub auth: AuthGate,
    pub csrf: CsrfGuard,
    pub templates: Arc<Environment<'static>>,
}

impl AppState {
    pub fn new(
        config: &Config,
        users: Arc<dyn UserStore>,
        snippets: Arc<dyn SnippetStore>,
        session_store: Arc<dyn SessionStore>,
    ) -> Self {
        let sessions = SessionManager::new(session_store, SessionConfig::from(config));
        let auth = AuthGate::new(users.clone(), sessions.clone());
        let csrf = CsrfGuard::new(&config.csrf_secret, sessions.clone());

        Self {
            users,
            snippets,
            sessions,
            auth,
            csrf,
            templates: Arc::new(create_environment(&config.template_dir)),
        }
    }
}
