use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{FromRequest, Request, State},
    http::{header::CONTENT_TYPE, HeaderMap, Method},
    middleware::Next,
    response::Response,
    Form,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;
use tracing::warn;

use crate::errors::{AppError, Result};
use crate::session::{Session, SessionManager};

type HmacSha256 = Hmac<Sha256>;

pub const CSRF_HEADER: &str = "x-csrf-token";

const MAX_FORM_BYTES: usize = 64 * 1024;

/// Issues and checks per-session form tokens.
///
/// Each session carries a random secret; pages embed an HMAC of that secret
/// keyed with the server secret, so the raw value never reaches the markup.
#[derive(Clone)]
pub struct CsrfGuard {
    key: Arc<Vec<u8>>,
    sessions: SessionManager,
}

impl CsrfGuard {
    pub fn new(secret: impl AsRef<[u8]>, sessions: SessionManager) -> Self {
        Self {
            key: Arc::new(secret.as_ref().to_vec()),
            sessions,
        }
    }

    /// Token to embed in forms rendered for `session`. Creates the session
    /// secret on first use.
    pub async fn token_for(&self, session: &Session) -> Result<String> {
        let secret = self.sessions.ensure_csrf_secret(session).await;
        let mut mac = self.mac()?;
        mac.update(secret.as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }

    /// Constant-time check of a submitted token against the session secret.
    pub async fn verify(&self, session: &Session, submitted: &str) -> bool {
        let Some(secret) = self.sessions.csrf_secret(session).await else {
            return false;
        };
        let Ok(expected) = URL_SAFE_NO_PAD.decode(submitted.trim()) else {
            return false;
        };
        let Ok(mut mac) = self.mac() else {
            return false;
        };
        mac.update(secret.as_bytes());
        mac.verify_slice(&expected).is_ok()
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.key)
            .map_err(|e| AppError::internal(format!("CSRF key rejected: {}", e)))
    }
}

#[derive(Deserialize)]
struct CsrfField {
    csrf_token: String,
}

fn is_state_changing(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH | Method::DELETE)
}

async fn form_token(headers: &HeaderMap, body: &Bytes) -> Option<String> {
    let mut builder = axum::http::Request::builder().method(Method::POST);
    if let Some(content_type) = headers.get(CONTENT_TYPE) {
        builder = builder.header(CONTENT_TYPE, content_type);
    }
    let request = builder.body(Body::from(body.clone())).ok()?;
    Form::<CsrfField>::from_request(request, &())
        .await
        .ok()
        .map(|Form(field)| field.csrf_token)
}

/// Rejects state-changing requests that lack a valid token before any
/// handler sees them. Must run inside the session middleware.
pub async fn csrf_middleware(
    State(guard): State<CsrfGuard>,
    request: Request,
    next: Next,
) -> Result<Response> {
    if !is_state_changing(request.method()) {
        return Ok(next.run(request).await);
    }

    let session = request
        .extensions()
        .get::<Session>()
        .cloned()
        .ok_or_else(|| AppError::internal("CSRF check ran without a session"))?;

    let header_token = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);

    if let Some(token) = header_token {
        if !guard.verify(&session, &token).await {
            warn!(path = %request.uri().path(), "CSRF header token rejected");
            return Err(AppError::CsrfMismatch);
        }
        return Ok(next.run(request).await);
    }

    // The token rides in the form body, so buffer it and hand it on intact.
    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, MAX_FORM_BYTES)
        .await
        .map_err(|e| AppError::bad_request(format!("Unreadable request body: {}", e)))?;

    let valid = match form_token(&parts.headers, &bytes).await {
        Some(token) => guard.verify(&session, &token).await,
        None => false,
    };
    if !valid {
        warn!(path = %parts.uri.path(), "CSRF form token missing or invalid");
        return Err(AppError::CsrfMismatch);
    }

    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}
