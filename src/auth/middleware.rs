use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::errors::{AppError, Result};
use crate::session::{Session, TextKey};
use crate::state::AppState;

pub const LOGIN_PATH: &str = "/user/login";

/// Gate for pages that need a signed-in user.
///
/// Anonymous visitors are sent to the login page and the path they asked for
/// is kept in the session so login can bring them back. Only `GET` and
/// `HEAD` paths are kept; a redirect can only ever replay a `GET`.
pub async fn require_authentication(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response> {
    let session = request
        .extensions()
        .get::<Session>()
        .cloned()
        .ok_or_else(|| AppError::internal("auth check ran without a session"))?;

    if !state.auth.is_authenticated(&session).await {
        if matches!(*request.method(), Method::GET | Method::HEAD) {
            let path = request.uri().path().to_string();
            state.sessions.put_string(&session, TextKey::Path, path).await;
        }
        return Ok(Redirect::to(LOGIN_PATH).into_response());
    }

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    Ok(response)
}
