use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use tracing::warn;

use crate::auth::LOGIN_PATH;
use crate::errors::Result;
use crate::models::AccountView;
use crate::session::Session;
use crate::state::AppState;
use crate::templates::render;
use super::template_data;

pub async fn home(State(state): State<AppState>, session: Session) -> Result<Response> {
    let snippets = state.snippets.latest().await?;
    let mut data = template_data(&state, &session).await?;
    data.snippets = snippets;
    render(&state.templates, StatusCode::OK, "home.html", &data)
}

pub async fn about(State(state): State<AppState>, session: Session) -> Result<Response> {
    let data = template_data(&state, &session).await?;
    render(&state.templates, StatusCode::OK, "about.html", &data)
}

pub async fn account_view(State(state): State<AppState>, session: Session) -> Result<Response> {
    let Some(identity) = state.auth.current_identity(&session).await else {
        return Ok(Redirect::to(LOGIN_PATH).into_response());
    };

    let user = match state.users.get_by_id(identity.user_id).await? {
        Some(user) => user,
        None => {
            warn!(user_id = identity.user_id, "Session refers to a missing account");
            return Ok(Redirect::to(LOGIN_PATH).into_response());
        }
    };

    let mut data = template_data(&state, &session).await?;
    data.user = Some(AccountView::from(user));
    render(&state.templates, StatusCode::OK, "account.html", &data)
}
