pub mod snippets;
pub mod users;
pub mod web;

use axum::{
    extract::rejection::FormRejection,
    middleware::from_fn_with_state,
    routing::{get, post},
    Form, Router,
};
use chrono::{Datelike, Utc};
use tower_http::{
    catch_panic::CatchPanicLayer, services::ServeDir, timeout::TimeoutLayer, trace::TraceLayer,
};

use crate::auth::require_authentication;
use crate::config::Config;
use crate::errors::{AppError, Result};
use crate::middleware::{csrf_middleware, security_headers};
use crate::session::{session_middleware, Session, TextKey};
use crate::state::AppState;
use crate::templates::TemplateData;

pub fn router(state: AppState, config: &Config) -> Router {
    let protected = Router::new()
        .route("/snippet/create", get(snippets::create_form).post(snippets::create))
        .route("/user/logout", post(users::logout))
        .route("/account/view", get(web::account_view))
        .route_layer(from_fn_with_state(state.clone(), require_authentication));

    let dynamic = Router::new()
        .route("/", get(web::home))
        .route("/about", get(web::about))
        .route("/snippet/view/{id}", get(snippets::view))
        .route("/user/signup", get(users::signup_form).post(users::signup))
        .route("/user/login", get(users::login_form).post(users::login))
        .merge(protected)
        .fallback(|| async { AppError::not_found("Page") })
        .layer(from_fn_with_state(state.csrf.clone(), csrf_middleware))
        .layer(from_fn_with_state(state.sessions.clone(), session_middleware))
        .with_state(state);

    let app = dynamic.nest_service("/static", ServeDir::new(&config.static_dir));

    security_headers(app)
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
}

/// Page context every handler starts from. Reading it consumes the flash.
pub(crate) async fn template_data(state: &AppState, session: &Session) -> Result<TemplateData> {
    Ok(TemplateData {
        current_year: Utc::now().year(),
        flash: state.sessions.pop_string(session, TextKey::Flash).await,
        is_authenticated: state.auth.is_authenticated(session).await,
        csrf_token: state.csrf.token_for(session).await?,
        ..TemplateData::default()
    })
}

pub(crate) fn decoded<T>(form: std::result::Result<Form<T>, FormRejection>) -> Result<T> {
    form.map(|Form(value)| value)
        .map_err(|rejection| AppError::bad_request(rejection.body_text()))
}
