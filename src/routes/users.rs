use axum::{
    extract::{rejection::FormRejection, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::{hash_password, LOGIN_PATH};
use crate::errors::{AppError, Result};
use crate::models::Credential;
use crate::session::{Session, TextKey};
use crate::state::AppState;
use crate::templates::render;
use crate::validation::{is_email, min_chars, not_blank, Validator, BLANK, INVALID_EMAIL};
use super::{decoded, template_data};

pub const INVALID_LOGIN: &str = "Email or password is incorrect";
pub const EMAIL_TAKEN: &str = "Email address is already in use";
pub const SIGNUP_FLASH: &str = "Your signup was successful. Please log in.";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SignupForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(skip_deserializing)]
    pub validator: Validator,
}

impl SignupForm {
    fn validate(&mut self) {
        let v = &mut self.validator;
        v.check_field(not_blank(&self.name), "name", BLANK);
        v.check_field(not_blank(&self.email), "email", BLANK);
        v.check_field(is_email(&self.email), "email", INVALID_EMAIL);
        v.check_field(not_blank(&self.password), "password", BLANK);
        v.check_field(
            min_chars(&self.password, 8),
            "password",
            "This field must be at least 8 characters long",
        );
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(skip_deserializing)]
    pub validator: Validator,
}

impl LoginForm {
    fn validate(&mut self) {
        let v = &mut self.validator;
        v.check_field(not_blank(&self.email), "email", BLANK);
        v.check_field(is_email(&self.email), "email", INVALID_EMAIL);
        v.check_field(not_blank(&self.password), "password", BLANK);
    }
}

pub async fn signup_form(State(state): State<AppState>, session: Session) -> Result<Response> {
    let data = template_data(&state, &session).await?.with_form(&SignupForm::default());
    render(&state.templates, StatusCode::OK, "signup.html", &data)
}

pub async fn signup(
    State(state): State<AppState>,
    session: Session,
    form: std::result::Result<Form<SignupForm>, FormRejection>,
) -> Result<Response> {
    let mut form = decoded(form)?;
    form.validate();

    if !form.validator.valid() {
        let data = template_data(&state, &session).await?.with_form(&form);
        return render(&state.templates, StatusCode::UNPROCESSABLE_ENTITY, "signup.html", &data);
    }

    let password = form.password.clone();
    let hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::internal(format!("Password task failed: {}", e)))??;

    match state.users.insert(&form.name, &form.email, &hash).await {
        Ok(id) => {
            info!(user_id = id, "Account created");
            state.sessions.put_string(&session, TextKey::Flash, SIGNUP_FLASH).await;
            Ok(Redirect::to(LOGIN_PATH).into_response())
        }
        Err(AppError::DuplicateEmail(_)) => {
            form.validator.add_field_error("email", EMAIL_TAKEN);
            let data = template_data(&state, &session).await?.with_form(&form);
            render(&state.templates, StatusCode::UNPROCESSABLE_ENTITY, "signup.html", &data)
        }
        Err(e) => Err(e),
    }
}

pub async fn login_form(State(state): State<AppState>, session: Session) -> Result<Response> {
    let data = template_data(&state, &session).await?.with_form(&LoginForm::default());
    render(&state.templates, StatusCode::OK, "login.html", &data)
}

pub async fn login(
    State(state): State<AppState>,
    session: Session,
    form: std::result::Result<Form<LoginForm>, FormRejection>,
) -> Result<Response> {
    let mut form = decoded(form)?;
    form.validate();

    if !form.validator.valid() {
        let data = template_data(&state, &session).await?.with_form(&form);
        return render(&state.templates, StatusCode::UNPROCESSABLE_ENTITY, "login.html", &data);
    }

    let credential = Credential::new(form.email.clone(), form.password.clone());
    match state.auth.log_in(&session, &credential).await {
        Ok(target) => Ok(Redirect::to(&target).into_response()),
        Err(AppError::InvalidCredentials) => {
            form.validator.add_non_field_error(INVALID_LOGIN);
            let data = template_data(&state, &session).await?.with_form(&form);
            render(&state.templates, StatusCode::UNPROCESSABLE_ENTITY, "login.html", &data)
        }
        Err(e) => Err(e),
    }
}

pub async fn logout(State(state): State<AppState>, session: Session) -> Result<Response> {
    state.auth.log_out(&session).await?;
    Ok(Redirect::to("/").into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signup_checks_every_field() {
        let mut form = SignupForm {
            email: "not-an-email".into(),
            password: "short".into(),
            ..SignupForm::default()
        };
        form.validate();

        let errors = &form.validator.field_errors;
        assert_eq!(errors["name"], BLANK);
        assert_eq!(errors["email"], INVALID_EMAIL);
        assert_eq!(errors["password"], "This field must be at least 8 characters long");
    }

    #[test]
    fn passwords_never_reach_the_template() {
        let form = LoginForm {
            email: "alice@example.com".into(),
            password: "pa$$word".into(),
            ..LoginForm::default()
        };
        let json = serde_json::to_string(&form).unwrap();
        assert!(json.contains("alice@example.com"));
        assert!(!json.contains("pa$$word"));
    }
}
