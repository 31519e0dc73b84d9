use axum::{
    extract::{rejection::FormRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, Result};
use crate::session::{Session, TextKey};
use crate::state::AppState;
use crate::templates::render;
use crate::validation::{max_chars, not_blank, permitted, Validator, BLANK};
use super::{decoded, template_data};

const EXPIRY_CHOICES: [i32; 3] = [1, 7, 365];

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SnippetCreateForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub expires: i32,
    #[serde(skip_deserializing)]
    pub validator: Validator,
}

impl SnippetCreateForm {
    fn validate(&mut self) {
        let v = &mut self.validator;
        v.check_field(not_blank(&self.title), "title", BLANK);
        v.check_field(
            max_chars(&self.title, 100),
            "title",
            "This field cannot be more than 100 characters long",
        );
        v.check_field(not_blank(&self.content), "content", BLANK);
        v.check_field(
            permitted(&self.expires, &EXPIRY_CHOICES),
            "expires",
            "This field must equal 1, 7 or 365",
        );
    }
}

pub async fn view(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Response> {
    let id = id
        .parse::<i32>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::not_found("Snippet"))?;

    let snippet = state
        .snippets
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found("Snippet"))?;

    let mut data = template_data(&state, &session).await?;
    data.snippet = Some(snippet);
    render(&state.templates, StatusCode::OK, "view.html", &data)
}

pub async fn create_form(State(state): State<AppState>, session: Session) -> Result<Response> {
    let form = SnippetCreateForm {
        expires: 365,
        ..SnippetCreateForm::default()
    };
    let data = template_data(&state, &session).await?.with_form(&form);
    render(&state.templates, StatusCode::OK, "create.html", &data)
}

pub async fn create(
    State(state): State<AppState>,
    session: Session,
    form: std::result::Result<Form<SnippetCreateForm>, FormRejection>,
) -> Result<Response> {
    let mut form = decoded(form)?;
    form.validate();

    if !form.validator.valid() {
        let data = template_data(&state, &session).await?.with_form(&form);
        return render(&state.templates, StatusCode::OK, "create.html", &data);
    }

    let id = state
        .snippets
        .insert(&form.title, &form.content, form.expires)
        .await?;

    state
        .sessions
        .put_string(&session, TextKey::Flash, "Snippet successfully created!")
        .await;
    Ok(Redirect::to(&format!("/snippet/view/{}", id)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_messages() {
        let mut form = SnippetCreateForm {
            title: "x".repeat(101),
            content: "  ".into(),
            expires: 30,
            ..SnippetCreateForm::default()
        };
        form.validate();

        let errors = &form.validator.field_errors;
        assert_eq!(errors["title"], "This field cannot be more than 100 characters long");
        assert_eq!(errors["content"], BLANK);
        assert_eq!(errors["expires"], "This field must equal 1, 7 or 365");
    }

    #[test]
    fn well_formed_snippet_passes() {
        let mut form = SnippetCreateForm {
            title: "O snail".into(),
            content: "Climb Mount Fuji".into(),
            expires: 7,
            ..SnippetCreateForm::default()
        };
        form.validate();
        assert!(form.validator.valid());
    }
}
