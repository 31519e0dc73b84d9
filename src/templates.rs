use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use minijinja::{path_loader, Environment, Value};
use serde::Serialize;

use crate::errors::Result;
use crate::models::{AccountView, Snippet};

pub fn create_environment(template_dir: &str) -> Environment<'static> {
    let mut env = Environment::new();
    env.set_loader(path_loader(template_dir));
    env.add_filter("human_date", human_date);
    env
}

/// `2024-03-01T09:05:00Z` becomes `01 Mar 2024 at 09:05`. Anything that is
/// not an RFC 3339 timestamp is passed through.
fn human_date(value: String) -> String {
    match DateTime::parse_from_rfc3339(&value) {
        Ok(dt) => dt.with_timezone(&Utc).format("%d %b %Y at %H:%M").to_string(),
        Err(_) => value,
    }
}

/// Context shared by every page.
#[derive(Debug, Default, Serialize)]
pub struct TemplateData {
    pub current_year: i32,
    pub flash: String,
    pub is_authenticated: bool,
    pub csrf_token: String,
    pub form: Option<Value>,
    pub snippet: Option<Snippet>,
    pub snippets: Vec<Snippet>,
    pub user: Option<AccountView>,
}

impl TemplateData {
    pub fn with_form<T: Serialize>(mut self, form: &T) -> Self {
        self.form = Some(Value::from_serialize(form));
        self
    }
}

/// Render to a string first so a failing template never sends half a page.
pub fn render(
    env: &Environment<'static>,
    status: StatusCode,
    page: &str,
    data: &TemplateData,
) -> Result<Response> {
    let template = env.get_template(page)?;
    let html = template.render(data)?;
    Ok((status, Html(html)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_date_formats_utc() {
        assert_eq!(human_date("2024-03-01T09:05:00Z".into()), "01 Mar 2024 at 09:05");
        assert_eq!(
            human_date("2024-03-01T10:05:00.123456+01:00".into()),
            "01 Mar 2024 at 09:05"
        );
        assert_eq!(human_date("yesterday".into()), "yesterday");
    }

    #[test]
    fn missing_template_is_an_error() {
        let env = create_environment("does-not-exist");
        let result = render(&env, StatusCode::OK, "home.html", &TemplateData::default());
        assert!(result.is_err());
    }

    #[test]
    fn form_values_reach_the_template() {
        #[derive(Serialize)]
        struct Form {
            title: &'static str,
        }

        let mut env = Environment::new();
        env.add_filter("human_date", human_date);
        env.add_template("t.html", "{{ form.title }}|{{ csrf_token }}").unwrap();

        let data = TemplateData {
            csrf_token: "tok".into(),
            ..TemplateData::default()
        }
        .with_form(&Form { title: "Hello" });
        let out = env.get_template("t.html").unwrap().render(&data).unwrap();
        assert_eq!(out, "Hello|tok");
    }
}
