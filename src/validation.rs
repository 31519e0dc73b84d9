use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::LazyLock;

pub static EMAIL_RX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("email pattern compiles")
});

pub const BLANK: &str = "This field cannot be blank";
pub const INVALID_EMAIL: &str = "This field must be a valid email address";

/// Collected form errors, rendered back next to the offending inputs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Validator {
    pub field_errors: HashMap<String, String>,
    pub non_field_errors: Vec<String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn valid(&self) -> bool {
        self.field_errors.is_empty() && self.non_field_errors.is_empty()
    }

    /// Keeps the first message recorded for a field.
    pub fn add_field_error(&mut self, field: &str, message: &str) {
        self.field_errors
            .entry(field.to_string())
            .or_insert_with(|| message.to_string());
    }

    pub fn add_non_field_error(&mut self, message: &str) {
        self.non_field_errors.push(message.to_string());
    }

    pub fn check_field(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add_field_error(field, message);
        }
    }
}

pub fn not_blank(value: &str) -> bool {
    !value.trim().is_empty()
}

/// Counts characters, not bytes.
pub fn max_chars(value: &str, n: usize) -> bool {
    value.chars().count() <= n
}

pub fn min_chars(value: &str, n: usize) -> bool {
    value.chars().count() >= n
}

pub fn is_email(value: &str) -> bool {
    EMAIL_RX.is_match(value)
}

pub fn permitted<T: PartialEq>(value: &T, allowed: &[T]) -> bool {
    allowed.contains(value)
}
