use std::fmt;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug)]
pub enum AppError {
    // Authentication and password errors
    InvalidCredentials,
    ArgonError(argon2::Error),
    PasswordHashError(argon2::password_hash::Error),
    MalformedHash(String),

    // Request integrity errors
    CsrfMismatch,
    BadRequest(String),

    // Storage errors
    StoreUnavailable(String),
    DatabaseError(String),
    DuplicateEmail(String),
    NotFound(String),

    // Rendering and setup errors
    TemplateError(String),
    ConfigurationError(String),
    InternalServerError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AppError::InvalidCredentials => write!(f, "Invalid credentials"),
            AppError::ArgonError(e) => write!(f, "Argon2 error: {}", e),
            AppError::PasswordHashError(e) => write!(f, "Password hash error: {}", e),
            AppError::MalformedHash(msg) => write!(f, "Malformed password hash: {}", msg),

            AppError::CsrfMismatch => write!(f, "CSRF token missing or invalid"),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),

            AppError::StoreUnavailable(msg) => write!(f, "Session store unavailable: {}", msg),
            AppError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppError::DuplicateEmail(email) => write!(f, "Email address already in use: {}", email),
            AppError::NotFound(resource) => write!(f, "Resource not found: {}", resource),

            AppError::TemplateError(msg) => write!(f, "Template error: {}", msg),
            AppError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::InternalServerError(msg) => write!(f, "Internal server error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    /// Status code sent to the client for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidCredentials | AppError::DuplicateEmail(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::CsrfMismatch | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ArgonError(_)
            | AppError::PasswordHashError(_)
            | AppError::MalformedHash(_)
            | AppError::StoreUnavailable(_)
            | AppError::DatabaseError(_)
            | AppError::TemplateError(_)
            | AppError::ConfigurationError(_)
            | AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the error describes a server-side failure rather than a bad request.
    pub fn is_internal(&self) -> bool {
        self.status().is_server_error()
    }
}

// Internal detail stays in the log; the client only ever sees the status text.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if self.is_internal() {
            tracing::error!(status = %status, error = %self, "request failed");
        } else {
            tracing::warn!(status = %status, error = %self, "request rejected");
        }

        let body = status.canonical_reason().unwrap_or("Error").to_string();
        (status, body).into_response()
    }
}

impl AppError {
    /// Create a bad request error
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// Create a not found error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    /// Create a session store error
    pub fn store_unavailable(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::DatabaseError(msg.into())
    }

    /// Create an internal server error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalServerError(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigurationError(msg.into())
    }
}

// Conversion from database errors
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("Record".to_string()),
            _ => Self::DatabaseError(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::DatabaseError(format!("migration failed: {}", err))
    }
}

// Redis only backs the session store
impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}

// Conversion from argon2 errors
impl From<argon2::Error> for AppError {
    fn from(err: argon2::Error) -> Self {
        Self::ArgonError(err)
    }
}

impl From<argon2::password_hash::Error> for AppError {
    fn from(err: argon2::password_hash::Error) -> Self {
        Self::PasswordHashError(err)
    }
}

impl From<minijinja::Error> for AppError {
    fn from(err: minijinja::Error) -> Self {
        Self::TemplateError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_hide_detail_from_client() {
        let err = AppError::store_unavailable("redis://10.0.0.3 refused connection");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.is_internal());

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn user_facing_errors_map_to_client_statuses() {
        assert_eq!(AppError::InvalidCredentials.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(AppError::CsrfMismatch.status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::not_found("Snippet").status(), StatusCode::NOT_FOUND);
        assert!(!AppError::CsrfMismatch.is_internal());
    }

    #[test]
    fn malformed_hash_is_internal() {
        assert!(AppError::MalformedHash("not a phc string".into()).is_internal());
    }
}
