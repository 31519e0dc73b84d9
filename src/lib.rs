pub mod auth;
pub mod config;
pub mod database;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod session;
pub mod state;
pub mod templates;
pub mod validation;

pub use config::Config;
pub use errors::{AppError, Result};
pub use routes::router;
pub use state::AppState;
