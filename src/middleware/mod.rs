pub mod csrf;
pub mod headers;

pub use csrf::{csrf_middleware, CsrfGuard, CSRF_HEADER};
pub use headers::security_headers;
