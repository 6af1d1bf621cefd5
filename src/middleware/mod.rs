// Middleware modules
pub mod logging;

pub use logging::{request_logging, DiagnosticContext, RequestLoggingOptions};
