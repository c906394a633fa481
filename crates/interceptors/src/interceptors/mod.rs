//! gRPC interceptors for cross-cutting concerns

pub mod error_handler;
pub mod logging;
pub mod timeout;

pub use error_handler::default_error_handler;
pub use logging::{
    ErrorHandler, LoggingInterceptor, LoggingOptions, RequestExtraction, RequestExtractor,
    ResponseExtractor,
};
pub use timeout::{ClientTimeoutInterceptor, ServerTimeoutInterceptor, DEFAULT_TIMEOUT};

/// What the framework tells a server interceptor about the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnaryServerInfo {
    /// `/package.Service/Method`
    pub full_method: String,
}

impl UnaryServerInfo {
    pub fn new(full_method: impl Into<String>) -> Self {
        Self {
            full_method: full_method.into(),
        }
    }

    /// Build from a fully-qualified service name and a method name.
    pub fn from_parts(service: &str, method: &str) -> Self {
        Self::new(format!("/{service}/{method}"))
    }
}
