//! Logging and deadline interceptors for unary gRPC calls.
//!
//! This crate provides two families of middleware for tonic services:
//! - A logging interceptor writing "started"/"completed" structured records,
//!   with pluggable request/response extractors and an error handler that
//!   encodes `google.rpc` error details
//! - Deadline interceptors (server and client) that bound every call with a
//!   default timeout when the caller did not set one

pub mod context;
pub mod details;
pub mod error;
pub mod fields;
pub mod interceptors;
pub mod sink;
pub mod status;

/// `google.rpc` status and error-detail messages.
pub use tonic_types::pb as proto;

pub use context::{CallContext, ScopedContext};
pub use details::{encode_error_details, error_details, ErrorDetail};
pub use error::{DetailError, TimeoutHeaderError};
pub use fields::{build_common_fields, extract_service_and_method, Field, FieldValue};
pub use interceptors::{
    ClientTimeoutInterceptor, LoggingInterceptor, LoggingOptions, RequestExtraction,
    ServerTimeoutInterceptor, UnaryServerInfo,
};
pub use sink::{Level, LogSink, TracingSink};
pub use status::{code_name, status_from_error, status_with_details};
