//! Testing utilities for the gRPC interceptors
//!
//! This crate provides:
//! - A recording [`LogSink`](grpc_interceptors::LogSink) that captures records in memory
//! - Fixtures for requests, responses and `google.rpc` error details
//! - Builders for statuses carrying error details
//! - Property-based strategies for method names
//!
//! # Examples
//!
//! ```
//! use grpc_interceptors::{LoggingInterceptor, LoggingOptions};
//! use grpc_interceptors_testing::RecordingSink;
//!
//! let sink = RecordingSink::new();
//! let interceptor = LoggingInterceptor::new(LoggingOptions::new().with_sink(sink.clone()));
//! assert!(sink.is_empty());
//! # let _ = interceptor;
//! ```

pub mod builders;
pub mod fixtures;
pub mod mocks;

// Re-export commonly used types
pub use builders::*;
pub use fixtures::*;
pub use mocks::*;

// Re-export testing dependencies for convenience
pub use proptest;
