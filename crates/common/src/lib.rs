//! Shared configuration and telemetry setup for the gRPC interceptors.

pub mod config;
pub mod telemetry;

pub use config::{InterceptorConfig, LoggingConfig, TelemetryConfig, TimeoutConfig};
pub use telemetry::{init_from_config, init_tracing};
