//! Fluent builders for statuses that carry error details.

use grpc_interceptors::{status_with_details, ErrorDetail};
use prost_types::Any;
use tonic::{Code, Status};

/// Builder for [`Status`] values with attached detail payloads
#[derive(Debug, Clone)]
pub struct StatusBuilder {
    code: Code,
    message: String,
    details: Vec<ErrorDetail>,
}

impl StatusBuilder {
    pub fn new(code: Code) -> Self {
        Self {
            code,
            message: String::new(),
            details: Vec::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_detail(mut self, detail: impl Into<ErrorDetail>) -> Self {
        self.details.push(detail.into());
        self
    }

    pub fn with_details(mut self, details: impl IntoIterator<Item = ErrorDetail>) -> Self {
        self.details.extend(details);
        self
    }

    /// Attach a raw payload, e.g. one of a kind the interceptors do not know.
    pub fn with_any(mut self, type_url: impl Into<String>, value: Vec<u8>) -> Self {
        self.details.push(ErrorDetail::Other(Any {
            type_url: type_url.into(),
            value,
        }));
        self
    }

    pub fn build(self) -> Status {
        status_with_details(self.code, self.message, self.details)
    }
}
