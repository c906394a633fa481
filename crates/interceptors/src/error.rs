//! Error module

use thiserror::Error;
use tonic::{Code, Status};

/// Failure to interpret the detail payloads attached to a status.
#[derive(Debug, Error)]
pub enum DetailError {
    #[error("Invalid status details: {0}")]
    InvalidStatus(#[from] prost::DecodeError),

    #[error("Invalid `{type_name}` payload: {source}")]
    InvalidPayload {
        type_name: String,
        #[source]
        source: prost::DecodeError,
    },

    #[error("Unknown detail type: {0}")]
    UnknownType(String),
}

/// Failure to parse a `grpc-timeout` header value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeoutHeaderError {
    #[error("grpc-timeout header is empty")]
    Empty,

    #[error("grpc-timeout value has more than 8 digits: {0}")]
    TooLong(String),

    #[error("Invalid grpc-timeout value: {0}")]
    InvalidValue(String),

    #[error("Invalid grpc-timeout unit: {0}")]
    InvalidUnit(char),
}

impl From<TimeoutHeaderError> for Status {
    fn from(err: TimeoutHeaderError) -> Self {
        Status::new(Code::InvalidArgument, err.to_string())
    }
}

pub type DetailResult<T> = Result<T, DetailError>;
