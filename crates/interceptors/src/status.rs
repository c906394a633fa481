//! Helpers for reading and building `tonic::Status` values.

use crate::details::ErrorDetail;
use crate::proto;
use bytes::Bytes;
use prost::Message;
use std::error::Error;
use tonic::{Code, Status};

/// Canonical name of a status code, as used in the `grpc.status` field.
pub fn code_name(code: Code) -> &'static str {
    match code {
        Code::Ok => "OK",
        Code::Cancelled => "Canceled",
        Code::Unknown => "Unknown",
        Code::InvalidArgument => "InvalidArgument",
        Code::DeadlineExceeded => "DeadlineExceeded",
        Code::NotFound => "NotFound",
        Code::AlreadyExists => "AlreadyExists",
        Code::PermissionDenied => "PermissionDenied",
        Code::ResourceExhausted => "ResourceExhausted",
        Code::FailedPrecondition => "FailedPrecondition",
        Code::Aborted => "Aborted",
        Code::OutOfRange => "OutOfRange",
        Code::Unimplemented => "Unimplemented",
        Code::Internal => "Internal",
        Code::Unavailable => "Unavailable",
        Code::DataLoss => "DataLoss",
        Code::Unauthenticated => "Unauthenticated",
    }
}

/// Find the `Status` behind an error, looking through its source chain.
pub fn status_from_error<'a>(err: &'a (dyn Error + 'static)) -> Option<&'a Status> {
    let mut current = Some(err);
    while let Some(err) = current {
        if let Some(status) = err.downcast_ref::<Status>() {
            return Some(status);
        }
        current = err.source();
    }
    None
}

/// The code a failure reports. Errors that carry no status are `Unknown`.
pub fn error_code(err: &(dyn Error + 'static)) -> Code {
    status_from_error(err).map_or(Code::Unknown, Status::code)
}

/// Build a status whose details carry the given payloads.
pub fn status_with_details(
    code: Code,
    message: impl Into<String>,
    details: impl IntoIterator<Item = ErrorDetail>,
) -> Status {
    let message = message.into();
    let packed = proto::Status {
        code: code as i32,
        message: message.clone(),
        details: details.into_iter().map(ErrorDetail::into_any).collect(),
    };
    Status::with_details(code, message, Bytes::from(packed.encode_to_vec()))
}
