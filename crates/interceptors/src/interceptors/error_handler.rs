//! Default error handler for the logging interceptor.

use crate::context::CallContext;
use crate::details::{encode_error_details, error_details};
use crate::fields::{Field, FIELD_ERROR, FIELD_GRPC_ERROR_DETAILS, FIELD_GRPC_ERROR_MESSAGE};
use crate::status::{code_name, status_from_error};
use std::error::Error;
use tonic::Status;

/// Fields describing a failed call: the error text, then the status message
/// and encoded detail payloads when the failure carries a status.
pub fn default_error_handler(_ctx: &CallContext, err: &(dyn Error + 'static)) -> Vec<Field> {
    let mut fields = vec![Field::string(FIELD_ERROR, error_text(err))];

    if let Some(status) = status_from_error(err) {
        fields.push(Field::string(FIELD_GRPC_ERROR_MESSAGE, status.message()));

        let details = error_details(status);
        if !details.is_empty() {
            fields.push(Field::new(
                FIELD_GRPC_ERROR_DETAILS,
                encode_error_details(&details),
            ));
        }
    }

    fields
}

fn error_text(err: &(dyn Error + 'static)) -> String {
    match err.downcast_ref::<Status>() {
        Some(status) => format!(
            "rpc error: code = {} desc = {}",
            code_name(status.code()),
            status.message()
        ),
        None => err.to_string(),
    }
}
