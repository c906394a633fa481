//! Typed error-detail encoding.
//!
//! A failed call can carry `google.rpc` detail payloads packed as
//! `google.protobuf.Any` values. [`ErrorDetail`] decodes the ten well-known
//! kinds into typed variants and keeps anything else as
//! [`ErrorDetail::Other`]; [`ErrorDetail::encode`] turns each variant into a
//! structured log object that starts with a `$type` discriminator.

use crate::error::{DetailError, DetailResult};
use crate::fields::{Field, FieldValue};
use crate::proto;
use bytes::Buf;
use prost::encoding::{decode_key, decode_varint, WireType};
use prost::Message;
use prost_types::Any;
use tonic::Status;
use tracing::{debug, warn};

/// Discriminator key present on every encoded detail.
pub const FIELD_TYPE: &str = "$type";

const GOOGLE_RPC_PREFIX: &str = "google.rpc.";

/// Type URL prefix of the well-known detail kinds.
pub const DETAIL_TYPE_URL_PREFIX: &str = "type.googleapis.com/google.rpc.";

/// A detail payload attached to a status.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorDetail {
    BadRequest(proto::BadRequest),
    QuotaFailure(proto::QuotaFailure),
    RequestInfo(proto::RequestInfo),
    ResourceInfo(proto::ResourceInfo),
    DebugInfo(proto::DebugInfo),
    Help(proto::Help),
    LocalizedMessage(proto::LocalizedMessage),
    PreconditionFailure(proto::PreconditionFailure),
    RetryInfo(proto::RetryInfo),
    ErrorInfo(proto::ErrorInfo),
    /// Any payload that is not one of the well-known kinds, or that failed
    /// to decode as the kind its type URL claims.
    Other(Any),
}

macro_rules! known_details {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<proto::$variant> for ErrorDetail {
                fn from(detail: proto::$variant) -> Self {
                    ErrorDetail::$variant(detail)
                }
            }
        )*

        impl ErrorDetail {
            /// Decode a packed payload, failing on unknown or corrupt kinds.
            pub fn try_from_any(any: &Any) -> DetailResult<Self> {
                let full_name = full_name_from_type_url(&any.type_url);
                let short_name = full_name
                    .strip_prefix(GOOGLE_RPC_PREFIX)
                    .ok_or_else(|| DetailError::UnknownType(full_name.to_string()))?;

                match short_name {
                    $(
                        stringify!($variant) => {
                            proto::$variant::decode(any.value.as_slice())
                                .map(ErrorDetail::$variant)
                                .map_err(|source| DetailError::InvalidPayload {
                                    type_name: full_name.to_string(),
                                    source,
                                })
                        }
                    )*
                    _ => Err(DetailError::UnknownType(full_name.to_string())),
                }
            }

            /// Pack the detail back into an `Any`.
            pub fn into_any(self) -> Any {
                match self {
                    $(
                        ErrorDetail::$variant(detail) => Any {
                            type_url: format!("{}{}", DETAIL_TYPE_URL_PREFIX, stringify!($variant)),
                            value: detail.encode_to_vec(),
                        },
                    )*
                    ErrorDetail::Other(any) => any,
                }
            }

            /// Canonical type name used as the `$type` discriminator: the short
            /// message name for known kinds, the full name otherwise.
            pub fn type_name(&self) -> &str {
                match self {
                    $(ErrorDetail::$variant(_) => stringify!($variant),)*
                    ErrorDetail::Other(any) => full_name_from_type_url(&any.type_url),
                }
            }
        }
    };
}

known_details!(
    BadRequest,
    QuotaFailure,
    RequestInfo,
    ResourceInfo,
    DebugInfo,
    Help,
    LocalizedMessage,
    PreconditionFailure,
    RetryInfo,
    ErrorInfo,
);

impl ErrorDetail {
    /// Decode a packed payload. Never fails: anything that cannot be decoded
    /// as a known kind is kept as [`ErrorDetail::Other`].
    pub fn from_any(any: Any) -> Self {
        match Self::try_from_any(&any) {
            Ok(detail) => detail,
            Err(err) => {
                debug!(type_url = %any.type_url, error = %err, "Keeping detail payload as opaque");
                ErrorDetail::Other(any)
            }
        }
    }

    /// Encode as a structured log object.
    pub fn encode(&self) -> FieldValue {
        let mut fields = vec![Field::string(FIELD_TYPE, self.type_name())];

        match self {
            ErrorDetail::BadRequest(v) => {
                let violations = v
                    .field_violations
                    .iter()
                    .map(|violation| {
                        FieldValue::Object(vec![
                            Field::string("field", &violation.field),
                            Field::string("description", &violation.description),
                        ])
                    })
                    .collect();
                fields.push(Field::array("field_violations", violations));
            }
            ErrorDetail::QuotaFailure(v) => {
                let violations = v
                    .violations
                    .iter()
                    .map(|violation| {
                        FieldValue::Object(vec![
                            Field::string("subject", &violation.subject),
                            Field::string("description", &violation.description),
                        ])
                    })
                    .collect();
                fields.push(Field::array("violations", violations));
            }
            ErrorDetail::RequestInfo(v) => {
                fields.push(Field::string("request_id", &v.request_id));
                fields.push(Field::string("serving_data", &v.serving_data));
            }
            ErrorDetail::ResourceInfo(v) => {
                fields.push(Field::string("resource_type", &v.resource_type));
                fields.push(Field::string("resource_name", &v.resource_name));
                fields.push(Field::string("owner", &v.owner));
                fields.push(Field::string("description", &v.description));
            }
            ErrorDetail::DebugInfo(v) => {
                let entries = v
                    .stack_entries
                    .iter()
                    .map(|entry| FieldValue::String(entry.clone()))
                    .collect();
                fields.push(Field::array("stack_entries", entries));
                fields.push(Field::string("detail", &v.detail));
            }
            ErrorDetail::Help(v) => {
                let links = v
                    .links
                    .iter()
                    .map(|link| {
                        FieldValue::Object(vec![
                            Field::string("description", &link.description),
                            Field::string("url", &link.url),
                        ])
                    })
                    .collect();
                fields.push(Field::array("links", links));
            }
            ErrorDetail::LocalizedMessage(v) => {
                fields.push(Field::string("locale", &v.locale));
                fields.push(Field::string("message", &v.message));
            }
            ErrorDetail::PreconditionFailure(v) => {
                let violations = v
                    .violations
                    .iter()
                    .map(|violation| {
                        FieldValue::Object(vec![
                            Field::string("type", &violation.r#type),
                            Field::string("subject", &violation.subject),
                            Field::string("description", &violation.description),
                        ])
                    })
                    .collect();
                fields.push(Field::array("violations", violations));
            }
            ErrorDetail::RetryInfo(v) => {
                fields.push(Field::string(
                    "retry_delay",
                    format_duration(v.retry_delay.as_ref()),
                ));
            }
            ErrorDetail::ErrorInfo(v) => {
                fields.push(Field::string("reason", &v.reason));
                fields.push(Field::string("domain", &v.domain));
                // HashMap iteration order; consumers must not rely on it.
                for (key, value) in &v.metadata {
                    fields.push(Field::string(format!("metadata.{key}"), value));
                }
            }
            ErrorDetail::Other(any) => fields.extend(reflect_payload(&any.value)),
        }

        FieldValue::Object(fields)
    }
}

/// Encode a detail sequence as one array value, keeping its order.
pub fn encode_error_details(details: &[ErrorDetail]) -> FieldValue {
    FieldValue::Array(details.iter().map(ErrorDetail::encode).collect())
}

/// Decode the detail payloads carried by a status.
pub fn try_error_details(status: &Status) -> DetailResult<Vec<ErrorDetail>> {
    let raw = status.details();
    if raw.is_empty() {
        return Ok(Vec::new());
    }

    let decoded = proto::Status::decode(raw)?;
    Ok(decoded.details.into_iter().map(ErrorDetail::from_any).collect())
}

/// Like [`try_error_details`], but treats undecodable details as absent.
pub fn error_details(status: &Status) -> Vec<ErrorDetail> {
    try_error_details(status).unwrap_or_else(|err| {
        warn!(error = %err, "Ignoring undecodable status details");
        Vec::new()
    })
}

fn full_name_from_type_url(type_url: &str) -> &str {
    match type_url.rfind('/') {
        Some(idx) => &type_url[idx + 1..],
        None => type_url,
    }
}

fn format_duration(duration: Option<&prost_types::Duration>) -> String {
    let Some(duration) = duration else {
        return format!("{:?}", std::time::Duration::ZERO);
    };

    let negative = duration.seconds < 0 || duration.nanos < 0;
    let magnitude =
        std::time::Duration::new(duration.seconds.unsigned_abs(), duration.nanos.unsigned_abs());
    if negative {
        format!("-{magnitude:?}")
    } else {
        format!("{magnitude:?}")
    }
}

/// Best-effort view of a payload whose schema is unknown: one field per
/// protobuf field number, falling back to the raw bytes in hex.
fn reflect_payload(bytes: &[u8]) -> Vec<Field> {
    match reflect_wire_fields(bytes) {
        Some(fields) => fields,
        None => vec![Field::string("value", hex::encode(bytes))],
    }
}

fn reflect_wire_fields(mut buf: &[u8]) -> Option<Vec<Field>> {
    let mut entries: Vec<(u32, Vec<FieldValue>)> = Vec::new();

    while buf.has_remaining() {
        let (tag, wire_type) = decode_key(&mut buf).ok()?;
        let value = match wire_type {
            WireType::Varint => FieldValue::U64(decode_varint(&mut buf).ok()?),
            WireType::SixtyFourBit => {
                if buf.remaining() < 8 {
                    return None;
                }
                FieldValue::U64(buf.get_u64_le())
            }
            WireType::ThirtyTwoBit => {
                if buf.remaining() < 4 {
                    return None;
                }
                FieldValue::U64(u64::from(buf.get_u32_le()))
            }
            WireType::LengthDelimited => {
                let len = usize::try_from(decode_varint(&mut buf).ok()?).ok()?;
                if buf.remaining() < len {
                    return None;
                }
                let (chunk, rest) = buf.split_at(len);
                buf = rest;
                match std::str::from_utf8(chunk) {
                    Ok(text) => FieldValue::String(text.to_string()),
                    Err(_) => FieldValue::String(hex::encode(chunk)),
                }
            }
            WireType::StartGroup | WireType::EndGroup => return None,
        };

        match entries.iter_mut().find(|(seen, _)| *seen == tag) {
            Some((_, values)) => values.push(value),
            None => entries.push((tag, vec![value])),
        }
    }

    Some(
        entries
            .into_iter()
            .map(|(tag, mut values)| {
                let value = if values.len() == 1 {
                    values.remove(0)
                } else {
                    FieldValue::Array(values)
                };
                Field::new(tag.to_string(), value)
            })
            .collect(),
    )
}
