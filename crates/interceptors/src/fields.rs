//! Structured log fields.
//!
//! A [`Field`] is a named, typed value destined for a log sink. Records are
//! built as ordered `Vec<Field>`s and the order is kept all the way to the
//! rendered output, so consumers can rely on positional indices.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::borrow::Cow;

pub const FIELD_GRPC_SERVICE: &str = "grpc.service";
pub const FIELD_GRPC_METHOD: &str = "grpc.method";
pub const FIELD_GRPC_FULL_METHOD: &str = "grpc.full_method";
pub const FIELD_GRPC_STATUS: &str = "grpc.status";
pub const FIELD_GRPC_STATUS_CODE: &str = "grpc.status_code";
pub const FIELD_GRPC_REQUEST: &str = "grpc.request";
pub const FIELD_GRPC_RESPONSE: &str = "grpc.response";
pub const FIELD_GRPC_ERROR_MESSAGE: &str = "grpc.error.message";
pub const FIELD_GRPC_ERROR_DETAILS: &str = "grpc.error.details";
pub const FIELD_ERROR: &str = "error";

/// A typed value attached to a [`Field`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    U64(u64),
    I64(i64),
    F64(f64),
    String(String),
    /// Ordered list of named values.
    Object(Vec<Field>),
    Array(Vec<FieldValue>),
}

impl FieldValue {
    /// Build a value from anything serde can serialize.
    ///
    /// Useful inside request/response extractors that want to log a whole
    /// message without writing a field list by hand. Struct fields keep
    /// their declaration order.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Self::from)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::U64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&[Field]> {
        match self {
            Self::Object(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[FieldValue]> {
        match self {
            Self::Array(values) => Some(values),
            _ => None,
        }
    }

    /// Looks up the first field named `key` when this value is an object.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.as_object()
            .and_then(|fields| fields.iter().find(|f| f.key == key))
            .map(|f| &f.value)
    }

    /// Render as a JSON value. Repeated object keys collapse to the last
    /// one; use the `Serialize` impl for exact output.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::U64(v) => serde_json::Value::from(*v),
            Self::I64(v) => serde_json::Value::from(*v),
            Self::F64(v) => serde_json::Value::from(*v),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Object(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|f| (f.key.to_string(), f.value.to_json()))
                    .collect(),
            ),
            Self::Array(values) => {
                serde_json::Value::Array(values.iter().map(FieldValue::to_json).collect())
            }
        }
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(v) = n.as_u64() {
                    Self::U64(v)
                } else if let Some(v) = n.as_i64() {
                    Self::I64(v)
                } else {
                    Self::F64(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(values) => {
                Self::Array(values.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(map) => Self::Object(
                map.into_iter()
                    .map(|(key, value)| Field::new(key, Self::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        Self::U64(u64::from(value))
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        Self::U64(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::I64(value)
    }
}

impl From<Vec<Field>> for FieldValue {
    fn from(fields: Vec<Field>) -> Self {
        Self::Object(fields)
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::U64(v) => serializer.serialize_u64(*v),
            Self::I64(v) => serializer.serialize_i64(*v),
            Self::F64(v) => serializer.serialize_f64(*v),
            Self::String(s) => serializer.serialize_str(s),
            Self::Object(fields) => FieldList(fields).serialize(serializer),
            Self::Array(values) => {
                let mut seq = serializer.serialize_seq(Some(values.len()))?;
                for value in values {
                    seq.serialize_element(value)?;
                }
                seq.end()
            }
        }
    }
}

/// A named structured value.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub key: Cow<'static, str>,
    pub value: FieldValue,
}

impl Field {
    pub fn new(key: impl Into<Cow<'static, str>>, value: impl Into<FieldValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn string(key: impl Into<Cow<'static, str>>, value: impl Into<String>) -> Self {
        Self::new(key, FieldValue::String(value.into()))
    }

    pub fn u64(key: impl Into<Cow<'static, str>>, value: u64) -> Self {
        Self::new(key, FieldValue::U64(value))
    }

    pub fn object(key: impl Into<Cow<'static, str>>, fields: Vec<Field>) -> Self {
        Self::new(key, FieldValue::Object(fields))
    }

    pub fn array(key: impl Into<Cow<'static, str>>, values: Vec<FieldValue>) -> Self {
        Self::new(key, FieldValue::Array(values))
    }
}

/// Serializes a slice of fields as a single map, preserving order.
#[derive(Debug, Clone, Copy)]
pub struct FieldList<'a>(pub &'a [Field]);

impl Serialize for FieldList<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for field in self.0 {
            map.serialize_entry(field.key.as_ref(), &field.value)?;
        }
        map.end()
    }
}

/// Split a full method name (`/package.Service/Method`) into its short
/// service and method names.
///
/// Malformed names never fail; they yield two empty strings.
pub fn extract_service_and_method(full_method: &str) -> (&str, &str) {
    let tail = match full_method.rfind('.') {
        Some(idx) => &full_method[idx + 1..],
        None => full_method,
    };

    let mut tokens = tail.split('/');
    match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(service), Some(method), None) => (service, method),
        _ => ("", ""),
    }
}

/// The identity fields every record of a call starts with.
pub fn build_common_fields(service: &str, method: &str, full_method: &str) -> Vec<Field> {
    // Room for status, request, response and error fields appended later.
    let mut fields = Vec::with_capacity(8);
    fields.push(Field::string(FIELD_GRPC_SERVICE, service));
    fields.push(Field::string(FIELD_GRPC_METHOD, method));
    fields.push(Field::string(FIELD_GRPC_FULL_METHOD, full_method));
    fields
}
