//! In-memory log sink for asserting on interceptor output.

use grpc_interceptors::{CallContext, Field, FieldValue, Level, LogSink};
use parking_lot::RwLock;
use std::sync::Arc;

/// One record captured by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub level: Level,
    pub message: String,
    pub fields: Vec<Field>,
    /// Log fields carried by the context the record was written with.
    pub context_fields: Vec<Field>,
}

impl LogRecord {
    /// Value of the first field named `key`.
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|field| field.key == key)
            .map(|field| &field.value)
    }

    pub fn has_field(&self, key: &str) -> bool {
        self.field(key).is_some()
    }

    /// Field keys in the order they were written.
    pub fn keys(&self) -> Vec<&str> {
        self.fields.iter().map(|field| field.key.as_ref()).collect()
    }

    /// How many times `key` occurs.
    pub fn count(&self, key: &str) -> usize {
        self.fields.iter().filter(|field| field.key == key).count()
    }

    /// Fields serialized as a JSON object, in order.
    pub fn to_json(&self) -> serde_json::Value {
        FieldValue::Object(self.fields.clone()).to_json()
    }
}

/// Sink that keeps every record. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    records: Arc<RwLock<Vec<LogRecord>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.read().clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn last(&self) -> Option<LogRecord> {
        self.records.read().last().cloned()
    }

    pub fn clear(&self) {
        self.records.write().clear();
    }
}

impl LogSink for RecordingSink {
    fn log(&self, ctx: &CallContext, level: Level, message: &str, fields: &[Field]) {
        self.records.write().push(LogRecord {
            level,
            message: message.to_string(),
            fields: fields.to_vec(),
            context_fields: ctx.log_fields().to_vec(),
        });
    }
}
