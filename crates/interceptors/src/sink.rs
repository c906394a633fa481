//! Destination for structured log records.

use crate::context::CallContext;
use crate::fields::Field;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tracing::{error, info};

/// Target used for events emitted by [`TracingSink`].
pub const LOG_TARGET: &str = "grpc_interceptors";

/// Severity of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Info,
    Error,
}

/// Accepts structured records. Implementations must not buffer in a way
/// that reorders records of the same call.
pub trait LogSink: Send + Sync {
    fn log(&self, ctx: &CallContext, level: Level, message: &str, fields: &[Field]);
}

/// Writes records as `tracing` events.
///
/// `tracing` needs field names at compile time, so the record's fields are
/// rendered as one JSON object under the `fields` key, preceded by the
/// context's own log fields.
///
/// The event records that object as a string. A JSON formatter therefore
/// writes it escaped (`"fields":"{\"grpc.service\":...}"`), and log
/// pipelines have to parse the `fields` value a second time to query it.
/// Implement [`LogSink`] directly when nested output is needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, ctx: &CallContext, level: Level, message: &str, fields: &[Field]) {
        let rendered = render_fields(ctx.log_fields(), fields);
        match level {
            Level::Info => info!(target: LOG_TARGET, fields = %rendered, "{}", message),
            Level::Error => error!(target: LOG_TARGET, fields = %rendered, "{}", message),
        }
    }
}

/// Render context fields followed by record fields as one JSON object.
pub fn render_fields(context: &[Field], record: &[Field]) -> String {
    serde_json::to_string(&Chained(context, record)).unwrap_or_else(|err| err.to_string())
}

struct Chained<'a>(&'a [Field], &'a [Field]);

impl Serialize for Chained<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len() + self.1.len()))?;
        for field in self.0.iter().chain(self.1) {
            map.serialize_entry(field.key.as_ref(), &field.value)?;
        }
        map.end()
    }
}
