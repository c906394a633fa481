//! Logging interceptor for unary gRPC calls
//!
//! Each call produces at most two records: an optional "started" record
//! written before the handler runs and a "completed" record written after
//! it returns. Records carry the call's identity fields, its status, and
//! whatever the configured extractors and error handler contribute.

use super::error_handler::default_error_handler;
use super::UnaryServerInfo;
use crate::context::CallContext;
use crate::fields::{
    build_common_fields, extract_service_and_method, Field, FieldValue, FIELD_GRPC_REQUEST,
    FIELD_GRPC_RESPONSE, FIELD_GRPC_STATUS, FIELD_GRPC_STATUS_CODE,
};
use crate::sink::{Level, LogSink, TracingSink};
use crate::status::{code_name, error_code};
use grpc_interceptors_common::config::LoggingConfig;
use std::any::Any;
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tonic::{Code, Status};

/// Placeholder replaced by the short method name in message templates.
pub const METHOD_PLACEHOLDER: &str = "{method}";

pub const DEFAULT_STARTED_MESSAGE: &str = "{method} started";
pub const DEFAULT_COMPLETED_MESSAGE: &str = "{method} completed";
pub const DEFAULT_COMPLETED_ERROR_MESSAGE: &str = "{method} completed with error";

/// What a request extractor hands back.
#[derive(Debug, Clone, Default)]
pub struct RequestExtraction {
    /// Replacement context for the rest of the call.
    pub context: Option<CallContext>,
    /// Loggable representation of the request.
    pub object: Option<FieldValue>,
}

impl RequestExtraction {
    pub fn object(object: FieldValue) -> Self {
        Self {
            context: None,
            object: Some(object),
        }
    }

    pub fn with_context(mut self, context: CallContext) -> Self {
        self.context = Some(context);
        self
    }
}

/// Runs before the handler; an error aborts the call unlogged.
pub type RequestExtractor = Arc<
    dyn Fn(&CallContext, &(dyn Any + Send + Sync)) -> Result<RequestExtraction, Status>
        + Send
        + Sync,
>;

/// Runs on successful responses.
pub type ResponseExtractor =
    Arc<dyn Fn(&CallContext, &(dyn Any + Send + Sync)) -> Option<FieldValue> + Send + Sync>;

/// Turns a failure into extra fields appended to the completion record.
pub type ErrorHandler =
    Arc<dyn Fn(&CallContext, &(dyn Error + 'static)) -> Vec<Field> + Send + Sync>;

/// Configuration of a [`LoggingInterceptor`].
#[derive(Clone)]
pub struct LoggingOptions {
    log_started: bool,
    started_message: String,
    log_completed: bool,
    completed_message: String,
    completed_error_message: String,
    extract_request: Option<RequestExtractor>,
    extract_response: Option<ResponseExtractor>,
    handle_error: Option<ErrorHandler>,
    sink: Arc<dyn LogSink>,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            log_started: false,
            started_message: DEFAULT_STARTED_MESSAGE.to_string(),
            log_completed: true,
            completed_message: DEFAULT_COMPLETED_MESSAGE.to_string(),
            completed_error_message: DEFAULT_COMPLETED_ERROR_MESSAGE.to_string(),
            extract_request: None,
            extract_response: None,
            handle_error: Some(Arc::new(default_error_handler)),
            sink: Arc::new(TracingSink),
        }
    }
}

impl fmt::Debug for LoggingOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingOptions")
            .field("log_started", &self.log_started)
            .field("started_message", &self.started_message)
            .field("log_completed", &self.log_completed)
            .field("completed_message", &self.completed_message)
            .field("completed_error_message", &self.completed_error_message)
            .field("extract_request", &self.extract_request.is_some())
            .field("extract_response", &self.extract_response.is_some())
            .field("handle_error", &self.handle_error.is_some())
            .finish_non_exhaustive()
    }
}

impl LoggingOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a loaded configuration; hooks keep their defaults.
    pub fn from_config(config: &LoggingConfig) -> Self {
        Self::default()
            .with_operation_started(config.log_started)
            .with_operation_completed(config.log_completed)
            .with_started_message(config.started_message.clone())
            .with_completed_message(config.completed_message.clone())
            .with_completed_error_message(config.completed_error_message.clone())
    }

    /// Log a record before the handler runs.
    pub fn with_operation_started(mut self, enable: bool) -> Self {
        self.log_started = enable;
        self
    }

    /// Log a record after successful calls. Failed calls are always logged.
    pub fn with_operation_completed(mut self, enable: bool) -> Self {
        self.log_completed = enable;
        self
    }

    pub fn with_request_extractor<F>(mut self, extractor: F) -> Self
    where
        F: Fn(&CallContext, &(dyn Any + Send + Sync)) -> Result<RequestExtraction, Status>
            + Send
            + Sync
            + 'static,
    {
        self.extract_request = Some(Arc::new(extractor));
        self
    }

    pub fn with_response_extractor<F>(mut self, extractor: F) -> Self
    where
        F: Fn(&CallContext, &(dyn Any + Send + Sync)) -> Option<FieldValue> + Send + Sync + 'static,
    {
        self.extract_response = Some(Arc::new(extractor));
        self
    }

    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&CallContext, &(dyn Error + 'static)) -> Vec<Field> + Send + Sync + 'static,
    {
        self.handle_error = Some(Arc::new(handler));
        self
    }

    /// Drop the error handler; failures then only report their status.
    pub fn without_error_handler(mut self) -> Self {
        self.handle_error = None;
        self
    }

    pub fn with_started_message(mut self, template: impl Into<String>) -> Self {
        self.started_message = template.into();
        self
    }

    pub fn with_completed_message(mut self, template: impl Into<String>) -> Self {
        self.completed_message = template.into();
        self
    }

    pub fn with_completed_error_message(mut self, template: impl Into<String>) -> Self {
        self.completed_error_message = template.into();
        self
    }

    pub fn with_sink(mut self, sink: impl LogSink + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    pub fn log_started(&self) -> bool {
        self.log_started
    }

    pub fn log_completed(&self) -> bool {
        self.log_completed
    }

    pub fn has_request_extractor(&self) -> bool {
        self.extract_request.is_some()
    }

    pub fn has_response_extractor(&self) -> bool {
        self.extract_response.is_some()
    }

    pub fn has_error_handler(&self) -> bool {
        self.handle_error.is_some()
    }
}

/// Logging interceptor
#[derive(Clone, Debug)]
pub struct LoggingInterceptor {
    options: Arc<LoggingOptions>,
}

impl LoggingInterceptor {
    /// Create a new logging interceptor
    pub fn new(options: LoggingOptions) -> Self {
        Self {
            options: Arc::new(options),
        }
    }

    pub fn options(&self) -> &LoggingOptions {
        &self.options
    }

    /// Wrap one unary call.
    ///
    /// A failing request extractor returns its error before anything is
    /// logged or the handler runs. Handler failures are logged and then
    /// returned untouched.
    pub async fn intercept<Req, Resp, E, H, Fut>(
        &self,
        ctx: CallContext,
        req: Req,
        info: &UnaryServerInfo,
        handler: H,
    ) -> Result<Resp, E>
    where
        Req: Any + Send + Sync,
        Resp: Any + Send + Sync,
        E: Error + From<Status> + 'static,
        H: FnOnce(CallContext, Req) -> Fut,
        Fut: Future<Output = Result<Resp, E>>,
    {
        let mut ctx = ctx;
        let mut request_object = None;
        if let Some(extract) = &self.options.extract_request {
            let extraction = extract(&ctx, &req).map_err(E::from)?;
            if let Some(replacement) = extraction.context {
                ctx = replacement;
            }
            request_object = extraction.object;
        }

        let (service, method) = extract_service_and_method(&info.full_method);
        let common_fields = build_common_fields(service, method, &info.full_method);

        self.log_started(&ctx, method, &common_fields, request_object.as_ref());

        let result = handler(ctx.clone(), req).await;

        let response_object = match (&result, &self.options.extract_response) {
            (Ok(resp), Some(extract)) => extract(&ctx, resp),
            _ => None,
        };

        let err = result.as_ref().err().map(|err| err as &(dyn Error + 'static));
        self.log_completed(
            &ctx,
            method,
            common_fields,
            request_object,
            response_object,
            err,
        );

        result
    }

    fn log_started(
        &self,
        ctx: &CallContext,
        method: &str,
        common_fields: &[Field],
        request_object: Option<&FieldValue>,
    ) {
        if !self.options.log_started {
            return;
        }

        let mut fields = common_fields.to_vec();
        if let Some(object) = request_object {
            fields.push(Field::new(FIELD_GRPC_REQUEST, object.clone()));
        }

        let message = render_message(&self.options.started_message, method);
        self.options.sink.log(ctx, Level::Info, &message, &fields);
    }

    fn log_completed(
        &self,
        ctx: &CallContext,
        method: &str,
        mut fields: Vec<Field>,
        request_object: Option<FieldValue>,
        response_object: Option<FieldValue>,
        err: Option<&(dyn Error + 'static)>,
    ) {
        if !self.options.log_completed && err.is_none() {
            return;
        }

        let code = err.map_or(Code::Ok, error_code);
        fields.push(Field::string(FIELD_GRPC_STATUS, code_name(code)));
        fields.push(Field::u64(FIELD_GRPC_STATUS_CODE, code as u64));

        // Already on the started record otherwise.
        if !self.options.log_started {
            if let Some(object) = request_object {
                fields.push(Field::new(FIELD_GRPC_REQUEST, object));
            }
        }

        if let Some(object) = response_object {
            fields.push(Field::new(FIELD_GRPC_RESPONSE, object));
        }

        let (level, template) = match err {
            None => (Level::Info, &self.options.completed_message),
            Some(err) => {
                if let Some(handle_error) = &self.options.handle_error {
                    fields.extend(handle_error(ctx, err));
                }
                (Level::Error, &self.options.completed_error_message)
            }
        };

        let message = render_message(template, method);
        self.options.sink.log(ctx, level, &message, &fields);
    }
}

impl Default for LoggingInterceptor {
    fn default() -> Self {
        Self::new(LoggingOptions::default())
    }
}

fn render_message(template: &str, method: &str) -> String {
    template.replace(METHOD_PLACEHOLDER, method)
}
