//! Example: logging and deadline interceptors around an in-process handler
//!
//! Run with:
//! cargo run -p grpc-interceptors --example logging_demo
//!
//! Set `GRPC_INTERCEPTORS__TELEMETRY__JSON_LOGGING=true` for JSON output.

use grpc_interceptors::proto::bad_request::FieldViolation;
use grpc_interceptors::proto::BadRequest;
use grpc_interceptors::{
    status_with_details, CallContext, ErrorDetail, FieldValue, LoggingInterceptor, LoggingOptions,
    RequestExtraction, ServerTimeoutInterceptor, UnaryServerInfo,
};
use grpc_interceptors_common::{init_from_config, InterceptorConfig};
use grpc_interceptors_testing::{HelloReply, HelloRequest};
use tonic::{Code, Status};

async fn say_hello(_ctx: CallContext, req: HelloRequest) -> Result<HelloReply, Status> {
    if req.name.is_empty() {
        return Err(status_with_details(
            Code::InvalidArgument,
            "name is required",
            [ErrorDetail::from(BadRequest {
                field_violations: vec![FieldViolation {
                    field: "name".to_string(),
                    description: "must not be empty".to_string(),
                }],
            })],
        ));
    }

    Ok(HelloReply {
        message: format!("Hello {}", req.name),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = InterceptorConfig::load()?;
    init_from_config(&config.telemetry)?;

    let logging = LoggingInterceptor::new(
        LoggingOptions::from_config(&config.logging)
            .with_operation_started(true)
            .with_request_extractor(|_, req| {
                let object = req
                    .downcast_ref::<HelloRequest>()
                    .and_then(|req| FieldValue::from_serialize(req).ok());
                Ok(RequestExtraction {
                    context: None,
                    object,
                })
            })
            .with_response_extractor(|_, resp| {
                resp.downcast_ref::<HelloReply>()
                    .and_then(|reply| FieldValue::from_serialize(reply).ok())
            }),
    );
    let timeout = ServerTimeoutInterceptor::from_config(&config.timeout);
    let info = UnaryServerInfo::from_parts("helloworld.Greeter", "SayHello");

    for name in ["world", ""] {
        let request = HelloRequest {
            name: name.to_string(),
        };
        let result = logging
            .intercept(CallContext::background(), request, &info, |ctx, req| {
                timeout.intercept(ctx, req, &info, say_hello)
            })
            .await;

        match result {
            Ok(reply) => tracing::info!(reply = %reply.message, "Call succeeded"),
            Err(status) => tracing::info!(code = ?status.code(), "Call failed"),
        }
    }

    Ok(())
}
