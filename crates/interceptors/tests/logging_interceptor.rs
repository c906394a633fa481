//! End-to-end behaviour of the logging interceptor against a recording sink.

use grpc_interceptors::fields::{
    FIELD_ERROR, FIELD_GRPC_ERROR_DETAILS, FIELD_GRPC_ERROR_MESSAGE, FIELD_GRPC_FULL_METHOD,
    FIELD_GRPC_METHOD, FIELD_GRPC_REQUEST, FIELD_GRPC_RESPONSE, FIELD_GRPC_SERVICE,
    FIELD_GRPC_STATUS, FIELD_GRPC_STATUS_CODE,
};
use grpc_interceptors::{
    CallContext, Field, FieldValue, Level, LoggingInterceptor, LoggingOptions, RequestExtraction,
    UnaryServerInfo,
};
use grpc_interceptors_common::config::InterceptorConfig;
use grpc_interceptors_testing::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tonic::{Code, Status};

fn interceptor(options: LoggingOptions) -> (LoggingInterceptor, RecordingSink) {
    let sink = RecordingSink::new();
    (LoggingInterceptor::new(options.with_sink(sink.clone())), sink)
}

fn request_as_json(_: &CallContext, req: &(dyn std::any::Any + Send + Sync)) -> Result<RequestExtraction, Status> {
    let req = req
        .downcast_ref::<HelloRequest>()
        .ok_or_else(|| Status::internal("unexpected request type"))?;
    let object = FieldValue::from_serialize(req).map_err(|err| Status::internal(err.to_string()))?;
    Ok(RequestExtraction::object(object))
}

fn response_as_json(_: &CallContext, resp: &(dyn std::any::Any + Send + Sync)) -> Option<FieldValue> {
    resp.downcast_ref::<HelloReply>()
        .and_then(|reply| FieldValue::from_serialize(reply).ok())
}

async fn say_hello(_ctx: CallContext, req: HelloRequest) -> Result<HelloReply, Status> {
    Ok(create_test_reply(&req))
}

#[tokio::test]
async fn test_start_and_completion_records() {
    let (interceptor, sink) = interceptor(LoggingOptions::new().with_operation_started(true));

    let reply = interceptor
        .intercept(
            CallContext::background(),
            create_test_request(),
            &create_test_server_info(),
            say_hello,
        )
        .await
        .unwrap();
    assert_eq!(reply.message, "Hello world");

    let records = sink.records();
    assert_eq!(records.len(), 2);

    let started = &records[0];
    assert_eq!(started.level, Level::Info);
    assert_eq!(started.message, "SayHello started");
    assert_eq!(
        started.keys(),
        vec![FIELD_GRPC_SERVICE, FIELD_GRPC_METHOD, FIELD_GRPC_FULL_METHOD]
    );
    assert_eq!(started.field(FIELD_GRPC_SERVICE).and_then(FieldValue::as_str), Some("Greeter"));
    assert_eq!(
        started.field(FIELD_GRPC_FULL_METHOD).and_then(FieldValue::as_str),
        Some(GREETER_SAY_HELLO)
    );

    let completed = &records[1];
    assert_eq!(completed.level, Level::Info);
    assert_eq!(completed.message, "SayHello completed");
    assert_eq!(
        completed.keys(),
        vec![
            FIELD_GRPC_SERVICE,
            FIELD_GRPC_METHOD,
            FIELD_GRPC_FULL_METHOD,
            FIELD_GRPC_STATUS,
            FIELD_GRPC_STATUS_CODE,
        ]
    );
    assert_eq!(completed.field(FIELD_GRPC_STATUS).and_then(FieldValue::as_str), Some("OK"));
    assert_eq!(completed.field(FIELD_GRPC_STATUS_CODE).and_then(FieldValue::as_u64), Some(0));
}

#[tokio::test]
async fn test_extractors_populate_request_and_response() {
    let (interceptor, sink) = interceptor(
        LoggingOptions::new()
            .with_operation_started(true)
            .with_request_extractor(request_as_json)
            .with_response_extractor(response_as_json),
    );

    interceptor
        .intercept(
            CallContext::background(),
            create_test_request(),
            &create_test_server_info(),
            say_hello,
        )
        .await
        .unwrap();

    let records = sink.records();
    assert_eq!(records.len(), 2);

    let started = &records[0];
    assert_eq!(started.keys().last(), Some(&FIELD_GRPC_REQUEST));
    assert_eq!(
        started.field(FIELD_GRPC_REQUEST).map(FieldValue::to_json),
        Some(serde_json::json!({"name": "world"}))
    );

    // The request is on the started record, so the completion record only
    // carries the response.
    let completed = &records[1];
    assert_eq!(completed.count(FIELD_GRPC_REQUEST), 0);
    assert_eq!(completed.keys().last(), Some(&FIELD_GRPC_RESPONSE));
    assert_eq!(
        completed.field(FIELD_GRPC_RESPONSE).map(FieldValue::to_json),
        Some(serde_json::json!({"message": "Hello world"}))
    );
}

#[tokio::test]
async fn test_request_on_completion_record_when_start_disabled() {
    let (interceptor, sink) = interceptor(
        LoggingOptions::new()
            .with_request_extractor(request_as_json)
            .with_response_extractor(response_as_json),
    );

    interceptor
        .intercept(
            CallContext::background(),
            create_test_request(),
            &create_test_server_info(),
            say_hello,
        )
        .await
        .unwrap();

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].keys(),
        vec![
            FIELD_GRPC_SERVICE,
            FIELD_GRPC_METHOD,
            FIELD_GRPC_FULL_METHOD,
            FIELD_GRPC_STATUS,
            FIELD_GRPC_STATUS_CODE,
            FIELD_GRPC_REQUEST,
            FIELD_GRPC_RESPONSE,
        ]
    );
    assert_eq!(records[0].count(FIELD_GRPC_REQUEST), 1);
}

#[tokio::test]
async fn test_nothing_logged_when_both_records_disabled() {
    let (interceptor, sink) = interceptor(
        LoggingOptions::new()
            .with_operation_started(false)
            .with_operation_completed(false),
    );

    interceptor
        .intercept(
            CallContext::background(),
            create_test_request(),
            &create_test_server_info(),
            say_hello,
        )
        .await
        .unwrap();

    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_failure_logged_even_when_completion_disabled() {
    let (interceptor, sink) = interceptor(LoggingOptions::new().with_operation_completed(false));

    let result: Result<HelloReply, Status> = interceptor
        .intercept(
            CallContext::background(),
            create_test_request(),
            &create_test_server_info(),
            |_, _| async { Err(Status::unavailable("backend down")) },
        )
        .await;

    assert_eq!(result.unwrap_err().code(), Code::Unavailable);

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].level, Level::Error);
    assert_eq!(records[0].message, "SayHello completed with error");
    assert_eq!(
        records[0].field(FIELD_GRPC_STATUS).and_then(FieldValue::as_str),
        Some("Unavailable")
    );
}

#[tokio::test]
async fn test_failure_with_request_info_detail() {
    let (interceptor, sink) = interceptor(LoggingOptions::new());

    let result: Result<HelloReply, Status> = interceptor
        .intercept(
            CallContext::background(),
            create_test_request(),
            &create_test_server_info(),
            |_, _| async {
                Err(StatusBuilder::new(Code::NotFound)
                    .with_message("greeting not found")
                    .with_detail(create_test_request_info())
                    .build())
            },
        )
        .await;

    let err = result.unwrap_err();
    assert_eq!(err.code(), Code::NotFound);
    assert_eq!(err.message(), "greeting not found");

    let record = sink.last().unwrap();
    assert_eq!(record.level, Level::Error);
    assert_eq!(record.message, "SayHello completed with error");
    assert_eq!(
        record.keys(),
        vec![
            FIELD_GRPC_SERVICE,
            FIELD_GRPC_METHOD,
            FIELD_GRPC_FULL_METHOD,
            FIELD_GRPC_STATUS,
            FIELD_GRPC_STATUS_CODE,
            FIELD_ERROR,
            FIELD_GRPC_ERROR_MESSAGE,
            FIELD_GRPC_ERROR_DETAILS,
        ]
    );
    assert_eq!(record.field(FIELD_GRPC_STATUS).and_then(FieldValue::as_str), Some("NotFound"));
    assert_eq!(record.field(FIELD_GRPC_STATUS_CODE).and_then(FieldValue::as_u64), Some(5));
    assert_eq!(
        record.field(FIELD_ERROR).and_then(FieldValue::as_str),
        Some("rpc error: code = NotFound desc = greeting not found")
    );
    assert_eq!(
        record.field(FIELD_GRPC_ERROR_MESSAGE).and_then(FieldValue::as_str),
        Some("greeting not found")
    );
    assert_eq!(
        record.field(FIELD_GRPC_ERROR_DETAILS).map(FieldValue::to_json),
        Some(serde_json::json!([{
            "$type": "RequestInfo",
            "request_id": "req-42",
            "serving_data": "shard-7",
        }]))
    );
}

#[tokio::test]
async fn test_failure_with_bad_request_violations() {
    let (interceptor, sink) = interceptor(LoggingOptions::new());

    let _: Result<HelloReply, Status> = interceptor
        .intercept(
            CallContext::background(),
            create_test_request(),
            &create_test_server_info(),
            |_, _| async {
                Err(StatusBuilder::new(Code::InvalidArgument)
                    .with_message("bad greeting")
                    .with_detail(create_test_bad_request(3))
                    .build())
            },
        )
        .await;

    let record = sink.last().unwrap();
    let details = record
        .field(FIELD_GRPC_ERROR_DETAILS)
        .and_then(FieldValue::as_array)
        .unwrap();
    assert_eq!(details.len(), 1);

    let violations = details[0]
        .get("field_violations")
        .and_then(FieldValue::as_array)
        .unwrap();
    assert_eq!(violations.len(), 3);
    assert_eq!(
        violations[1].to_json(),
        serde_json::json!({"field": "field_1", "description": "field_1 is invalid"})
    );
}

#[tokio::test]
async fn test_wrapped_status_error_passes_through() {
    let (interceptor, sink) = interceptor(LoggingOptions::new());

    let result: Result<HelloReply, GreeterError> = interceptor
        .intercept(
            CallContext::background(),
            create_test_request(),
            &create_test_server_info(),
            |_, _| async { Err(GreeterError::Rpc(Status::permission_denied("nope"))) },
        )
        .await;

    match result {
        Err(GreeterError::Rpc(status)) => assert_eq!(status.code(), Code::PermissionDenied),
        other => panic!("unexpected result: {:?}", other),
    }

    let record = sink.last().unwrap();
    assert_eq!(record.field(FIELD_GRPC_STATUS_CODE).and_then(FieldValue::as_u64), Some(7));
    assert_eq!(record.field(FIELD_ERROR).and_then(FieldValue::as_str), Some("greeter call failed"));
    assert_eq!(record.field(FIELD_GRPC_ERROR_MESSAGE).and_then(FieldValue::as_str), Some("nope"));
}

#[tokio::test]
async fn test_error_without_status_reports_unknown() {
    let (interceptor, sink) = interceptor(LoggingOptions::new());

    let result: Result<HelloReply, GreeterError> = interceptor
        .intercept(
            CallContext::background(),
            create_test_request(),
            &create_test_server_info(),
            |_, _| async { Err(GreeterError::Closed) },
        )
        .await;
    assert!(matches!(result, Err(GreeterError::Closed)));

    let record = sink.last().unwrap();
    assert_eq!(record.field(FIELD_GRPC_STATUS).and_then(FieldValue::as_str), Some("Unknown"));
    assert_eq!(record.keys().last(), Some(&FIELD_ERROR));
}

#[tokio::test]
async fn test_failing_request_extractor_short_circuits() {
    let called = Arc::new(AtomicBool::new(false));
    let (interceptor, sink) = interceptor(
        LoggingOptions::new()
            .with_operation_started(true)
            .with_request_extractor(|_, _| Err(Status::invalid_argument("cannot log request"))),
    );

    let flag = called.clone();
    let result: Result<HelloReply, Status> = interceptor
        .intercept(
            CallContext::background(),
            create_test_request(),
            &create_test_server_info(),
            move |ctx, req| {
                flag.store(true, Ordering::SeqCst);
                say_hello(ctx, req)
            },
        )
        .await;

    let err = result.unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
    assert_eq!(err.message(), "cannot log request");
    assert!(!called.load(Ordering::SeqCst));
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_replacement_context_reaches_handler_and_records() {
    let (interceptor, sink) = interceptor(LoggingOptions::new().with_request_extractor(|ctx, _| {
        Ok(RequestExtraction::default()
            .with_context(ctx.with_log_field(Field::string("tenant", "acme"))))
    }));

    let seen = interceptor
        .intercept(
            CallContext::background(),
            create_test_request(),
            &create_test_server_info(),
            |ctx, _| async move { Ok::<_, Status>(ctx.log_fields().to_vec()) },
        )
        .await
        .unwrap();

    assert_eq!(seen, vec![Field::string("tenant", "acme")]);

    let record = sink.last().unwrap();
    assert_eq!(record.context_fields, vec![Field::string("tenant", "acme")]);
    assert!(!record.has_field(FIELD_GRPC_REQUEST));
}

#[tokio::test]
async fn test_custom_error_handler_replaces_default() {
    let (interceptor, sink) = interceptor(
        LoggingOptions::new().with_error_handler(|_, err| vec![Field::string("cause", err.to_string())]),
    );

    let _: Result<HelloReply, Status> = interceptor
        .intercept(
            CallContext::background(),
            create_test_request(),
            &create_test_server_info(),
            |_, _| async { Err(Status::internal("boom")) },
        )
        .await;

    let record = sink.last().unwrap();
    assert!(!record.has_field(FIELD_ERROR));
    assert_eq!(record.keys().last(), Some(&"cause"));
}

#[tokio::test]
async fn test_without_error_handler_only_reports_status() {
    let (interceptor, sink) = interceptor(LoggingOptions::new().without_error_handler());

    let _: Result<HelloReply, Status> = interceptor
        .intercept(
            CallContext::background(),
            create_test_request(),
            &create_test_server_info(),
            |_, _| async { Err(Status::internal("boom")) },
        )
        .await;

    let record = sink.last().unwrap();
    assert_eq!(record.keys().last(), Some(&FIELD_GRPC_STATUS_CODE));
}

#[tokio::test]
async fn test_malformed_method_name_logs_empty_identity() {
    let (interceptor, sink) = interceptor(LoggingOptions::new());

    interceptor
        .intercept(
            CallContext::background(),
            create_test_request(),
            &UnaryServerInfo::new("not-a-method"),
            say_hello,
        )
        .await
        .unwrap();

    let record = sink.last().unwrap();
    assert_eq!(record.message, " completed");
    assert_eq!(record.field(FIELD_GRPC_SERVICE).and_then(FieldValue::as_str), Some(""));
    assert_eq!(record.field(FIELD_GRPC_METHOD).and_then(FieldValue::as_str), Some(""));
    assert_eq!(
        record.field(FIELD_GRPC_FULL_METHOD).and_then(FieldValue::as_str),
        Some("not-a-method")
    );
}

#[tokio::test]
async fn test_options_from_config_templates() {
    let config = InterceptorConfig::from_toml(
        r#"
        [logging]
        log_started = true
        started_message = "-> {method}"
        completed_message = "<- {method}"
        "#,
    )
    .unwrap();
    let (interceptor, sink) = interceptor(LoggingOptions::from_config(&config.logging));

    interceptor
        .intercept(
            CallContext::background(),
            create_test_request(),
            &create_test_server_info(),
            say_hello,
        )
        .await
        .unwrap();

    let messages: Vec<String> = sink.records().into_iter().map(|r| r.message).collect();
    assert_eq!(messages, vec!["-> SayHello", "<- SayHello"]);
}
