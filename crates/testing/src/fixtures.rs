//! Test fixtures for calls, messages and error details.

use grpc_interceptors::proto::{
    bad_request, help, precondition_failure, quota_failure, BadRequest, DebugInfo, ErrorInfo,
    Help, LocalizedMessage, PreconditionFailure, QuotaFailure, RequestInfo, ResourceInfo,
    RetryInfo,
};
use grpc_interceptors::{ErrorDetail, UnaryServerInfo};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tonic::Status;

/// Full method used across the tests.
pub const GREETER_SAY_HELLO: &str = "/pkg.Greeter/SayHello";

/// Request message of the greeter fixture service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloRequest {
    pub name: String,
}

/// Response message of the greeter fixture service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloReply {
    pub message: String,
}

/// Error type of a service whose failures wrap a status.
#[derive(Debug, thiserror::Error)]
pub enum GreeterError {
    #[error("greeter call failed")]
    Rpc(#[from] Status),
    #[error("greeter is closed")]
    Closed,
}

pub fn create_test_server_info() -> UnaryServerInfo {
    UnaryServerInfo::new(GREETER_SAY_HELLO)
}

pub fn create_test_request() -> HelloRequest {
    HelloRequest {
        name: "world".to_string(),
    }
}

/// Reply the greeter sends for a request.
pub fn create_test_reply(request: &HelloRequest) -> HelloReply {
    HelloReply {
        message: format!("Hello {}", request.name),
    }
}

pub fn create_test_request_info() -> RequestInfo {
    RequestInfo {
        request_id: "req-42".to_string(),
        serving_data: "shard-7".to_string(),
    }
}

/// A bad request with `count` field violations named `field_0`, `field_1`, ...
pub fn create_test_bad_request(count: usize) -> BadRequest {
    BadRequest {
        field_violations: (0..count)
            .map(|i| bad_request::FieldViolation {
                field: format!("field_{}", i),
                description: format!("field_{} is invalid", i),
            })
            .collect(),
    }
}

pub fn create_test_quota_failure() -> QuotaFailure {
    QuotaFailure {
        violations: vec![quota_failure::Violation {
            subject: "project:demo".to_string(),
            description: "daily limit exceeded".to_string(),
        }],
    }
}

pub fn create_test_resource_info() -> ResourceInfo {
    ResourceInfo {
        resource_type: "book".to_string(),
        resource_name: "shelves/1/books/2".to_string(),
        owner: "user:alice".to_string(),
        description: "book not found".to_string(),
    }
}

pub fn create_test_debug_info() -> DebugInfo {
    DebugInfo {
        stack_entries: vec!["main.rs:10".to_string(), "lib.rs:20".to_string()],
        detail: "nil pointer".to_string(),
    }
}

pub fn create_test_help() -> Help {
    Help {
        links: vec![help::Link {
            description: "docs".to_string(),
            url: "https://example.com/docs".to_string(),
        }],
    }
}

pub fn create_test_localized_message() -> LocalizedMessage {
    LocalizedMessage {
        locale: "en-US".to_string(),
        message: "Something went wrong".to_string(),
    }
}

pub fn create_test_precondition_failure() -> PreconditionFailure {
    PreconditionFailure {
        violations: vec![precondition_failure::Violation {
            r#type: "TOS".to_string(),
            subject: "google.com/cloud".to_string(),
            description: "terms not accepted".to_string(),
        }],
    }
}

pub fn create_test_retry_info() -> RetryInfo {
    RetryInfo {
        retry_delay: Some(prost_types::Duration {
            seconds: 1,
            nanos: 500_000_000,
        }),
    }
}

pub fn create_test_error_info() -> ErrorInfo {
    ErrorInfo {
        reason: "API_DISABLED".to_string(),
        domain: "googleapis.com".to_string(),
        metadata: HashMap::from([
            ("service".to_string(), "pubsub.googleapis.com".to_string()),
            ("consumer".to_string(), "projects/123".to_string()),
        ]),
    }
}

/// One detail of every well-known kind.
pub fn create_all_test_details() -> Vec<ErrorDetail> {
    vec![
        create_test_bad_request(2).into(),
        create_test_quota_failure().into(),
        create_test_request_info().into(),
        create_test_resource_info().into(),
        create_test_debug_info().into(),
        create_test_help().into(),
        create_test_localized_message().into(),
        create_test_precondition_failure().into(),
        create_test_retry_info().into(),
        create_test_error_info().into(),
    ]
}

/// Strategy producing `/package.Service/Method` strings.
pub fn full_method_strategy() -> impl Strategy<Value = String> {
    ("[a-z]{1,8}(\\.[a-z]{1,8}){0,2}", "[A-Z][A-Za-z]{0,11}", "[A-Z][A-Za-z]{0,11}")
        .prop_map(|(package, service, method)| format!("/{}.{}/{}", package, service, method))
}
