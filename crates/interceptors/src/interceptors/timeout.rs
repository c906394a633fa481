//! Deadline enforcement for unary calls.
//!
//! Both variants make sure the call runs under a bounded deadline: when the
//! incoming context has none, a child context expiring after the configured
//! default is created for the duration of the call and released afterwards.
//! A zero default disables enforcement.

use super::UnaryServerInfo;
use crate::context::{CallContext, GRPC_TIMEOUT_HEADER};
use grpc_interceptors_common::config::TimeoutConfig;
use std::future::Future;
use std::time::Duration;
use tonic::service::Interceptor;
use tonic::{Request, Status};
use tracing::debug;

/// Deadline applied when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Server-side deadline interceptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerTimeoutInterceptor {
    default_timeout: Duration,
}

impl ServerTimeoutInterceptor {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    pub fn from_config(config: &TimeoutConfig) -> Self {
        Self::new(config.default_timeout())
    }

    /// Set the default timeout. Zero disables the interceptor.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub async fn intercept<Req, Resp, E, H, Fut>(
        &self,
        ctx: CallContext,
        req: Req,
        info: &UnaryServerInfo,
        handler: H,
    ) -> Result<Resp, E>
    where
        H: FnOnce(CallContext, Req) -> Fut,
        Fut: Future<Output = Result<Resp, E>>,
    {
        run_with_deadline(self.default_timeout, ctx, &info.full_method, |ctx| {
            handler(ctx, req)
        })
        .await
    }
}

impl Default for ServerTimeoutInterceptor {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

/// Client-side deadline interceptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientTimeoutInterceptor {
    default_timeout: Duration,
}

impl ClientTimeoutInterceptor {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    pub fn from_config(config: &TimeoutConfig) -> Self {
        Self::new(config.default_timeout())
    }

    /// Set the default timeout. Zero disables the interceptor.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub async fn intercept<Req, Resp, E, I, Fut>(
        &self,
        ctx: CallContext,
        method: &str,
        req: Req,
        invoker: I,
    ) -> Result<Resp, E>
    where
        I: FnOnce(CallContext, Req) -> Fut,
        Fut: Future<Output = Result<Resp, E>>,
    {
        run_with_deadline(self.default_timeout, ctx, method, |ctx| invoker(ctx, req)).await
    }

    /// Put the caller's deadline, or the default one, on an outbound request.
    pub fn apply_to_request<T>(&self, ctx: &CallContext, request: &mut Request<T>) {
        if ctx.deadline().is_some() || self.default_timeout.is_zero() {
            ctx.apply_to_request(request);
        } else {
            request.set_timeout(self.default_timeout);
        }
    }
}

impl Default for ClientTimeoutInterceptor {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

/// Lets the client variant sit in a tonic interceptor chain: requests that
/// carry no `grpc-timeout` get the default one.
impl Interceptor for ClientTimeoutInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        if !self.default_timeout.is_zero() && !request.metadata().contains_key(GRPC_TIMEOUT_HEADER) {
            request.set_timeout(self.default_timeout);
        }
        Ok(request)
    }
}

async fn run_with_deadline<T, F, Fut>(
    default_timeout: Duration,
    ctx: CallContext,
    method: &str,
    call: F,
) -> T
where
    F: FnOnce(CallContext) -> Fut,
    Fut: Future<Output = T>,
{
    if default_timeout.is_zero() || ctx.deadline().is_some() {
        return call(ctx).await;
    }

    debug!(
        method = %method,
        timeout_ms = saturating_millis(default_timeout),
        "Attaching default deadline"
    );

    // Dropping the scope, on return or if this future is dropped, releases it.
    let scope = ctx.with_timeout(default_timeout);
    let result = call(scope.context().clone()).await;
    scope.release();
    result
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
