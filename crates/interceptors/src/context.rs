//! Call context threaded through interceptors and handlers.
//!
//! A [`CallContext`] is a cheap, clonable value carrying an optional
//! deadline, a cancellation signal and contextual log fields. It is never
//! mutated in place: every `with_*` method hands back a new context. Child
//! contexts that own a cancellation resource come wrapped in a
//! [`ScopedContext`], which cancels the child when it is released or dropped.

use crate::error::TimeoutHeaderError;
use crate::fields::Field;
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tonic::{Request, Status};

/// Metadata key carrying the caller's timeout.
pub const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

/// Largest digit count the gRPC protocol allows in a `grpc-timeout` value.
const MAX_TIMEOUT_DIGITS: usize = 8;

#[derive(Debug)]
struct CancelNode {
    sender: watch::Sender<bool>,
    parent: Option<Arc<CancelNode>>,
}

impl CancelNode {
    fn new(parent: Option<Arc<CancelNode>>) -> Arc<Self> {
        let (sender, _) = watch::channel(false);
        Arc::new(Self { sender, parent })
    }

    fn cancel(&self) {
        self.sender.send_replace(true);
    }

    fn is_cancelled(&self) -> bool {
        *self.sender.borrow() || self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }

    fn cancelled(self: Arc<Self>) -> BoxFuture<'static, ()> {
        async move {
            let mut receiver = self.sender.subscribe();
            let own = async move {
                let _ = receiver.wait_for(|cancelled| *cancelled).await;
            };
            match self.parent.clone() {
                Some(parent) => {
                    tokio::select! {
                        _ = own => {}
                        _ = parent.cancelled() => {}
                    }
                }
                None => own.await,
            }
        }
        .boxed()
    }
}

/// Execution context of a single call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: Option<Arc<CancelNode>>,
    fields: Arc<Vec<Field>>,
}

impl CallContext {
    /// An empty context: no deadline, never cancelled, no fields.
    pub fn background() -> Self {
        Self::default()
    }

    /// Build a context for an inbound request, honouring its `grpc-timeout`.
    pub fn from_request<T>(request: &Request<T>) -> Result<Self, TimeoutHeaderError> {
        let Some(value) = request.metadata().get(GRPC_TIMEOUT_HEADER) else {
            return Ok(Self::background());
        };

        let value = value
            .to_str()
            .map_err(|_| TimeoutHeaderError::InvalidValue("non-ascii header".to_string()))?;
        let timeout = parse_grpc_timeout(value)?;

        Ok(Self {
            deadline: Instant::now().checked_add(timeout),
            ..Self::default()
        })
    }

    /// Propagate this context's remaining time onto an outbound request.
    pub fn apply_to_request<T>(&self, request: &mut Request<T>) {
        if let Some(remaining) = self.remaining() {
            request.set_timeout(remaining);
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|node| node.is_cancelled())
    }

    /// Why the context is done, if it is.
    pub fn err(&self) -> Option<Status> {
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            Some(Status::deadline_exceeded("context deadline exceeded"))
        } else if self.is_cancelled() {
            Some(Status::cancelled("context canceled"))
        } else {
            None
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn cancelled(&self) {
        let cancel = self.cancel.clone();
        match (self.deadline, cancel) {
            (Some(deadline), Some(node)) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {}
                    _ = node.cancelled() => {}
                }
            }
            (Some(deadline), None) => tokio::time::sleep_until(deadline).await,
            (None, Some(node)) => node.cancelled().await,
            (None, None) => std::future::pending::<()>().await,
        }
    }

    /// Derive a child context whose deadline is at most `deadline`.
    pub fn with_deadline(&self, deadline: Instant) -> ScopedContext {
        let deadline = match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        };
        self.child(Some(deadline))
    }

    /// Derive a child context that expires `timeout` from now.
    ///
    /// A timeout too large to represent as an instant leaves the child
    /// without a deadline of its own.
    pub fn with_timeout(&self, timeout: Duration) -> ScopedContext {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.with_cancel(),
        }
    }

    /// Derive a child context that can be cancelled independently.
    pub fn with_cancel(&self) -> ScopedContext {
        self.child(self.deadline)
    }

    /// A copy of this context with one more contextual log field.
    pub fn with_log_field(&self, field: Field) -> Self {
        let mut fields = Vec::with_capacity(self.fields.len() + 1);
        fields.extend(self.fields.iter().cloned());
        fields.push(field);
        Self {
            fields: Arc::new(fields),
            ..self.clone()
        }
    }

    /// Fields every record written under this context should carry.
    pub fn log_fields(&self) -> &[Field] {
        &self.fields
    }

    fn child(&self, deadline: Option<Instant>) -> ScopedContext {
        let node = CancelNode::new(self.cancel.clone());
        ScopedContext {
            context: Self {
                deadline,
                cancel: Some(Arc::clone(&node)),
                fields: Arc::clone(&self.fields),
            },
            node,
        }
    }
}

/// A child context that owns its cancellation resource.
///
/// Releasing or dropping the scope cancels the child and everything derived
/// from it, so holders of cloned contexts observe the end of the scope.
#[derive(Debug)]
pub struct ScopedContext {
    context: CallContext,
    node: Arc<CancelNode>,
}

impl ScopedContext {
    pub fn context(&self) -> &CallContext {
        &self.context
    }

    /// Cancel the child now rather than at the end of the enclosing scope.
    pub fn release(self) {}
}

impl Drop for ScopedContext {
    fn drop(&mut self) {
        self.node.cancel();
    }
}

/// Parse a `grpc-timeout` header value such as `100m` or `5S`.
pub fn parse_grpc_timeout(value: &str) -> Result<Duration, TimeoutHeaderError> {
    let mut chars = value.chars();
    let unit = chars.next_back().ok_or(TimeoutHeaderError::Empty)?;
    let digits = chars.as_str();

    if digits.is_empty() {
        return Err(TimeoutHeaderError::InvalidValue(value.to_string()));
    }
    if digits.len() > MAX_TIMEOUT_DIGITS {
        return Err(TimeoutHeaderError::TooLong(value.to_string()));
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TimeoutHeaderError::InvalidValue(value.to_string()));
    }
    let amount: u64 = digits
        .parse()
        .map_err(|_| TimeoutHeaderError::InvalidValue(value.to_string()))?;

    match unit {
        'H' => Ok(Duration::from_secs(amount * 60 * 60)),
        'M' => Ok(Duration::from_secs(amount * 60)),
        'S' => Ok(Duration::from_secs(amount)),
        'm' => Ok(Duration::from_millis(amount)),
        'u' => Ok(Duration::from_micros(amount)),
        'n' => Ok(Duration::from_nanos(amount)),
        other => Err(TimeoutHeaderError::InvalidUnit(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_has_no_deadline() {
        let ctx = CallContext::background();
        assert!(ctx.deadline().is_none());
        assert!(!ctx.is_cancelled());
        assert!(ctx.err().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_sets_deadline() {
        let ctx = CallContext::background();
        let scope = ctx.with_timeout(Duration::from_secs(5));
        let deadline = scope.context().deadline().unwrap();
        assert_eq!(deadline, Instant::now() + Duration::from_secs(5));
        assert!(ctx.deadline().is_none(), "parent must be left untouched");
    }

    #[tokio::test]
    async fn test_unrepresentable_timeout_has_no_deadline() {
        let parent = CallContext::background().with_cancel();
        let scope = parent.context().with_timeout(Duration::MAX);
        assert!(scope.context().deadline().is_none());

        let observed = scope.context().clone();
        scope.release();
        assert!(observed.is_cancelled());
        assert!(!parent.context().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_deadline_never_extends_parent() {
        let parent = CallContext::background().with_timeout(Duration::from_secs(2));
        let child = parent.context().with_timeout(Duration::from_secs(10));
        assert_eq!(child.context().deadline(), parent.context().deadline());
    }

    #[tokio::test]
    async fn test_release_cancels_child_only() {
        let parent = CallContext::background().with_cancel();
        let child = parent.context().with_cancel();
        let observed = child.context().clone();

        child.release();
        assert!(observed.is_cancelled());
        assert_eq!(observed.err().map(|s| s.code()), Some(tonic::Code::Cancelled));
        assert!(!parent.context().is_cancelled());
    }

    #[tokio::test]
    async fn test_parent_cancellation_propagates() {
        let parent = CallContext::background().with_cancel();
        let child = parent.context().with_cancel();
        let observed = child.context().clone();

        let waiter = tokio::spawn(async move { observed.cancelled().await });
        drop(parent);
        waiter.await.unwrap();
        assert!(child.context().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_resolves_at_deadline() {
        let scope = CallContext::background().with_timeout(Duration::from_millis(50));
        let start = Instant::now();
        scope.context().cancelled().await;
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(
            scope.context().err().map(|s| s.code()),
            Some(tonic::Code::DeadlineExceeded)
        );
    }

    #[test]
    fn test_log_fields_are_copied_on_write() {
        let base = CallContext::background().with_log_field(Field::string("tenant", "acme"));
        let derived = base.with_log_field(Field::string("user", "bob"));
        assert_eq!(base.log_fields().len(), 1);
        assert_eq!(derived.log_fields().len(), 2);
        assert_eq!(derived.log_fields()[0].key, "tenant");
    }

    #[test]
    fn test_parse_grpc_timeout_units() {
        assert_eq!(parse_grpc_timeout("2H"), Ok(Duration::from_secs(7200)));
        assert_eq!(parse_grpc_timeout("3M"), Ok(Duration::from_secs(180)));
        assert_eq!(parse_grpc_timeout("5S"), Ok(Duration::from_secs(5)));
        assert_eq!(parse_grpc_timeout("100m"), Ok(Duration::from_millis(100)));
        assert_eq!(parse_grpc_timeout("7u"), Ok(Duration::from_micros(7)));
        assert_eq!(parse_grpc_timeout("9n"), Ok(Duration::from_nanos(9)));
    }

    #[test]
    fn test_parse_grpc_timeout_rejects_malformed() {
        assert_eq!(parse_grpc_timeout(""), Err(TimeoutHeaderError::Empty));
        assert_eq!(parse_grpc_timeout("S"), Err(TimeoutHeaderError::InvalidValue("S".into())));
        assert_eq!(parse_grpc_timeout("10x"), Err(TimeoutHeaderError::InvalidUnit('x')));
        assert_eq!(
            parse_grpc_timeout("123456789S"),
            Err(TimeoutHeaderError::TooLong("123456789S".into()))
        );
        assert_eq!(parse_grpc_timeout("-5S"), Err(TimeoutHeaderError::InvalidValue("-5S".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_from_request_reads_timeout() {
        let mut request = Request::new(());
        request
            .metadata_mut()
            .insert(GRPC_TIMEOUT_HEADER, "250m".parse().unwrap());

        let ctx = CallContext::from_request(&request).unwrap();
        assert_eq!(ctx.remaining(), Some(Duration::from_millis(250)));

        let ctx = CallContext::from_request(&Request::new(())).unwrap();
        assert!(ctx.deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_to_request_sets_timeout_header() {
        let scope = CallContext::background().with_timeout(Duration::from_secs(3));
        let mut request = Request::new(());
        scope.context().apply_to_request(&mut request);
        assert!(request.metadata().get(GRPC_TIMEOUT_HEADER).is_some());

        let mut request = Request::new(());
        CallContext::background().apply_to_request(&mut request);
        assert!(request.metadata().get(GRPC_TIMEOUT_HEADER).is_none());
    }
}
