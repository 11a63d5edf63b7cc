//! Tests for the destination retry wrapper.

use super::*;
use crate::handler::DestinationHandler;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

/// Destination that fails a fixed number of times before succeeding
struct FlakyDestination {
    failures_before_success: u32,
    calls: AtomicU32,
}

impl FlakyDestination {
    fn new(failures_before_success: u32) -> Self {
        Self {
            failures_before_success,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl DestinationHandler for FlakyDestination {
    async fn deliver(&self, _ctx: &mut MessageContext) -> HandlerResult<Value> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures_before_success {
            Err(HandlerError::new(format!("boom-{}", call)))
        } else {
            Ok(json!(format!("ok-{}", call)))
        }
    }
}

/// Destination that panics once, then succeeds
struct PanicOnceDestination {
    calls: AtomicU32,
}

#[async_trait]
impl DestinationHandler for PanicOnceDestination {
    async fn deliver(&self, _ctx: &mut MessageContext) -> HandlerResult<Value> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("first attempt aborted");
        }
        Ok(json!("recovered"))
    }
}

fn wrap(inner: Arc<dyn DestinationHandler>, config: RetryConfig) -> RetryingDestination {
    RetryingDestination::new("d".to_string(), inner, config)
}

// ============================================================================
// RetryConfig
// ============================================================================

/// Verify attempt accounting includes the initial try.
#[test]
fn test_total_attempts() {
    let config = RetryConfig::new(2, Duration::from_millis(5));
    assert_eq!(config.total_attempts(), 3);

    let none = RetryConfig::new(0, Duration::from_millis(5));
    assert_eq!(none.total_attempts(), 1);
}

/// Verify the default policy values.
#[test]
fn test_default_config() {
    let config = RetryConfig::default();
    assert_eq!(config.max_retries, 3);
    assert_eq!(config.retry_interval, Duration::from_secs(1));
}

// ============================================================================
// RetryingDestination
// ============================================================================

/// Verify a first-attempt success neither retries nor sleeps.
#[tokio::test]
async fn test_success_without_retry() {
    let inner = Arc::new(FlakyDestination::new(0));
    let wrapped = wrap(inner.clone(), RetryConfig::new(3, Duration::from_millis(50)));
    let mut ctx = MessageContext::new("chain", json!(null));

    let start = Instant::now();
    let result = wrapped.deliver(&mut ctx).await.unwrap();

    assert_eq!(result, json!("ok-1"));
    assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    assert!(start.elapsed() < Duration::from_millis(50));
}

/// Verify k failures then success produces one result after k sleeps.
#[tokio::test]
async fn test_fail_twice_then_succeed() {
    let interval = Duration::from_millis(20);
    let inner = Arc::new(FlakyDestination::new(2));
    let wrapped = wrap(inner.clone(), RetryConfig::new(2, interval));
    let mut ctx = MessageContext::new("chain", json!(null));

    let start = Instant::now();
    let result = wrapped.deliver(&mut ctx).await.unwrap();

    assert_eq!(result, json!("ok-3"));
    assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    assert!(start.elapsed() >= interval * 2);
}

/// Verify exhaustion reports the fixed message with the last error as
/// cause, after exactly 1 + max_retries attempts.
#[tokio::test]
async fn test_retries_exhausted() {
    let inner = Arc::new(FlakyDestination::new(u32::MAX));
    let wrapped = wrap(inner.clone(), RetryConfig::new(1, Duration::from_millis(5)));
    let mut ctx = MessageContext::new("chain", json!(null));

    let error = wrapped.deliver(&mut ctx).await.unwrap_err();

    assert_eq!(error.message(), "Failed to execute destination after retries");
    assert_eq!(error.root_cause().as_deref(), Some("boom-2"));
    assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
}

/// Verify a zero-retry policy makes exactly one attempt.
#[tokio::test]
async fn test_zero_retries() {
    let inner = Arc::new(FlakyDestination::new(u32::MAX));
    let wrapped = wrap(inner.clone(), RetryConfig::new(0, Duration::from_millis(5)));
    let mut ctx = MessageContext::new("chain", json!(null));

    let error = wrapped.deliver(&mut ctx).await.unwrap_err();

    assert_eq!(error.message(), "Failed to execute destination after retries");
    assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
}

/// Verify a panicking attempt consumes retry budget instead of aborting the
/// delivery task.
#[tokio::test]
async fn test_panic_consumes_attempt() {
    let inner = Arc::new(PanicOnceDestination {
        calls: AtomicU32::new(0),
    });
    let wrapped = wrap(inner.clone(), RetryConfig::new(1, Duration::from_millis(5)));
    let mut ctx = MessageContext::new("chain", json!(null));

    let result = wrapped.deliver(&mut ctx).await.unwrap();

    assert_eq!(result, json!("recovered"));
    assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
}
