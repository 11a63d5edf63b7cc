//! Tests for handler descriptors and panic trapping.

use super::*;
use crate::context::MessageContext;
use crate::retry::RetryConfig;
use serde_json::json;
use std::time::Duration;

struct PassFilter;

#[async_trait]
impl FilterHandler for PassFilter {
    async fn filter(&self, _ctx: &mut MessageContext) -> HandlerResult<bool> {
        Ok(true)
    }
}

struct EchoDestination;

#[async_trait]
impl DestinationHandler for EchoDestination {
    async fn deliver(&self, ctx: &mut MessageContext) -> HandlerResult<Value> {
        Ok(ctx.content())
    }
}

// ============================================================================
// Descriptors
// ============================================================================

mod descriptors {
    use super::*;

    /// Verify processor registration carries the id and flavor.
    #[test]
    fn test_processor_registration() {
        let processor = Processor::filter("validate", PassFilter);

        assert_eq!(processor.id(), "validate");
        assert!(matches!(processor.kind(), ProcessorKind::Filter(_)));
        assert!(format!("{:?}", processor).contains("validate"));
    }

    /// Verify destination registration and retry attachment.
    #[test]
    fn test_destination_registration() {
        let plain = Destination::new("warehouse", EchoDestination);
        assert_eq!(plain.id(), "warehouse");
        assert!(plain.retry_config().is_none());

        let retried = Destination::new("warehouse", EchoDestination)
            .with_retry(RetryConfig::new(2, Duration::from_millis(10)));
        assert_eq!(
            retried.retry_config(),
            Some(&RetryConfig::new(2, Duration::from_millis(10)))
        );
    }
}

// ============================================================================
// Panic Trapping
// ============================================================================

mod panic_trapping {
    use super::*;
    use crate::error::HandlerError;

    /// Verify normal results pass through untouched.
    #[tokio::test]
    async fn test_run_trapped_passthrough() {
        let ok = run_trapped(async { Ok::<_, HandlerError>(5u32) }).await;
        assert_eq!(ok.unwrap(), 5);

        let err = run_trapped(async { Err::<u32, _>(HandlerError::new("boom")) }).await;
        assert_eq!(err.unwrap_err().message(), "boom");
    }

    /// Verify a panicking handler surfaces as the fixed abort error with
    /// the panic payload as detail.
    #[tokio::test]
    async fn test_run_trapped_panic() {
        let result = run_trapped(async {
            panic!("stack blew up");
            #[allow(unreachable_code)]
            Ok::<u32, HandlerError>(0)
        })
        .await;

        let error = result.unwrap_err();
        assert_eq!(error.message(), "handler aborted");
        assert_eq!(error.detail(), Some(&json!("stack blew up")));
    }

    /// Verify payload extraction for the common panic payload shapes.
    #[test]
    fn test_panic_detail_shapes() {
        assert_eq!(panic_detail(Box::new("static")), json!("static"));
        assert_eq!(
            panic_detail(Box::new("owned".to_string())),
            json!("owned")
        );
        assert_eq!(panic_detail(Box::new(42u32)), json!("non-string panic payload"));
    }
}
