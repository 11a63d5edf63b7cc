//! Common test fixtures for flowline integration tests.
//!
//! Provides an order-processing pipeline: validation, completed-order
//! filtering, amount calculation, approval, and an in-memory order table
//! destination, plus failure-injecting destinations for the recovery
//! scenarios.

use async_trait::async_trait;
use flowline_core::{
    DestinationHandler, FilterHandler, GenericHandler, HandlerError, HandlerResult,
    MessageContext, TransformerHandler,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// Order Domain
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Approved,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub unit_price: u64,
    pub quantity: u64,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
}

#[allow(dead_code)]
pub fn pending_order(id: &str, unit_price: u64, quantity: u64) -> Value {
    json!({
        "id": id,
        "unitPrice": unit_price,
        "quantity": quantity,
        "status": "PENDING"
    })
}

// ============================================================================
// Processors
// ============================================================================

/// Rejects orders with missing or zero-valued fields
pub struct OrderValidator;

#[async_trait]
impl GenericHandler for OrderValidator {
    async fn process(&self, ctx: &mut MessageContext) -> HandlerResult<()> {
        let order: Order = ctx
            .content_as()
            .map_err(|e| HandlerError::new("Invalid order payload").with_cause(e))?;
        if order.id.is_empty() || order.unit_price == 0 || order.quantity == 0 {
            return Err(HandlerError::new("Order fields must be present and non-zero"));
        }
        Ok(())
    }
}

/// Gates out orders that already completed
pub struct CompletedOrderFilter;

#[async_trait]
impl FilterHandler for CompletedOrderFilter {
    async fn filter(&self, ctx: &mut MessageContext) -> HandlerResult<bool> {
        let order: Order = ctx
            .content_as()
            .map_err(|e| HandlerError::new("Invalid order payload").with_cause(e))?;
        Ok(order.status != OrderStatus::Completed)
    }
}

/// Computes the order amount from unit price and quantity
pub struct AmountCalculator;

#[async_trait]
impl TransformerHandler for AmountCalculator {
    async fn transform(&self, ctx: &mut MessageContext) -> HandlerResult<Value> {
        let mut order: Order = ctx
            .content_as()
            .map_err(|e| HandlerError::new("Invalid order payload").with_cause(e))?;
        order.amount = Some(order.unit_price * order.quantity);
        serde_json::to_value(&order).map_err(|e| HandlerError::new(e.to_string()))
    }
}

/// Approves orders under the amount limit
pub struct OrderApprover;

#[async_trait]
impl TransformerHandler for OrderApprover {
    async fn transform(&self, ctx: &mut MessageContext) -> HandlerResult<Value> {
        let mut order: Order = ctx
            .content_as()
            .map_err(|e| HandlerError::new("Invalid order payload").with_cause(e))?;
        if order.amount.unwrap_or(0) > 100_000 {
            return Err(HandlerError::new("Order amount exceeds limit"));
        }
        order.status = OrderStatus::Approved;
        serde_json::to_value(&order).map_err(|e| HandlerError::new(e.to_string()))
    }
}

// ============================================================================
// Destinations
// ============================================================================

/// In-memory order table standing in for a downstream database
#[derive(Default)]
#[allow(dead_code)]
pub struct OrderTable {
    rows: Mutex<BTreeMap<String, Order>>,
}

#[allow(dead_code)]
impl OrderTable {
    pub fn get(&self, id: &str) -> Option<Order> {
        self.rows.lock().unwrap().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

/// Destination that persists the order as completed
#[allow(dead_code)]
pub struct AddOrderDestination {
    pub table: Arc<OrderTable>,
}

#[async_trait]
impl DestinationHandler for AddOrderDestination {
    async fn deliver(&self, ctx: &mut MessageContext) -> HandlerResult<Value> {
        let mut order: Order = ctx
            .content_as()
            .map_err(|e| HandlerError::new("Invalid order payload").with_cause(e))?;
        order.status = OrderStatus::Completed;
        self.table
            .rows
            .lock()
            .unwrap()
            .insert(order.id.clone(), order);
        Ok(json!("ok"))
    }
}

/// Destination that fails a fixed number of times before succeeding
#[allow(dead_code)]
pub struct FlakyDestination {
    pub failures_before_success: u32,
    pub calls: Arc<AtomicU32>,
}

#[async_trait]
impl DestinationHandler for FlakyDestination {
    async fn deliver(&self, _ctx: &mut MessageContext) -> HandlerResult<Value> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures_before_success {
            Err(HandlerError::new(format!("transient failure {}", call)))
        } else {
            Ok(json!(format!("ok-{}", call)))
        }
    }
}

/// Destination whose outcome is flipped at runtime, counting calls
pub struct SwitchableDestination {
    pub succeed: Arc<AtomicBool>,
    pub calls: Arc<AtomicU32>,
    pub result: Value,
}

impl SwitchableDestination {
    #[allow(dead_code)]
    pub fn new(succeed: &Arc<AtomicBool>, calls: &Arc<AtomicU32>, result: Value) -> Self {
        Self {
            succeed: Arc::clone(succeed),
            calls: Arc::clone(calls),
            result,
        }
    }
}

#[async_trait]
impl DestinationHandler for SwitchableDestination {
    async fn deliver(&self, _ctx: &mut MessageContext) -> HandlerResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.succeed.load(Ordering::SeqCst) {
            Ok(self.result.clone())
        } else {
            Err(HandlerError::new("delivery refused"))
        }
    }
}
