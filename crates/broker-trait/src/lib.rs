//! Broker adapter boundary (§6). Deliberately narrow: `place`/`status`/`cancel`
//! is everything the order pipeline needs from a real broker connection.

use async_trait::async_trait;
use core_types::{ExecutionType, OrderSide};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerOrderRequest {
    pub client_order_id: Uuid,
    pub ticker: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub execution_type: ExecutionType,
    pub limit_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerOrderStatus {
    Pending,
    Filled,
    PartiallyFilled,
    Cancelled,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerOrderState {
    pub state: BrokerOrderStatus,
    pub filled_qty: Decimal,
    pub filled_price: Option<Decimal>,
    pub reason: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker call timed out")]
    Timeout,
    #[error("broker call failed: {0}")]
    Failed(String),
    #[error("unknown broker order id: {0}")]
    UnknownOrder(String),
}

/// Implemented by real broker integrations and by the in-memory mock below.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Must be idempotent on `request.client_order_id`: submitting the same
    /// client id twice returns the same broker id without duplicating the order.
    async fn place(&self, request: BrokerOrderRequest) -> Result<String, BrokerError>;
    async fn status(&self, broker_id: &str) -> Result<BrokerOrderState, BrokerError>;
    async fn cancel(&self, broker_id: &str) -> Result<(), BrokerError>;
    fn broker_name(&self) -> &str;
}

/// Deterministic in-memory broker used by tests and offline/`--paper` runs.
/// Fills every order immediately at the order's limit price (or a configured
/// mark price for market orders).
pub struct MockBroker {
    name: String,
    mark_price: Decimal,
    orders: dashmap::DashMap<String, BrokerOrderState>,
    seen_client_ids: dashmap::DashMap<Uuid, String>,
}

impl MockBroker {
    pub fn new(name: impl Into<String>, mark_price: Decimal) -> Self {
        Self {
            name: name.into(),
            mark_price,
            orders: dashmap::DashMap::new(),
            seen_client_ids: dashmap::DashMap::new(),
        }
    }

    pub fn set_mark_price(&mut self, price: Decimal) {
        self.mark_price = price;
    }
}

#[async_trait]
impl BrokerClient for MockBroker {
    async fn place(&self, request: BrokerOrderRequest) -> Result<String, BrokerError> {
        if let Some(existing) = self.seen_client_ids.get(&request.client_order_id) {
            return Ok(existing.clone());
        }
        let broker_id = format!("mock-{}", Uuid::new_v4());
        let fill_price = request.limit_price.unwrap_or(self.mark_price);
        self.orders.insert(
            broker_id.clone(),
            BrokerOrderState {
                state: BrokerOrderStatus::Filled,
                filled_qty: request.quantity,
                filled_price: Some(fill_price),
                reason: None,
            },
        );
        self.seen_client_ids.insert(request.client_order_id, broker_id.clone());
        Ok(broker_id)
    }

    async fn status(&self, broker_id: &str) -> Result<BrokerOrderState, BrokerError> {
        self.orders
            .get(broker_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| BrokerError::UnknownOrder(broker_id.to_string()))
    }

    async fn cancel(&self, broker_id: &str) -> Result<(), BrokerError> {
        let mut entry = self
            .orders
            .get_mut(broker_id)
            .ok_or_else(|| BrokerError::UnknownOrder(broker_id.to_string()))?;
        entry.state = BrokerOrderStatus::Cancelled;
        Ok(())
    }

    fn broker_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(client_order_id: Uuid) -> BrokerOrderRequest {
        BrokerOrderRequest {
            client_order_id,
            ticker: "AAPL".to_string(),
            side: OrderSide::Buy,
            quantity: Decimal::from(10),
            execution_type: ExecutionType::Market,
            limit_price: None,
            stop_price: None,
        }
    }

    #[tokio::test]
    async fn place_is_idempotent_on_client_order_id() {
        let broker = MockBroker::new("mock", Decimal::from(100));
        let id = Uuid::new_v4();
        let first = broker.place(req(id)).await.unwrap();
        let second = broker.place(req(id)).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn cancel_marks_order_cancelled() {
        let broker = MockBroker::new("mock", Decimal::from(100));
        let broker_id = broker.place(req(Uuid::new_v4())).await.unwrap();
        broker.cancel(&broker_id).await.unwrap();
        let status = broker.status(&broker_id).await.unwrap();
        assert_eq!(status.state, BrokerOrderStatus::Cancelled);
    }
}
