use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::OrderSide;

/// Order lifecycle state. Transition legality lives in `state-machine`; this
/// type is the shared vocabulary every crate matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    Idle,
    SignalReceived,
    Validating,
    OrderPending,
    OrderSent,
    PartialFilled,
    FullyFilled,
    Cancelled,
    Rejected,
    Failed,
}

impl OrderState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderState::FullyFilled | OrderState::Cancelled | OrderState::Rejected | OrderState::Failed
        )
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::str::FromStr for OrderState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Idle" => Ok(OrderState::Idle),
            "SignalReceived" => Ok(OrderState::SignalReceived),
            "Validating" => Ok(OrderState::Validating),
            "OrderPending" => Ok(OrderState::OrderPending),
            "OrderSent" => Ok(OrderState::OrderSent),
            "PartialFilled" => Ok(OrderState::PartialFilled),
            "FullyFilled" => Ok(OrderState::FullyFilled),
            "Cancelled" => Ok(OrderState::Cancelled),
            "Rejected" => Ok(OrderState::Rejected),
            "Failed" => Ok(OrderState::Failed),
            other => Err(format!("unknown order state: {other}")),
        }
    }
}

/// Execution type requested for a broker order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionType {
    Market,
    Limit,
}

/// A single order under the exclusive ownership of the Order Manager.
///
/// Only `order-manager` is permitted to construct a mutated copy of this type
/// and persist it; every other crate treats it as read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub ticker: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub limit_price: Option<Decimal>,
    pub filled_qty: Option<Decimal>,
    pub filled_price: Option<Decimal>,
    pub status: OrderState,
    pub broker_id: Option<String>,
    pub signal_id: Option<Uuid>,
    pub order_metadata: serde_json::Value,
    pub needs_manual_review: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(ticker: impl Into<String>, side: OrderSide, quantity: Decimal, signal_id: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            ticker: ticker.into(),
            side,
            quantity,
            limit_price: None,
            filled_qty: None,
            filled_price: None,
            status: OrderState::Idle,
            broker_id: None,
            signal_id,
            order_metadata: serde_json::json!({}),
            needs_manual_review: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge a metadata fragment into `order_metadata` under `stage`, additive per §4.3.
    pub fn merge_metadata(&mut self, stage: &str, value: serde_json::Value) {
        if !self.order_metadata.is_object() {
            self.order_metadata = serde_json::json!({});
        }
        self.order_metadata
            .as_object_mut()
            .expect("just ensured object")
            .insert(stage.to_string(), value);
    }
}
