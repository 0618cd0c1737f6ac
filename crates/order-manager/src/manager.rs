use chrono::Utc;
use core_types::{Order, OrderError, OrderSide, OrderState, Signal, Topic};
use dashmap::DashMap;
use event_bus::EventBus;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::OrderDb;

/// Single writer for the `orders` table (§4.3). Every mutator loads the row
/// under a per-order lock, validates the transition through `state-machine`,
/// persists, and publishes the derived event. No other component may write
/// an order directly.
pub struct OrderManager {
    db: OrderDb,
    bus: EventBus,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl OrderManager {
    pub fn new(db: OrderDb, bus: EventBus) -> Self {
        Self { db, bus, locks: DashMap::new() }
    }

    pub fn db(&self) -> &OrderDb {
        &self.db
    }

    fn lock_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(id).or_insert_with(|| Arc::new(Mutex::new(()))).value())
    }

    /// Create an order from a validated signal. This is the Idle -> SignalReceived
    /// transition; the order does not yet exist in storage before this call.
    pub async fn receive_signal(&self, signal: &Signal, side: OrderSide, quantity: Decimal) -> Result<Order, OrderError> {
        let mut order = Order::new(&signal.ticker, side, quantity, Some(signal.id));
        order.status = OrderState::SignalReceived;
        order.merge_metadata("signal_data", serde_json::json!({"signal_id": signal.id, "reason": signal.reason}));
        self.db.insert(&order).await?;
        self.bus.publish(Topic::SignalReceived, serde_json::json!({"order_id": order.id, "ticker": order.ticker})).await;
        Ok(order)
    }

    pub async fn begin_validation(&self, id: Uuid) -> Result<Order, OrderError> {
        self.transition(id, OrderState::Validating, |_| {}).await
    }

    pub async fn validated(&self, id: Uuid, validation: Result<(), core_types::RuleViolation>) -> Result<Order, OrderError> {
        match validation {
            Ok(()) => {
                let order = self.transition(id, OrderState::OrderPending, |o| {
                    o.merge_metadata("validation_result", serde_json::json!({"passed": true}));
                })
                .await?;
                self.bus.publish(Topic::SignalValidated, serde_json::json!({"order_id": id})).await;
                Ok(order)
            }
            Err(violation) => {
                let order = self.transition(id, OrderState::Rejected, |o| {
                    o.merge_metadata(
                        "validation_result",
                        serde_json::json!({"passed": false, "rule_code": violation.rule_code, "reason": violation.reason}),
                    );
                })
                .await?;
                self.bus
                    .publish(Topic::SignalRejected, serde_json::json!({"order_id": id, "rule_code": violation.rule_code}))
                    .await;
                Ok(order)
            }
        }
    }

    pub async fn sent(&self, id: Uuid, broker_id: impl Into<String>) -> Result<Order, OrderError> {
        let broker_id = broker_id.into();
        let order = self
            .transition(id, OrderState::OrderSent, |o| {
                o.broker_id = Some(broker_id.clone());
                o.merge_metadata("broker_info", serde_json::json!({"broker_id": broker_id}));
            })
            .await?;
        self.bus.publish(Topic::OrderSent, serde_json::json!({"order_id": id})).await;
        Ok(order)
    }

    pub async fn partially_filled(&self, id: Uuid, qty: Decimal, avg_price: Decimal) -> Result<Order, OrderError> {
        self.transition(id, OrderState::PartialFilled, |o| {
            o.filled_qty = Some(qty);
            o.filled_price = Some(avg_price);
            o.merge_metadata("fill_info", serde_json::json!({"filled_qty": qty.to_string(), "filled_price": avg_price.to_string()}));
        })
        .await
    }

    /// Idempotent: calling this on an already-`FullyFilled` order is a no-op
    /// that returns the existing order (§4.3, §8 round-trip property). The
    /// event is only published on the genuine transition, not on repeats.
    pub async fn fully_filled(&self, id: Uuid, fill_price: Decimal) -> Result<Order, OrderError> {
        let already_filled = self.db.get(id).await?.status == OrderState::FullyFilled;
        let order = self
            .transition(id, OrderState::FullyFilled, |o| {
                o.filled_qty = Some(o.quantity);
                o.filled_price = Some(fill_price);
                o.merge_metadata("fill_info", serde_json::json!({"filled_qty": o.quantity.to_string(), "filled_price": fill_price.to_string()}));
            })
            .await?;
        if !already_filled {
            self.bus.publish(Topic::OrderFilled, serde_json::json!({"order_id": id})).await;
        }
        Ok(order)
    }

    pub async fn cancel(&self, id: Uuid, reason: impl Into<String>) -> Result<Order, OrderError> {
        let reason = reason.into();
        let order = self
            .transition(id, OrderState::Cancelled, |o| {
                o.merge_metadata("cancel_reason", serde_json::json!(reason));
            })
            .await?;
        self.bus.publish(Topic::OrderCancelled, serde_json::json!({"order_id": id, "reason": reason})).await;
        Ok(order)
    }

    pub async fn reject(&self, id: Uuid, reason: impl Into<String>) -> Result<Order, OrderError> {
        let reason = reason.into();
        let order = self
            .transition(id, OrderState::Rejected, |o| {
                o.merge_metadata("reject_reason", serde_json::json!(reason));
            })
            .await?;
        self.bus.publish(Topic::OrderRejected, serde_json::json!({"order_id": id, "reason": reason})).await;
        Ok(order)
    }

    pub async fn fail(&self, id: Uuid, reason: impl Into<String>) -> Result<Order, OrderError> {
        let reason = reason.into();
        let order = self
            .transition(id, OrderState::Failed, |o| {
                o.merge_metadata("fail_reason", serde_json::json!(reason));
                o.needs_manual_review = true;
            })
            .await?;
        self.bus.publish(Topic::OrderFailed, serde_json::json!({"order_id": id, "reason": reason})).await;
        Ok(order)
    }

    pub async fn mark_needs_manual_review(&self, id: Uuid) -> Result<Order, OrderError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;
        let mut order = self.db.get(id).await?;
        order.needs_manual_review = true;
        order.updated_at = Utc::now();
        self.db.update(&order).await?;
        drop(_guard);
        self.bus.publish(Topic::ManualReviewRequired, serde_json::json!({"order_id": id})).await;
        Ok(order)
    }

    pub async fn get(&self, id: Uuid) -> Result<Order, OrderError> {
        self.db.get(id).await
    }

    pub async fn non_terminal_orders(&self) -> Result<Vec<Order>, OrderError> {
        self.db.non_terminal_orders().await
    }

    /// Core single-writer primitive: lock, load, idempotence-check, validate,
    /// mutate, persist. `mutate` is only invoked on a genuine transition.
    async fn transition(&self, id: Uuid, to: OrderState, mutate: impl FnOnce(&mut Order)) -> Result<Order, OrderError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut order = self.db.get(id).await?;
        if order.status == to {
            return Ok(order); // idempotent no-op
        }

        state_machine::validate_transition(order.status, to)?;
        mutate(&mut order);
        order.status = to;
        order.updated_at = Utc::now();
        self.db.update(&order).await?;
        Ok(order)
    }
}
