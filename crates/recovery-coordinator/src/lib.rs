//! Boot-time reconciliation of non-terminal orders against the broker of
//! record (§4.15). Runs once at process start, before the scheduler begins
//! ticking, so the Order Manager's view of the world matches reality after
//! a crash or restart.

use std::sync::Arc;

use broker_trait::{BrokerClient, BrokerOrderStatus};
use core_types::{OrderError, Topic};
use event_bus::EventBus;
use order_manager::OrderManager;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub reconciled: usize,
    pub left_pending: usize,
    pub needs_manual_review: usize,
}

pub struct RecoveryCoordinator<B: BrokerClient> {
    broker: Arc<B>,
    bus: EventBus,
}

impl<B: BrokerClient> RecoveryCoordinator<B> {
    pub fn new(broker: Arc<B>, bus: EventBus) -> Self {
        Self { broker, bus }
    }

    /// Idempotent: re-running against an already-reconciled order set is a
    /// no-op, since every Order Manager mutator short-circuits on a status
    /// that's already at the target state.
    pub async fn recover(&self, orders: &OrderManager) -> Result<RecoveryReport, OrderError> {
        self.bus.publish(Topic::RecoveryStarted, serde_json::json!({})).await;

        let mut report = RecoveryReport::default();
        for order in orders.non_terminal_orders().await? {
            let Some(broker_id) = order.broker_id.clone() else {
                // Never reached the broker (stuck before OrderSent). Nothing
                // to reconcile against; flag it for a human.
                orders.mark_needs_manual_review(order.id).await?;
                report.needs_manual_review += 1;
                continue;
            };

            match self.broker.status(&broker_id).await {
                Ok(state) => match state.state {
                    BrokerOrderStatus::Filled => {
                        let price = state.filled_price.unwrap_or_default();
                        orders.fully_filled(order.id, price).await?;
                        report.reconciled += 1;
                    }
                    BrokerOrderStatus::PartiallyFilled => {
                        let price = state.filled_price.unwrap_or_default();
                        orders.partially_filled(order.id, state.filled_qty, price).await?;
                        report.reconciled += 1;
                    }
                    BrokerOrderStatus::Cancelled => {
                        orders.cancel(order.id, "recovered").await?;
                        report.reconciled += 1;
                    }
                    BrokerOrderStatus::Rejected => {
                        orders.reject(order.id, "recovered").await?;
                        report.reconciled += 1;
                    }
                    BrokerOrderStatus::Pending => {
                        // Leave ORDER_SENT as-is; a later scheduler tick reconciles it.
                        report.left_pending += 1;
                    }
                },
                Err(err) => {
                    tracing::warn!(order_id = %order.id, broker_id, error = %err, "recovery: broker status lookup failed");
                    orders.mark_needs_manual_review(order.id).await?;
                    report.needs_manual_review += 1;
                }
            }
        }

        self.bus
            .publish(
                Topic::RecoveryCompleted,
                serde_json::json!({"reconciled": report.reconciled, "left_pending": report.left_pending, "needs_manual_review": report.needs_manual_review}),
            )
            .await;
        Ok(report)
    }
}
