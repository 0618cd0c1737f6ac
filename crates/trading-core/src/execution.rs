//! Signal-to-fill glue: the part of the composition root that is not owned by
//! any single library crate. Subscribes to `Topic::SignalReceived`, runs the
//! hard-rule validator, places with the broker and, on a BUY fill, opens the
//! matching Shadow Ledger position. Also drives the stop-loss fast-track path
//! that bypasses the War Room entirely (§4.5, §4.12).

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use broker_trait::{BrokerClient, BrokerOrderRequest, BrokerOrderStatus};
use chrono::Utc;
use core_types::{
    ExecutionType, MarketContext, Order, OrderError, OrderSide, OrderState, RecentOrderRef, RiskContext, ShadowSession,
};
use execution_router::{route, RouterInput};
use market_data_trait::MarketDataClient;
use order_manager::OrderManager;
use order_validator::OrderDraft;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use shadow_ledger::ShadowLedger;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::AppConfig;

/// Volatility-based stop distance, matching the heuristic the Signal Pipeline
/// uses when sizing a BUY (`stop_and_target` in `signal-pipeline::pipeline`).
/// The `Order` entity does not carry its own stop-loss once sized, so the
/// gateway recomputes the same distance here rather than widening the Order
/// Manager's API (see DESIGN.md).
fn stop_loss_for(entry_price: Decimal, side: OrderSide, vol: Decimal) -> Decimal {
    let stop_distance_pct = (vol * Decimal::from(2)).min(dec!(0.20));
    match side {
        OrderSide::Buy => entry_price * (Decimal::ONE - stop_distance_pct),
        OrderSide::Sell => entry_price * (Decimal::ONE + stop_distance_pct),
    }
}

pub struct ExecutionGateway<B: BrokerClient, M: MarketDataClient> {
    orders: Arc<OrderManager>,
    shadow: Arc<ShadowLedger>,
    session: Arc<Mutex<ShadowSession>>,
    broker: Arc<B>,
    market: Arc<M>,
    config: Arc<AppConfig>,
}

impl<B: BrokerClient, M: MarketDataClient> ExecutionGateway<B, M> {
    pub fn new(orders: Arc<OrderManager>, shadow: Arc<ShadowLedger>, session: Arc<Mutex<ShadowSession>>, broker: Arc<B>, market: Arc<M>, config: Arc<AppConfig>) -> Self {
        Self { orders, shadow, session, broker, market, config }
    }

    /// Handler for `Topic::SignalReceived`: validate, place, and (for BUYs)
    /// open the corresponding Shadow Ledger position.
    pub async fn handle_signal_received(&self, order_id: Uuid) -> anyhow::Result<()> {
        let mut session = self.session.lock().await;
        self.validate_and_place(order_id, &mut session).await?;
        Ok(())
    }

    /// Dedicated stop-loss/take-profit monitor job (§4.16 `stop_loss_scan`).
    /// Runs the Shadow Ledger's monitor, which closes crossed positions
    /// synchronously, then hands each closure's synthetic SELL to
    /// `OrderManager::receive_signal`, skipping the War Room and Signal
    /// Deduper entirely — the Execution Router is consulted purely to record
    /// the routing decision, since a crossed stop is always fast-tracked by
    /// construction. `receive_signal` publishes `Topic::SignalReceived`,
    /// which the composition root's subscription drives through the same
    /// `handle_signal_received` → `validate_and_place` path every other
    /// order uses; this function must not also call `validate_and_place`
    /// itself, and must release the session lock before emitting, or that
    /// subscription re-locking the same session deadlocks against it.
    pub async fn run_stop_loss_scan(&self) -> anyhow::Result<()> {
        let (triggered, quantity_by_ticker, daily_pnl_pct) = {
            let mut session = self.session.lock().await;
            let positions = self.shadow.db().open_positions(session.id).await?;
            if positions.is_empty() {
                return Ok(());
            }

            let mut quantity_by_ticker = HashMap::new();
            let mut prices = HashMap::new();
            for position in &positions {
                quantity_by_ticker.insert(position.ticker.clone(), position.quantity);
                let price = self.market.price(&position.ticker, None).await.unwrap_or(position.current_price);
                prices.insert(position.ticker.clone(), price);
            }

            let triggered = self.shadow.monitor_stop_losses(&mut session, &prices).await?;
            let daily_pnl_pct = if session.initial_capital.is_zero() { Decimal::ZERO } else { session.total_pnl / session.initial_capital };
            (triggered, quantity_by_ticker, daily_pnl_pct)
        };

        for signal in triggered {
            let quantity = quantity_by_ticker.get(&signal.ticker).copied().unwrap_or(Decimal::ZERO);
            if quantity <= Decimal::ZERO {
                continue;
            }

            let decision = route(
                RouterInput { position_open: true, stop_loss_crossed: true, daily_pnl_pct },
                MarketContext { vix: dec!(15), kill_switch_active: false },
            );
            tracing::info!(ticker = %signal.ticker, route = ?decision, "stop-loss triggered sell routed");

            self.orders.receive_signal(&signal, OrderSide::Sell, quantity).await?;
        }
        Ok(())
    }

    async fn validate_and_place(&self, order_id: Uuid, session: &mut ShadowSession) -> anyhow::Result<()> {
        self.orders.begin_validation(order_id).await?;
        let order = self.orders.get(order_id).await?;

        let entry_price = self.market.price(&order.ticker, None).await.unwrap_or(Decimal::ZERO);
        let vol = self.market.realized_vol(&order.ticker, 30).await.unwrap_or(dec!(0.20));
        let stop_loss = if entry_price.is_zero() { None } else { Some(stop_loss_for(entry_price, order.side, vol)) };
        let market_is_open = self.market.market_is_open("NASDAQ", Utc::now()).await.unwrap_or(true);

        let ctx = self.risk_context(session, &order.ticker).await?;
        let order_notional = order.quantity * entry_price;
        let draft = OrderDraft {
            ticker: order.ticker.clone(),
            side: order.side,
            requested_size_pct: if ctx.equity.is_zero() { Decimal::ZERO } else { order_notional / ctx.equity },
            order_notional,
            stop_loss,
            entry_price,
            exchange: "NASDAQ".to_string(),
        };

        match order_validator::validate(&draft, &ctx, market_is_open, Utc::now()) {
            Ok(()) => {
                self.orders.validated(order_id, Ok(())).await?;
                self.place_and_settle(&order, entry_price, session).await?;
            }
            Err(violation) => {
                tracing::info!(order_id = %order_id, rule_code = violation.rule_code, reason = %violation.reason, "order rejected by hard rules");
                self.orders.validated(order_id, Err(violation)).await?;
            }
        }
        Ok(())
    }

    async fn risk_context(&self, session: &ShadowSession, ticker: &str) -> Result<RiskContext, OrderError> {
        let positions = self.shadow.db().open_positions(session.id).await.map_err(|e| OrderError::StorageFailure(e.to_string()))?;
        let open_value: Decimal = positions.iter().map(|p| p.market_value()).sum();
        let equity = session.equity(open_value);

        let aggregate_position_risk = positions
            .iter()
            .map(|p| {
                let stop_distance_pct = match p.stop_loss {
                    Some(sl) if !p.entry_price.is_zero() => ((p.entry_price - sl).abs()) / p.entry_price,
                    _ => Decimal::ZERO,
                };
                if equity.is_zero() {
                    Decimal::ZERO
                } else {
                    (p.market_value() / equity) * stop_distance_pct
                }
            })
            .sum();

        let since = Utc::now() - chrono::Duration::minutes(self.config.dedup_window_min);
        let recent_orders = self
            .orders
            .db()
            .recent_orders_for_ticker(ticker, since)
            .await?
            .into_iter()
            .map(|o| RecentOrderRef { ticker: o.ticker, side: o.side, placed_at: o.created_at })
            .collect();

        let daily_pnl_pct = if session.initial_capital.is_zero() { Decimal::ZERO } else { session.total_pnl / session.initial_capital };

        Ok(RiskContext {
            equity,
            cash: session.current_cash,
            open_position_count: positions.len() as u32,
            aggregate_position_risk,
            blacklist: self.config.blacklist.clone(),
            recent_orders,
            daily_pnl_pct,
        })
    }

    async fn place_and_settle(&self, order: &Order, entry_price: Decimal, session: &mut ShadowSession) -> anyhow::Result<()> {
        let request = BrokerOrderRequest {
            client_order_id: order.id,
            ticker: order.ticker.clone(),
            side: order.side,
            quantity: order.quantity,
            execution_type: ExecutionType::Market,
            limit_price: None,
            stop_price: None,
        };
        let broker_id = self.broker.place(request).await?;
        self.orders.sent(order.id, broker_id.clone()).await?;

        let state = self.broker.status(&broker_id).await?;
        match state.state {
            BrokerOrderStatus::Filled => {
                let fill_price = state.filled_price.unwrap_or(entry_price);
                self.orders.fully_filled(order.id, fill_price).await?;
                if order.side == OrderSide::Buy {
                    let vol = self.market.realized_vol(&order.ticker, 30).await.unwrap_or(dec!(0.20));
                    let stop_loss = stop_loss_for(fill_price, OrderSide::Buy, vol);
                    self.shadow.open_position(session, &order.ticker, order.quantity, fill_price, Some(stop_loss), None).await?;
                }
            }
            BrokerOrderStatus::PartiallyFilled => {
                let fill_price = state.filled_price.unwrap_or(entry_price);
                self.orders.partially_filled(order.id, state.filled_qty, fill_price).await?;
            }
            BrokerOrderStatus::Rejected => {
                self.orders.reject(order.id, state.reason.unwrap_or_else(|| "broker rejected".to_string())).await?;
            }
            BrokerOrderStatus::Cancelled => {
                self.orders.cancel(order.id, "broker cancelled").await?;
            }
            BrokerOrderStatus::Pending => {
                // Left as ORDER_SENT; the broker_reconcile job settles it later.
            }
        }
        Ok(())
    }

    pub fn blacklist(&self) -> &BTreeSet<String> {
        &self.config.blacklist
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_trait::MockBroker;
    use core_types::{Action, Signal, Urgency};
    use event_bus::EventBus;
    use market_data_trait::MockMarketData;
    use order_manager::OrderDb;
    use shadow_ledger::ShadowDb;

    async fn gateway(blacklist: BTreeSet<String>) -> (ExecutionGateway<MockBroker, MockMarketData>, Arc<OrderManager>, Arc<Mutex<ShadowSession>>, EventBus) {
        let bus = EventBus::new();
        let orders = Arc::new(OrderManager::new(OrderDb::new("sqlite::memory:").await.unwrap(), bus.clone()));
        let shadow_db = ShadowDb::new("sqlite::memory:").await.unwrap();
        let shadow = Arc::new(ShadowLedger::new(shadow_db, bus.clone()));
        let session = shadow.ensure_session(Decimal::from(100_000)).await.unwrap();
        let market = Arc::new(MockMarketData::new());
        market.set_price("AAPL", Decimal::from(100));
        market.set_vol("AAPL", dec!(0.10));
        let broker = Arc::new(MockBroker::new("mock", Decimal::from(100)));
        let config = Arc::new(AppConfig {
            persona_mode: core_types::PersonaMode::Trading,
            max_position_pct: dec!(0.30),
            portfolio_risk_cap: dec!(0.05),
            position_count_cap: 20,
            dedup_window_min: 30,
            min_signal_confidence: 0.60,
            llm_rate_limit_per_min: 10,
            agent_timeout_s: 8,
            deliberation_timeout_s: 12,
            nia_window_days: 30,
            nia_min_sample: 50,
            nia_daily_delta_cap: 0.05,
            blacklist,
            tradeable_keywords: vec![],
            shadow_initial_capital: Decimal::from(100_000),
            database_url: "sqlite::memory:".to_string(),
            claim_limit: 10,
            cycle_deadline_s: 60,
        });
        let gateway = ExecutionGateway::new(Arc::clone(&orders), shadow, Arc::new(Mutex::new(session)), broker, market, config);
        let session_handle = Arc::clone(&gateway.session);
        (gateway, orders, session_handle, bus)
    }

    /// Wires `Topic::SignalReceived` to `gateway.handle_signal_received`, the
    /// same subscription the composition root sets up in `main.rs`. Tests
    /// that exercise a path driven by `OrderManager::receive_signal` (rather
    /// than calling `handle_signal_received` directly) need this or the
    /// order never actually gets placed.
    fn wire_signal_received(bus: &EventBus, gateway: &Arc<ExecutionGateway<MockBroker, MockMarketData>>) {
        let gateway = Arc::clone(gateway);
        bus.subscribe(core_types::Topic::SignalReceived, move |event| {
            let gateway = Arc::clone(&gateway);
            async move {
                let Some(order_id) = event.payload.get("order_id").and_then(|v| v.as_str()).and_then(|s| s.parse().ok()) else {
                    return;
                };
                let _ = gateway.handle_signal_received(order_id).await;
            }
        });
    }

    #[tokio::test]
    async fn clean_buy_signal_is_validated_placed_and_opens_a_shadow_position() {
        let (gateway, orders, session, _bus) = gateway(BTreeSet::new()).await;
        let signal = Signal::new("AAPL", Action::Buy, 0.9, 0.1, "test", Urgency::Med, None);
        let order = orders.receive_signal(&signal, OrderSide::Buy, Decimal::from(10)).await.unwrap();

        gateway.handle_signal_received(order.id).await.unwrap();

        let filled = orders.get(order.id).await.unwrap();
        assert_eq!(filled.status, OrderState::FullyFilled);
        let session = session.lock().await;
        assert_eq!(gateway.shadow.db().open_positions(session.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn blacklisted_ticker_is_rejected_not_placed() {
        let mut blacklist = BTreeSet::new();
        blacklist.insert("AAPL".to_string());
        let (gateway, orders, _session, _bus) = gateway(blacklist).await;

        let signal = Signal::new("AAPL", Action::Buy, 0.9, 0.1, "test", Urgency::Med, None);
        let order = orders.receive_signal(&signal, OrderSide::Buy, Decimal::from(10)).await.unwrap();
        gateway.handle_signal_received(order.id).await.unwrap();

        let rejected = orders.get(order.id).await.unwrap();
        assert_eq!(rejected.status, OrderState::Rejected);
    }

    #[tokio::test]
    async fn stop_loss_scan_routes_the_sell_through_the_wired_subscription_without_deadlocking() {
        let (gateway, _orders, session, bus) = gateway(BTreeSet::new()).await;
        let gateway = Arc::new(gateway);
        wire_signal_received(&bus, &gateway);

        {
            let mut session = session.lock().await;
            gateway.shadow.open_position(&mut session, "AAPL", Decimal::from(10), Decimal::from(100), Some(dec!(95)), None).await.unwrap();
        }
        gateway.market.set_price("AAPL", dec!(90));

        // Regresses against a reentrant-lock deadlock: before the fix this
        // scan held the session lock across `receive_signal`, and the
        // subscription above re-locking the same session would hang forever.
        tokio::time::timeout(std::time::Duration::from_secs(5), gateway.run_stop_loss_scan())
            .await
            .expect("stop-loss scan deadlocked")
            .unwrap();

        let session = session.lock().await;
        assert!(gateway.shadow.db().open_positions(session.id).await.unwrap().is_empty());
        let closed = gateway.shadow.db().closed_positions(session.id).await.unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].ticker, "AAPL");
    }
}
