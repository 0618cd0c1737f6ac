//! Virtual portfolio tracking a single active `ShadowSession` (§4.12). Owns
//! the open/close/mark-to-market/stop-loss-monitor lifecycle and feeds the
//! equity curve that `metrics` scores.

use chrono::{DateTime, Utc};
use core_types::{Action, PositionStatus, SessionMetrics, ShadowPosition, ShadowSession, Signal, Topic, Urgency};
use event_bus::EventBus;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

use crate::db::{ShadowDb, ShadowDbError};
use crate::metrics;

/// Reconciliation drift beyond this fraction of equity raises a warning (§4.12).
pub const RECONCILIATION_TOLERANCE: Decimal = dec!(0.001);

pub struct ShadowLedger {
    db: ShadowDb,
    bus: EventBus,
}

impl ShadowLedger {
    pub fn new(db: ShadowDb, bus: EventBus) -> Self {
        Self { db, bus }
    }

    pub fn db(&self) -> &ShadowDb {
        &self.db
    }

    /// Returns the active session, creating one seeded with `initial_capital`
    /// if none exists yet.
    pub async fn ensure_session(&self, initial_capital: Decimal) -> Result<ShadowSession, ShadowDbError> {
        if let Some(session) = self.db.active_session().await? {
            return Ok(session);
        }
        let session = ShadowSession::new(initial_capital);
        self.db.insert_session(&session).await?;
        Ok(session)
    }

    /// Open a position from a BUY fill. Deducts notional from cash.
    pub async fn open_position(
        &self,
        session: &mut ShadowSession,
        ticker: &str,
        quantity: Decimal,
        fill_price: Decimal,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<ShadowPosition, ShadowDbError> {
        let notional = quantity * fill_price;
        let position = ShadowPosition {
            id: uuid::Uuid::new_v4(),
            session_id: session.id,
            ticker: ticker.to_string(),
            quantity,
            entry_price: fill_price,
            entry_at: Utc::now(),
            stop_loss,
            take_profit,
            current_price: fill_price,
            pnl: Decimal::ZERO,
            status: PositionStatus::Open,
            closed_at: None,
            exit_price: None,
        };
        self.db.insert_position(&position).await?;

        session.current_cash -= notional;
        session.invested += notional;
        self.db.update_session(session).await?;

        self.bus
            .publish(Topic::PositionOpened, serde_json::json!({"position_id": position.id, "ticker": ticker, "quantity": quantity.to_string()}))
            .await;
        Ok(position)
    }

    /// Close a position at `exit_price`, crediting cash and realizing P&L.
    /// Closed P&L is append-only: this is the only writer of `total_pnl`.
    pub async fn close_position(&self, session: &mut ShadowSession, position: &mut ShadowPosition, exit_price: Decimal) -> Result<(), ShadowDbError> {
        let cost_basis = position.quantity * position.entry_price;
        let proceeds = position.quantity * exit_price;
        let realized_pnl = proceeds - cost_basis;

        position.status = PositionStatus::Closed;
        position.closed_at = Some(Utc::now());
        position.exit_price = Some(exit_price);
        position.current_price = exit_price;
        position.pnl = realized_pnl;
        self.db.update_position(position).await?;

        session.current_cash += proceeds;
        session.invested -= cost_basis;
        session.total_pnl += realized_pnl;
        self.db.update_session(session).await?;

        self.bus
            .publish(Topic::PositionClosed, serde_json::json!({"position_id": position.id, "ticker": position.ticker, "pnl": realized_pnl.to_string()}))
            .await;
        Ok(())
    }

    /// Sample current prices into every open position and append an equity
    /// curve point (§4.12: one sample per call, intended cadence 60s).
    pub async fn mark_to_market(&self, session: &ShadowSession, prices: &HashMap<String, Decimal>, now: DateTime<Utc>) -> Result<Decimal, ShadowDbError> {
        let mut open_value = Decimal::ZERO;
        for mut position in self.db.open_positions(session.id).await? {
            if let Some(&price) = prices.get(&position.ticker) {
                position.mark(price);
                self.db.update_position(&position).await?;
            }
            open_value += position.market_value();
        }
        let equity = session.equity(open_value);
        self.db.record_equity_sample(session.id, now, equity).await?;
        Ok(equity)
    }

    /// Dedicated stop-loss/take-profit monitor. Closes any position whose
    /// current price (from `prices`) has crossed its stop or target, and
    /// returns a synthetic HIGH-urgency SELL signal per closure so the
    /// execution side can fast-track it, bypassing the War Room (§4.12).
    pub async fn monitor_stop_losses(&self, session: &mut ShadowSession, prices: &HashMap<String, Decimal>) -> Result<Vec<Signal>, ShadowDbError> {
        let mut triggered = Vec::new();
        for mut position in self.db.open_positions(session.id).await? {
            let Some(&price) = prices.get(&position.ticker) else { continue };
            position.mark(price);
            if position.stop_loss_crossed() || position.take_profit_crossed() {
                let reason = if position.stop_loss_crossed() { "stop_loss_crossed" } else { "take_profit_crossed" };
                self.bus
                    .publish(Topic::PositionStopLossTriggered, serde_json::json!({"position_id": position.id, "ticker": position.ticker, "reason": reason}))
                    .await;
                self.close_position(session, &mut position, price).await?;
                triggered.push(Signal::new(&position.ticker, Action::Sell, 1.0, 1.0, reason, Urgency::High, None));
            } else {
                self.db.update_position(&position).await?;
            }
        }
        Ok(triggered)
    }

    /// Recompute Sharpe, max-drawdown and win-rate off the stored equity
    /// curve and closed-position P&L. Metrics are derived, not persisted.
    pub async fn recompute_metrics(&self, session_id: uuid::Uuid, rf_annual: f64) -> Result<SessionMetrics, ShadowDbError> {
        let curve = self.db.equity_curve(session_id).await?;
        let returns = metrics::daily_returns(&curve);
        let sharpe = metrics::sharpe_ratio(&returns, rf_annual);
        let max_drawdown = if curve.is_empty() { None } else { Some(metrics::max_drawdown(&curve).0) };
        let closed = self.db.closed_positions(session_id).await?;
        let pnls: Vec<f64> = closed.iter().filter_map(|p| p.pnl.to_string().parse::<f64>().ok()).collect();
        let win_rate = metrics::win_rate(&pnls);
        Ok(SessionMetrics { sharpe, max_drawdown, win_rate })
    }

    /// §8 invariant 4: cash + open market value - initial capital ≈ total_pnl.
    /// Returns the drift when it exceeds tolerance, logging a warning.
    pub async fn check_reconciliation(&self, session: &ShadowSession) -> Result<Option<Decimal>, ShadowDbError> {
        let open_value: Decimal = self.db.open_positions(session.id).await?.iter().map(|p| p.market_value()).sum();
        let drift = session.reconciliation_drift(open_value);
        let equity = session.equity(open_value);
        let threshold = if equity.is_zero() { RECONCILIATION_TOLERANCE } else { equity.abs() * RECONCILIATION_TOLERANCE };
        if drift > threshold {
            tracing::warn!(session_id = %session.id, %drift, "shadow ledger reconciliation drift exceeds tolerance");
            Ok(Some(drift))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ledger() -> (ShadowLedger, ShadowSession) {
        let db = ShadowDb::new("sqlite::memory:").await.unwrap();
        let ledger = ShadowLedger::new(db, EventBus::new());
        let session = ledger.ensure_session(Decimal::from(100_000)).await.unwrap();
        (ledger, session)
    }

    #[tokio::test]
    async fn open_then_close_position_realizes_pnl() {
        let (ledger, mut session) = ledger().await;
        let mut position = ledger.open_position(&mut session, "AAPL", Decimal::from(10), Decimal::from(150), Some(Decimal::from(140)), None).await.unwrap();
        assert_eq!(session.current_cash, Decimal::from(98_500));

        ledger.close_position(&mut session, &mut position, Decimal::from(160)).await.unwrap();
        assert_eq!(session.total_pnl, Decimal::from(100));
        assert_eq!(session.current_cash, Decimal::from(100_100));
    }

    #[tokio::test]
    async fn mark_to_market_updates_open_value() {
        let (ledger, mut session) = ledger().await;
        ledger.open_position(&mut session, "AAPL", Decimal::from(10), Decimal::from(150), None, None).await.unwrap();
        let mut prices = HashMap::new();
        prices.insert("AAPL".to_string(), Decimal::from(155));
        let equity = ledger.mark_to_market(&session, &prices, Utc::now()).await.unwrap();
        assert_eq!(equity, session.current_cash + Decimal::from(1550));
    }

    #[tokio::test]
    async fn stop_loss_crossing_closes_position_and_emits_signal() {
        let (ledger, mut session) = ledger().await;
        ledger.open_position(&mut session, "AAPL", Decimal::from(10), Decimal::from(150), Some(Decimal::from(140)), None).await.unwrap();
        let mut prices = HashMap::new();
        prices.insert("AAPL".to_string(), Decimal::from(135));
        let signals = ledger.monitor_stop_losses(&mut session, &prices).await.unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].action, Action::Sell);
        assert_eq!(signals[0].urgency, Urgency::High);
        assert!(ledger.db().open_positions(session.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reconciliation_drift_zero_when_balanced() {
        let (ledger, session) = ledger().await;
        assert_eq!(ledger.check_reconciliation(&session).await.unwrap(), None);
    }
}
