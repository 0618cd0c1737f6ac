use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowPosition {
    pub id: Uuid,
    pub session_id: Uuid,
    pub ticker: String,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub entry_at: DateTime<Utc>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub current_price: Decimal,
    pub pnl: Decimal,
    pub status: PositionStatus,
    pub closed_at: Option<DateTime<Utc>>,
    pub exit_price: Option<Decimal>,
}

impl ShadowPosition {
    pub fn market_value(&self) -> Decimal {
        self.quantity * self.current_price
    }

    pub fn mark(&mut self, price: Decimal) {
        self.current_price = price;
        self.pnl = (price - self.entry_price) * self.quantity;
    }

    /// Crossed the stop-loss from below (long position losing value).
    pub fn stop_loss_crossed(&self) -> bool {
        match self.stop_loss {
            Some(sl) => self.current_price <= sl,
            None => false,
        }
    }

    pub fn take_profit_crossed(&self) -> bool {
        match self.take_profit {
            Some(tp) => self.current_price >= tp,
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionMetrics {
    pub sharpe: Option<f64>,
    pub max_drawdown: Option<f64>,
    pub win_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowSession {
    pub id: Uuid,
    pub initial_capital: Decimal,
    pub current_cash: Decimal,
    pub invested: Decimal,
    pub total_pnl: Decimal,
    pub started_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub metrics: SessionMetrics,
}

impl ShadowSession {
    pub fn new(initial_capital: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            initial_capital,
            current_cash: initial_capital,
            invested: Decimal::ZERO,
            total_pnl: Decimal::ZERO,
            started_at: Utc::now(),
            status: SessionStatus::Active,
            metrics: SessionMetrics::default(),
        }
    }

    pub fn equity(&self, open_positions_market_value: Decimal) -> Decimal {
        self.current_cash + open_positions_market_value
    }

    /// §8 invariant 4: cash + open market value - initial capital == total_pnl within 0.1%.
    pub fn reconciliation_drift(&self, open_positions_market_value: Decimal) -> Decimal {
        let lhs = self.current_cash + open_positions_market_value - self.initial_capital;
        (lhs - self.total_pnl).abs()
    }
}
