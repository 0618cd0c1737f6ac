use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Named preset of PM gating thresholds (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PersonaMode {
    Aggressive,
    Trading,
    LongTerm,
    Dividend,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersonaConfig {
    pub mode: PersonaMode,
    pub disagreement_reject_threshold: f64,
    pub silence_confidence_floor: f64,
}

impl PersonaConfig {
    pub fn for_mode(mode: PersonaMode) -> Self {
        let (disagreement_reject_threshold, silence_confidence_floor) = match mode {
            PersonaMode::Aggressive => (0.60, 0.45),
            PersonaMode::Trading => (0.67, 0.50),
            PersonaMode::LongTerm => (0.70, 0.55),
            PersonaMode::Dividend => (0.75, 0.60),
        };
        Self {
            mode,
            disagreement_reject_threshold,
            silence_confidence_floor,
        }
    }
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self::for_mode(PersonaMode::Trading)
    }
}

/// Read-only snapshot of portfolio/market state the Order Validator and
/// Execution Router need. Replaces the source's long optional-field chains
/// with one explicit record built once per decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskContext {
    pub equity: Decimal,
    pub cash: Decimal,
    pub open_position_count: u32,
    pub aggregate_position_risk: Decimal,
    pub blacklist: BTreeSet<String>,
    pub recent_orders: Vec<RecentOrderRef>,
    pub daily_pnl_pct: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentOrderRef {
    pub ticker: String,
    pub side: crate::action::OrderSide,
    pub placed_at: DateTime<Utc>,
}

/// Agent-facing market context passed into the LLM agent adapter (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub ticker: String,
    pub price: Decimal,
    pub indicators: serde_json::Value,
    pub recent_news: Vec<NewsDigest>,
    pub macro_context: MacroContext,
    pub taken_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsDigest {
    pub title: String,
    pub sentiment: crate::news::Sentiment,
    pub impact: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroContext {
    pub regime: String,
    pub vix: Decimal,
    pub fed_stance: String,
}

/// Market-wide fast-track inputs for the Execution Router (§4.5).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MarketContext {
    pub vix: Decimal,
    pub kill_switch_active: bool,
}
