use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// A news item as delivered by an external news source. Immutable after
/// ingest except for the `analyzed`/`skip_reason` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsArticle {
    pub id: Uuid,
    pub source: String,
    pub published_at: DateTime<Utc>,
    pub title: String,
    pub body: String,
    pub tickers: BTreeSet<String>,
    pub ingested_at: DateTime<Utc>,
    pub analyzed: bool,
    pub skip_reason: Option<String>,
}

impl NewsArticle {
    pub fn new(
        source: impl Into<String>,
        published_at: DateTime<Utc>,
        title: impl Into<String>,
        body: impl Into<String>,
        tickers: BTreeSet<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            published_at,
            title: title.into(),
            body: body.into(),
            tickers,
            ingested_at: Utc::now(),
            analyzed: false,
            skip_reason: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeHorizon {
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "1w")]
    OneWeek,
    #[serde(rename = "1m")]
    OneMonth,
}

impl TimeHorizon {
    pub fn all() -> [TimeHorizon; 3] {
        [TimeHorizon::OneDay, TimeHorizon::OneWeek, TimeHorizon::OneMonth]
    }

    pub fn offset(self) -> chrono::Duration {
        match self {
            TimeHorizon::OneDay => chrono::Duration::days(1),
            TimeHorizon::OneWeek => chrono::Duration::weeks(1),
            TimeHorizon::OneMonth => chrono::Duration::days(30),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TimeHorizon::OneDay => "1d",
            TimeHorizon::OneWeek => "1w",
            TimeHorizon::OneMonth => "1m",
        }
    }
}

/// One agent's structured interpretation of an article for a single ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsInterpretation {
    pub id: Uuid,
    pub article_id: Uuid,
    pub ticker: String,
    pub sentiment: Sentiment,
    pub impact_score: Decimal,
    pub predicted_direction: Direction,
    pub predicted_magnitude_pct: Decimal,
    pub time_horizon: TimeHorizon,
    pub confidence: f64,
    pub price_at_prediction: Decimal,
    pub created_at: DateTime<Utc>,
}

impl NewsInterpretation {
    /// Whether this interpretation clears the bar for driving a deliberation (§4.10).
    pub fn is_trading_actionable(&self) -> bool {
        self.impact_score >= Decimal::from(5)
    }
}

/// Verified market reaction for one horizon of one interpretation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketReaction {
    pub interpretation_id: Uuid,
    pub horizon: TimeHorizon,
    pub actual_direction: Direction,
    pub actual_magnitude_pct: Decimal,
    pub price_after: Decimal,
    pub accuracy: f64,
    pub verified_at: DateTime<Utc>,
}

/// A scheduled re-check of an interpretation's prediction at a fixed horizon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HorizonJob {
    pub interpretation_id: Uuid,
    pub horizon: TimeHorizon,
    pub due_at: DateTime<Utc>,
    pub attempts: u8,
}

impl HorizonJob {
    pub const MAX_ATTEMPTS: u8 = 3;

    pub fn new(interpretation_id: Uuid, created_at: DateTime<Utc>, horizon: TimeHorizon) -> Self {
        Self {
            interpretation_id,
            horizon,
            due_at: created_at + horizon.offset(),
            attempts: 0,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.due_at
    }

    pub fn exhausted(&self) -> bool {
        self.attempts >= Self::MAX_ATTEMPTS
    }
}
