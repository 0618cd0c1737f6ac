use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::{Action, ExecutionType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Urgency {
    Low,
    Med,
    High,
}

impl Urgency {
    pub fn from_impact_score(impact_score: Decimal) -> Self {
        if impact_score > Decimal::from(8) {
            Urgency::High
        } else if impact_score >= Decimal::from(6) {
            Urgency::Med
        } else {
            Urgency::Low
        }
    }

    pub fn execution_type(self) -> ExecutionType {
        match self {
            Urgency::High => ExecutionType::Market,
            Urgency::Med | Urgency::Low => ExecutionType::Limit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStatus {
    Active,
    Executed,
    Cancelled,
    Expired,
}

/// A candidate trade distilled from a deliberation, ready for the execution pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub ticker: String,
    pub action: Action,
    pub confidence: f64,
    pub position_size_pct: f64,
    pub reason: String,
    pub urgency: Urgency,
    pub execution_type: ExecutionType,
    pub source_article_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub status: SignalStatus,
}

impl Signal {
    pub fn new(
        ticker: impl Into<String>,
        action: Action,
        confidence: f64,
        position_size_pct: f64,
        reason: impl Into<String>,
        urgency: Urgency,
        source_article_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            ticker: ticker.into(),
            action,
            confidence,
            position_size_pct,
            reason: reason.into(),
            urgency,
            execution_type: urgency.execution_type(),
            source_article_id,
            created_at: Utc::now(),
            status: SignalStatus::Active,
        }
    }
}
