use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::action::Action;

/// One agent's vote in a deliberation. `features` carries whatever
/// supporting data the agent chose to surface; it is opaque to the ballot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOpinion {
    pub agent_id: String,
    pub action: Action,
    pub confidence: f64,
    pub reasoning: String,
    pub features: HashMap<String, serde_json::Value>,
}

impl AgentOpinion {
    pub fn hold_timeout(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            action: Action::Hold,
            confidence: 0.0,
            reasoning: "agent timed out".to_string(),
            features: HashMap::new(),
        }
    }
}

/// Final disposition the PM assigns to a ballot result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PmVerdict {
    Approve,
    Reject,
    ReduceSize,
    Silence,
}

/// The persisted record of a single War Room session for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deliberation {
    pub id: Uuid,
    pub symbol: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub agent_opinions: Vec<AgentOpinion>,
    pub final_action: Action,
    pub final_confidence: f64,
    pub pm_verdict: PmVerdict,
    pub reasoning: String,
}
