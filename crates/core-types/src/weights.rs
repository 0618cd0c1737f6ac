use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// One immutable, versioned snapshot of agent weights.
///
/// Per the append-only redesign flag: there is no mutable "current weights"
/// cell. Readers snapshot the highest version at the moment they need it;
/// writers only ever append a new version.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AgentWeights {
    pub version: u64,
    pub effective_at: DateTime<Utc>,
    pub weights: HashMap<String, f64>,
    pub reason: String,
    pub actor: String,
}

pub const WEIGHT_FLOOR: f64 = 0.01;
pub const WEIGHT_CEILING: f64 = 0.40;
pub const NORMALIZATION_TOLERANCE: f64 = 1e-6;

impl AgentWeights {
    pub fn validate(&self) -> Result<(), crate::error::WeightError> {
        let sum: f64 = self.weights.values().sum();
        if (sum - 1.0).abs() > NORMALIZATION_TOLERANCE {
            return Err(crate::error::WeightError::NotNormalized(sum));
        }
        for (agent_id, &w) in &self.weights {
            if !(WEIGHT_FLOOR..=WEIGHT_CEILING).contains(&w) {
                return Err(crate::error::WeightError::OutOfBounds {
                    agent_id: agent_id.clone(),
                    weight: w,
                });
            }
        }
        Ok(())
    }

    pub fn weight_of(&self, agent_id: &str) -> f64 {
        self.weights.get(agent_id).copied().unwrap_or(0.0)
    }
}
