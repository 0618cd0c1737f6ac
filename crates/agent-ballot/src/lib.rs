//! Agent Weighted Ballot (§4.7): turns a list of agent opinions plus the
//! current weight snapshot into one winning action with a confidence and a
//! disagreement measure the War Room's PM verdict gates on.

use core_types::{Action, AgentOpinion, AgentWeights, WeightError};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct BallotResult {
    pub winner: Action,
    pub consensus_confidence: f64,
    pub disagreement: f64,
    pub scores_by_action: HashMap<Action, f64>,
}

/// §4.7 steps 1-5. Errors if `opinions` is empty.
pub fn tally(opinions: &[AgentOpinion], weights: &AgentWeights) -> Result<BallotResult, WeightError> {
    if opinions.is_empty() {
        return Err(WeightError::EmptyBallot);
    }

    let mut scores_by_action: HashMap<Action, f64> = HashMap::new();
    let mut weight_present = 0.0;

    for opinion in opinions {
        let w = weights.weight_of(&opinion.agent_id);
        weight_present += w;
        *scores_by_action.entry(opinion.action).or_insert(0.0) += w * opinion.confidence;
    }

    let winner = *scores_by_action
        .keys()
        .max_by(|a, b| {
            let sa = scores_by_action[*a];
            let sb = scores_by_action[*b];
            sa.partial_cmp(&sb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.tie_break_rank().cmp(&a.tie_break_rank()))
        })
        .expect("opinions non-empty implies at least one action");

    let total_score: f64 = scores_by_action.values().sum();
    let winner_score = scores_by_action[&winner];
    let consensus_confidence = if total_score > 0.0 { winner_score / total_score } else { 0.0 };

    let weight_on_winner: f64 = opinions
        .iter()
        .filter(|o| o.action == winner)
        .map(|o| weights.weight_of(&o.agent_id))
        .sum();
    let disagreement = if weight_present > 0.0 { 1.0 - (weight_on_winner / weight_present) } else { 1.0 };

    Ok(BallotResult { winner, consensus_confidence, disagreement, scores_by_action })
}
