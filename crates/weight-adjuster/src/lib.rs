//! Self-learning weight adjustment (§4.14). Runs once a day: scores the
//! Information agent's News Interpretation Accuracy (NIA) over the trailing
//! 30-day window of verified 1-day `MarketReaction`s and nudges its weight,
//! redistributing the delta across the other agents.

use chrono::{DateTime, Duration, Utc};
use core_types::{AgentWeights, MarketReaction, TimeHorizon, Topic, WeightError};
use event_bus::EventBus;

pub const INFORMATION_AGENT: &str = "information";
pub const MIN_VERIFIED_SAMPLES: usize = 50;
pub const MAX_DAILY_DELTA: f64 = 0.05;
pub const ADJUST_FLOOR: f64 = 0.05;
pub const ADJUST_CEILING: f64 = 0.25;
pub const NIA_WINDOW_DAYS: i64 = 30;
const LOW_NIA_THRESHOLD: f64 = 0.60;
const HIGH_NIA_THRESHOLD: f64 = 0.80;

pub struct WeightAdjuster {
    bus: EventBus,
}

impl WeightAdjuster {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    /// Run the daily adjustment. Returns `None` when there is too little
    /// data or the rule yields no change; otherwise publishes an audit event
    /// and returns the new weights version for the caller to persist.
    pub async fn run_daily(&self, current: &AgentWeights, reactions: &[MarketReaction], now: DateTime<Utc>) -> Result<Option<AgentWeights>, WeightError> {
        let adjusted = compute_adjustment(current, reactions, now)?;
        if let Some(ref next) = adjusted {
            self.bus
                .publish(Topic::ConsensusReached, serde_json::json!({"component": "weight-adjuster", "version": next.version, "reason": next.reason}))
                .await;
        }
        Ok(adjusted)
    }
}

/// NIA: mean accuracy of verified 1-day reactions in the trailing window.
/// `None` when fewer than `MIN_VERIFIED_SAMPLES` fall in the window.
pub fn compute_nia(reactions: &[MarketReaction], now: DateTime<Utc>) -> Option<f64> {
    let window_start = now - Duration::days(NIA_WINDOW_DAYS);
    let samples: Vec<f64> = reactions
        .iter()
        .filter(|r| r.horizon == TimeHorizon::OneDay && r.verified_at >= window_start && r.verified_at <= now)
        .map(|r| r.accuracy)
        .collect();
    if samples.len() < MIN_VERIFIED_SAMPLES {
        return None;
    }
    Some(samples.iter().sum::<f64>() / samples.len() as f64)
}

fn delta_for_nia(nia: f64) -> f64 {
    if nia < LOW_NIA_THRESHOLD {
        -0.02
    } else if nia >= HIGH_NIA_THRESHOLD {
        0.02
    } else {
        0.0
    }
}

/// Pure computation of the adjustment, with no side effects. Separated from
/// `WeightAdjuster::run_daily` so the arithmetic can be unit tested without
/// an event bus.
pub fn compute_adjustment(current: &AgentWeights, reactions: &[MarketReaction], now: DateTime<Utc>) -> Result<Option<AgentWeights>, WeightError> {
    let Some(nia) = compute_nia(reactions, now) else {
        return Ok(None);
    };
    let delta = delta_for_nia(nia);
    if delta == 0.0 {
        return Ok(None);
    }

    let old_info_weight = current.weight_of(INFORMATION_AGENT);
    let new_info_weight = (old_info_weight + delta.clamp(-MAX_DAILY_DELTA, MAX_DAILY_DELTA)).clamp(ADJUST_FLOOR, ADJUST_CEILING);
    let actual_delta = new_info_weight - old_info_weight;
    if actual_delta == 0.0 {
        return Ok(None);
    }

    let other_agents: Vec<String> = current.weights.keys().filter(|k| k.as_str() != INFORMATION_AGENT).cloned().collect();
    if other_agents.is_empty() {
        return Err(WeightError::EmptyBallot);
    }

    let mut weights = current.weights.clone();
    weights.insert(INFORMATION_AGENT.to_string(), new_info_weight);

    let compensation_per_agent = -actual_delta / other_agents.len() as f64;
    for agent in &other_agents {
        if let Some(w) = weights.get_mut(agent) {
            *w += compensation_per_agent;
        }
    }

    // Re-apportion any residual from floating point error onto the largest
    // non-information weight so the set sums to exactly 1.0.
    let residual = 1.0 - weights.values().sum::<f64>();
    if residual.abs() > 0.0 {
        if let Some(biggest) = other_agents.iter().max_by(|a, b| weights[*a].partial_cmp(&weights[*b]).unwrap()) {
            *weights.get_mut(biggest).unwrap() += residual;
        }
    }

    let next = AgentWeights {
        version: current.version + 1,
        effective_at: now,
        weights,
        reason: format!("auto: NIA={:.0}%", nia * 100.0),
        actor: "weight-adjuster".to_string(),
    };
    next.validate()?;
    Ok(Some(next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_weights() -> AgentWeights {
        let mut weights = HashMap::new();
        weights.insert("attack".to_string(), 0.35);
        weights.insert("defense".to_string(), 0.35);
        weights.insert(INFORMATION_AGENT.to_string(), 0.30);
        AgentWeights { version: 1, effective_at: Utc::now(), weights, reason: "seed".to_string(), actor: "system".to_string() }
    }

    fn reaction(accuracy: f64, verified_at: DateTime<Utc>) -> MarketReaction {
        MarketReaction {
            interpretation_id: uuid::Uuid::new_v4(),
            horizon: TimeHorizon::OneDay,
            actual_direction: core_types::Direction::Up,
            actual_magnitude_pct: rust_decimal::Decimal::from(1),
            price_after: rust_decimal::Decimal::from(100),
            accuracy,
            verified_at,
        }
    }

    #[test]
    fn too_few_samples_yields_no_adjustment() {
        let now = Utc::now();
        let reactions: Vec<_> = (0..10).map(|_| reaction(0.2, now)).collect();
        assert_eq!(compute_adjustment(&base_weights(), &reactions, now).unwrap(), None);
    }

    #[test]
    fn low_nia_decreases_information_weight_and_redistributes() {
        let now = Utc::now();
        let reactions: Vec<_> = (0..60).map(|_| reaction(0.2, now)).collect();
        let next = compute_adjustment(&base_weights(), &reactions, now).unwrap().unwrap();
        assert!((next.weight_of(INFORMATION_AGENT) - 0.28).abs() < 1e-9);
        assert!((next.weights.values().sum::<f64>() - 1.0).abs() < NORMALIZATION_EPS);
        next.validate().unwrap();
    }

    #[test]
    fn high_nia_increases_information_weight() {
        let now = Utc::now();
        let reactions: Vec<_> = (0..60).map(|_| reaction(0.9, now)).collect();
        let next = compute_adjustment(&base_weights(), &reactions, now).unwrap().unwrap();
        assert!((next.weight_of(INFORMATION_AGENT) - 0.32).abs() < 1e-9);
        next.validate().unwrap();
    }

    #[test]
    fn mid_nia_makes_no_change() {
        let now = Utc::now();
        let reactions: Vec<_> = (0..60).map(|_| reaction(0.7, now)).collect();
        assert_eq!(compute_adjustment(&base_weights(), &reactions, now).unwrap(), None);
    }

    #[test]
    fn reactions_outside_window_are_ignored() {
        let now = Utc::now();
        let stale: Vec<_> = (0..60).map(|_| reaction(0.2, now - Duration::days(40))).collect();
        assert_eq!(compute_adjustment(&base_weights(), &stale, now).unwrap(), None);
    }

    const NORMALIZATION_EPS: f64 = 1e-9;
}
