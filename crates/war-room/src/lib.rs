//! Deliberation Orchestrator (§4.8) — the War Room.
//!
//! Runs every configured agent concurrently against a market snapshot, each
//! under its own deadline, tallies the ballot, then applies the PM verdict
//! rules. Mirrors the source stack's `analysis-orchestrator::analyze`
//! concurrent-fan-out-then-combine shape, generalized from four fixed
//! analysis engines to an arbitrary roster of LLM agents.

use async_trait::async_trait;
use chrono::Utc;
use core_types::{
    Action, AgentOpinion, AgentWeights, Deliberation, MarketSnapshot, PersonaConfig, PmVerdict, Topic,
};
use event_bus::EventBus;
use llm_agent_trait::NewsAgentClient;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct WarRoomConfig {
    pub agent_timeout: Duration,
    pub deliberation_timeout: Duration,
    pub reduce_size_factor: f64,
}

impl Default for WarRoomConfig {
    fn default() -> Self {
        Self {
            agent_timeout: Duration::from_secs(8),
            deliberation_timeout: Duration::from_secs(12),
            reduce_size_factor: 0.5,
        }
    }
}

#[async_trait]
pub trait DeliberationStore: Send + Sync {
    async fn save(&self, deliberation: &Deliberation) -> anyhow::Result<()>;
}

/// No-op store: deliberations are still returned to the caller, just never
/// persisted. Useful for tests that only care about the verdict.
pub struct NullStore;

#[async_trait]
impl DeliberationStore for NullStore {
    async fn save(&self, _deliberation: &Deliberation) -> anyhow::Result<()> {
        Ok(())
    }
}

pub struct WarRoom {
    agents: Vec<Arc<dyn NewsAgentClient>>,
    store: Arc<dyn DeliberationStore>,
    bus: EventBus,
    config: WarRoomConfig,
}

/// Outcome of one full deliberation: the persisted record plus, when the PM
/// approved or reduced, the effective position-size scale factor to apply.
#[derive(Debug, Clone)]
pub struct DeliberationOutcome {
    pub deliberation: Deliberation,
    pub size_scale: f64,
}

impl WarRoom {
    pub fn new(agents: Vec<Arc<dyn NewsAgentClient>>, store: Arc<dyn DeliberationStore>, bus: EventBus, config: WarRoomConfig) -> Self {
        Self { agents, store, bus, config }
    }

    /// Run a full deliberation session for one symbol (§4.8).
    pub async fn deliberate(
        &self,
        symbol: &str,
        snapshot: &MarketSnapshot,
        weights: &AgentWeights,
        persona: PersonaConfig,
    ) -> anyhow::Result<DeliberationOutcome> {
        let started_at = Utc::now();
        self.bus
            .publish(Topic::DebateStarted, serde_json::json!({"symbol": symbol}))
            .await;

        let opinions = tokio::time::timeout(self.config.deliberation_timeout, self.collect_opinions(symbol, snapshot)).await.unwrap_or_else(|_| {
            // Overall deadline missed: every agent contributes a timeout HOLD.
            self.agents.iter().map(|a| AgentOpinion::hold_timeout(a.agent_id())).collect()
        });

        let ballot = agent_ballot::tally(&opinions, weights)?;

        // The missing-stop-loss PM rule from §4.8 is enforced by the Order
        // Validator's rule 3 instead (see DESIGN.md): stop-loss is assigned
        // by the sizer downstream of this deliberation, so the War Room has
        // nothing to check here yet.
        let (pm_verdict, size_scale, reasoning) = decide_verdict(&ballot, persona, self.config.reduce_size_factor);

        let deliberation = Deliberation {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            started_at,
            ended_at: Some(Utc::now()),
            agent_opinions: opinions,
            final_action: ballot.winner,
            final_confidence: ballot.consensus_confidence,
            pm_verdict,
            reasoning,
        };

        self.store.save(&deliberation).await?;
        self.bus
            .publish(Topic::DebateEnded, serde_json::json!({"symbol": symbol, "verdict": format!("{pm_verdict:?}")}))
            .await;

        Ok(DeliberationOutcome { deliberation, size_scale })
    }

    async fn collect_opinions(&self, symbol: &str, snapshot: &MarketSnapshot) -> Vec<AgentOpinion> {
        let mut handles = Vec::with_capacity(self.agents.len());
        for agent in &self.agents {
            let agent = Arc::clone(agent);
            let symbol = symbol.to_string();
            let snapshot = snapshot.clone();
            let timeout = self.config.agent_timeout;
            handles.push(tokio::spawn(async move {
                let agent_id = agent.agent_id().to_string();
                match tokio::time::timeout(timeout, agent.analyze(&symbol, &snapshot)).await {
                    Ok(Ok(opinion)) => opinion,
                    Ok(Err(err)) => {
                        tracing::warn!(agent_id, error = %err, "agent returned an error, treating as HOLD");
                        AgentOpinion::hold_timeout(&agent_id)
                    }
                    Err(_) => {
                        tracing::warn!(agent_id, "agent timed out, treating as HOLD");
                        AgentOpinion::hold_timeout(&agent_id)
                    }
                }
            }));
        }

        let mut opinions = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(opinion) => opinions.push(opinion),
                Err(join_err) => tracing::error!(error = %join_err, "agent task panicked"),
            }
        }
        opinions
    }
}

/// §4.8 PM verdict rules, applied after the ballot. Returns (verdict, size_scale, reasoning).
fn decide_verdict(ballot: &agent_ballot::BallotResult, persona: PersonaConfig, reduce_size_factor: f64) -> (PmVerdict, f64, String) {
    if ballot.disagreement > persona.disagreement_reject_threshold {
        return (
            PmVerdict::Reject,
            0.0,
            format!("disagreement {:.2} exceeds {:.2} threshold for {:?}", ballot.disagreement, persona.disagreement_reject_threshold, persona.mode),
        );
    }

    if ballot.consensus_confidence < persona.silence_confidence_floor {
        return (
            PmVerdict::Silence,
            0.0,
            format!("consensus confidence {:.2} below silence floor {:.2}", ballot.consensus_confidence, persona.silence_confidence_floor),
        );
    }

    if ballot.winner == Action::Buy && ballot.consensus_confidence < 0.70 {
        return (
            PmVerdict::ReduceSize,
            reduce_size_factor,
            format!("consensus confidence {:.2} below 0.70, scaling size by {reduce_size_factor}", ballot.consensus_confidence),
        );
    }

    (PmVerdict::Approve, 1.0, format!("approved with consensus confidence {:.2}", ballot.consensus_confidence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{Direction, MacroContext, Sentiment};
    use llm_agent_trait::MockAgent;
    use std::collections::HashMap;

    fn snapshot() -> MarketSnapshot {
        MarketSnapshot {
            ticker: "AAPL".to_string(),
            price: rust_decimal::Decimal::from(150),
            indicators: serde_json::json!({}),
            recent_news: vec![],
            macro_context: MacroContext { regime: "normal".to_string(), vix: rust_decimal::Decimal::from(15), fed_stance: "neutral".to_string() },
            taken_at: Utc::now(),
        }
    }

    fn weights() -> AgentWeights {
        let mut w = HashMap::new();
        w.insert("attack".to_string(), 0.35);
        w.insert("defense".to_string(), 0.35);
        w.insert("information".to_string(), 0.30);
        AgentWeights { version: 1, effective_at: Utc::now(), weights: w, reason: "seed".to_string(), actor: "system".to_string() }
    }

    fn opinion(agent_id: &str, action: Action, confidence: f64) -> AgentOpinion {
        AgentOpinion { agent_id: agent_id.to_string(), action, confidence, reasoning: "test".to_string(), features: HashMap::new() }
    }

    #[tokio::test]
    async fn unanimous_high_confidence_buy_is_approved() {
        let agents: Vec<Arc<dyn NewsAgentClient>> = vec![
            Arc::new(MockAgent::new("attack", opinion("attack", Action::Buy, 0.9))),
            Arc::new(MockAgent::new("defense", opinion("defense", Action::Buy, 0.85))),
            Arc::new(MockAgent::new("information", opinion("information", Action::Buy, 0.8))),
        ];
        let war_room = WarRoom::new(agents, Arc::new(NullStore), EventBus::new(), WarRoomConfig::default());
        let outcome = war_room.deliberate("AAPL", &snapshot(), &weights(), PersonaConfig::default()).await.unwrap();
        assert_eq!(outcome.deliberation.pm_verdict, PmVerdict::Approve);
        assert_eq!(outcome.deliberation.final_action, Action::Buy);
    }

    #[tokio::test]
    async fn high_disagreement_is_rejected() {
        let agents: Vec<Arc<dyn NewsAgentClient>> = vec![
            Arc::new(MockAgent::new("attack", opinion("attack", Action::Buy, 1.0))),
            Arc::new(MockAgent::new("defense", opinion("defense", Action::Sell, 0.5))),
            Arc::new(MockAgent::new("information", opinion("information", Action::Hold, 0.1))),
        ];
        let mut w = weights();
        w.weights.insert("attack".to_string(), 0.30);
        w.weights.insert("defense".to_string(), 0.35);
        w.weights.insert("information".to_string(), 0.35);
        let war_room = WarRoom::new(agents, Arc::new(NullStore), EventBus::new(), WarRoomConfig::default());
        let outcome = war_room.deliberate("AAPL", &snapshot(), &w, PersonaConfig::default()).await.unwrap();
        assert_eq!(outcome.deliberation.pm_verdict, PmVerdict::Reject);
    }

    #[tokio::test]
    async fn low_confidence_is_silenced() {
        let agents: Vec<Arc<dyn NewsAgentClient>> = vec![
            Arc::new(MockAgent::new("attack", opinion("attack", Action::Buy, 0.3))),
            Arc::new(MockAgent::new("defense", opinion("defense", Action::Buy, 0.2))),
            Arc::new(MockAgent::new("information", opinion("information", Action::Hold, 0.1))),
        ];
        let war_room = WarRoom::new(agents, Arc::new(NullStore), EventBus::new(), WarRoomConfig::default());
        let outcome = war_room.deliberate("AAPL", &snapshot(), &weights(), PersonaConfig::default()).await.unwrap();
        assert_eq!(outcome.deliberation.pm_verdict, PmVerdict::Silence);
    }

    #[tokio::test]
    async fn moderate_confidence_buy_reduces_size() {
        let agents: Vec<Arc<dyn NewsAgentClient>> = vec![
            Arc::new(MockAgent::new("attack", opinion("attack", Action::Buy, 0.62))),
            Arc::new(MockAgent::new("defense", opinion("defense", Action::Buy, 0.60))),
            Arc::new(MockAgent::new("information", opinion("information", Action::Buy, 0.58))),
        ];
        let war_room = WarRoom::new(agents, Arc::new(NullStore), EventBus::new(), WarRoomConfig::default());
        let outcome = war_room.deliberate("AAPL", &snapshot(), &weights(), PersonaConfig::default()).await.unwrap();
        assert_eq!(outcome.deliberation.pm_verdict, PmVerdict::ReduceSize);
        assert_eq!(outcome.size_scale, 0.5);
    }
}
