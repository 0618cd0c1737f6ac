//! LLM-backed agent boundary (§6): opaque text-in / structured-JSON-out.
//! Two adapters: one per War Room agent (`NewsAgentClient`), one for turning a
//! raw article into a per-ticker interpretation (`NewsInterpreterClient`).

use async_trait::async_trait;
use core_types::{AgentOpinion, Direction, MarketSnapshot, NewsArticle, Sentiment, TimeHorizon};

#[derive(Debug, thiserror::Error)]
pub enum LlmAgentError {
    #[error("agent call timed out")]
    Timeout,
    #[error("agent call failed: {0}")]
    Failed(String),
    #[error("agent returned malformed response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait NewsAgentClient: Send + Sync {
    fn agent_id(&self) -> &str;
    async fn analyze(&self, symbol: &str, snapshot: &MarketSnapshot) -> Result<AgentOpinion, LlmAgentError>;
}

/// Output of turning one (article, ticker) pair into a structured prediction.
#[derive(Debug, Clone)]
pub struct InterpretationDraft {
    pub sentiment: Sentiment,
    pub impact_score: rust_decimal::Decimal,
    pub predicted_direction: Direction,
    pub predicted_magnitude_pct: rust_decimal::Decimal,
    pub time_horizon: TimeHorizon,
    pub confidence: f64,
}

#[async_trait]
pub trait NewsInterpreterClient: Send + Sync {
    async fn interpret(&self, article: &NewsArticle, ticker: &str) -> Result<InterpretationDraft, LlmAgentError>;
}

/// Deterministic mock agent returning a fixed opinion, used by tests and
/// offline runs so the War Room's concurrency contract can be exercised
/// without a live LLM.
pub struct MockAgent {
    id: String,
    fixed: AgentOpinion,
}

impl MockAgent {
    pub fn new(id: impl Into<String>, fixed: AgentOpinion) -> Self {
        Self { id: id.into(), fixed }
    }
}

#[async_trait]
impl NewsAgentClient for MockAgent {
    fn agent_id(&self) -> &str {
        &self.id
    }

    async fn analyze(&self, _symbol: &str, _snapshot: &MarketSnapshot) -> Result<AgentOpinion, LlmAgentError> {
        Ok(self.fixed.clone())
    }
}

pub struct MockInterpreter {
    fixed: InterpretationDraft,
}

impl MockInterpreter {
    pub fn new(fixed: InterpretationDraft) -> Self {
        Self { fixed }
    }
}

#[async_trait]
impl NewsInterpreterClient for MockInterpreter {
    async fn interpret(&self, _article: &NewsArticle, _ticker: &str) -> Result<InterpretationDraft, LlmAgentError> {
        Ok(self.fixed.clone())
    }
}
