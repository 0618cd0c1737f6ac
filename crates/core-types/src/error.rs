use thiserror::Error;

/// Errors returned by the order state machine and order manager.
#[derive(Error, Debug)]
pub enum OrderError {
    #[error("invalid state transition: {from:?} -> {to:?}")]
    InvalidStateTransition { from: crate::order::OrderState, to: crate::order::OrderState },
    #[error("order not found: {0}")]
    OrderNotFound(uuid::Uuid),
    #[error("storage failure: {0}")]
    StorageFailure(String),
}

/// Outcome of the Order Validator's hard-rule pass.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("rule {rule_code} violated: {reason}")]
pub struct RuleViolation {
    pub rule_code: u8,
    pub reason: String,
}

/// Errors raised while sizing a position.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SizingError {
    #[error("stop loss not set, cannot size position")]
    MissingStopLoss,
    #[error("stop distance is zero, cannot size position")]
    ZeroStopDistance,
    #[error("sized quantity rounds to zero")]
    ZeroQuantity,
}

/// Errors from the Agent Weighted Ballot and weight adjustment.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WeightError {
    #[error("weights do not sum to 1.0 (got {0})")]
    NotNormalized(f64),
    #[error("weight for agent {agent_id} out of bounds: {weight}")]
    OutOfBounds { agent_id: String, weight: f64 },
    #[error("no opinions supplied to ballot")]
    EmptyBallot,
}

/// Errors surfaced by the Outcome Verifier's horizon jobs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VerificationError {
    #[error("price unavailable at horizon for {ticker} at {at}")]
    PriceUnavailable { ticker: String, at: chrono::DateTime<chrono::Utc> },
    #[error("job exceeded max attempts, needs manual review")]
    MaxAttemptsExceeded,
}

/// Generic external-adapter failure (broker, market data, LLM).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    #[error("adapter timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("adapter call failed: {0}")]
    Failed(String),
    #[error("adapter returned malformed data: {0}")]
    Malformed(String),
}
