//! Shared data model and error taxonomy for the trading core.
//!
//! Every other crate in the workspace depends on `core-types` and nothing
//! else from each other's domain types, so entities only ever travel in one
//! canonical shape.

pub mod action;
pub mod context;
pub mod deliberation;
pub mod error;
pub mod news;
pub mod order;
pub mod shadow;
pub mod signal;
pub mod weights;

pub use action::{Action, ExecutionType, OrderSide};
pub use context::{MacroContext, MarketContext, MarketSnapshot, NewsDigest, PersonaConfig, PersonaMode, RecentOrderRef, RiskContext};
pub use deliberation::{AgentOpinion, Deliberation, PmVerdict};
pub use error::{AdapterError, OrderError, RuleViolation, SizingError, VerificationError, WeightError};
pub use news::{Direction, HorizonJob, MarketReaction, NewsArticle, NewsInterpretation, Sentiment, TimeHorizon};
pub use order::{Order, OrderState};
pub use shadow::{PositionStatus, SessionMetrics, SessionStatus, ShadowPosition, ShadowSession};
pub use signal::{Signal, SignalStatus, Urgency};
pub use weights::{AgentWeights, NORMALIZATION_TOLERANCE, WEIGHT_CEILING, WEIGHT_FLOOR};

/// The system-wide event topic names (§4.1), closed by construction: any
/// publish/subscribe call must name one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    OrderSent,
    OrderFilled,
    OrderCancelled,
    OrderRejected,
    OrderFailed,
    SignalReceived,
    SignalValidated,
    SignalRejected,
    PositionOpened,
    PositionClosed,
    PositionStopLossTriggered,
    RiskLimitExceeded,
    KillSwitchActivated,
    DebateStarted,
    DebateEnded,
    ConsensusReached,
    SystemStarted,
    SystemStopped,
    RecoveryStarted,
    RecoveryCompleted,
    ErrorOccurred,
    /// Reserved slot: raised by the News Poller after a batch persists, to
    /// wake the Signal Pipeline (§4.11).
    ArticlesIngested,
    /// Reserved slot: raised whenever an order or job is flagged for human
    /// attention (§4.3, §4.15).
    ManualReviewRequired,
}

impl Topic {
    pub fn name(self) -> &'static str {
        match self {
            Topic::OrderSent => "order_sent",
            Topic::OrderFilled => "order_filled",
            Topic::OrderCancelled => "order_cancelled",
            Topic::OrderRejected => "order_rejected",
            Topic::OrderFailed => "order_failed",
            Topic::SignalReceived => "signal_received",
            Topic::SignalValidated => "signal_validated",
            Topic::SignalRejected => "signal_rejected",
            Topic::PositionOpened => "position_opened",
            Topic::PositionClosed => "position_closed",
            Topic::PositionStopLossTriggered => "position_stop_loss_triggered",
            Topic::RiskLimitExceeded => "risk_limit_exceeded",
            Topic::KillSwitchActivated => "kill_switch_activated",
            Topic::DebateStarted => "debate_started",
            Topic::DebateEnded => "debate_ended",
            Topic::ConsensusReached => "consensus_reached",
            Topic::SystemStarted => "system_started",
            Topic::SystemStopped => "system_stopped",
            Topic::RecoveryStarted => "recovery_started",
            Topic::RecoveryCompleted => "recovery_completed",
            Topic::ErrorOccurred => "error_occurred",
            Topic::ArticlesIngested => "articles_ingested",
            Topic::ManualReviewRequired => "manual_review_required",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn action_tie_break_prefers_inaction() {
        assert!(Action::Hold.tie_break_rank() < Action::Buy.tie_break_rank());
        assert!(Action::Maintain.tie_break_rank() < Action::Sell.tie_break_rank());
    }

    #[test]
    fn order_side_conversion() {
        assert_eq!(OrderSide::try_from(Action::Buy), Ok(OrderSide::Buy));
        assert_eq!(OrderSide::try_from(Action::Reduce), Ok(OrderSide::Sell));
        assert!(OrderSide::try_from(Action::Hold).is_err());
    }

    #[test]
    fn agent_weights_validate_normalized() {
        let mut weights = HashMap::new();
        weights.insert("attack".to_string(), 0.35);
        weights.insert("defense".to_string(), 0.35);
        weights.insert("information".to_string(), 0.30);
        let w = AgentWeights {
            version: 1,
            effective_at: chrono::Utc::now(),
            weights,
            reason: "seed".to_string(),
            actor: "system".to_string(),
        };
        assert!(w.validate().is_ok());
    }

    #[test]
    fn agent_weights_reject_unnormalized() {
        let mut weights = HashMap::new();
        weights.insert("attack".to_string(), 0.5);
        weights.insert("defense".to_string(), 0.6);
        let w = AgentWeights {
            version: 1,
            effective_at: chrono::Utc::now(),
            weights,
            reason: "bad".to_string(),
            actor: "system".to_string(),
        };
        assert!(w.validate().is_err());
    }

    #[test]
    fn urgency_from_impact_score() {
        assert_eq!(Urgency::from_impact_score(rust_decimal::Decimal::from(9)), Urgency::High);
        assert_eq!(Urgency::from_impact_score(rust_decimal::Decimal::from(6)), Urgency::Med);
        assert_eq!(Urgency::from_impact_score(rust_decimal::Decimal::from(3)), Urgency::Low);
    }

    #[test]
    fn shadow_session_reconciliation_drift_zero_when_balanced() {
        let mut session = ShadowSession::new(rust_decimal::Decimal::from(100_000));
        session.total_pnl = rust_decimal::Decimal::ZERO;
        assert_eq!(session.reconciliation_drift(rust_decimal::Decimal::ZERO), rust_decimal::Decimal::ZERO);
    }
}
