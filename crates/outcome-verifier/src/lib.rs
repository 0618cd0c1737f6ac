//! Scores how well a `NewsInterpretation`'s prediction played out against the
//! market, one `HorizonJob` at a time (§4.13). Feeds the Weight Adjuster's
//! NIA computation.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use core_types::{Direction, HorizonJob, MarketReaction, NewsInterpretation, Topic};
use event_bus::EventBus;
use market_data_trait::MarketDataClient;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

pub struct OutcomeVerifier<M: MarketDataClient> {
    market: Arc<M>,
    bus: EventBus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerifyOutcome {
    NotDue,
    Scored(MarketReaction),
    Retrying,
    ManualReview,
}

impl<M: MarketDataClient> OutcomeVerifier<M> {
    pub fn new(market: Arc<M>, bus: EventBus) -> Self {
        Self { market, bus }
    }

    /// Schedule the three standard horizons for a freshly-created interpretation.
    pub fn schedule_jobs(interpretation: &NewsInterpretation) -> Vec<HorizonJob> {
        core_types::TimeHorizon::all()
            .into_iter()
            .map(|h| HorizonJob::new(interpretation.id, interpretation.created_at, h))
            .collect()
    }

    /// Attempt to verify one due job. Advances `job` in place on failure
    /// (bumping `attempts` and pushing `due_at` out per an exponential
    /// backoff) so the scheduler can simply re-poll due jobs on its normal
    /// cadence rather than sleeping in-process.
    pub async fn verify(&self, job: &mut HorizonJob, interpretation: &NewsInterpretation, now: DateTime<Utc>) -> VerifyOutcome {
        if !job.is_due(now) {
            return VerifyOutcome::NotDue;
        }

        match self.market.price(&interpretation.ticker, Some(job.due_at)).await {
            Ok(price_after) => {
                let reaction = score_reaction(interpretation, job.horizon, price_after, now);
                tracing::debug!(interpretation_id = %interpretation.id, horizon = job.horizon.label(), accuracy = reaction.accuracy, "horizon job scored");
                VerifyOutcome::Scored(reaction)
            }
            Err(_) => {
                job.attempts += 1;
                if job.exhausted() {
                    self.bus
                        .publish(
                            Topic::ErrorOccurred,
                            serde_json::json!({
                                "component": "outcome-verifier",
                                "interpretation_id": interpretation.id,
                                "horizon": job.horizon.label(),
                                "reason": "max_attempts_exceeded",
                            }),
                        )
                        .await;
                    VerifyOutcome::ManualReview
                } else {
                    let backoff_minutes = 2i64.pow(job.attempts as u32);
                    job.due_at = now + Duration::minutes(backoff_minutes);
                    VerifyOutcome::Retrying
                }
            }
        }
    }
}

/// `accuracy_h = direction_match × sqrt(mag_ratio)` (§4.13). Tiny/zero
/// predicted magnitudes are treated as fully matched if the actual move was
/// also tiny, since the ratio is otherwise ill-defined.
pub fn score_reaction(interpretation: &NewsInterpretation, horizon: core_types::TimeHorizon, price_after: Decimal, verified_at: DateTime<Utc>) -> MarketReaction {
    let base = interpretation.price_at_prediction;
    let ret = if base.is_zero() { Decimal::ZERO } else { (price_after - base) / base };

    let actual_direction = if ret > Decimal::ZERO {
        Direction::Up
    } else if ret < Decimal::ZERO {
        Direction::Down
    } else {
        Direction::Flat
    };
    let actual_magnitude_pct = ret.abs() * Decimal::from(100);

    let direction_match = if actual_direction == interpretation.predicted_direction { 1.0 } else { 0.0 };

    let predicted = interpretation.predicted_magnitude_pct.to_f64().unwrap_or(0.0).abs();
    let actual = actual_magnitude_pct.to_f64().unwrap_or(0.0).abs();
    let mag_ratio = if predicted < 1e-6 {
        if actual < 1e-6 {
            1.0
        } else {
            0.0
        }
    } else if actual < 1e-6 {
        0.0
    } else {
        let ratio = actual / predicted;
        ratio.min(1.0 / ratio)
    };

    let accuracy = direction_match * mag_ratio.sqrt();

    MarketReaction {
        interpretation_id: interpretation.id,
        horizon,
        actual_direction,
        actual_magnitude_pct,
        price_after,
        accuracy,
        verified_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{Sentiment, TimeHorizon};
    use market_data_trait::MockMarketData;
    use uuid::Uuid;

    fn interpretation(predicted_direction: Direction, predicted_magnitude_pct: Decimal, price_at_prediction: Decimal) -> NewsInterpretation {
        NewsInterpretation {
            id: Uuid::new_v4(),
            article_id: Uuid::new_v4(),
            ticker: "AAPL".to_string(),
            sentiment: Sentiment::Bullish,
            impact_score: Decimal::from(7),
            predicted_direction,
            predicted_magnitude_pct,
            time_horizon: TimeHorizon::OneDay,
            confidence: 0.8,
            price_at_prediction,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn perfect_prediction_scores_accuracy_one() {
        let interp = interpretation(Direction::Up, Decimal::from(5), Decimal::from(100));
        let reaction = score_reaction(&interp, TimeHorizon::OneDay, Decimal::from(105), Utc::now());
        assert_eq!(reaction.actual_direction, Direction::Up);
        assert!((reaction.accuracy - 1.0).abs() < 1e-9);
    }

    #[test]
    fn wrong_direction_scores_zero() {
        let interp = interpretation(Direction::Up, Decimal::from(5), Decimal::from(100));
        let reaction = score_reaction(&interp, TimeHorizon::OneDay, Decimal::from(95), Utc::now());
        assert_eq!(reaction.accuracy, 0.0);
    }

    #[test]
    fn overshoot_magnitude_penalized_via_sqrt_ratio() {
        let interp = interpretation(Direction::Up, Decimal::from(2), Decimal::from(100));
        // actual move is 8%, predicted was 2% -> mag_ratio = 2/8 = 0.25, sqrt = 0.5
        let reaction = score_reaction(&interp, TimeHorizon::OneDay, Decimal::from(108), Utc::now());
        assert!((reaction.accuracy - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn verify_returns_not_due_before_due_at() {
        let market = Arc::new(MockMarketData::new());
        let verifier = OutcomeVerifier::new(market, EventBus::new());
        let interp = interpretation(Direction::Up, Decimal::from(5), Decimal::from(100));
        let mut job = HorizonJob::new(interp.id, interp.created_at, TimeHorizon::OneDay);
        let outcome = verifier.verify(&mut job, &interp, Utc::now()).await;
        assert_eq!(outcome, VerifyOutcome::NotDue);
    }

    #[tokio::test]
    async fn verify_scores_when_price_available() {
        let market = Arc::new(MockMarketData::new());
        market.set_price("AAPL", Decimal::from(105));
        let verifier = OutcomeVerifier::new(market, EventBus::new());
        let interp = interpretation(Direction::Up, Decimal::from(5), Decimal::from(100));
        let mut job = HorizonJob::new(interp.id, interp.created_at, TimeHorizon::OneDay);
        let outcome = verifier.verify(&mut job, &interp, job.due_at).await;
        assert!(matches!(outcome, VerifyOutcome::Scored(_)));
    }

    #[tokio::test]
    async fn verify_retries_then_exhausts_to_manual_review() {
        let market = Arc::new(MockMarketData::new()); // no price set: always fails
        let verifier = OutcomeVerifier::new(market, EventBus::new());
        let interp = interpretation(Direction::Up, Decimal::from(5), Decimal::from(100));
        let mut job = HorizonJob::new(interp.id, interp.created_at, TimeHorizon::OneDay);
        let due = job.due_at;

        assert_eq!(verifier.verify(&mut job, &interp, due).await, VerifyOutcome::Retrying);
        assert_eq!(verifier.verify(&mut job, &interp, job.due_at).await, VerifyOutcome::Retrying);
        assert_eq!(verifier.verify(&mut job, &interp, job.due_at).await, VerifyOutcome::ManualReview);
        assert!(job.exhausted());
    }
}
