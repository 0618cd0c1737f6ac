//! Signal Pipeline (§4.10): the bounded worker that turns analyzed news into
//! a Signal the Order Manager can act on. Ties together News Poller storage,
//! the interpreter adapter, the War Room, the sizer, the deduper and the
//! Order Manager in one per-cycle pass.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use core_types::{
    AgentWeights, MacroContext, MarketSnapshot, NewsArticle, NewsDigest, NewsInterpretation, OrderSide, PersonaConfig, PmVerdict, Signal,
};
use llm_agent_trait::NewsInterpreterClient;
use market_data_trait::MarketDataClient;
use news_poller::NewsDb;
use order_manager::OrderManager;
use outcome_verifier::OutcomeVerifier;
use position_sizer::SizingInput;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use signal_dedup::{FilterOutcome, SignalDeduper};
use tokio::time::Instant;
use uuid::Uuid;
use war_room::WarRoom;

use crate::ratelimit::TokenBucket;
use crate::store::InterpretationStore;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("news storage failure: {0}")]
    NewsDb(#[from] news_poller::NewsDbError),
    #[error("interpretation storage failure: {0}")]
    Store(#[from] crate::store::StoreError),
    #[error("order manager failure: {0}")]
    Order(#[from] core_types::OrderError),
    #[error("deliberation failed: {0}")]
    Deliberation(String),
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub claim_limit: u32,
    pub cycle_deadline: StdDuration,
    pub llm_rate_per_minute: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { claim_limit: 10, cycle_deadline: StdDuration::from_secs(60), llm_rate_per_minute: 10 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub interpreted: usize,
    pub deliberated: usize,
    pub signals_emitted: usize,
    pub deferred_rate_limited: usize,
    pub cycle_aborted: bool,
}

pub struct SignalPipeline<I: NewsInterpreterClient, M: MarketDataClient> {
    news_db: NewsDb,
    store: InterpretationStore,
    interpreter: Arc<I>,
    market: Arc<M>,
    war_room: Arc<WarRoom>,
    orders: Arc<OrderManager>,
    verifier: OutcomeVerifier<M>,
    dedup: SignalDeduper,
    bucket: TokenBucket,
    config: PipelineConfig,
}

impl<I: NewsInterpreterClient, M: MarketDataClient> SignalPipeline<I, M> {
    pub fn new(
        news_db: NewsDb,
        store: InterpretationStore,
        interpreter: Arc<I>,
        market: Arc<M>,
        war_room: Arc<WarRoom>,
        orders: Arc<OrderManager>,
        bus: event_bus::EventBus,
        config: PipelineConfig,
    ) -> Self {
        let verifier = OutcomeVerifier::new(Arc::clone(&market), bus);
        let bucket = TokenBucket::new(config.llm_rate_per_minute);
        Self { news_db, store, interpreter, market, war_room, orders, verifier, dedup: SignalDeduper::new(), bucket, config }
    }

    pub fn store(&self) -> &InterpretationStore {
        &self.store
    }

    /// Re-check any horizon jobs that have come due, recording the reaction.
    /// Run on the Scheduler's `horizon_verify` cadence, independent of the
    /// article ingestion cycle.
    pub async fn verify_due_jobs(&self, now: DateTime<Utc>) -> Result<usize, PipelineError> {
        let mut scored = 0;
        for mut job in self.store.due_jobs(now).await? {
            let interpretation = self.store.get_interpretation(job.interpretation_id).await?;
            match self.verifier.verify(&mut job, &interpretation, now).await {
                outcome_verifier::VerifyOutcome::Scored(reaction) => {
                    self.store.record_reaction(&reaction).await?;
                    self.store.remove_job(&job).await?;
                    scored += 1;
                }
                outcome_verifier::VerifyOutcome::ManualReview => {
                    self.store.remove_job(&job).await?;
                }
                outcome_verifier::VerifyOutcome::Retrying => {
                    self.store.update_job(&job).await?;
                }
                outcome_verifier::VerifyOutcome::NotDue => {}
            }
        }
        Ok(scored)
    }

    /// One pass over unanalyzed articles (§4.10). `equity` is a snapshot of
    /// the Shadow Ledger's current session equity, used by the sizer.
    pub async fn run_cycle(&self, weights: &AgentWeights, persona: PersonaConfig, equity: Decimal, now: DateTime<Utc>) -> Result<CycleReport, PipelineError> {
        let deadline = Instant::now() + self.config.cycle_deadline;
        let mut report = CycleReport::default();
        let articles = self.news_db.unanalyzed(self.config.claim_limit).await?;

        'articles: for article in &articles {
            if Instant::now() >= deadline {
                report.cycle_aborted = true;
                break;
            }

            for ticker in &article.tickers {
                if Instant::now() >= deadline {
                    report.cycle_aborted = true;
                    break 'articles;
                }

                if !self.bucket.try_acquire() {
                    report.deferred_rate_limited += 1;
                    continue 'articles; // leave the whole article unanalyzed for the next cycle
                }

                let interpretation = match self.interpret_one(article, ticker, now).await {
                    Ok(i) => i,
                    Err(err) => {
                        tracing::warn!(article_id = %article.id, ticker, error = %err, "interpretation failed");
                        continue;
                    }
                };
                report.interpreted += 1;

                if interpretation.is_trading_actionable() {
                    report.deliberated += 1;
                    match self.deliberate_and_emit(&interpretation, weights, persona, equity, now).await {
                        Ok(true) => report.signals_emitted += 1,
                        Ok(false) => {}
                        Err(err) => tracing::warn!(interpretation_id = %interpretation.id, error = %err, "deliberation/sizing failed"),
                    }
                }
            }

            self.news_db.mark_analyzed(article.id, None).await?;
        }

        Ok(report)
    }

    async fn interpret_one(&self, article: &NewsArticle, ticker: &str, now: DateTime<Utc>) -> Result<NewsInterpretation, PipelineError> {
        let draft = self
            .interpreter
            .interpret(article, ticker)
            .await
            .map_err(|e| PipelineError::Deliberation(e.to_string()))?;
        let price_at_prediction = self.market.price(ticker, None).await.unwrap_or(Decimal::ZERO);

        let interpretation = NewsInterpretation {
            id: Uuid::new_v4(),
            article_id: article.id,
            ticker: ticker.to_string(),
            sentiment: draft.sentiment,
            impact_score: draft.impact_score,
            predicted_direction: draft.predicted_direction,
            predicted_magnitude_pct: draft.predicted_magnitude_pct,
            time_horizon: draft.time_horizon,
            confidence: draft.confidence,
            price_at_prediction,
            created_at: now,
        };

        self.store.insert_interpretation(&interpretation).await?;
        let jobs = OutcomeVerifier::<M>::schedule_jobs(&interpretation);
        self.store.insert_jobs(&jobs).await?;
        Ok(interpretation)
    }

    /// Returns `Ok(true)` iff a Signal was actually emitted to the Order Manager.
    async fn deliberate_and_emit(
        &self,
        interpretation: &NewsInterpretation,
        weights: &AgentWeights,
        persona: PersonaConfig,
        equity: Decimal,
        now: DateTime<Utc>,
    ) -> Result<bool, PipelineError> {
        let snapshot = self.build_snapshot(interpretation).await;

        let outcome = self
            .war_room
            .deliberate(&interpretation.ticker, &snapshot, weights, persona)
            .await
            .map_err(|e| PipelineError::Deliberation(e.to_string()))?;

        if !matches!(outcome.deliberation.pm_verdict, PmVerdict::Approve | PmVerdict::ReduceSize) {
            return Ok(false);
        }

        let action = outcome.deliberation.final_action;
        let side = match OrderSide::try_from(action) {
            Ok(side) => side,
            Err(_) => return Ok(false), // HOLD/MAINTAIN never reaches the sizer
        };

        let vol = self.market.realized_vol(&interpretation.ticker, 30).await.unwrap_or(dec!(0.20));
        let entry_price = snapshot.price;
        let (stop_loss, _take_profit) = stop_and_target(entry_price, side, vol);

        let sizing = SizingInput {
            action,
            equity,
            entry_price,
            stop_loss: Some(stop_loss),
            agent_confidence: outcome.deliberation.final_confidence,
            realized_vol_30d: vol,
        };

        let sized = match position_sizer::size_position(&sizing) {
            Ok(out) => out,
            Err(_) => return Ok(false), // size-fail: ballot effectively becomes a no-op
        };

        let scale = Decimal::try_from(outcome.size_scale).unwrap_or(Decimal::ONE);
        let quantity = (sized.quantity * scale).floor();
        if quantity <= Decimal::ZERO {
            return Ok(false);
        }
        let position_size_pct = (quantity * entry_price / equity).to_f64().unwrap_or(0.0);

        let reason = format!(
            "interpretation {} impact {} verdict {:?}",
            interpretation.id, interpretation.impact_score, outcome.deliberation.pm_verdict
        );
        let urgency = core_types::Urgency::from_impact_score(interpretation.impact_score);
        let signal = Signal::new(&interpretation.ticker, action, outcome.deliberation.final_confidence, position_size_pct, reason, urgency, Some(interpretation.article_id));

        match self.dedup.check(&signal, now) {
            FilterOutcome::Emit => {
                self.orders.receive_signal(&signal, side, quantity).await?;
                Ok(true)
            }
            FilterOutcome::DedupedDuplicate | FilterOutcome::BelowConfidenceFloor => Ok(false),
        }
    }

    async fn build_snapshot(&self, interpretation: &NewsInterpretation) -> MarketSnapshot {
        let price = self.market.price(&interpretation.ticker, None).await.unwrap_or(interpretation.price_at_prediction);
        let vol = self.market.realized_vol(&interpretation.ticker, 30).await.unwrap_or(dec!(0.20));
        MarketSnapshot {
            ticker: interpretation.ticker.clone(),
            price,
            indicators: serde_json::json!({"realized_vol_30d": vol.to_string()}),
            recent_news: vec![NewsDigest { title: format!("article {}", interpretation.article_id), sentiment: interpretation.sentiment, impact: interpretation.impact_score }],
            // No macro/VIX feed adapter exists in this build; a neutral
            // placeholder stands in until one is added.
            macro_context: MacroContext { regime: "normal".to_string(), vix: dec!(15), fed_stance: "neutral".to_string() },
            taken_at: Utc::now(),
        }
    }
}

/// Stop-loss/take-profit derived from realized volatility: two standard
/// moves against the position for the stop, symmetric 2:1 reward:risk for
/// the target (see DESIGN.md — the distilled spec leaves the exact stop
/// placement formula unspecified).
fn stop_and_target(entry: Decimal, side: OrderSide, vol: Decimal) -> (Decimal, Decimal) {
    let stop_distance_pct = (vol * Decimal::from(2)).min(dec!(0.20));
    match side {
        OrderSide::Buy => (entry * (Decimal::ONE - stop_distance_pct), entry * (Decimal::ONE + stop_distance_pct * Decimal::from(2))),
        OrderSide::Sell => (entry * (Decimal::ONE + stop_distance_pct), entry * (Decimal::ONE - stop_distance_pct * Decimal::from(2))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{Action, Direction, Sentiment, TimeHorizon};
    use event_bus::EventBus;
    use llm_agent_trait::{InterpretationDraft, MockInterpreter};
    use market_data_trait::MockMarketData;
    use order_manager::OrderDb;
    use std::collections::BTreeSet;
    use war_room::{NullStore, WarRoomConfig};

    fn weights() -> AgentWeights {
        let mut w = std::collections::HashMap::new();
        w.insert("attack".to_string(), 0.35);
        w.insert("defense".to_string(), 0.35);
        w.insert("information".to_string(), 0.30);
        AgentWeights { version: 1, effective_at: Utc::now(), weights: w, reason: "seed".to_string(), actor: "system".to_string() }
    }

    fn bullish_draft() -> InterpretationDraft {
        InterpretationDraft {
            sentiment: Sentiment::Bullish,
            impact_score: Decimal::from(9),
            predicted_direction: Direction::Up,
            predicted_magnitude_pct: Decimal::from(5),
            time_horizon: TimeHorizon::OneDay,
            confidence: 0.9,
        }
    }

    async fn pipeline(
        draft: InterpretationDraft,
        agents: Vec<Arc<dyn llm_agent_trait::NewsAgentClient>>,
    ) -> (SignalPipeline<MockInterpreter, MockMarketData>, NewsDb, Arc<OrderManager>) {
        let news_db = NewsDb::new("sqlite::memory:").await.unwrap();
        let store = InterpretationStore::new("sqlite::memory:").await.unwrap();
        let market = Arc::new(MockMarketData::new());
        market.set_price("AAPL", Decimal::from(100));
        market.set_vol("AAPL", dec!(0.10));
        let interpreter = Arc::new(MockInterpreter::new(draft));
        let bus = EventBus::new();
        let war_room = Arc::new(WarRoom::new(agents, Arc::new(NullStore), bus.clone(), WarRoomConfig::default()));
        let orders = Arc::new(OrderManager::new(OrderDb::new("sqlite::memory:").await.unwrap(), bus.clone()));
        let pipeline = SignalPipeline::new(news_db.clone(), store, interpreter, market, war_room, Arc::clone(&orders), bus, PipelineConfig::default());
        (pipeline, news_db, orders)
    }

    fn opinion(agent_id: &str, action: Action, confidence: f64) -> core_types::AgentOpinion {
        core_types::AgentOpinion { agent_id: agent_id.to_string(), action, confidence, reasoning: "test".to_string(), features: std::collections::HashMap::new() }
    }

    #[tokio::test]
    async fn actionable_approved_article_emits_a_signal() {
        let agents: Vec<Arc<dyn llm_agent_trait::NewsAgentClient>> = vec![
            Arc::new(llm_agent_trait::MockAgent::new("attack", opinion("attack", Action::Buy, 0.9))),
            Arc::new(llm_agent_trait::MockAgent::new("defense", opinion("defense", Action::Buy, 0.85))),
            Arc::new(llm_agent_trait::MockAgent::new("information", opinion("information", Action::Buy, 0.8))),
        ];
        let (pipeline, news_db, orders) = pipeline(bullish_draft(), agents).await;
        let article = NewsArticle::new("reuters", Utc::now(), "Acme merger", "body", BTreeSet::from(["AAPL".to_string()]));
        news_db.insert_if_new(&article, "k1").await.unwrap();

        let report = pipeline.run_cycle(&weights(), PersonaConfig::default(), Decimal::from(100_000), Utc::now()).await.unwrap();
        assert_eq!(report.interpreted, 1);
        assert_eq!(report.deliberated, 1);
        assert_eq!(report.signals_emitted, 1);
        assert_eq!(orders.non_terminal_orders().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn low_impact_article_skips_deliberation() {
        let mut draft = bullish_draft();
        draft.impact_score = Decimal::from(3);
        let (pipeline, news_db, _orders) = pipeline(draft, vec![]).await;
        let article = NewsArticle::new("reuters", Utc::now(), "Acme merger", "body", BTreeSet::from(["AAPL".to_string()]));
        news_db.insert_if_new(&article, "k1").await.unwrap();

        let report = pipeline.run_cycle(&weights(), PersonaConfig::default(), Decimal::from(100_000), Utc::now()).await.unwrap();
        assert_eq!(report.interpreted, 1);
        assert_eq!(report.deliberated, 0);
        assert_eq!(report.signals_emitted, 0);
    }

    #[tokio::test]
    async fn rejected_deliberation_emits_no_signal() {
        let agents: Vec<Arc<dyn llm_agent_trait::NewsAgentClient>> = vec![
            Arc::new(llm_agent_trait::MockAgent::new("attack", opinion("attack", Action::Buy, 1.0))),
            Arc::new(llm_agent_trait::MockAgent::new("defense", opinion("defense", Action::Sell, 0.5))),
            Arc::new(llm_agent_trait::MockAgent::new("information", opinion("information", Action::Hold, 0.1))),
        ];
        let (pipeline, news_db, orders) = pipeline(bullish_draft(), agents).await;
        let article = NewsArticle::new("reuters", Utc::now(), "Acme merger", "body", BTreeSet::from(["AAPL".to_string()]));
        news_db.insert_if_new(&article, "k1").await.unwrap();

        let report = pipeline.run_cycle(&weights(), PersonaConfig::default(), Decimal::from(100_000), Utc::now()).await.unwrap();
        assert_eq!(report.signals_emitted, 0);
        assert!(orders.non_terminal_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn exhausted_rate_limit_defers_article_to_next_cycle() {
        let agents: Vec<Arc<dyn llm_agent_trait::NewsAgentClient>> = vec![
            Arc::new(llm_agent_trait::MockAgent::new("attack", opinion("attack", Action::Buy, 0.9))),
            Arc::new(llm_agent_trait::MockAgent::new("defense", opinion("defense", Action::Buy, 0.85))),
            Arc::new(llm_agent_trait::MockAgent::new("information", opinion("information", Action::Buy, 0.8))),
        ];
        let (pipeline, news_db, _orders) = pipeline(bullish_draft(), agents).await;
        let article = NewsArticle::new("reuters", Utc::now(), "Acme merger", "body", BTreeSet::from(["AAPL".to_string()]));
        news_db.insert_if_new(&article, "k1").await.unwrap();

        for _ in 0..pipeline.config.llm_rate_per_minute {
            pipeline.bucket.try_acquire();
        }

        let report = pipeline.run_cycle(&weights(), PersonaConfig::default(), Decimal::from(100_000), Utc::now()).await.unwrap();
        assert_eq!(report.interpreted, 0);
        assert_eq!(report.deferred_rate_limited, 1);
        assert!(news_db.unanalyzed(10).await.unwrap().len() == 1);
    }
}
