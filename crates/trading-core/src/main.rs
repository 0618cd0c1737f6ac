//! Composition root (§A5). Wires every library crate into one running
//! process: News Poller, Signal Pipeline (War Room, sizer, dedup, Order
//! Manager), Shadow Ledger, Outcome Verifier, Weight Adjuster, Recovery
//! Coordinator, all driven by the Scheduler on the cadences in §4.16.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use broker_trait::MockBroker;
use chrono::Utc;
use core_types::{Action, AgentOpinion, AgentWeights, PersonaConfig, Topic};
use event_bus::EventBus;
use llm_agent_trait::{InterpretationDraft, MockAgent, MockInterpreter};
use market_data_trait::MockMarketData;
use news_poller::{MockNewsSource, NewsDb, NewsPoller};
use order_manager::{OrderDb, OrderManager};
use recovery_coordinator::RecoveryCoordinator;
use rust_decimal::Decimal;
use scheduler_core::Scheduler;
use shadow_ledger::{ShadowDb, ShadowLedger};
use signal_pipeline::{PipelineConfig, SignalPipeline};
use tokio::signal::unix::SignalKind;
use tokio::sync::{Mutex, RwLock};
use war_room::{NullStore, WarRoom, WarRoomConfig};
use weight_adjuster::WeightAdjuster;

use trading_core::config::AppConfig;
use trading_core::execution::ExecutionGateway;

fn seed_weights() -> AgentWeights {
    let mut weights = HashMap::new();
    weights.insert("attack".to_string(), 0.35);
    weights.insert("defense".to_string(), 0.35);
    weights.insert("information".to_string(), 0.30);
    AgentWeights { version: 1, effective_at: Utc::now(), weights, reason: "startup seed".to_string(), actor: "system".to_string() }
}

/// The only `NewsAgentClient`/`NewsInterpreterClient` implementations in the
/// workspace are fixed-response mocks (no real LLM adapter was built — the
/// trait is the extension seam, see DESIGN.md). Wired here with a modest
/// default stance per agent so a fresh deployment isn't silently inert.
fn seed_agents() -> Vec<Arc<dyn llm_agent_trait::NewsAgentClient>> {
    vec![
        Arc::new(MockAgent::new(
            "attack",
            AgentOpinion { agent_id: "attack".to_string(), action: Action::Buy, confidence: 0.65, reasoning: "default bullish stance".to_string(), features: HashMap::new() },
        )),
        Arc::new(MockAgent::new(
            "defense",
            AgentOpinion { agent_id: "defense".to_string(), action: Action::Hold, confidence: 0.55, reasoning: "default cautious stance".to_string(), features: HashMap::new() },
        )),
        Arc::new(MockAgent::new(
            "information",
            AgentOpinion { agent_id: "information".to_string(), action: Action::Buy, confidence: 0.60, reasoning: "default informational read".to_string(), features: HashMap::new() },
        )),
    ]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .init();

    std::panic::set_hook(Box::new(|info| {
        tracing::error!("PANIC: {info}");
    }));

    tracing::info!("starting trading-core");

    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!(persona = ?config.persona_mode, max_position_pct = %config.max_position_pct, "configuration loaded");

    let bus = EventBus::new();
    bus.publish(Topic::SystemStarted, serde_json::json!({"persona": format!("{:?}", config.persona_mode)})).await;

    // Storage layer: every crate owns its own tables in the same database file.
    let order_db = OrderDb::new(&config.database_url).await?;
    let shadow_db = ShadowDb::new(&config.database_url).await?;
    let news_db = NewsDb::new(&config.database_url).await?;
    let interpretation_store = signal_pipeline::InterpretationStore::new(&config.database_url).await?;

    let orders = Arc::new(OrderManager::new(order_db, bus.clone()));
    let shadow = Arc::new(ShadowLedger::new(shadow_db, bus.clone()));
    let session = shadow.ensure_session(config.shadow_initial_capital).await?;
    let session = Arc::new(Mutex::new(session));

    let broker = Arc::new(MockBroker::new("paper-broker", Decimal::from(100)));
    let market = Arc::new(MockMarketData::new());

    // No live news feed adapter exists in this build; an empty mock source
    // means `news_poll` ticks are no-ops until a real `NewsSource` is wired in.
    let news_poller = Arc::new(NewsPoller::with_keywords(news_db.clone(), bus.clone(), vec![Arc::new(MockNewsSource::new("offline", vec![]))], config.tradeable_keywords.clone()));

    let interpreter = Arc::new(MockInterpreter::new(InterpretationDraft {
        sentiment: core_types::Sentiment::Neutral,
        impact_score: Decimal::from(5),
        predicted_direction: core_types::Direction::Flat,
        predicted_magnitude_pct: Decimal::ZERO,
        time_horizon: core_types::TimeHorizon::OneDay,
        confidence: 0.5,
    }));

    // Deliberations are not persisted anywhere in this build: no DB-backed
    // `DeliberationStore` exists in the workspace, so the War Room is wired
    // to the in-memory no-op store (see DESIGN.md).
    let war_room = Arc::new(WarRoom::new(seed_agents(), Arc::new(NullStore), bus.clone(), WarRoomConfig::default()));

    let pipeline_config = PipelineConfig { claim_limit: config.claim_limit, cycle_deadline: Duration::from_secs(config.cycle_deadline_s), llm_rate_per_minute: config.llm_rate_limit_per_min };
    let pipeline = Arc::new(SignalPipeline::new(news_db, interpretation_store, interpreter, Arc::clone(&market), war_room, Arc::clone(&orders), bus.clone(), pipeline_config));

    let gateway = Arc::new(ExecutionGateway::new(Arc::clone(&orders), Arc::clone(&shadow), Arc::clone(&session), Arc::clone(&broker), Arc::clone(&market), Arc::clone(&config)));

    {
        let gateway = Arc::clone(&gateway);
        bus.subscribe(Topic::SignalReceived, move |event| {
            let gateway = Arc::clone(&gateway);
            async move {
                let Some(order_id) = event.payload.get("order_id").and_then(|v| v.as_str()).and_then(|s| s.parse().ok()) else {
                    tracing::warn!("SignalReceived event missing order_id");
                    return;
                };
                if let Err(err) = gateway.handle_signal_received(order_id).await {
                    tracing::warn!(%err, "execution gateway failed to settle signal");
                }
            }
        });
    }

    // Recover any orders left mid-flight by a previous run before scheduling
    // new work (§4.15).
    let recovery = RecoveryCoordinator::new(Arc::clone(&broker), bus.clone());
    let report = recovery.recover(&orders).await?;
    tracing::info!(reconciled = report.reconciled, left_pending = report.left_pending, needs_manual_review = report.needs_manual_review, "startup recovery complete");

    let weights = Arc::new(RwLock::new(seed_weights()));
    let persona = PersonaConfig::for_mode(config.persona_mode);
    let weight_adjuster = Arc::new(WeightAdjuster::new(bus.clone()));

    let scheduler = Scheduler::new(bus.clone());

    {
        let news_poller = Arc::clone(&news_poller);
        scheduler.spawn_job("news_poll", Duration::from_secs(15 * 60), move || {
            let news_poller = Arc::clone(&news_poller);
            async move {
                let report = news_poller.poll(Utc::now() - chrono::Duration::minutes(20)).await?;
                tracing::debug!(ingested = report.ingested, duplicates = report.duplicates, "news poll cycle");
                Ok(())
            }
        });
    }

    {
        let pipeline = Arc::clone(&pipeline);
        let weights = Arc::clone(&weights);
        let shadow = Arc::clone(&shadow);
        let session = Arc::clone(&session);
        scheduler.spawn_job("signal_cycle", Duration::from_secs(5 * 60), move || {
            let pipeline = Arc::clone(&pipeline);
            let weights = Arc::clone(&weights);
            let shadow = Arc::clone(&shadow);
            let session = Arc::clone(&session);
            async move {
                let current_weights = weights.read().await.clone();
                let equity = {
                    let session = session.lock().await;
                    let positions = shadow.db().open_positions(session.id).await?;
                    let open_value: Decimal = positions.iter().map(|p| p.market_value()).sum();
                    session.equity(open_value)
                };
                let report = pipeline.run_cycle(&current_weights, persona, equity, Utc::now()).await?;
                tracing::debug!(interpreted = report.interpreted, signals_emitted = report.signals_emitted, "signal cycle");
                Ok(())
            }
        });
    }

    {
        let pipeline = Arc::clone(&pipeline);
        scheduler.spawn_job("horizon_check", Duration::from_secs(60), move || {
            let pipeline = Arc::clone(&pipeline);
            async move {
                let scored = pipeline.verify_due_jobs(Utc::now()).await?;
                if scored > 0 {
                    tracing::debug!(scored, "horizon check scored reactions");
                }
                Ok(())
            }
        });
    }

    {
        let shadow = Arc::clone(&shadow);
        let session = Arc::clone(&session);
        let market = Arc::clone(&market);
        scheduler.spawn_job("shadow_mtm", Duration::from_secs(60), move || {
            let shadow = Arc::clone(&shadow);
            let session = Arc::clone(&session);
            let market = Arc::clone(&market);
            async move {
                let session = session.lock().await;
                let positions = shadow.db().open_positions(session.id).await?;
                let mut prices = HashMap::new();
                for position in &positions {
                    let price = market.price(&position.ticker, None).await.unwrap_or(position.current_price);
                    prices.insert(position.ticker.clone(), price);
                }
                shadow.mark_to_market(&session, &prices, Utc::now()).await?;
                Ok(())
            }
        });
    }

    {
        let gateway = Arc::clone(&gateway);
        scheduler.spawn_job("stop_loss_scan", Duration::from_secs(10), move || {
            let gateway = Arc::clone(&gateway);
            async move {
                gateway.run_stop_loss_scan().await?;
                Ok(())
            }
        });
    }

    {
        let orders = Arc::clone(&orders);
        let broker = Arc::clone(&broker);
        let bus = bus.clone();
        scheduler.spawn_job("broker_reconcile", Duration::from_secs(60), move || {
            let orders = Arc::clone(&orders);
            let broker = Arc::clone(&broker);
            let bus = bus.clone();
            async move {
                let coordinator = RecoveryCoordinator::new(Arc::clone(&broker), bus);
                coordinator.recover(&orders).await?;
                Ok(())
            }
        });
    }

    {
        let pipeline = Arc::clone(&pipeline);
        let weights = Arc::clone(&weights);
        let weight_adjuster = Arc::clone(&weight_adjuster);
        scheduler.spawn_job("daily_learning", Duration::from_secs(24 * 60 * 60), move || {
            let pipeline = Arc::clone(&pipeline);
            let weights = Arc::clone(&weights);
            let weight_adjuster = Arc::clone(&weight_adjuster);
            async move {
                let now = Utc::now();
                let reactions = pipeline.store().reactions_since(now - chrono::Duration::days(30)).await?;
                let mut current = weights.write().await;
                if let Some(updated) = weight_adjuster.run_daily(&current, &reactions, now).await? {
                    tracing::info!(version = updated.version, "agent weights adjusted");
                    *current = updated;
                }
                Ok(())
            }
        });
    }

    tracing::info!("trading-core is running; press Ctrl+C to stop");

    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT");
        }
        _ = sigterm.recv() => {
            tracing::info!("received SIGTERM");
        }
    }

    scheduler.shutdown();
    bus.publish(Topic::SystemStopped, serde_json::json!({})).await;
    tracing::info!("trading-core shut down cleanly");
    Ok(())
}
