//! In-process cron-like job runner (§4.16). Each job owns a dedicated task
//! running its own `tokio::time::interval`; ticks are skipped rather than
//! queued when an action overruns its cadence, so a job never runs two
//! instances concurrently with itself.

use std::future::Future;
use std::time::Duration;

use core_types::Topic;
use event_bus::EventBus;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Number of consecutive failures before a job raises a persistent alert.
pub const ALERT_THRESHOLD: u32 = 3;

pub struct Scheduler {
    bus: EventBus,
    shutdown_tx: watch::Sender<bool>,
}

impl Scheduler {
    pub fn new(bus: EventBus) -> Self {
        let (shutdown_tx, _rx) = watch::channel(false);
        Self { bus, shutdown_tx }
    }

    /// Spawn a named job on `cadence`. `action` is invoked once per tick and
    /// must not be called concurrently with itself; the scheduler enforces
    /// that by awaiting each invocation to completion before the next tick
    /// can fire (missed ticks are dropped, not queued).
    pub fn spawn_job<F, Fut>(&self, name: &'static str, cadence: Duration, mut action: F) -> JoinHandle<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let bus = self.bus.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(cadence);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut consecutive_failures: u32 = 0;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match action().await {
                            Ok(()) => consecutive_failures = 0,
                            Err(err) => {
                                consecutive_failures += 1;
                                tracing::warn!(job = name, %err, attempt = consecutive_failures, "scheduled job failed");
                                if consecutive_failures >= ALERT_THRESHOLD {
                                    tracing::error!(job = name, "job failed {ALERT_THRESHOLD} consecutive times, raising persistent alert");
                                    bus.publish(
                                        Topic::ErrorOccurred,
                                        serde_json::json!({"component": "scheduler-core", "job": name, "reason": "persistent_failure", "consecutive_failures": consecutive_failures}),
                                    )
                                    .await;
                                }
                            }
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Signal every spawned job to stop after its current tick.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn job_runs_once_per_cadence() {
        let scheduler = Scheduler::new(EventBus::new());
        let ticks = Arc::new(AtomicU32::new(0));
        let ticks_clone = ticks.clone();

        scheduler.spawn_job("test_job", Duration::from_secs(10), move || {
            let ticks = ticks_clone.clone();
            async move {
                ticks.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        tokio::time::advance(Duration::from_secs(35)).await;
        tokio::task::yield_now().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_failures_raise_a_persistent_alert() {
        let bus = EventBus::new();
        let scheduler = Scheduler::new(bus.clone());

        scheduler.spawn_job("flaky_job", Duration::from_secs(1), || async { Err(anyhow::anyhow!("boom")) });

        tokio::time::advance(Duration::from_secs(4)).await;
        tokio::task::yield_now().await;
        assert_eq!(bus.history(Topic::ErrorOccurred).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_the_job_loop() {
        let scheduler = Scheduler::new(EventBus::new());
        let ticks = Arc::new(AtomicU32::new(0));
        let ticks_clone = ticks.clone();

        let handle = scheduler.spawn_job("stoppable", Duration::from_secs(1), move || {
            let ticks = ticks_clone.clone();
            async move {
                ticks.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        tokio::time::advance(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        scheduler.shutdown();
        handle.await.unwrap();
        let after_shutdown = ticks.load(Ordering::SeqCst);

        tokio::time::advance(Duration::from_secs(5)).await;
        tokio::task::yield_now().await;
        assert_eq!(ticks.load(Ordering::SeqCst), after_shutdown);
    }
}
