//! Signal Deduper & Quality Filter (§4.9). In-memory, following the same
//! `DashMap`-backed concurrent-cache idiom the source stack uses for its TTL
//! caches in `analysis-orchestrator`.

use chrono::{DateTime, Duration, Utc};
use core_types::{Action, Signal};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

pub const DEDUP_WINDOW_MINUTES: i64 = 30;
pub const MIN_SIGNAL_CONFIDENCE: f64 = 0.60;

#[derive(Debug, Clone, Copy)]
struct LastSignal {
    at: DateTime<Utc>,
    action: Action,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOutcome {
    Emit,
    DedupedDuplicate,
    BelowConfidenceFloor,
}

#[derive(Debug, Default)]
pub struct FilterCounters {
    pub deduped: AtomicU64,
    pub low_quality: AtomicU64,
    pub emitted: AtomicU64,
}

impl FilterCounters {
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.deduped.load(Ordering::Relaxed),
            self.low_quality.load(Ordering::Relaxed),
            self.emitted.load(Ordering::Relaxed),
        )
    }
}

pub struct SignalDeduper {
    last_by_ticker: DashMap<String, LastSignal>,
    window: Duration,
    min_confidence: f64,
    counters: FilterCounters,
}

impl SignalDeduper {
    pub fn new() -> Self {
        Self::with_params(Duration::minutes(DEDUP_WINDOW_MINUTES), MIN_SIGNAL_CONFIDENCE)
    }

    pub fn with_params(window: Duration, min_confidence: f64) -> Self {
        Self {
            last_by_ticker: DashMap::new(),
            window,
            min_confidence,
            counters: FilterCounters::default(),
        }
    }

    /// Evaluate `signal` at `now`. On `Emit`, records it as the new last-seen
    /// signal for the ticker so subsequent duplicates within the window are caught.
    pub fn check(&self, signal: &Signal, now: DateTime<Utc>) -> FilterOutcome {
        if signal.confidence < self.min_confidence {
            self.counters.low_quality.fetch_add(1, Ordering::Relaxed);
            return FilterOutcome::BelowConfidenceFloor;
        }

        if let Some(last) = self.last_by_ticker.get(&signal.ticker) {
            if last.action == signal.action && now - last.at < self.window {
                self.counters.deduped.fetch_add(1, Ordering::Relaxed);
                return FilterOutcome::DedupedDuplicate;
            }
        }

        self.last_by_ticker.insert(signal.ticker.clone(), LastSignal { at: now, action: signal.action });
        self.counters.emitted.fetch_add(1, Ordering::Relaxed);
        FilterOutcome::Emit
    }

    pub fn counters(&self) -> &FilterCounters {
        &self.counters
    }
}

impl Default for SignalDeduper {
    fn default() -> Self {
        Self::new()
    }
}
