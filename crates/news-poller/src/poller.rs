//! Periodic fan-out over configured news sources (§4.11).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use core_types::{NewsArticle, Topic};
use event_bus::EventBus;

use crate::db::{NewsDb, NewsDbError};
use crate::source::NewsSource;

/// Keyword set deciding whether an article is worth an LLM interpretation.
/// Case-insensitive substring match against title + body.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "earnings", "guidance", "merger", "acquisition", "lawsuit", "recall", "fda", "sec", "bankruptcy", "dividend", "buyback", "downgrade",
    "upgrade", "ceo", "layoffs", "investigation", "partnership", "contract", "outlook",
];

pub struct NewsPoller {
    db: NewsDb,
    bus: EventBus,
    sources: Vec<Arc<dyn NewsSource>>,
    keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    pub ingested: usize,
    pub duplicates: usize,
    pub non_actionable: usize,
}

impl NewsPoller {
    pub fn new(db: NewsDb, bus: EventBus, sources: Vec<Arc<dyn NewsSource>>) -> Self {
        Self::with_keywords(db, bus, sources, DEFAULT_KEYWORDS.iter().map(|s| s.to_string()).collect())
    }

    pub fn with_keywords(db: NewsDb, bus: EventBus, sources: Vec<Arc<dyn NewsSource>>, keywords: Vec<String>) -> Self {
        Self { db, bus, sources, keywords: keywords.into_iter().map(|k| k.to_lowercase()).collect() }
    }

    /// Fan out over every configured source, persist new articles, and wake
    /// the Signal Pipeline if anything landed.
    pub async fn poll(&self, since: DateTime<Utc>) -> Result<PollReport, NewsDbError> {
        let mut report = PollReport::default();

        for source in &self.sources {
            let raw = match source.fetch_since(since).await {
                Ok(raw) => raw,
                Err(err) => {
                    tracing::warn!(source = source.name(), %err, "news source fetch failed");
                    continue;
                }
            };

            for article in raw {
                let dedup_key = article.source_id.clone().unwrap_or_else(|| hash_fallback(article.url.as_deref().unwrap_or(&article.title)));

                let mut entity = NewsArticle::new(source.name(), article.published_at, article.title, article.body, article.tickers);
                if !self.is_tradeable(&entity) {
                    entity.analyzed = true;
                    entity.skip_reason = Some("non-actionable".to_string());
                }

                if self.db.insert_if_new(&entity, &dedup_key).await? {
                    report.ingested += 1;
                    if entity.skip_reason.is_some() {
                        report.non_actionable += 1;
                    }
                } else {
                    report.duplicates += 1;
                }
            }
        }

        if report.ingested > 0 {
            self.bus
                .publish(Topic::ArticlesIngested, serde_json::json!({"ingested": report.ingested, "non_actionable": report.non_actionable}))
                .await;
        }
        Ok(report)
    }

    fn is_tradeable(&self, article: &NewsArticle) -> bool {
        let haystack = format!("{} {}", article.title, article.body).to_lowercase();
        self.keywords.iter().any(|k| haystack.contains(k.as_str()))
    }
}

fn hash_fallback(input: &str) -> String {
    let mut hasher = DefaultHasher::new();
    input.hash(&mut hasher);
    format!("urlhash-{:x}", hasher.finish())
}
