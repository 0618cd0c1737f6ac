//! News source adapter boundary. Deliberately separate from the LLM/broker/
//! market-data traits (§A4): a source only hands back raw articles, never an
//! opinion about them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::AdapterError;
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct RawArticle {
    /// Source-native id when the feed provides one (e.g. a GUID). Falls back
    /// to a hash of `url` for dedup when absent.
    pub source_id: Option<String>,
    pub url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub title: String,
    pub body: String,
    pub tickers: BTreeSet<String>,
}

#[async_trait]
pub trait NewsSource: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch_since(&self, since: DateTime<Utc>) -> Result<Vec<RawArticle>, AdapterError>;
}

/// Fixed-feed mock used by tests and offline runs.
pub struct MockNewsSource {
    name: String,
    articles: Vec<RawArticle>,
}

impl MockNewsSource {
    pub fn new(name: impl Into<String>, articles: Vec<RawArticle>) -> Self {
        Self { name: name.into(), articles }
    }
}

#[async_trait]
impl NewsSource for MockNewsSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_since(&self, since: DateTime<Utc>) -> Result<Vec<RawArticle>, AdapterError> {
        Ok(self.articles.iter().filter(|a| a.published_at >= since).cloned().collect())
    }
}
