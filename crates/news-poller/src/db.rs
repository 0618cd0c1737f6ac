use core_types::NewsArticle;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::BTreeSet;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum NewsDbError {
    #[error("news poller storage failure: {0}")]
    Storage(String),
}

#[derive(Clone)]
pub struct NewsDb {
    pool: SqlitePool,
}

impl NewsDb {
    pub async fn new(database_url: &str) -> Result<Self, NewsDbError> {
        let options = SqliteConnectOptions::from_str(database_url).map_err(|e| NewsDbError::Storage(e.to_string()))?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await.map_err(|e| NewsDbError::Storage(e.to_string()))?;
        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> Result<(), NewsDbError> {
        let schema = include_str!("../schema.sql");
        for statement in schema.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(&self.pool).await.map_err(|e| NewsDbError::Storage(e.to_string()))?;
            }
        }
        Ok(())
    }

    /// Returns `false` without writing when `dedup_key` is already present.
    pub async fn insert_if_new(&self, article: &NewsArticle, dedup_key: &str) -> Result<bool, NewsDbError> {
        let tickers = article.tickers.iter().cloned().collect::<Vec<_>>().join(",");
        let result = sqlx::query(
            "INSERT OR IGNORE INTO news_articles (id, dedup_key, source, published_at, title, body, tickers, ingested_at, analyzed, skip_reason)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(article.id.to_string())
        .bind(dedup_key)
        .bind(&article.source)
        .bind(article.published_at.to_rfc3339())
        .bind(&article.title)
        .bind(&article.body)
        .bind(tickers)
        .bind(article.ingested_at.to_rfc3339())
        .bind(article.analyzed as i64)
        .bind(&article.skip_reason)
        .execute(&self.pool)
        .await
        .map_err(|e| NewsDbError::Storage(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn unanalyzed(&self, limit: u32) -> Result<Vec<NewsArticle>, NewsDbError> {
        let rows: Vec<ArticleRow> = sqlx::query_as(
            "SELECT id, source, published_at, title, body, tickers, ingested_at, analyzed, skip_reason FROM news_articles
             WHERE analyzed = 0 ORDER BY published_at ASC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| NewsDbError::Storage(e.to_string()))?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn mark_analyzed(&self, id: Uuid, skip_reason: Option<&str>) -> Result<(), NewsDbError> {
        sqlx::query("UPDATE news_articles SET analyzed = 1, skip_reason = ? WHERE id = ?")
            .bind(skip_reason)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| NewsDbError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct ArticleRow {
    id: String,
    source: String,
    published_at: String,
    title: String,
    body: String,
    tickers: String,
    ingested_at: String,
    analyzed: i64,
    skip_reason: Option<String>,
}

impl TryFrom<ArticleRow> for NewsArticle {
    type Error = NewsDbError;

    fn try_from(row: ArticleRow) -> Result<Self, Self::Error> {
        let parse_err = |what: &str| NewsDbError::Storage(format!("corrupt {what} in news_articles row"));
        let tickers: BTreeSet<String> = row.tickers.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect();
        Ok(NewsArticle {
            id: Uuid::parse_str(&row.id).map_err(|_| parse_err("id"))?,
            source: row.source,
            published_at: chrono::DateTime::parse_from_rfc3339(&row.published_at).map_err(|_| parse_err("published_at"))?.with_timezone(&chrono::Utc),
            title: row.title,
            body: row.body,
            tickers,
            ingested_at: chrono::DateTime::parse_from_rfc3339(&row.ingested_at).map_err(|_| parse_err("ingested_at"))?.with_timezone(&chrono::Utc),
            analyzed: row.analyzed != 0,
            skip_reason: row.skip_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[tokio::test]
    async fn insert_if_new_rejects_duplicate_key() {
        let db = NewsDb::new("sqlite::memory:").await.unwrap();
        let article = NewsArticle::new("reuters", chrono::Utc::now(), "t", "b", BTreeSet::from(["AAPL".to_string()]));
        assert!(db.insert_if_new(&article, "dedup-1").await.unwrap());
        let duplicate = NewsArticle::new("reuters", chrono::Utc::now(), "t2", "b2", BTreeSet::new());
        assert!(!db.insert_if_new(&duplicate, "dedup-1").await.unwrap());
    }

    #[tokio::test]
    async fn unanalyzed_excludes_marked_rows() {
        let db = NewsDb::new("sqlite::memory:").await.unwrap();
        let article = NewsArticle::new("reuters", chrono::Utc::now(), "t", "b", BTreeSet::new());
        db.insert_if_new(&article, "dedup-2").await.unwrap();
        assert_eq!(db.unanalyzed(10).await.unwrap().len(), 1);
        db.mark_analyzed(article.id, Some("non-actionable")).await.unwrap();
        assert!(db.unanalyzed(10).await.unwrap().is_empty());
    }
}
