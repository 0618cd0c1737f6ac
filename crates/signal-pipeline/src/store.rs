//! Persistence for interpretations, their horizon jobs and scored reactions.
//! Interpretations are created here (§4.10 step 2); horizon jobs and
//! reactions are the bookkeeping the Scheduler/Outcome Verifier need to
//! re-check predictions without holding anything in process memory.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use core_types::{Direction, HorizonJob, MarketReaction, NewsInterpretation, Sentiment, TimeHorizon};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("signal pipeline storage failure: {0}")]
    Storage(String),
}

#[derive(Clone)]
pub struct InterpretationStore {
    pool: SqlitePool,
}

impl InterpretationStore {
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url).map_err(|e| StoreError::Storage(e.to_string()))?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await.map_err(|e| StoreError::Storage(e.to_string()))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        let schema = include_str!("../schema.sql");
        for statement in schema.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(&self.pool).await.map_err(|e| StoreError::Storage(e.to_string()))?;
            }
        }
        Ok(())
    }

    pub async fn insert_interpretation(&self, interp: &NewsInterpretation) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO interpretations (id, article_id, ticker, sentiment, impact_score, predicted_direction, predicted_magnitude_pct, time_horizon, confidence, price_at_prediction, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(interp.id.to_string())
        .bind(interp.article_id.to_string())
        .bind(&interp.ticker)
        .bind(sentiment_to_str(interp.sentiment))
        .bind(interp.impact_score.to_string())
        .bind(direction_to_str(interp.predicted_direction))
        .bind(interp.predicted_magnitude_pct.to_string())
        .bind(interp.time_horizon.label())
        .bind(interp.confidence)
        .bind(interp.price_at_prediction.to_string())
        .bind(interp.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(())
    }

    pub async fn get_interpretation(&self, id: Uuid) -> Result<NewsInterpretation, StoreError> {
        let row: InterpretationRow = sqlx::query_as(
            "SELECT id, article_id, ticker, sentiment, impact_score, predicted_direction, predicted_magnitude_pct, time_horizon, confidence, price_at_prediction, created_at
             FROM interpretations WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?;
        row.try_into()
    }

    pub async fn insert_jobs(&self, jobs: &[HorizonJob]) -> Result<(), StoreError> {
        for job in jobs {
            sqlx::query("INSERT OR REPLACE INTO horizon_jobs (interpretation_id, horizon, due_at, attempts) VALUES (?, ?, ?, ?)")
                .bind(job.interpretation_id.to_string())
                .bind(job.horizon.label())
                .bind(job.due_at.to_rfc3339())
                .bind(job.attempts as i64)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Storage(e.to_string()))?;
        }
        Ok(())
    }

    pub async fn update_job(&self, job: &HorizonJob) -> Result<(), StoreError> {
        self.insert_jobs(std::slice::from_ref(job)).await
    }

    pub async fn remove_job(&self, job: &HorizonJob) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM horizon_jobs WHERE interpretation_id = ? AND horizon = ?")
            .bind(job.interpretation_id.to_string())
            .bind(job.horizon.label())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(())
    }

    pub async fn due_jobs(&self, now: DateTime<Utc>) -> Result<Vec<HorizonJob>, StoreError> {
        let rows: Vec<JobRow> = sqlx::query_as("SELECT interpretation_id, horizon, due_at, attempts FROM horizon_jobs WHERE due_at <= ? ORDER BY due_at ASC")
            .bind(now.to_rfc3339())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn record_reaction(&self, reaction: &MarketReaction) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO market_reactions (interpretation_id, horizon, actual_direction, actual_magnitude_pct, price_after, accuracy, verified_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(reaction.interpretation_id.to_string())
        .bind(reaction.horizon.label())
        .bind(direction_to_str(reaction.actual_direction))
        .bind(reaction.actual_magnitude_pct.to_string())
        .bind(reaction.price_after.to_string())
        .bind(reaction.accuracy)
        .bind(reaction.verified_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Reactions recorded since `since`, newest first. Feeds the Weight
    /// Adjuster's trailing-window NIA computation.
    pub async fn reactions_since(&self, since: DateTime<Utc>) -> Result<Vec<MarketReaction>, StoreError> {
        let rows: Vec<ReactionRow> = sqlx::query_as(
            "SELECT interpretation_id, horizon, actual_direction, actual_magnitude_pct, price_after, accuracy, verified_at
             FROM market_reactions WHERE verified_at >= ? ORDER BY verified_at DESC",
        )
        .bind(since.to_rfc3339())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

fn sentiment_to_str(s: Sentiment) -> &'static str {
    match s {
        Sentiment::Bullish => "bullish",
        Sentiment::Bearish => "bearish",
        Sentiment::Neutral => "neutral",
    }
}

fn str_to_sentiment(s: &str) -> Option<Sentiment> {
    match s {
        "bullish" => Some(Sentiment::Bullish),
        "bearish" => Some(Sentiment::Bearish),
        "neutral" => Some(Sentiment::Neutral),
        _ => None,
    }
}

fn direction_to_str(d: Direction) -> &'static str {
    match d {
        Direction::Up => "up",
        Direction::Down => "down",
        Direction::Flat => "flat",
    }
}

fn str_to_direction(s: &str) -> Option<Direction> {
    match s {
        "up" => Some(Direction::Up),
        "down" => Some(Direction::Down),
        "flat" => Some(Direction::Flat),
        _ => None,
    }
}

fn str_to_horizon(s: &str) -> Option<TimeHorizon> {
    match s {
        "1d" => Some(TimeHorizon::OneDay),
        "1w" => Some(TimeHorizon::OneWeek),
        "1m" => Some(TimeHorizon::OneMonth),
        _ => None,
    }
}

#[derive(sqlx::FromRow)]
struct InterpretationRow {
    id: String,
    article_id: String,
    ticker: String,
    sentiment: String,
    impact_score: String,
    predicted_direction: String,
    predicted_magnitude_pct: String,
    time_horizon: String,
    confidence: f64,
    price_at_prediction: String,
    created_at: String,
}

impl TryFrom<InterpretationRow> for NewsInterpretation {
    type Error = StoreError;

    fn try_from(row: InterpretationRow) -> Result<Self, Self::Error> {
        let parse_err = |what: &str| StoreError::Storage(format!("corrupt {what} in interpretations row"));
        Ok(NewsInterpretation {
            id: Uuid::parse_str(&row.id).map_err(|_| parse_err("id"))?,
            article_id: Uuid::parse_str(&row.article_id).map_err(|_| parse_err("article_id"))?,
            ticker: row.ticker,
            sentiment: str_to_sentiment(&row.sentiment).ok_or_else(|| parse_err("sentiment"))?,
            impact_score: Decimal::from_str(&row.impact_score).map_err(|_| parse_err("impact_score"))?,
            predicted_direction: str_to_direction(&row.predicted_direction).ok_or_else(|| parse_err("predicted_direction"))?,
            predicted_magnitude_pct: Decimal::from_str(&row.predicted_magnitude_pct).map_err(|_| parse_err("predicted_magnitude_pct"))?,
            time_horizon: str_to_horizon(&row.time_horizon).ok_or_else(|| parse_err("time_horizon"))?,
            confidence: row.confidence,
            price_at_prediction: Decimal::from_str(&row.price_at_prediction).map_err(|_| parse_err("price_at_prediction"))?,
            created_at: DateTime::parse_from_rfc3339(&row.created_at).map_err(|_| parse_err("created_at"))?.with_timezone(&Utc),
        })
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    interpretation_id: String,
    horizon: String,
    due_at: String,
    attempts: i64,
}

impl TryFrom<JobRow> for HorizonJob {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let parse_err = |what: &str| StoreError::Storage(format!("corrupt {what} in horizon_jobs row"));
        Ok(HorizonJob {
            interpretation_id: Uuid::parse_str(&row.interpretation_id).map_err(|_| parse_err("interpretation_id"))?,
            horizon: str_to_horizon(&row.horizon).ok_or_else(|| parse_err("horizon"))?,
            due_at: DateTime::parse_from_rfc3339(&row.due_at).map_err(|_| parse_err("due_at"))?.with_timezone(&Utc),
            attempts: row.attempts as u8,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReactionRow {
    interpretation_id: String,
    horizon: String,
    actual_direction: String,
    actual_magnitude_pct: String,
    price_after: String,
    accuracy: f64,
    verified_at: String,
}

impl TryFrom<ReactionRow> for MarketReaction {
    type Error = StoreError;

    fn try_from(row: ReactionRow) -> Result<Self, Self::Error> {
        let parse_err = |what: &str| StoreError::Storage(format!("corrupt {what} in market_reactions row"));
        Ok(MarketReaction {
            interpretation_id: Uuid::parse_str(&row.interpretation_id).map_err(|_| parse_err("interpretation_id"))?,
            horizon: str_to_horizon(&row.horizon).ok_or_else(|| parse_err("horizon"))?,
            actual_direction: str_to_direction(&row.actual_direction).ok_or_else(|| parse_err("actual_direction"))?,
            actual_magnitude_pct: Decimal::from_str(&row.actual_magnitude_pct).map_err(|_| parse_err("actual_magnitude_pct"))?,
            price_after: Decimal::from_str(&row.price_after).map_err(|_| parse_err("price_after"))?,
            accuracy: row.accuracy,
            verified_at: DateTime::parse_from_rfc3339(&row.verified_at).map_err(|_| parse_err("verified_at"))?.with_timezone(&Utc),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::Sentiment;

    fn interp() -> NewsInterpretation {
        NewsInterpretation {
            id: Uuid::new_v4(),
            article_id: Uuid::new_v4(),
            ticker: "AAPL".to_string(),
            sentiment: Sentiment::Bullish,
            impact_score: Decimal::from(7),
            predicted_direction: Direction::Up,
            predicted_magnitude_pct: Decimal::from(5),
            time_horizon: TimeHorizon::OneDay,
            confidence: 0.8,
            price_at_prediction: Decimal::from(100),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn round_trips_interpretation() {
        let store = InterpretationStore::new("sqlite::memory:").await.unwrap();
        let interp = interp();
        store.insert_interpretation(&interp).await.unwrap();
        let loaded = store.get_interpretation(interp.id).await.unwrap();
        assert_eq!(loaded.ticker, "AAPL");
        assert_eq!(loaded.impact_score, Decimal::from(7));
    }

    #[tokio::test]
    async fn due_jobs_respects_due_at() {
        let store = InterpretationStore::new("sqlite::memory:").await.unwrap();
        let interp = interp();
        store.insert_interpretation(&interp).await.unwrap();
        let jobs = outcome_verifier::OutcomeVerifier::<market_data_trait::MockMarketData>::schedule_jobs(&interp);
        store.insert_jobs(&jobs).await.unwrap();

        assert!(store.due_jobs(Utc::now()).await.unwrap().is_empty());
        let far_future = Utc::now() + chrono::Duration::days(60);
        assert_eq!(store.due_jobs(far_future).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn record_and_read_back_reaction() {
        let store = InterpretationStore::new("sqlite::memory:").await.unwrap();
        let interp = interp();
        let reaction = MarketReaction {
            interpretation_id: interp.id,
            horizon: TimeHorizon::OneDay,
            actual_direction: Direction::Up,
            actual_magnitude_pct: Decimal::from(4),
            price_after: Decimal::from(104),
            accuracy: 0.9,
            verified_at: Utc::now(),
        };
        store.record_reaction(&reaction).await.unwrap();
        let reactions = store.reactions_since(Utc::now() - chrono::Duration::days(1)).await.unwrap();
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0].interpretation_id, interp.id);
    }
}
