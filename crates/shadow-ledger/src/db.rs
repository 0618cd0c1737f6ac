use core_types::{PositionStatus, SessionMetrics, SessionStatus, ShadowPosition, ShadowSession};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ShadowDbError {
    #[error("shadow ledger storage failure: {0}")]
    Storage(String),
    #[error("session {0} not found")]
    SessionNotFound(Uuid),
    #[error("position {0} not found")]
    PositionNotFound(Uuid),
}

#[derive(Clone)]
pub struct ShadowDb {
    pool: SqlitePool,
}

impl ShadowDb {
    pub async fn new(database_url: &str) -> Result<Self, ShadowDbError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| ShadowDbError::Storage(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| ShadowDbError::Storage(e.to_string()))?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> Result<(), ShadowDbError> {
        let schema = include_str!("../schema.sql");
        for statement in schema.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(&self.pool).await.map_err(|e| ShadowDbError::Storage(e.to_string()))?;
            }
        }
        Ok(())
    }

    pub async fn insert_session(&self, session: &ShadowSession) -> Result<(), ShadowDbError> {
        sqlx::query(
            "INSERT INTO shadow_sessions (id, initial_capital, current_cash, invested, total_pnl, started_at, status)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(session.id.to_string())
        .bind(session.initial_capital.to_string())
        .bind(session.current_cash.to_string())
        .bind(session.invested.to_string())
        .bind(session.total_pnl.to_string())
        .bind(session.started_at.to_rfc3339())
        .bind(status_to_text(session.status))
        .execute(&self.pool)
        .await
        .map_err(|e| ShadowDbError::Storage(e.to_string()))?;
        Ok(())
    }

    pub async fn update_session(&self, session: &ShadowSession) -> Result<(), ShadowDbError> {
        sqlx::query(
            "UPDATE shadow_sessions SET current_cash = ?, invested = ?, total_pnl = ?, status = ? WHERE id = ?",
        )
        .bind(session.current_cash.to_string())
        .bind(session.invested.to_string())
        .bind(session.total_pnl.to_string())
        .bind(status_to_text(session.status))
        .bind(session.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| ShadowDbError::Storage(e.to_string()))?;
        Ok(())
    }

    pub async fn get_session(&self, id: Uuid) -> Result<ShadowSession, ShadowDbError> {
        let row: SessionRow = sqlx::query_as(
            "SELECT id, initial_capital, current_cash, invested, total_pnl, started_at, status FROM shadow_sessions WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ShadowDbError::Storage(e.to_string()))?
        .ok_or(ShadowDbError::SessionNotFound(id))?;
        row.try_into()
    }

    pub async fn active_session(&self) -> Result<Option<ShadowSession>, ShadowDbError> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT id, initial_capital, current_cash, invested, total_pnl, started_at, status FROM shadow_sessions WHERE status = 'active' ORDER BY started_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ShadowDbError::Storage(e.to_string()))?;
        row.map(TryInto::try_into).transpose()
    }

    pub async fn insert_position(&self, position: &ShadowPosition) -> Result<(), ShadowDbError> {
        sqlx::query(
            "INSERT INTO shadow_positions (id, session_id, ticker, quantity, entry_price, entry_at, stop_loss, take_profit, current_price, pnl, status, closed_at, exit_price)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(position.id.to_string())
        .bind(position.session_id.to_string())
        .bind(&position.ticker)
        .bind(position.quantity.to_string())
        .bind(position.entry_price.to_string())
        .bind(position.entry_at.to_rfc3339())
        .bind(position.stop_loss.map(|d| d.to_string()))
        .bind(position.take_profit.map(|d| d.to_string()))
        .bind(position.current_price.to_string())
        .bind(position.pnl.to_string())
        .bind(position_status_to_text(position.status))
        .bind(position.closed_at.map(|d| d.to_rfc3339()))
        .bind(position.exit_price.map(|d| d.to_string()))
        .execute(&self.pool)
        .await
        .map_err(|e| ShadowDbError::Storage(e.to_string()))?;
        Ok(())
    }

    pub async fn update_position(&self, position: &ShadowPosition) -> Result<(), ShadowDbError> {
        sqlx::query(
            "UPDATE shadow_positions SET current_price = ?, pnl = ?, status = ?, closed_at = ?, exit_price = ? WHERE id = ?",
        )
        .bind(position.current_price.to_string())
        .bind(position.pnl.to_string())
        .bind(position_status_to_text(position.status))
        .bind(position.closed_at.map(|d| d.to_rfc3339()))
        .bind(position.exit_price.map(|d| d.to_string()))
        .bind(position.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| ShadowDbError::Storage(e.to_string()))?;
        Ok(())
    }

    pub async fn open_positions(&self, session_id: Uuid) -> Result<Vec<ShadowPosition>, ShadowDbError> {
        let rows: Vec<PositionRow> = sqlx::query_as(
            "SELECT id, session_id, ticker, quantity, entry_price, entry_at, stop_loss, take_profit, current_price, pnl, status, closed_at, exit_price FROM shadow_positions
             WHERE session_id = ? AND status = 'open'",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ShadowDbError::Storage(e.to_string()))?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn open_position_for_ticker(&self, session_id: Uuid, ticker: &str) -> Result<Option<ShadowPosition>, ShadowDbError> {
        let row: Option<PositionRow> = sqlx::query_as(
            "SELECT id, session_id, ticker, quantity, entry_price, entry_at, stop_loss, take_profit, current_price, pnl, status, closed_at, exit_price FROM shadow_positions
             WHERE session_id = ? AND ticker = ? AND status = 'open' LIMIT 1",
        )
        .bind(session_id.to_string())
        .bind(ticker)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ShadowDbError::Storage(e.to_string()))?;
        row.map(TryInto::try_into).transpose()
    }

    pub async fn closed_positions(&self, session_id: Uuid) -> Result<Vec<ShadowPosition>, ShadowDbError> {
        let rows: Vec<PositionRow> = sqlx::query_as(
            "SELECT id, session_id, ticker, quantity, entry_price, entry_at, stop_loss, take_profit, current_price, pnl, status, closed_at, exit_price FROM shadow_positions
             WHERE session_id = ? AND status = 'closed'",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ShadowDbError::Storage(e.to_string()))?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn record_equity_sample(&self, session_id: Uuid, sampled_at: chrono::DateTime<chrono::Utc>, equity: Decimal) -> Result<(), ShadowDbError> {
        sqlx::query("INSERT INTO equity_curve (session_id, sampled_at, equity) VALUES (?, ?, ?)")
            .bind(session_id.to_string())
            .bind(sampled_at.to_rfc3339())
            .bind(equity.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| ShadowDbError::Storage(e.to_string()))?;
        Ok(())
    }

    pub async fn equity_curve(&self, session_id: Uuid) -> Result<Vec<f64>, ShadowDbError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT equity FROM equity_curve WHERE session_id = ? ORDER BY sampled_at ASC")
            .bind(session_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ShadowDbError::Storage(e.to_string()))?;
        rows.into_iter()
            .map(|(s,)| f64::from_str(&s).map_err(|_| ShadowDbError::Storage("corrupt equity sample".to_string())))
            .collect()
    }
}

fn status_to_text(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Active => "active",
        SessionStatus::Paused => "paused",
        SessionStatus::Completed => "completed",
    }
}

fn position_status_to_text(status: PositionStatus) -> &'static str {
    match status {
        PositionStatus::Open => "open",
        PositionStatus::Closed => "closed",
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    initial_capital: String,
    current_cash: String,
    invested: String,
    total_pnl: String,
    started_at: String,
    status: String,
}

impl TryFrom<SessionRow> for ShadowSession {
    type Error = ShadowDbError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let parse_err = |what: &str| ShadowDbError::Storage(format!("corrupt {what} in shadow_sessions row"));
        Ok(ShadowSession {
            id: Uuid::parse_str(&row.id).map_err(|_| parse_err("id"))?,
            initial_capital: Decimal::from_str(&row.initial_capital).map_err(|_| parse_err("initial_capital"))?,
            current_cash: Decimal::from_str(&row.current_cash).map_err(|_| parse_err("current_cash"))?,
            invested: Decimal::from_str(&row.invested).map_err(|_| parse_err("invested"))?,
            total_pnl: Decimal::from_str(&row.total_pnl).map_err(|_| parse_err("total_pnl"))?,
            started_at: chrono::DateTime::parse_from_rfc3339(&row.started_at).map_err(|_| parse_err("started_at"))?.with_timezone(&chrono::Utc),
            status: match row.status.as_str() {
                "active" => SessionStatus::Active,
                "paused" => SessionStatus::Paused,
                "completed" => SessionStatus::Completed,
                _ => return Err(parse_err("status")),
            },
            metrics: SessionMetrics::default(),
        })
    }
}

#[derive(sqlx::FromRow)]
struct PositionRow {
    id: String,
    session_id: String,
    ticker: String,
    quantity: String,
    entry_price: String,
    entry_at: String,
    stop_loss: Option<String>,
    take_profit: Option<String>,
    current_price: String,
    pnl: String,
    status: String,
    closed_at: Option<String>,
    exit_price: Option<String>,
}

impl TryFrom<PositionRow> for ShadowPosition {
    type Error = ShadowDbError;

    fn try_from(row: PositionRow) -> Result<Self, Self::Error> {
        let parse_err = |what: &str| ShadowDbError::Storage(format!("corrupt {what} in shadow_positions row"));
        Ok(ShadowPosition {
            id: Uuid::parse_str(&row.id).map_err(|_| parse_err("id"))?,
            session_id: Uuid::parse_str(&row.session_id).map_err(|_| parse_err("session_id"))?,
            ticker: row.ticker,
            quantity: Decimal::from_str(&row.quantity).map_err(|_| parse_err("quantity"))?,
            entry_price: Decimal::from_str(&row.entry_price).map_err(|_| parse_err("entry_price"))?,
            entry_at: chrono::DateTime::parse_from_rfc3339(&row.entry_at).map_err(|_| parse_err("entry_at"))?.with_timezone(&chrono::Utc),
            stop_loss: row.stop_loss.map(|s| Decimal::from_str(&s)).transpose().map_err(|_| parse_err("stop_loss"))?,
            take_profit: row.take_profit.map(|s| Decimal::from_str(&s)).transpose().map_err(|_| parse_err("take_profit"))?,
            current_price: Decimal::from_str(&row.current_price).map_err(|_| parse_err("current_price"))?,
            pnl: Decimal::from_str(&row.pnl).map_err(|_| parse_err("pnl"))?,
            status: match row.status.as_str() {
                "open" => PositionStatus::Open,
                "closed" => PositionStatus::Closed,
                _ => return Err(parse_err("status")),
            },
            closed_at: row.closed_at.map(|s| chrono::DateTime::parse_from_rfc3339(&s)).transpose().map_err(|_| parse_err("closed_at"))?.map(|d| d.with_timezone(&chrono::Utc)),
            exit_price: row.exit_price.map(|s| Decimal::from_str(&s)).transpose().map_err(|_| parse_err("exit_price"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn session_insert_and_get_roundtrip() {
        let db = ShadowDb::new("sqlite::memory:").await.unwrap();
        let session = ShadowSession::new(Decimal::from(100_000));
        db.insert_session(&session).await.unwrap();
        let fetched = db.get_session(session.id).await.unwrap();
        assert_eq!(fetched.initial_capital, Decimal::from(100_000));
        assert_eq!(fetched.status, SessionStatus::Active);
    }

    #[tokio::test]
    async fn active_session_finds_most_recent() {
        let db = ShadowDb::new("sqlite::memory:").await.unwrap();
        assert!(db.active_session().await.unwrap().is_none());
        let session = ShadowSession::new(Decimal::from(50_000));
        db.insert_session(&session).await.unwrap();
        let active = db.active_session().await.unwrap().unwrap();
        assert_eq!(active.id, session.id);
    }

    #[tokio::test]
    async fn position_lifecycle_roundtrip() {
        let db = ShadowDb::new("sqlite::memory:").await.unwrap();
        let session = ShadowSession::new(Decimal::from(100_000));
        db.insert_session(&session).await.unwrap();

        let mut position = ShadowPosition {
            id: Uuid::new_v4(),
            session_id: session.id,
            ticker: "AAPL".to_string(),
            quantity: Decimal::from(10),
            entry_price: Decimal::from(150),
            entry_at: chrono::Utc::now(),
            stop_loss: Some(Decimal::from(140)),
            take_profit: None,
            current_price: Decimal::from(150),
            pnl: Decimal::ZERO,
            status: PositionStatus::Open,
            closed_at: None,
            exit_price: None,
        };
        db.insert_position(&position).await.unwrap();

        let open = db.open_positions(session.id).await.unwrap();
        assert_eq!(open.len(), 1);

        position.mark(Decimal::from(160));
        db.update_position(&position).await.unwrap();
        let open = db.open_positions(session.id).await.unwrap();
        assert_eq!(open[0].pnl, Decimal::from(100));

        position.status = PositionStatus::Closed;
        position.closed_at = Some(chrono::Utc::now());
        position.exit_price = Some(Decimal::from(160));
        db.update_position(&position).await.unwrap();
        assert!(db.open_positions(session.id).await.unwrap().is_empty());
        assert_eq!(db.closed_positions(session.id).await.unwrap().len(), 1);
    }
}
