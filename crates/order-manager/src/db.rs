use core_types::{Order, OrderError, OrderSide, OrderState};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Clone)]
pub struct OrderDb {
    pool: SqlitePool,
}

impl OrderDb {
    pub async fn new(database_url: &str) -> Result<Self, OrderError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| OrderError::StorageFailure(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| OrderError::StorageFailure(e.to_string()))?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> Result<(), OrderError> {
        let schema = include_str!("../schema.sql");
        for statement in schema.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| OrderError::StorageFailure(e.to_string()))?;
            }
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn insert(&self, order: &Order) -> Result<(), OrderError> {
        sqlx::query(
            "INSERT INTO orders (id, ticker, side, quantity, limit_price, filled_qty, filled_price, status, broker_id, signal_id, order_metadata, needs_manual_review, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(order.id.to_string())
        .bind(&order.ticker)
        .bind(side_to_text(order.side))
        .bind(order.quantity.to_string())
        .bind(order.limit_price.map(|d| d.to_string()))
        .bind(order.filled_qty.map(|d| d.to_string()))
        .bind(order.filled_price.map(|d| d.to_string()))
        .bind(order.status.to_string())
        .bind(&order.broker_id)
        .bind(order.signal_id.map(|id| id.to_string()))
        .bind(order.order_metadata.to_string())
        .bind(order.needs_manual_review as i64)
        .bind(order.created_at.to_rfc3339())
        .bind(order.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| OrderError::StorageFailure(e.to_string()))?;
        Ok(())
    }

    pub async fn update(&self, order: &Order) -> Result<(), OrderError> {
        sqlx::query(
            "UPDATE orders SET quantity = ?, limit_price = ?, filled_qty = ?, filled_price = ?, status = ?, broker_id = ?, order_metadata = ?, needs_manual_review = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(order.quantity.to_string())
        .bind(order.limit_price.map(|d| d.to_string()))
        .bind(order.filled_qty.map(|d| d.to_string()))
        .bind(order.filled_price.map(|d| d.to_string()))
        .bind(order.status.to_string())
        .bind(&order.broker_id)
        .bind(order.order_metadata.to_string())
        .bind(order.needs_manual_review as i64)
        .bind(order.updated_at.to_rfc3339())
        .bind(order.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| OrderError::StorageFailure(e.to_string()))?;
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Order, OrderError> {
        let row: OrderRow = sqlx::query_as(
            "SELECT id, ticker, side, quantity, limit_price, filled_qty, filled_price, status, broker_id, signal_id, order_metadata, needs_manual_review, created_at, updated_at FROM orders WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OrderError::StorageFailure(e.to_string()))?
        .ok_or(OrderError::OrderNotFound(id))?;
        row.try_into()
    }

    pub async fn non_terminal_orders(&self) -> Result<Vec<Order>, OrderError> {
        let rows: Vec<OrderRow> = sqlx::query_as(
            "SELECT id, ticker, side, quantity, limit_price, filled_qty, filled_price, status, broker_id, signal_id, order_metadata, needs_manual_review, created_at, updated_at FROM orders
             WHERE status NOT IN ('FullyFilled', 'Cancelled', 'Rejected', 'Failed')",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| OrderError::StorageFailure(e.to_string()))?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    pub async fn recent_orders_for_ticker(&self, ticker: &str, since: chrono::DateTime<chrono::Utc>) -> Result<Vec<Order>, OrderError> {
        let rows: Vec<OrderRow> = sqlx::query_as(
            "SELECT id, ticker, side, quantity, limit_price, filled_qty, filled_price, status, broker_id, signal_id, order_metadata, needs_manual_review, created_at, updated_at FROM orders
             WHERE ticker = ? AND created_at >= ?",
        )
        .bind(ticker)
        .bind(since.to_rfc3339())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| OrderError::StorageFailure(e.to_string()))?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

fn side_to_text(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "buy",
        OrderSide::Sell => "sell",
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: String,
    ticker: String,
    side: String,
    quantity: String,
    limit_price: Option<String>,
    filled_qty: Option<String>,
    filled_price: Option<String>,
    status: String,
    broker_id: Option<String>,
    signal_id: Option<String>,
    order_metadata: String,
    needs_manual_review: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<OrderRow> for Order {
    type Error = OrderError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let parse_err = |what: &str| OrderError::StorageFailure(format!("corrupt {what} in orders row"));
        Ok(Order {
            id: Uuid::parse_str(&row.id).map_err(|_| parse_err("id"))?,
            ticker: row.ticker,
            side: match row.side.as_str() {
                "buy" => OrderSide::Buy,
                "sell" => OrderSide::Sell,
                _ => return Err(parse_err("side")),
            },
            quantity: Decimal::from_str(&row.quantity).map_err(|_| parse_err("quantity"))?,
            limit_price: row.limit_price.map(|s| Decimal::from_str(&s)).transpose().map_err(|_| parse_err("limit_price"))?,
            filled_qty: row.filled_qty.map(|s| Decimal::from_str(&s)).transpose().map_err(|_| parse_err("filled_qty"))?,
            filled_price: row.filled_price.map(|s| Decimal::from_str(&s)).transpose().map_err(|_| parse_err("filled_price"))?,
            status: OrderState::from_str(&row.status).map_err(|_| parse_err("status"))?,
            broker_id: row.broker_id,
            signal_id: row.signal_id.map(|s| Uuid::parse_str(&s)).transpose().map_err(|_| parse_err("signal_id"))?,
            order_metadata: serde_json::from_str(&row.order_metadata).map_err(|_| parse_err("order_metadata"))?,
            needs_manual_review: row.needs_manual_review != 0,
            created_at: chrono::DateTime::parse_from_rfc3339(&row.created_at).map_err(|_| parse_err("created_at"))?.with_timezone(&chrono::Utc),
            updated_at: chrono::DateTime::parse_from_rfc3339(&row.updated_at).map_err(|_| parse_err("updated_at"))?.with_timezone(&chrono::Utc),
        })
    }
}
