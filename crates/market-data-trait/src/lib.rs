//! Market-data adapter boundary (§6): price lookups, realized volatility and
//! market-hours checks. Real implementations wrap a data vendor; `MockMarketData`
//! answers from an in-memory price book for tests and offline runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[derive(Debug, thiserror::Error)]
pub enum MarketDataError {
    #[error("market data call timed out")]
    Timeout,
    #[error("no price available for {ticker} at {at}")]
    PriceUnavailable { ticker: String, at: DateTime<Utc> },
    #[error("market data call failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait MarketDataClient: Send + Sync {
    async fn price(&self, ticker: &str, at: Option<DateTime<Utc>>) -> Result<Decimal, MarketDataError>;
    async fn realized_vol(&self, ticker: &str, window_days: u32) -> Result<Decimal, MarketDataError>;
    async fn market_is_open(&self, exchange: &str, at: DateTime<Utc>) -> Result<bool, MarketDataError>;
}

#[derive(Debug, Clone)]
struct PricePoint {
    price: Decimal,
    vol: Decimal,
}

/// Fixed-price, always-open mock. Tests override individual tickers via `set_price`.
pub struct MockMarketData {
    prices: dashmap::DashMap<String, PricePoint>,
    default_vol: Decimal,
    market_open: std::sync::atomic::AtomicBool,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self {
            prices: dashmap::DashMap::new(),
            default_vol: Decimal::new(15, 2),
            market_open: std::sync::atomic::AtomicBool::new(true),
        }
    }

    pub fn set_price(&self, ticker: &str, price: Decimal) {
        self.prices
            .entry(ticker.to_string())
            .and_modify(|p| p.price = price)
            .or_insert(PricePoint { price, vol: self.default_vol });
    }

    pub fn set_vol(&self, ticker: &str, vol: Decimal) {
        self.prices
            .entry(ticker.to_string())
            .and_modify(|p| p.vol = vol)
            .or_insert(PricePoint { price: Decimal::ZERO, vol });
    }

    pub fn set_market_open(&self, open: bool) {
        self.market_open.store(open, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Default for MockMarketData {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataClient for MockMarketData {
    async fn price(&self, ticker: &str, at: Option<DateTime<Utc>>) -> Result<Decimal, MarketDataError> {
        self.prices
            .get(ticker)
            .map(|p| p.price)
            .ok_or_else(|| MarketDataError::PriceUnavailable {
                ticker: ticker.to_string(),
                at: at.unwrap_or_else(Utc::now),
            })
    }

    async fn realized_vol(&self, ticker: &str, _window_days: u32) -> Result<Decimal, MarketDataError> {
        Ok(self.prices.get(ticker).map(|p| p.vol).unwrap_or(self.default_vol))
    }

    async fn market_is_open(&self, _exchange: &str, _at: DateTime<Utc>) -> Result<bool, MarketDataError> {
        Ok(self.market_open.load(std::sync::atomic::Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn price_roundtrip() {
        let md = MockMarketData::new();
        md.set_price("AAPL", Decimal::from(150));
        let p = md.price("AAPL", None).await.unwrap();
        assert_eq!(p, Decimal::from(150));
    }

    #[tokio::test]
    async fn missing_price_is_an_error() {
        let md = MockMarketData::new();
        assert!(md.price("ZZZZ", None).await.is_err());
    }
}
