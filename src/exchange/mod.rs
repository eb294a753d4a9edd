// Exchange connectivity seam
pub mod binance;

pub use binance::BinanceFuturesClient;

use crate::models::{Candle, OrderBookSnapshot, OrderSide, Tick, Timeframe};
use crate::Result;
use async_trait::async_trait;
use thiserror::Error;

/// Failures originating in the exchange client itself, as opposed to
/// transport errors surfaced by reqwest
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("bad {field} value {value:?}")]
    Parse { field: &'static str, value: String },
    #[error("malformed exchange response: {0}")]
    Malformed(&'static str),
    #[error("api secret is not a valid HMAC key")]
    InvalidSecret,
}

/// Status of an order at the exchange
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
}

impl OrderStatus {
    pub fn from_exchange(s: &str) -> Self {
        match s {
            "FILLED" => OrderStatus::Filled,
            "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
            "CANCELED" => OrderStatus::Canceled,
            "REJECTED" => OrderStatus::Rejected,
            "EXPIRED" => OrderStatus::Expired,
            _ => OrderStatus::New,
        }
    }
}

/// Acknowledgement returned when an order is placed
#[derive(Debug, Clone)]
pub struct OrderAck {
    pub order_id: String,
    pub status: OrderStatus,
}

/// Exchange operations the trading core depends on
///
/// Every call is a suspension point and may fail transiently; callers inside
/// the orchestrator convert failures into backoff-and-retry, never panics.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    async fn fetch_candles(&self, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>>;

    async fn fetch_order_book(&self, depth: usize) -> Result<OrderBookSnapshot>;

    async fn fetch_recent_trades(&self, limit: usize) -> Result<Vec<Tick>>;

    async fn fetch_mark_price(&self) -> Result<f64>;

    /// Available account equity in quote currency (USDT)
    async fn fetch_equity(&self) -> Result<f64>;

    /// Place a post-only limit order; returns the exchange ack
    async fn place_limit_order(&self, side: OrderSide, price: f64, quantity: f64)
        -> Result<OrderAck>;

    /// Place a market order, used to flatten an open position
    async fn place_market_order(&self, side: OrderSide, quantity: f64) -> Result<()>;

    async fn cancel_order(&self, order_id: &str) -> Result<()>;

    async fn fetch_order_status(&self, order_id: &str) -> Result<OrderStatus>;

    async fn set_leverage(&self, leverage: u32) -> Result<()>;
}
