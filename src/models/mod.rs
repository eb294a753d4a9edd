use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Candle timeframes tracked by the bot
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Timeframe {
    OneMinute,
    FifteenMinutes,
}

impl Timeframe {
    /// Interval string used by the exchange API ("1m", "15m")
    pub fn as_interval(&self) -> &'static str {
        match self {
            Timeframe::OneMinute => "1m",
            Timeframe::FifteenMinutes => "15m",
        }
    }
}

/// OHLCV candlestick data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Side of an executed trade tick
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum TickSide {
    Buy,
    Sell,
}

/// A single executed trade, retained only within the trailing VWAP window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub size: f64,
    pub side: TickSide,
}

/// One price level of the order book
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub size: f64,
}

/// Order book snapshot, best levels first. Replaced wholesale on each update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl OrderBookSnapshot {
    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|l| l.price)
    }

    /// Sum of the top `depth` sizes on each side: (bid_volume, ask_volume)
    pub fn top_volumes(&self, depth: usize) -> (f64, f64) {
        let bid_vol = self.bids.iter().take(depth).map(|l| l.size).sum();
        let ask_vol = self.asks.iter().take(depth).map(|l| l.size).sum();
        (bid_vol, ask_vol)
    }
}

/// Direction of a position or entry signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Order side used to enter a position in this direction
    pub fn entry_side(&self) -> OrderSide {
        match self {
            Direction::Long => OrderSide::Buy,
            Direction::Short => OrderSide::Sell,
        }
    }

    /// Order side used to flatten a position in this direction
    pub fn exit_side(&self) -> OrderSide {
        match self {
            Direction::Long => OrderSide::Sell,
            Direction::Short => OrderSide::Buy,
        }
    }

    /// Signed percent return for a position entered at `entry` and marked at `mark`
    pub fn pnl_percent(&self, entry: f64, mark: f64) -> f64 {
        match self {
            Direction::Long => (mark - entry) / entry * 100.0,
            Direction::Short => (entry - mark) / entry * 100.0,
        }
    }
}

/// Exchange order side
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

/// Directional entry signal, produced once per detection cycle
#[derive(Debug, Clone, PartialEq)]
pub struct TradeSignal {
    pub direction: Direction,
    /// Best opposing book price at detection time (limit price for the entry)
    pub reference_price: f64,
}

/// Sizing decision for a single entry attempt
#[derive(Debug, Clone, PartialEq)]
pub struct RiskDecision {
    pub notional_usd: f64,
    pub quantity: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum PositionStatus {
    Open,
    Closing,
}

/// The single live position. At most one instance exists system-wide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivePosition {
    pub id: Uuid,
    pub direction: Direction,
    pub entry_price: f64,
    pub quantity: f64,
    pub entry_time: DateTime<Utc>,
    pub status: PositionStatus,
}

impl ActivePosition {
    pub fn new(direction: Direction, entry_price: f64, quantity: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            direction,
            entry_price,
            quantity,
            entry_time: Utc::now(),
            status: PositionStatus::Open,
        }
    }
}
