use crate::models::{Candle, OrderBookSnapshot, Tick, Timeframe};
use chrono::{Duration, Utc};
use std::collections::VecDeque;

const CAPACITY_1M: usize = 200;
const CAPACITY_15M: usize = 50;

/// Rolling in-memory view of the market for a single instrument
///
/// Holds bounded candle buffers per timeframe (oldest evicted on overflow),
/// a trailing tick window for VWAP, and the latest order book snapshot.
/// Pure data: insertion and windowed queries only.
pub struct MarketState {
    candles_1m: VecDeque<Candle>,
    candles_15m: VecDeque<Candle>,
    ticks: VecDeque<Tick>,
    order_book: OrderBookSnapshot,
    vwap_window_secs: i64,
}

impl MarketState {
    pub fn new(vwap_window_secs: i64) -> Self {
        Self {
            candles_1m: VecDeque::with_capacity(CAPACITY_1M),
            candles_15m: VecDeque::with_capacity(CAPACITY_15M),
            ticks: VecDeque::new(),
            order_book: OrderBookSnapshot::default(),
            vwap_window_secs,
        }
    }

    /// Append a candle, evicting the oldest when the buffer is full
    pub fn push_candle(&mut self, timeframe: Timeframe, candle: Candle) {
        let (buffer, capacity) = match timeframe {
            Timeframe::OneMinute => (&mut self.candles_1m, CAPACITY_1M),
            Timeframe::FifteenMinutes => (&mut self.candles_15m, CAPACITY_15M),
        };

        buffer.push_back(candle);
        while buffer.len() > capacity {
            buffer.pop_front();
        }
    }

    /// Append a trade tick; ticks older than the VWAP window are evicted eagerly
    pub fn push_tick(&mut self, tick: Tick) {
        self.ticks.push_back(tick);
        self.evict_stale_ticks();
    }

    /// Replace the order book snapshot wholesale
    pub fn set_order_book(&mut self, book: OrderBookSnapshot) {
        self.order_book = book;
    }

    pub fn order_book(&self) -> &OrderBookSnapshot {
        &self.order_book
    }

    pub fn candle_count(&self, timeframe: Timeframe) -> usize {
        self.buffer(timeframe).len()
    }

    /// The most recent candle for a timeframe
    pub fn latest_candle(&self, timeframe: Timeframe) -> Option<&Candle> {
        self.buffer(timeframe).back()
    }

    /// The `n` most recent candles, oldest first
    pub fn latest_window(&self, timeframe: Timeframe, n: usize) -> Vec<Candle> {
        let buffer = self.buffer(timeframe);
        buffer
            .iter()
            .skip(buffer.len().saturating_sub(n))
            .cloned()
            .collect()
    }

    /// Closes of the `n` most recent candles, oldest first
    pub fn latest_closes(&self, timeframe: Timeframe, n: usize) -> Vec<f64> {
        let buffer = self.buffer(timeframe);
        buffer
            .iter()
            .skip(buffer.len().saturating_sub(n))
            .map(|c| c.close)
            .collect()
    }

    /// Volume-weighted average price over the trailing window
    ///
    /// Evicts stale ticks first; returns None when no volume is in the window.
    pub fn vwap_window(&mut self) -> Option<f64> {
        self.evict_stale_ticks();

        let pv_sum: f64 = self.ticks.iter().map(|t| t.price * t.size).sum();
        let volume_sum: f64 = self.ticks.iter().map(|t| t.size).sum();

        if volume_sum > 0.0 {
            Some(pv_sum / volume_sum)
        } else {
            None
        }
    }

    fn evict_stale_ticks(&mut self) {
        let cutoff = Utc::now() - Duration::seconds(self.vwap_window_secs);
        while self
            .ticks
            .front()
            .is_some_and(|t| t.timestamp < cutoff)
        {
            self.ticks.pop_front();
        }
    }

    fn buffer(&self, timeframe: Timeframe) -> &VecDeque<Candle> {
        match timeframe {
            Timeframe::OneMinute => &self.candles_1m,
            Timeframe::FifteenMinutes => &self.candles_15m,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TickSide;

    fn make_candle(close: f64) -> Candle {
        Candle {
            open_time: Utc::now(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000.0,
        }
    }

    fn make_tick(price: f64, size: f64, age_secs: i64) -> Tick {
        Tick {
            timestamp: Utc::now() - Duration::seconds(age_secs),
            price,
            size,
            side: TickSide::Sell,
        }
    }

    #[test]
    fn test_candle_buffer_evicts_oldest() {
        let mut market = MarketState::new(60);
        for i in 0..250 {
            market.push_candle(Timeframe::OneMinute, make_candle(i as f64));
        }

        assert_eq!(market.candle_count(Timeframe::OneMinute), 200);
        // Oldest 50 evicted
        let closes = market.latest_closes(Timeframe::OneMinute, 200);
        assert_eq!(closes[0], 50.0);
        assert_eq!(*closes.last().unwrap(), 249.0);
    }

    #[test]
    fn test_latest_window_shorter_than_request() {
        let mut market = MarketState::new(60);
        market.push_candle(Timeframe::FifteenMinutes, make_candle(2650.0));

        let window = market.latest_window(Timeframe::FifteenMinutes, 10);
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_vwap_weighted_by_size() {
        let mut market = MarketState::new(60);
        market.push_tick(make_tick(100.0, 1.0, 0));
        market.push_tick(make_tick(200.0, 3.0, 0));

        // (100*1 + 200*3) / 4 = 175
        assert_eq!(market.vwap_window(), Some(175.0));
    }

    #[test]
    fn test_vwap_evicts_stale_ticks() {
        let mut market = MarketState::new(60);
        market.push_tick(make_tick(100.0, 5.0, 120)); // outside the 60s window
        market.push_tick(make_tick(200.0, 1.0, 1));

        assert_eq!(market.vwap_window(), Some(200.0));
    }

    #[test]
    fn test_vwap_unavailable_without_volume() {
        let mut market = MarketState::new(60);
        assert_eq!(market.vwap_window(), None);

        market.push_tick(make_tick(100.0, 5.0, 120));
        assert_eq!(market.vwap_window(), None);
    }
}
