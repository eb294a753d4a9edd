use crate::indicators::calculate_rsi;
use crate::market::MarketState;
use crate::models::{Direction, Timeframe, TradeSignal};
use serde::{Deserialize, Serialize};

/// Confirmation gates for entry signal detection
///
/// The reference band filters entries to a price region the strategy was
/// tuned for. It is deliberately a parameter, not a derived value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    pub entry_band_low: f64,
    pub entry_band_high: f64,
    pub rsi_period: usize,
    pub min_closes: usize,
    pub book_depth: usize,
    pub imbalance_ratio: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            entry_band_low: 2645.0,
            entry_band_high: 2660.0,
            rsi_period: 14,
            min_closes: 15,
            book_depth: 5,
            imbalance_ratio: 1.5,
        }
    }
}

/// Detects directional entry setups from the current market state
///
/// A signal fires only when every confirmation gate agrees; there is no
/// partial or weighted scoring. A quiet cycle is not an error.
pub struct SignalDetector {
    config: SignalConfig,
}

impl SignalDetector {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    /// Run one detection cycle against the market state
    ///
    /// Checks the short setup first, then its long mirror. Returns None when
    /// neither side's gates all pass.
    pub fn detect(&self, market: &mut MarketState) -> Option<TradeSignal> {
        if let Some(signal) = self.check_setup(market, Direction::Short) {
            return Some(signal);
        }
        self.check_setup(market, Direction::Long)
    }

    /// Direction-specific gate check
    ///
    /// Short requires: 15m close inside the reference band, RSI < 50,
    /// VWAP >= 15m close, and top ask volume >= ratio x top bid volume.
    /// Long is the exact mirror.
    fn check_setup(&self, market: &mut MarketState, direction: Direction) -> Option<TradeSignal> {
        let close_15m = market.latest_candle(Timeframe::FifteenMinutes)?.close;
        if close_15m < self.config.entry_band_low || close_15m > self.config.entry_band_high {
            return None;
        }

        let closes = market.latest_closes(Timeframe::OneMinute, self.config.min_closes);
        if closes.len() < self.config.min_closes {
            return None;
        }

        let rsi = calculate_rsi(&closes, self.config.rsi_period)?;
        let momentum_ok = match direction {
            Direction::Short => rsi < 50.0,
            Direction::Long => rsi > 50.0,
        };
        if !momentum_ok {
            return None;
        }

        let vwap = market.vwap_window()?;
        let vwap_ok = match direction {
            Direction::Short => vwap >= close_15m,
            Direction::Long => vwap <= close_15m,
        };
        if !vwap_ok {
            return None;
        }

        let (bid_vol, ask_vol) = market.order_book().top_volumes(self.config.book_depth);
        let (pressure, opposing) = match direction {
            Direction::Short => (ask_vol, bid_vol),
            Direction::Long => (bid_vol, ask_vol),
        };
        if pressure < self.config.imbalance_ratio * opposing {
            return None;
        }

        let reference_price = match direction {
            Direction::Short => market.order_book().best_ask()?,
            Direction::Long => market.order_book().best_bid()?,
        };

        tracing::debug!(
            ?direction,
            rsi,
            vwap,
            close_15m,
            reference_price,
            "entry setup confirmed"
        );

        Some(TradeSignal {
            direction,
            reference_price,
        })
    }
}
