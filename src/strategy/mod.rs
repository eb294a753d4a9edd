// Strategy core: volatility and return statistics plus the exit rule
use crate::indicators::{calculate_atr, calculate_zscore};
use crate::models::{Candle, Direction};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

const CLOSE_CAPACITY: usize = 50;
const RETURNS_CAPACITY: usize = 30;

/// Verdict of the adaptive exit rule for an open position
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitSignal {
    /// No action; keep monitoring at the normal cadence
    Hold,
    /// Mark has retraced past 0.5 ATR against the position. Not an exit,
    /// but monitoring should tighten.
    Retracement,
    /// Mark has moved 0.3 ATR in the position's favor; close now to lock
    /// the gain before a reversal.
    ExitNow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub zscore_window: usize,
    pub atr_window: usize,
    /// ATR multiple for the protective retracement band (adverse side)
    pub retrace_atr_mult: f64,
    /// ATR multiple for the profit-taking band (favorable side)
    pub exit_atr_mult: f64,
    /// Below this many recorded outcomes the Sharpe gate is permissive
    pub sharpe_min_samples: usize,
    pub sharpe_threshold: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            zscore_window: 20,
            atr_window: 14,
            retrace_atr_mult: 0.5,
            exit_atr_mult: 0.3,
            sharpe_min_samples: 10,
            sharpe_threshold: 0.5,
        }
    }
}

/// Mathematical core of the strategy
///
/// Owns the 1m close buffer, the trailing trade-return history feeding the
/// Sharpe entry gate, and the adaptive exit rule. All state is instance-local;
/// the orchestrator holds the only reference.
pub struct StrategyCore {
    config: StrategyConfig,
    closes_1m: VecDeque<f64>,
    returns_history: VecDeque<f64>,
}

impl StrategyCore {
    pub fn new(config: StrategyConfig) -> Self {
        Self {
            config,
            closes_1m: VecDeque::with_capacity(CLOSE_CAPACITY),
            returns_history: VecDeque::with_capacity(RETURNS_CAPACITY),
        }
    }

    pub fn update_close(&mut self, close: f64) {
        self.closes_1m.push_back(close);
        while self.closes_1m.len() > CLOSE_CAPACITY {
            self.closes_1m.pop_front();
        }
    }

    /// Append a realized trade return (percent). Never mutated after append;
    /// oldest evicted at capacity.
    pub fn record_outcome(&mut self, pnl_percent: f64) {
        self.returns_history.push_back(pnl_percent);
        while self.returns_history.len() > RETURNS_CAPACITY {
            self.returns_history.pop_front();
        }
    }

    /// Rolling z-score of the latest 1m close over the configured window
    pub fn zscore(&self) -> Option<f64> {
        let closes: Vec<f64> = self.closes_1m.iter().copied().collect();
        calculate_zscore(&closes, self.config.zscore_window)
    }

    /// ATR over the configured window for the given candles
    pub fn atr(&self, candles: &[Candle]) -> Option<f64> {
        calculate_atr(candles, self.config.atr_window)
    }

    /// Adaptive exit rule for an open position
    ///
    /// Asymmetric by design: the profit-taking band (0.3 ATR) is tighter than
    /// the drawdown-tolerance band (0.5 ATR). The strategy prefers early
    /// profit capture over wide stop-outs.
    pub fn adaptive_exit(
        &self,
        direction: Direction,
        entry_price: f64,
        mark_price: f64,
        atr: f64,
    ) -> ExitSignal {
        let retrace = self.config.retrace_atr_mult * atr;
        let target = self.config.exit_atr_mult * atr;

        let (favorable_move, adverse_move) = match direction {
            Direction::Long => (mark_price - entry_price, entry_price - mark_price),
            Direction::Short => (entry_price - mark_price, mark_price - entry_price),
        };

        if favorable_move >= target {
            ExitSignal::ExitNow
        } else if adverse_move >= retrace {
            ExitSignal::Retracement
        } else {
            ExitSignal::Hold
        }
    }

    /// Sharpe-style ratio of recent trade returns
    ///
    /// None with fewer than `sharpe_min_samples` outcomes; infinity when
    /// stddev is numerically zero (treated as maximally favorable). Identical
    /// percent returns leave a stddev of around 1e-17 from float rounding, so
    /// the comparison uses a small epsilon rather than exact zero.
    pub fn rolling_sharpe(&self) -> Option<f64> {
        if self.returns_history.len() < self.config.sharpe_min_samples {
            return None;
        }

        let n = self.returns_history.len() as f64;
        let mean: f64 = self.returns_history.iter().sum::<f64>() / n;
        let variance: f64 = self
            .returns_history
            .iter()
            .map(|r| (r - mean).powi(2))
            .sum::<f64>()
            / n;
        let stddev = variance.sqrt();

        if stddev < 1e-12 {
            return Some(f64::INFINITY);
        }
        Some(mean / stddev)
    }

    /// Entry gate: block new trades when the rolling Sharpe ratio is below
    /// the threshold. Insufficient data is permissive.
    pub fn allow_new_trades(&self) -> bool {
        match self.rolling_sharpe() {
            Some(sharpe) if sharpe < self.config.sharpe_threshold => {
                tracing::debug!(sharpe, threshold = self.config.sharpe_threshold, "sharpe gate blocked");
                false
            }
            _ => true,
        }
    }
}
