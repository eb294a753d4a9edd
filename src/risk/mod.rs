// Risk sizing: Kelly-style fraction with a hard notional ceiling
use crate::models::RiskDecision;
use std::collections::VecDeque;

const RESULTS_CAPACITY: usize = 200;

/// Fraction used until enough outcomes exist to estimate Kelly
const EXPLORATION_FRACTION: f64 = 0.001;
/// Fraction used when the history has no usable losing samples
const NO_LOSS_DATA_FRACTION: f64 = 0.002;
/// Hard clamp on the Kelly output, 0.05% to 1% of account equity
const MIN_FRACTION: f64 = 0.0005;
const MAX_FRACTION: f64 = 0.01;

/// Converts trailing trade outcomes into a bounded capital-at-risk fraction
/// and caps notional exposure by a hard dollar ceiling.
pub struct RiskSizer {
    risk_ceiling_usd: f64,
    trade_results: VecDeque<f64>,
}

impl RiskSizer {
    pub fn new(risk_ceiling_usd: f64) -> Self {
        Self {
            risk_ceiling_usd,
            trade_results: VecDeque::with_capacity(RESULTS_CAPACITY),
        }
    }

    pub fn risk_ceiling_usd(&self) -> f64 {
        self.risk_ceiling_usd
    }

    /// Append a realized trade return (percent), evicting the oldest at capacity
    pub fn record_outcome(&mut self, pnl_percent: f64) {
        self.trade_results.push_back(pnl_percent);
        while self.trade_results.len() > RESULTS_CAPACITY {
            self.trade_results.pop_front();
        }
    }

    pub fn sample_count(&self) -> usize {
        self.trade_results.len()
    }

    /// Kelly-style fraction: f = (p*(R+1) - 1)/R with p = win rate and
    /// R = avg win / avg loss, clamped to [MIN_FRACTION, MAX_FRACTION]
    ///
    /// The clamp is a hard safety rail independent of the formula, which can
    /// go negative or explode on skewed histories.
    pub fn kelly_fraction(&self) -> f64 {
        if self.trade_results.len() < 20 {
            return EXPLORATION_FRACTION;
        }

        let wins: Vec<f64> = self.trade_results.iter().copied().filter(|r| *r > 0.0).collect();
        let losses: Vec<f64> = self.trade_results.iter().copied().filter(|r| *r <= 0.0).collect();

        let p = wins.len() as f64 / self.trade_results.len() as f64;

        let mean_loss = if losses.is_empty() {
            0.0
        } else {
            losses.iter().sum::<f64>() / losses.len() as f64
        };
        if losses.is_empty() || mean_loss == 0.0 {
            return NO_LOSS_DATA_FRACTION;
        }

        let avg_win = if wins.is_empty() {
            0.0
        } else {
            wins.iter().sum::<f64>() / wins.len() as f64
        };
        let avg_loss = -mean_loss; // positive
        let r = if avg_loss > 0.0 { avg_win / avg_loss } else { 1.0 };

        let f = (p * (r + 1.0) - 1.0) / r;
        f.clamp(MIN_FRACTION, MAX_FRACTION)
    }

    /// Sizing decision for an entry at `entry_price` with the given equity
    ///
    /// notional = min(equity * fraction, risk ceiling). Returns None (no
    /// trade) if the quantity is not positive or the notional exceeds the
    /// ceiling; the clamp should already prevent the latter, this is a
    /// belt-and-suspenders check.
    pub fn size_position(&self, account_equity: f64, entry_price: f64) -> Option<RiskDecision> {
        let fraction = self.kelly_fraction();
        let notional_usd = (account_equity * fraction).min(self.risk_ceiling_usd);
        let quantity = notional_usd / entry_price;

        if quantity <= 0.0 || notional_usd > self.risk_ceiling_usd {
            tracing::debug!(notional_usd, quantity, "sizing rejected");
            return None;
        }

        Some(RiskDecision {
            notional_usd,
            quantity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizer_with_outcomes(outcomes: &[f64]) -> RiskSizer {
        let mut sizer = RiskSizer::new(100.0);
        for &r in outcomes {
            sizer.record_outcome(r);
        }
        sizer
    }

    #[test]
    fn test_exploration_fraction_below_20_samples() {
        let sizer = sizer_with_outcomes(&[1.0; 19]);
        assert_eq!(sizer.kelly_fraction(), 0.001);

        let sizer = sizer_with_outcomes(&[]);
        assert_eq!(sizer.kelly_fraction(), 0.001);
    }

    #[test]
    fn test_no_loss_data_fraction() {
        // 25 samples, all winners
        let sizer = sizer_with_outcomes(&[0.5; 25]);
        assert_eq!(sizer.kelly_fraction(), 0.002);
    }

    #[test]
    fn test_fraction_always_within_clamp() {
        // Strongly winning history would push raw Kelly far above 1%
        let mut outcomes = vec![2.0; 30];
        outcomes.extend_from_slice(&[-0.1; 5]);
        let sizer = sizer_with_outcomes(&outcomes);
        let f = sizer.kelly_fraction();
        assert!((MIN_FRACTION..=MAX_FRACTION).contains(&f));
        assert_eq!(f, MAX_FRACTION);

        // All-losing history drives raw Kelly negative
        let sizer = sizer_with_outcomes(&[-1.0, -0.5].repeat(15));
        let f = sizer.kelly_fraction();
        assert_eq!(f, MIN_FRACTION);
    }

    #[test]
    fn test_sizing_respects_ceiling() {
        let mut outcomes = vec![2.0; 30];
        outcomes.extend_from_slice(&[-0.1; 5]);
        let sizer = sizer_with_outcomes(&outcomes);

        // 1% of 1,000,000 would be 10,000; the $100 ceiling wins
        let decision = sizer.size_position(1_000_000.0, 2650.0).unwrap();
        assert_eq!(decision.notional_usd, 100.0);
        assert!((decision.quantity - 100.0 / 2650.0).abs() < 1e-12);
    }

    #[test]
    fn test_sizing_uses_fraction_below_ceiling() {
        let sizer = RiskSizer::new(100.0);

        // Exploration sizing: 10,000 * 0.001 = $10 notional
        let decision = sizer.size_position(10_000.0, 2650.0).unwrap();
        assert_eq!(decision.notional_usd, 10.0);
    }

    #[test]
    fn test_sizing_rejects_zero_equity() {
        let sizer = RiskSizer::new(100.0);
        assert!(sizer.size_position(0.0, 2650.0).is_none());
    }

    #[test]
    fn test_results_history_bounded() {
        let mut sizer = RiskSizer::new(100.0);
        for i in 0..250 {
            sizer.record_outcome(i as f64);
        }
        assert_eq!(sizer.sample_count(), RESULTS_CAPACITY);
    }
}
