/// Average True Range (ATR) indicator
///
/// Measures market volatility as the mean of true ranges over the trailing
/// window. True Range is the greatest of:
/// - Current High - Current Low
/// - Abs(Current High - Previous Close)
/// - Abs(Current Low - Previous Close)

use crate::models::Candle;

/// Calculate ATR for the given candles
///
/// Returns the mean true range over the trailing `window` samples, or None
/// if fewer than `window` true ranges exist (i.e. fewer than window+1 candles).
pub fn calculate_atr(candles: &[Candle], window: usize) -> Option<f64> {
    if candles.len() < window + 1 {
        return None;
    }

    let mut true_ranges = Vec::new();
    for i in 1..candles.len() {
        let high = candles[i].high;
        let low = candles[i].low;
        let prev_close = candles[i - 1].close;

        let tr = (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs());

        true_ranges.push(tr);
    }

    if true_ranges.len() < window {
        return None;
    }

    let sum: f64 = true_ranges.iter().rev().take(window).sum();
    Some(sum / window as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn create_test_candles(prices: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
        prices
            .iter()
            .map(|&(open, high, low, close)| Candle {
                open_time: Utc::now(),
                open,
                high,
                low,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn test_calculate_atr() {
        // Low volatility market, constant 2.0 range
        let prices = vec![(100.0, 101.0, 99.0, 100.0); 15];
        let candles = create_test_candles(&prices);

        let atr = calculate_atr(&candles, 14);
        assert_eq!(atr, Some(2.0));
    }

    #[test]
    fn test_calculate_atr_high_volatility() {
        let prices = vec![
            (100.0, 105.0, 95.0, 102.0),
            (102.0, 110.0, 98.0, 105.0),
            (105.0, 108.0, 92.0, 95.0),
            (95.0, 103.0, 88.0, 100.0),
            (100.0, 115.0, 97.0, 110.0),
            (110.0, 112.0, 95.0, 98.0),
            (98.0, 108.0, 90.0, 105.0),
            (105.0, 120.0, 100.0, 115.0),
            (115.0, 118.0, 105.0, 110.0),
            (110.0, 125.0, 108.0, 120.0),
            (120.0, 130.0, 115.0, 125.0),
            (125.0, 128.0, 110.0, 115.0),
            (115.0, 122.0, 105.0, 118.0),
            (118.0, 130.0, 115.0, 125.0),
            (125.0, 135.0, 120.0, 130.0),
        ];

        let candles = create_test_candles(&prices);
        let atr = calculate_atr(&candles, 14);

        assert!(atr.is_some());
        assert!(atr.unwrap() > 10.0);
    }

    #[test]
    fn test_gap_dominates_true_range() {
        // Second candle gaps up: high - prev_close = 20 dominates high - low = 2
        let prices = vec![
            (100.0, 101.0, 99.0, 100.0),
            (119.0, 120.0, 118.0, 119.0),
            (119.0, 120.0, 118.0, 119.0),
        ];

        let candles = create_test_candles(&prices);
        let atr = calculate_atr(&candles, 2);

        // TRs: max(2, |120-100|, |118-100|) = 20 and 2 -> mean 11
        assert_eq!(atr, Some(11.0));
    }

    #[test]
    fn test_insufficient_data() {
        // 14 candles give only 13 true ranges, below window 14
        let prices = vec![(100.0, 101.0, 99.0, 100.0); 14];
        let candles = create_test_candles(&prices);

        assert!(calculate_atr(&candles, 14).is_none());
    }
}
