/// Rolling z-score of the latest value against the trailing window
///
/// `(latest - mean) / stddev` over the last `window` samples using the
/// population standard deviation. Returns 0 for a flat window (stddev 0)
/// and None with fewer than `window` samples.
pub fn calculate_zscore(values: &[f64], window: usize) -> Option<f64> {
    if values.len() < window {
        return None;
    }

    let tail = &values[values.len() - window..];
    let mean: f64 = tail.iter().sum::<f64>() / window as f64;
    let variance: f64 =
        tail.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / window as f64;
    let stddev = variance.sqrt();

    if stddev == 0.0 {
        return Some(0.0);
    }

    let latest = *values.last().unwrap();
    Some((latest - mean) / stddev)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zscore_ascending_series() {
        // 50 ascending closes: latest is well above the trailing mean
        let closes: Vec<f64> = (100..150).map(|v| v as f64).collect();

        let z = calculate_zscore(&closes, 20);
        assert!(z.is_some());
        assert!(z.unwrap() > 0.0);
    }

    #[test]
    fn test_zscore_flat_series_is_zero() {
        let closes = vec![2650.0; 25];
        assert_eq!(calculate_zscore(&closes, 20), Some(0.0));
    }

    #[test]
    fn test_zscore_insufficient_data() {
        let closes = vec![2650.0; 19];
        assert!(calculate_zscore(&closes, 20).is_none());
    }

    #[test]
    fn test_zscore_sign_follows_deviation() {
        let mut closes = vec![100.0; 19];
        closes.push(110.0);
        assert!(calculate_zscore(&closes, 20).unwrap() > 0.0);

        let mut closes = vec![100.0; 19];
        closes.push(90.0);
        assert!(calculate_zscore(&closes, 20).unwrap() < 0.0);
    }
}
