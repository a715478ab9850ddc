// =============================================================================
// Average True Range (ATR), Wilder's method
// =============================================================================
//
// true_range_0 = high_0 - low_0
// true_range_i = max(high_i - low_i, |high_i - close_{i-1}|, |low_i - close_{i-1}|)
//
// Seed: plain mean of the first `period` true ranges, written at index
// `period - 1`. After the seed, Wilder-smoothed:
//   atr_i = (atr_{i-1} * (period - 1) + true_range_i) / period
//
// Output is the same length as the input; NaN before the seed index.
// =============================================================================

/// ATR over `high`/`low`/`close` (all same length) with look-back `period`.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let n = close.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    let mut tr = vec![0.0; n];
    tr[0] = high[0] - low[0];
    for i in 1..n {
        let a = high[i] - low[i];
        let b = (high[i] - close[i - 1]).abs();
        let c = (low[i] - close[i - 1]).abs();
        tr[i] = a.max(b).max(c);
    }

    let seed = tr[..period].iter().sum::<f64>() / period as f64;
    result[period - 1] = seed;

    let mut prev = seed;
    for i in period..n {
        prev = (prev * (period - 1) as f64 + tr[i]) / period as f64;
        result[i] = prev;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_data_is_all_nan() {
        let out = atr(&[10.0, 11.0], &[9.0, 10.0], &[9.5, 10.5], 14);
        assert!(out.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn seed_is_mean_of_first_period_true_ranges() {
        let high = vec![10.0, 11.0, 12.0];
        let low = vec![9.0, 10.0, 11.0];
        let close = vec![9.5, 10.5, 11.5];
        let out = atr(&high, &low, &close, 3);
        assert!((out[2] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn first_true_range_uses_high_minus_low_only() {
        let high = vec![10.0];
        let low = vec![8.0];
        let close = vec![9.0];
        let out = atr(&high, &low, &close, 1);
        assert!((out[0] - 2.0).abs() < 1e-10);
    }
}
