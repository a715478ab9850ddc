// =============================================================================
// Relative Strength Index (RSI), Wilder's method
// =============================================================================
//
// Seed: the average gain/loss are the plain arithmetic mean of the first
// `period` deltas. After the seed, both averages are Wilder-smoothed:
//   avg = (avg * (period - 1) + new_value) / period
//
// Output is the same length as `close`. The first `period` entries are NaN
// (there is no delta to look back on until index `period`). A zero average
// loss produces RSI = 100 rather than a division by zero.
// =============================================================================

/// RSI over `close` with look-back `period` (Wilder's smoothing, default 14).
pub fn rsi(close: &[f64], period: usize) -> Vec<f64> {
    let n = close.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period + 1 {
        return result;
    }

    let deltas: Vec<f64> = close.windows(2).map(|w| w[1] - w[0]).collect();

    let mut avg_gain: f64 = deltas[..period].iter().map(|d| d.max(0.0)).sum::<f64>() / period as f64;
    let mut avg_loss: f64 = deltas[..period].iter().map(|d| (-d).max(0.0)).sum::<f64>() / period as f64;

    result[period] = if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    };

    for (i, &delta) in deltas.iter().enumerate().skip(period) {
        let gain = delta.max(0.0);
        let loss = (-delta).max(0.0);
        avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
        result[i + 1] = if avg_loss == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
        };
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_data_is_all_nan() {
        let out = rsi(&[1.0, 2.0, 3.0], 14);
        assert!(out.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn all_gains_yields_rsi_100() {
        let data: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        let out = rsi(&data, 14);
        assert!((out[14] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn all_losses_yields_rsi_0() {
        let data: Vec<f64> = (1..=20).rev().map(|x| x as f64).collect();
        let out = rsi(&data, 14);
        assert!((out[14] - 0.0).abs() < 1e-9);
    }

    #[test]
    fn flat_series_is_undefined_loss_rsi_100() {
        let data = vec![5.0; 20];
        let out = rsi(&data, 14);
        assert!((out[14] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn leading_period_entries_are_nan() {
        let data: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        let out = rsi(&data, 14);
        assert!(out[..14].iter().all(|v| v.is_nan()));
        assert!(out[14].is_finite());
    }

    #[test]
    fn rsi_always_stays_within_zero_to_one_hundred() {
        let data = vec![
            5.0, 7.0, 6.0, 9.0, 3.0, 3.0, 8.0, 12.0, 2.0, 2.0, 2.0, 15.0, 1.0, 20.0, 4.0, 4.0, 6.0,
            6.0, 30.0, 1.0, 1.0, 1.0,
        ];
        let out = rsi(&data, 14);
        for v in out.iter().filter(|v| v.is_finite()) {
            assert!((0.0..=100.0).contains(v), "RSI {v} out of range");
        }
    }
}
