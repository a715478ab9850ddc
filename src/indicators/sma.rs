// =============================================================================
// Simple Moving Average (SMA)
// =============================================================================
//
// Rolling arithmetic mean over a trailing window of length `period`. Output
// is the same length as the input; positions before `period - 1` are NaN.
// =============================================================================

/// Rolling mean of `data` over `period`. NaN until index `period - 1`.
pub fn sma(data: &[f64], period: usize) -> Vec<f64> {
    let n = data.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    let mut window_sum: f64 = data[..period].iter().sum();
    result[period - 1] = window_sum / period as f64;

    for i in period..n {
        window_sum += data[i] - data[i - period];
        result[i] = window_sum / period as f64;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_data_is_all_nan() {
        let out = sma(&[1.0, 2.0], 5);
        assert!(out.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn rolling_mean_matches_hand_computed() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let out = sma(&data, 3);
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert!((out[2] - 2.0).abs() < 1e-10);
        assert!((out[3] - 3.0).abs() < 1e-10);
        assert!((out[4] - 4.0).abs() < 1e-10);
    }

    #[test]
    fn period_zero_is_all_nan() {
        let out = sma(&[1.0, 2.0, 3.0], 0);
        assert!(out.iter().all(|v| v.is_nan()));
    }
}
