// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the Simple Moving Average (SMA).
//
// Formula:
//   alpha  = 2 / (period + 1)
//   EMA_t  = alpha * x_t + (1 - alpha) * EMA_{t-1}
//
// Output is the same length as the input. Leading positions before the first
// finite value, and positions before enough data has accumulated to seed the
// average, are filled with NaN. The seed is the arithmetic mean of the first
// `period` values starting at the first finite one. A NaN encountered *after*
// seeding carries the previous EMA value forward rather than resetting.
// =============================================================================

/// Compute the EMA series for `data` with look-back `period`.
///
/// Same length as `data`. All-NaN when `period == 0`, when `data` has no
/// finite values, or when fewer than `period` finite values are available
/// starting at the first one.
pub fn ema(data: &[f64], period: usize) -> Vec<f64> {
    let n = data.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n == 0 {
        return result;
    }

    let Some(start) = data.iter().position(|x| !x.is_nan()) else {
        return result;
    };

    let non_nan_from_start = data[start..].iter().filter(|x| !x.is_nan()).count();
    if non_nan_from_start < period {
        return result;
    }

    let seed_end = start + period;
    if seed_end > n {
        return result;
    }

    let seed = data[start..seed_end].iter().sum::<f64>() / period as f64;
    result[seed_end - 1] = seed;

    let alpha = 2.0 / (period as f64 + 1.0);
    for i in seed_end..n {
        result[i] = if data[i].is_nan() {
            result[i - 1]
        } else {
            alpha * data[i] + (1.0 - alpha) * result[i - 1]
        };
    }

    result
}
