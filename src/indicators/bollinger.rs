// =============================================================================
// Bollinger Bands and %B
// =============================================================================
//
// middle = SMA(close, period)
// std    = population standard deviation of the trailing `period` window,
//          computed against the already-known `middle[i]` as the mean
// upper  = middle + num_std * std
// lower  = middle - num_std * std
//
// %B = (close - lower) / (upper - lower), with 0.5 when the band width is
// exactly zero (a flat window). NaN propagates everywhere else undefined.
// =============================================================================

use super::sma::sma;

/// (middle, upper, lower) bands over `close`.
pub fn bollinger(close: &[f64], period: usize, num_std: f64) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let n = close.len();
    let middle = sma(close, period);
    let mut upper = vec![f64::NAN; n];
    let mut lower = vec![f64::NAN; n];

    if period == 0 {
        return (middle, upper, lower);
    }

    for i in (period - 1)..n {
        let mean = middle[i];
        if mean.is_nan() {
            continue;
        }
        let window = &close[(i + 1 - period)..=i];
        let variance = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / period as f64;
        let std = variance.sqrt();
        upper[i] = mean + num_std * std;
        lower[i] = mean - num_std * std;
    }

    (middle, upper, lower)
}

/// %B = position of `close` within the [lower, upper] band, 0.5 when the
/// band has zero width.
pub fn pct_b(close: &[f64], upper: &[f64], lower: &[f64]) -> Vec<f64> {
    close
        .iter()
        .zip(upper.iter())
        .zip(lower.iter())
        .map(|((&c, &u), &l)| {
            let width = u - l;
            if width == 0.0 {
                0.5
            } else {
                (c - l) / width
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_data_is_all_nan() {
        let (mid, up, lo) = bollinger(&[1.0, 2.0], 20, 2.0);
        assert!(mid.iter().all(|v| v.is_nan()));
        assert!(up.iter().all(|v| v.is_nan()));
        assert!(lo.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn flat_series_has_zero_width_band() {
        let data = vec![10.0; 25];
        let (mid, up, lo) = bollinger(&data, 20, 2.0);
        assert!((mid[19] - 10.0).abs() < 1e-10);
        assert!((up[19] - 10.0).abs() < 1e-10);
        assert!((lo[19] - 10.0).abs() < 1e-10);
    }

    #[test]
    fn pct_b_is_half_when_band_width_zero() {
        let close = vec![10.0; 5];
        let upper = vec![10.0; 5];
        let lower = vec![10.0; 5];
        let out = pct_b(&close, &upper, &lower);
        assert!(out.iter().all(|&v| (v - 0.5).abs() < 1e-12));
    }

    #[test]
    fn pct_b_matches_relative_position() {
        let close = vec![110.0];
        let upper = vec![120.0];
        let lower = vec![100.0];
        let out = pct_b(&close, &upper, &lower);
        assert!((out[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn upper_is_never_below_middle_and_lower_never_above_it() {
        let data = vec![10.0, 12.0, 9.0, 15.0, 8.0, 20.0, 5.0, 11.0, 13.0, 7.0, 14.0, 6.0, 16.0, 9.0, 10.0, 18.0, 4.0, 12.0, 17.0, 8.0, 9.0, 11.0];
        let (mid, up, lo) = bollinger(&data, 20, 2.0);
        for i in 0..data.len() {
            if mid[i].is_nan() {
                continue;
            }
            assert!(up[i] >= mid[i] - 1e-9, "upper {} < middle {} at {i}", up[i], mid[i]);
            assert!(mid[i] >= lo[i] - 1e-9, "middle {} < lower {} at {i}", mid[i], lo[i]);
        }
    }
}
