// =============================================================================
// Volume-Weighted Average Price (VWAP)
// =============================================================================
//
// typical_i = (high_i + low_i + close_i) / 3
// VWAP_i    = cumsum(typical * volume)_i / cumsum(volume)_i
//
// Unlike the other indicators, VWAP is not NaN-sentinel: it is defined from
// the first bar and resolves to 0.0 wherever cumulative volume is still
// zero, rather than leaving the output undefined.
// =============================================================================

/// Cumulative VWAP over `high`/`low`/`close`/`volume` (all same length).
pub fn vwap(high: &[f64], low: &[f64], close: &[f64], volume: &[f64]) -> Vec<f64> {
    let n = close.len();
    let mut result = vec![0.0; n];
    let mut cum_tpv = 0.0;
    let mut cum_vol = 0.0;

    for i in 0..n {
        let typical = (high[i] + low[i] + close[i]) / 3.0;
        cum_tpv += typical * volume[i];
        cum_vol += volume[i];
        result[i] = if cum_vol == 0.0 { 0.0 } else { cum_tpv / cum_vol };
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_volume_series_is_all_zero() {
        let out = vwap(&[10.0, 11.0], &[9.0, 10.0], &[9.5, 10.5], &[0.0, 0.0]);
        assert_eq!(out, vec![0.0, 0.0]);
    }

    #[test]
    fn single_bar_vwap_equals_typical_price() {
        let out = vwap(&[10.0], &[8.0], &[9.0], &[5.0]);
        assert!((out[0] - 9.0).abs() < 1e-10);
    }

    #[test]
    fn accumulates_across_bars() {
        let high = vec![10.0, 10.0];
        let low = vec![10.0, 10.0];
        let close = vec![10.0, 20.0];
        let volume = vec![1.0, 1.0];
        let out = vwap(&high, &low, &close, &volume);
        let typical0 = (10.0 + 10.0 + 10.0) / 3.0;
        let typical1 = (10.0 + 10.0 + 20.0) / 3.0;
        let expected = (typical0 * 1.0 + typical1 * 1.0) / 2.0;
        assert!((out[1] - expected).abs() < 1e-10);
    }
}
