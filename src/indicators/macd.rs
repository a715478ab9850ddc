// =============================================================================
// Moving Average Convergence/Divergence (MACD)
// =============================================================================
//
// macd_line   = EMA(close, fast) - EMA(close, slow)
// signal_line = EMA(macd_line, signal)
// histogram   = macd_line - signal_line
//
// NaN propagates naturally through the subtraction: the macd_line is NaN
// wherever either EMA hasn't seeded yet, and the signal line in turn needs
// `signal` finite macd_line values before it seeds.
// =============================================================================

use super::ema::ema;

/// MACD line, signal line, and histogram for `close`.
pub fn macd(close: &[f64], fast: usize, slow: usize, signal: usize) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let ema_fast = ema(close, fast);
    let ema_slow = ema(close, slow);

    let macd_line: Vec<f64> = ema_fast
        .iter()
        .zip(ema_slow.iter())
        .map(|(&f, &s)| f - s)
        .collect();

    let signal_line = ema(&macd_line, signal);

    let histogram: Vec<f64> = macd_line
        .iter()
        .zip(signal_line.iter())
        .map(|(&m, &s)| m - s)
        .collect();

    (macd_line, signal_line, histogram)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_data_is_all_nan() {
        let (line, signal, hist) = macd(&[1.0, 2.0, 3.0], 12, 26, 9);
        assert!(line.iter().all(|v| v.is_nan()));
        assert!(signal.iter().all(|v| v.is_nan()));
        assert!(hist.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn histogram_equals_line_minus_signal() {
        let data: Vec<f64> = (1..=60).map(|x| x as f64).collect();
        let (line, signal, hist) = macd(&data, 12, 26, 9);
        for i in 0..data.len() {
            if line[i].is_finite() && signal[i].is_finite() {
                assert!((hist[i] - (line[i] - signal[i])).abs() < 1e-9);
            } else {
                assert!(hist[i].is_nan());
            }
        }
    }

    #[test]
    fn uptrend_gives_positive_macd_line() {
        let data: Vec<f64> = (1..=60).map(|x| x as f64).collect();
        let (line, _, _) = macd(&data, 12, 26, 9);
        assert!(line[59] > 0.0);
    }
}
