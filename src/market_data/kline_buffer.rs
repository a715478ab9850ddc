//! Fixed-size ring buffer of OHLCV data, one per (symbol, timeframe).
//!
//! Columns are stored as parallel `Vec<f64>` rather than a struct-of-rows so
//! that the indicator engine (`crate::indicators`) can hand each column
//! straight to a numeric transform without reshaping. New candles are
//! appended; once the buffer is full the oldest row is dropped.

use serde::{Deserialize, Serialize};

/// Ring buffer of OHLCV candles for a single (symbol, timeframe) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KlineBuffer {
    pub max_size: usize,

    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
    pub timestamp: Vec<f64>,
}

impl Default for KlineBuffer {
    fn default() -> Self {
        Self::new(200)
    }
}

impl KlineBuffer {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            open: Vec::new(),
            high: Vec::new(),
            low: Vec::new(),
            close: Vec::new(),
            volume: Vec::new(),
            timestamp: Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    /// Append a new candle. If the buffer is non-empty and the last stored
    /// timestamp equals `ts`, this is an in-progress candle update: the last
    /// row is replaced in place rather than extending the buffer. Otherwise a
    /// new row is appended and, if the buffer now exceeds `max_size`, the
    /// oldest row is dropped.
    pub fn append(&mut self, o: f64, h: f64, l: f64, c: f64, v: f64, ts: f64) {
        if let Some(&last_ts) = self.timestamp.last() {
            if last_ts == ts {
                *self.open.last_mut().unwrap() = o;
                *self.high.last_mut().unwrap() = h;
                *self.low.last_mut().unwrap() = l;
                *self.close.last_mut().unwrap() = c;
                *self.volume.last_mut().unwrap() = v;
                return;
            }
        }

        self.open.push(o);
        self.high.push(h);
        self.low.push(l);
        self.close.push(c);
        self.volume.push(v);
        self.timestamp.push(ts);

        if self.size() > self.max_size {
            let drop = self.size() - self.max_size;
            self.open.drain(0..drop);
            self.high.drain(0..drop);
            self.low.drain(0..drop);
            self.close.drain(0..drop);
            self.volume.drain(0..drop);
            self.timestamp.drain(0..drop);
        }
    }

    /// Replace all six sequences with the tail `max_size` rows of the given
    /// bulk load. The caller guarantees the six inputs have equal length and
    /// non-decreasing timestamps (oldest first).
    pub fn load_bulk(
        &mut self,
        opens: &[f64],
        highs: &[f64],
        lows: &[f64],
        closes: &[f64],
        volumes: &[f64],
        timestamps: &[f64],
    ) {
        let tail = |s: &[f64]| -> Vec<f64> {
            let start = s.len().saturating_sub(self.max_size);
            s[start..].to_vec()
        };
        self.open = tail(opens);
        self.high = tail(highs);
        self.low = tail(lows);
        self.close = tail(closes);
        self.volume = tail(volumes);
        self.timestamp = tail(timestamps);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_trimming() {
        let mut buf = KlineBuffer::new(3);
        for i in 0..5 {
            buf.append(
                100.0 + i as f64,
                101.0 + i as f64,
                99.0 + i as f64,
                100.5 + i as f64,
                10.0,
                (i * 60) as f64,
            );
        }
        assert_eq!(buf.size(), 3);
        assert_eq!(buf.close, vec![102.5, 103.5, 104.5]);
        assert_eq!(buf.timestamp, vec![120.0, 180.0, 240.0]);
    }

    #[test]
    fn same_timestamp_updates_in_place() {
        let mut buf = KlineBuffer::new(10);
        buf.append(1.0, 2.0, 0.5, 1.5, 10.0, 0.0);
        buf.append(1.0, 2.5, 0.5, 1.8, 15.0, 0.0);
        assert_eq!(buf.size(), 1);
        assert_eq!(buf.close[0], 1.8);
        assert_eq!(buf.volume[0], 15.0);
    }

    #[test]
    fn load_bulk_truncates_to_max_size() {
        let mut buf = KlineBuffer::new(2);
        let series: Vec<f64> = (0..5).map(|i| i as f64).collect();
        buf.load_bulk(&series, &series, &series, &series, &series, &series);
        assert_eq!(buf.close, vec![3.0, 4.0]);
        assert_eq!(buf.size(), 2);
    }

    #[test]
    fn empty_buffer_has_zero_size() {
        let buf = KlineBuffer::new(200);
        assert_eq!(buf.size(), 0);
        assert!(buf.is_empty());
    }
}
