//! Indicator report: turns a [`MarketSnapshot`] into the structured summary
//! the strategy engine feeds to the oracle.
//!
//! One [`TimeframeIndicators`] is produced per tracked [`Timeframe`], plus a
//! derived read of the orderbook and the derivatives (funding/OI) state.
//! Every indicator here is a last-value snapshot, not the full series — the
//! full series lives in [`crate::market_data::kline_buffer::KlineBuffer`]
//! and the raw indicator functions above.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::indicators::atr::atr;
use crate::indicators::bollinger::{bollinger, pct_b};
use crate::indicators::ema::ema;
use crate::indicators::macd::macd;
use crate::indicators::rsi::rsi;
use crate::indicators::vwap::vwap;
use crate::market_data::kline_buffer::KlineBuffer;
use crate::models::market::MarketSnapshot;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeframeIndicators {
    pub timeframe: String,
    pub last_close: f64,

    pub rsi_14: f64,
    pub macd_line: f64,
    pub macd_signal: f64,
    pub macd_histogram: f64,

    pub bb_upper: f64,
    pub bb_middle: f64,
    pub bb_lower: f64,
    pub bb_pct_b: f64,

    pub ema_9: f64,
    pub ema_21: f64,
    pub ema_50: f64,
    /// "bullish", "bearish", or "mixed".
    pub ema_alignment: String,

    pub vwap_value: f64,
    /// "above", "below", or "at".
    pub price_vs_vwap: String,

    pub atr_14: f64,

    pub recent_change_pct: f64,
    pub consecutive_red: u32,
    pub consecutive_green: u32,
    /// "dropping", "rising", or "choppy".
    pub candle_trend: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderbookAnalysis {
    pub bid_depth: f64,
    pub ask_depth: f64,
    pub imbalance: f64,
    pub spread_bps: f64,
    pub mid_price: f64,
    /// "buy_pressure", "sell_pressure", or "balanced".
    pub interpretation: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DerivativesAnalysis {
    pub funding_rate: f64,
    /// "longs_pay", "shorts_pay", or "neutral".
    pub funding_interpretation: String,
    pub open_interest: f64,
    pub long_ratio: f64,
    pub short_ratio: f64,
    pub ls_ratio: f64,
    /// "crowded_longs", "crowded_shorts", or "balanced".
    pub sentiment: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndicatorReport {
    pub symbol: String,
    pub mark_price: f64,
    pub index_price: f64,

    pub timeframes: HashMap<String, TimeframeIndicators>,
    pub orderbook: OrderbookAnalysis,
    pub derivatives: DerivativesAnalysis,
    pub volume_delta: f64,
    pub volume_delta_ratio: f64,

    pub ticker_change_24h: f64,
    pub ticker_volume_24h: f64,
}

fn last_or(series: &[f64], default: f64) -> f64 {
    match series.last() {
        Some(v) if !v.is_nan() => *v,
        _ => default,
    }
}

fn compute_timeframe(buf: &KlineBuffer, tf_name: &str) -> TimeframeIndicators {
    let mut ti = TimeframeIndicators {
        timeframe: tf_name.to_string(),
        ..Default::default()
    };

    if buf.size() < 2 {
        return ti;
    }

    let c = &buf.close;
    ti.last_close = *c.last().unwrap();

    let rsi_arr = rsi(c, 14);
    ti.rsi_14 = last_or(&rsi_arr, 50.0);

    let (ml, sl, hist) = macd(c, 12, 26, 9);
    ti.macd_line = last_or(&ml, 0.0);
    ti.macd_signal = last_or(&sl, 0.0);
    ti.macd_histogram = last_or(&hist, 0.0);

    let (bb_m, bb_u, bb_l) = bollinger(c, 20, 2.0);
    ti.bb_upper = last_or(&bb_u, 0.0);
    ti.bb_middle = last_or(&bb_m, 0.0);
    ti.bb_lower = last_or(&bb_l, 0.0);
    let pb = pct_b(c, &bb_u, &bb_l);
    ti.bb_pct_b = last_or(&pb, 0.5);

    let e9 = ema(c, 9);
    let e21 = ema(c, 21);
    let e50 = ema(c, 50);
    ti.ema_9 = last_or(&e9, 0.0);
    ti.ema_21 = last_or(&e21, 0.0);
    ti.ema_50 = last_or(&e50, 0.0);

    ti.ema_alignment = if ti.ema_9 > ti.ema_21 && ti.ema_21 > ti.ema_50 && ti.ema_50 > 0.0 {
        "bullish"
    } else if ti.ema_50 > ti.ema_21 && ti.ema_21 > ti.ema_9 && ti.ema_9 > 0.0 {
        "bearish"
    } else {
        "mixed"
    }
    .to_string();

    let v = vwap(&buf.high, &buf.low, c, &buf.volume);
    ti.vwap_value = last_or(&v, 0.0);
    if ti.vwap_value > 0.0 {
        ti.price_vs_vwap = if ti.last_close > ti.vwap_value * 1.001 {
            "above"
        } else if ti.last_close < ti.vwap_value * 0.999 {
            "below"
        } else {
            "at"
        }
        .to_string();
    }

    let a = atr(&buf.high, &buf.low, c, 14);
    ti.atr_14 = last_or(&a, 0.0);

    if buf.size() >= 4 {
        let n = c.len();
        let ref_close = c[n - 4];
        if ref_close > 0.0 {
            ti.recent_change_pct = (c[n - 1] - ref_close) / ref_close * 100.0;
        }

        let mut red = 0u32;
        let mut green = 0u32;
        let mut i = n - 1;
        while i > 0 {
            if c[i] < c[i - 1] {
                if green > 0 {
                    break;
                }
                red += 1;
            } else if c[i] > c[i - 1] {
                if red > 0 {
                    break;
                }
                green += 1;
            } else {
                break;
            }
            i -= 1;
        }
        ti.consecutive_red = red;
        ti.consecutive_green = green;

        ti.candle_trend = if red >= 3 {
            "dropping"
        } else if green >= 3 {
            "rising"
        } else {
            "choppy"
        }
        .to_string();
    }

    ti
}

fn analyze_orderbook(snapshot: &MarketSnapshot) -> OrderbookAnalysis {
    let ob = &snapshot.orderbook;
    let bbo = &snapshot.bbo;
    let imbalance = ob.imbalance();
    let interpretation = if imbalance > 0.2 {
        "buy_pressure"
    } else if imbalance < -0.2 {
        "sell_pressure"
    } else {
        "balanced"
    };

    OrderbookAnalysis {
        bid_depth: ob.bid_depth(),
        ask_depth: ob.ask_depth(),
        imbalance,
        spread_bps: bbo.spread_bps(),
        mid_price: bbo.mid_price(),
        interpretation: interpretation.to_string(),
    }
}

fn analyze_derivatives(snapshot: &MarketSnapshot) -> DerivativesAnalysis {
    let fr = &snapshot.funding;
    let oi = &snapshot.open_interest;
    let toi = &snapshot.traders_oi;
    let ls_ratio = toi.ls_ratio();

    let funding_interpretation = if fr.est_funding_rate > 0.0001 {
        "longs_pay"
    } else if fr.est_funding_rate < -0.0001 {
        "shorts_pay"
    } else {
        "neutral"
    };

    let sentiment = if ls_ratio >= 1.49 {
        "crowded_longs"
    } else if ls_ratio <= 0.67 {
        "crowded_shorts"
    } else {
        "balanced"
    };

    DerivativesAnalysis {
        funding_rate: fr.est_funding_rate,
        funding_interpretation: funding_interpretation.to_string(),
        open_interest: oi.open_interest,
        long_ratio: toi.long_ratio,
        short_ratio: toi.short_ratio,
        ls_ratio,
        sentiment: sentiment.to_string(),
    }
}

/// Compute the full indicator report for one symbol's snapshot. Main entry
/// point called by the strategy engine ahead of every analysis cycle.
pub fn compute_indicators(snapshot: &MarketSnapshot) -> IndicatorReport {
    let mut report = IndicatorReport {
        symbol: snapshot.symbol.clone(),
        mark_price: snapshot.mark_price,
        index_price: snapshot.index_price,
        ..Default::default()
    };

    for (tf, buf) in &snapshot.klines {
        report
            .timeframes
            .insert(tf.label().to_string(), compute_timeframe(buf, tf.label()));
    }

    report.orderbook = analyze_orderbook(snapshot);
    report.derivatives = analyze_derivatives(snapshot);

    report.volume_delta = snapshot.volume_delta.delta();
    report.volume_delta_ratio = snapshot.volume_delta.delta_ratio();

    report.ticker_change_24h = snapshot.ticker.change_24h;
    report.ticker_volume_24h = snapshot.ticker.volume_24h;

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::orderbook::{OrderbookLevel, OrderbookSnapshot, BBO};
    use crate::models::market::{FundingRate, OpenInterest, TickerData, Timeframe, TradersOI, VolumeDelta};

    fn sample_buffer() -> KlineBuffer {
        let mut buf = KlineBuffer::new(200);
        for i in 0..30 {
            let px = 100.0 + i as f64;
            buf.append(px, px + 1.0, px - 1.0, px + 0.5, 10.0, i as f64);
        }
        buf
    }

    #[test]
    fn short_buffer_returns_defaults() {
        let buf = KlineBuffer::new(200);
        let ti = compute_timeframe(&buf, "5m");
        assert_eq!(ti.last_close, 0.0);
        assert_eq!(ti.timeframe, "5m");
    }

    #[test]
    fn uptrending_buffer_is_bullish_alignment_candidate() {
        let buf = sample_buffer();
        let ti = compute_timeframe(&buf, "5m");
        assert!(ti.last_close > 0.0);
        assert!(["bullish", "bearish", "mixed"].contains(&ti.ema_alignment.as_str()));
        assert!(["above", "below", "at", ""].contains(&ti.price_vs_vwap.as_str()));
    }

    #[test]
    fn rsi_defaults_to_50_when_undefined() {
        let mut buf = KlineBuffer::new(200);
        buf.append(100.0, 101.0, 99.0, 100.0, 1.0, 0.0);
        buf.append(101.0, 102.0, 100.0, 101.0, 1.0, 1.0);
        let ti = compute_timeframe(&buf, "5m");
        assert_eq!(ti.rsi_14, 50.0);
    }

    #[test]
    fn orderbook_interpretation_buy_pressure() {
        let mut snapshot = MarketSnapshot::default();
        snapshot.orderbook = {
            let mut ob = OrderbookSnapshot::default();
            ob.replace(
                vec![OrderbookLevel { price: 100.0, quantity: 9.0 }],
                vec![OrderbookLevel { price: 101.0, quantity: 1.0 }],
                0.0,
            );
            ob
        };
        snapshot.bbo = BBO { bid_price: 100.0, bid_qty: 9.0, ask_price: 101.0, ask_qty: 1.0, timestamp: 0.0 };
        let analysis = analyze_orderbook(&snapshot);
        assert_eq!(analysis.interpretation, "buy_pressure");
    }

    #[test]
    fn derivatives_crowded_longs_sentiment() {
        let mut snapshot = MarketSnapshot::default();
        snapshot.funding = FundingRate { symbol: "X".into(), funding_rate: 0.0, est_funding_rate: 0.0002, next_funding_time: 0.0, timestamp: 0.0 };
        snapshot.open_interest = OpenInterest { symbol: "X".into(), open_interest: 1000.0, timestamp: 0.0 };
        snapshot.traders_oi = TradersOI { symbol: "X".into(), long_ratio: 0.7, short_ratio: 0.3, timestamp: 0.0 };
        let analysis = analyze_derivatives(&snapshot);
        assert_eq!(analysis.funding_interpretation, "longs_pay");
        assert_eq!(analysis.sentiment, "crowded_longs");
    }

    #[test]
    fn compute_indicators_populates_all_timeframes() {
        let mut snapshot = MarketSnapshot::default();
        snapshot.symbol = "PERP_BTC_USDC".to_string();
        for tf in Timeframe::ALL {
            snapshot.klines.insert(tf, sample_buffer());
        }
        snapshot.ticker = TickerData { change_24h: 3.5, volume_24h: 500.0, ..Default::default() };
        snapshot.volume_delta = VolumeDelta { buy_volume: 60.0, sell_volume: 40.0, trade_count: 10 };

        let report = compute_indicators(&snapshot);
        assert_eq!(report.timeframes.len(), 3);
        assert!(report.timeframes.contains_key("5m"));
        assert_eq!(report.ticker_change_24h, 3.5);
        assert!((report.volume_delta - 20.0).abs() < 1e-9);
    }
}
