// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the core technical indicators used
// by the trading engine. Every series function returns a `Vec<f64>` the same
// length as its input, NaN-sentinel at positions where the indicator isn't
// yet defined, matching the shape of the underlying candle data.

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod report;
pub mod rsi;
pub mod sma;
pub mod vwap;

pub use atr::atr as atr_series;
pub use bollinger::{bollinger, pct_b};
pub use ema::ema;
pub use macd::macd;
pub use report::{compute_indicators, DerivativesAnalysis, IndicatorReport, OrderbookAnalysis, TimeframeIndicators};
pub use rsi::rsi;
pub use sma::sma;
pub use vwap::vwap;
