//! Flat market-data records and the point-in-time [`MarketSnapshot`].
//!
//! Everything here is a plain value type: no locking, no shared ownership.
//! The collector (`crate::market_data::collector`) is the only thing that
//! mutates these in place; every other consumer works off a cloned snapshot.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::market_data::kline_buffer::KlineBuffer;
use crate::market_data::orderbook::{OrderbookSnapshot, BBO};

/// Kline cadence tracked per symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 3] = [Timeframe::M5, Timeframe::M15, Timeframe::H1];

    /// Resolution string used against the REST backfill endpoint (§6.1).
    pub fn resolution(self) -> &'static str {
        match self {
            Timeframe::M5 => "5",
            Timeframe::M15 => "15",
            Timeframe::H1 => "60",
        }
    }

    pub fn minutes(self) -> i64 {
        match self {
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::H1 => 60,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FundingRate {
    pub symbol: String,
    pub funding_rate: f64,
    pub est_funding_rate: f64,
    pub next_funding_time: f64,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenInterest {
    pub symbol: String,
    pub open_interest: f64,
    pub timestamp: f64,
}

/// Long/short ratio derived from traders' open interest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradersOI {
    pub symbol: String,
    pub long_ratio: f64,
    pub short_ratio: f64,
    pub timestamp: f64,
}

impl Default for TradersOI {
    fn default() -> Self {
        Self {
            symbol: String::new(),
            long_ratio: 0.5,
            short_ratio: 0.5,
            timestamp: 0.0,
        }
    }
}

impl TradersOI {
    pub fn ls_ratio(&self) -> f64 {
        if self.short_ratio == 0.0 {
            f64::INFINITY
        } else {
            self.long_ratio / self.short_ratio
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentTrade {
    pub price: f64,
    pub quantity: f64,
    pub side: String,
    pub timestamp: f64,
}

/// Aggregated buy vs. sell volume from the recent-trades FIFO.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VolumeDelta {
    pub buy_volume: f64,
    pub sell_volume: f64,
    pub trade_count: u32,
}

impl VolumeDelta {
    pub fn delta(&self) -> f64 {
        self.buy_volume - self.sell_volume
    }

    pub fn delta_ratio(&self) -> f64 {
        let total = self.buy_volume + self.sell_volume;
        if total == 0.0 {
            0.0
        } else {
            self.delta() / total
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickerData {
    pub symbol: String,
    pub open_24h: f64,
    pub high_24h: f64,
    pub low_24h: f64,
    pub close_24h: f64,
    pub volume_24h: f64,
    pub change_24h: f64,
    pub timestamp: f64,
}

/// Complete market state for one symbol at a point in time.
///
/// This is the input to indicator computation and prompt building. Every
/// field is an owned, independent copy — holding one of these across a
/// collector mutation is always safe.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub snapshot_time: f64,

    pub klines: HashMap<Timeframe, KlineBuffer>,

    pub orderbook: OrderbookSnapshot,
    pub bbo: BBO,

    pub funding: FundingRate,
    pub open_interest: OpenInterest,
    pub traders_oi: TradersOI,

    pub volume_delta: VolumeDelta,
    pub recent_trades: Vec<RecentTrade>,

    pub ticker: TickerData,

    pub mark_price: f64,
    pub index_price: f64,
}
