//! Orderbook and best-bid/offer value types.
//!
//! These are plain snapshots, not actors: the collector (`collector.rs`) owns
//! the mutable orderbook state behind its lock and replaces these values
//! wholesale on every `@orderbook` / `@bbo` message.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderbookLevel {
    pub price: f64,
    pub quantity: f64,
}

/// Current orderbook state: top N levels each side (capped at 20, §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderbookSnapshot {
    pub bids: Vec<OrderbookLevel>,
    pub asks: Vec<OrderbookLevel>,
    pub timestamp: f64,
}

pub const MAX_ORDERBOOK_LEVELS: usize = 20;

impl OrderbookSnapshot {
    /// Replace bids/asks, keeping only the first `MAX_ORDERBOOK_LEVELS` of
    /// each (bids are expected sorted descending, asks ascending).
    pub fn replace(&mut self, mut bids: Vec<OrderbookLevel>, mut asks: Vec<OrderbookLevel>, ts: f64) {
        bids.truncate(MAX_ORDERBOOK_LEVELS);
        asks.truncate(MAX_ORDERBOOK_LEVELS);
        self.bids = bids;
        self.asks = asks;
        self.timestamp = ts;
    }

    pub fn bid_depth(&self) -> f64 {
        self.bids.iter().map(|l| l.quantity).sum()
    }

    pub fn ask_depth(&self) -> f64 {
        self.asks.iter().map(|l| l.quantity).sum()
    }

    /// Positive = bid-heavy (buy pressure), negative = ask-heavy. Zero when
    /// both sides are empty.
    pub fn imbalance(&self) -> f64 {
        let bid = self.bid_depth();
        let ask = self.ask_depth();
        let total = bid + ask;
        if total == 0.0 {
            0.0
        } else {
            (bid - ask) / total
        }
    }
}

/// Best bid/offer.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BBO {
    pub bid_price: f64,
    pub bid_qty: f64,
    pub ask_price: f64,
    pub ask_qty: f64,
    pub timestamp: f64,
}

impl BBO {
    pub fn mid_price(&self) -> f64 {
        if self.bid_price == 0.0 || self.ask_price == 0.0 {
            0.0
        } else {
            (self.bid_price + self.ask_price) / 2.0
        }
    }

    pub fn spread(&self) -> f64 {
        self.ask_price - self.bid_price
    }

    pub fn spread_bps(&self) -> f64 {
        let mid = self.mid_price();
        if mid == 0.0 {
            0.0
        } else {
            (self.spread() / mid) * 10_000.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn imbalance_is_zero_when_empty() {
        let ob = OrderbookSnapshot::default();
        assert_eq!(ob.imbalance(), 0.0);
    }

    #[test]
    fn imbalance_is_bid_heavy_positive() {
        let mut ob = OrderbookSnapshot::default();
        ob.replace(
            vec![OrderbookLevel { price: 100.0, quantity: 9.0 }],
            vec![OrderbookLevel { price: 101.0, quantity: 1.0 }],
            0.0,
        );
        assert!((ob.imbalance() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn replace_caps_levels_at_twenty() {
        let mut ob = OrderbookSnapshot::default();
        let bids: Vec<OrderbookLevel> = (0..30)
            .map(|i| OrderbookLevel { price: 100.0 - i as f64, quantity: 1.0 })
            .collect();
        ob.replace(bids, Vec::new(), 0.0);
        assert_eq!(ob.bids.len(), MAX_ORDERBOOK_LEVELS);
    }

    #[test]
    fn bbo_mid_price_zero_when_one_side_missing() {
        let bbo = BBO { bid_price: 100.0, bid_qty: 1.0, ask_price: 0.0, ask_qty: 0.0, timestamp: 0.0 };
        assert_eq!(bbo.mid_price(), 0.0);
        assert_eq!(bbo.spread_bps(), 0.0);
    }

    #[test]
    fn bbo_spread_bps() {
        let bbo = BBO { bid_price: 100.0, bid_qty: 1.0, ask_price: 101.0, ask_qty: 1.0, timestamp: 0.0 };
        assert!((bbo.mid_price() - 100.5).abs() < 1e-9);
        assert!((bbo.spread_bps() - 99.502487).abs() < 1e-3);
    }
}
