//! Per-symbol market data collector (C2).
//!
//! Owns every piece of mutable market state for one symbol behind a single
//! `parking_lot::RwLock`. Ingest handlers and `get_snapshot` all acquire this
//! lock for the duration of the operation; `get_snapshot` hands back a fully
//! independent, deep-copied [`MarketSnapshot`] that is never mutated once
//! produced. Interleaving across streams is not ordered — only within one
//! stream are updates guaranteed to be applied in arrival order.

use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::market::{
    FundingRate, MarketSnapshot, OpenInterest, RecentTrade, TickerData, Timeframe, TradersOI,
    VolumeDelta,
};
use crate::market_data::kline_buffer::KlineBuffer;
use crate::market_data::orderbook::{OrderbookLevel, OrderbookSnapshot, BBO};

pub const MAX_RECENT_TRADES: usize = 500;
const BACKFILL_TIMEOUT_SECS: u64 = 15;

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Derive the spot-market twin of a perpetual symbol for the index-price
/// topic (`PERP_ETH_USDC` -> `SPOT_ETH_USDC`).
pub fn spot_symbol(perp_symbol: &str) -> String {
    if let Some(rest) = perp_symbol.strip_prefix("PERP_") {
        format!("SPOT_{rest}")
    } else {
        perp_symbol.to_string()
    }
}

struct Inner {
    klines: std::collections::HashMap<Timeframe, KlineBuffer>,
    orderbook: OrderbookSnapshot,
    bbo: BBO,
    funding: FundingRate,
    open_interest: OpenInterest,
    traders_oi: TradersOI,
    ticker: TickerData,
    recent_trades: VecDeque<RecentTrade>,
    mark_price: f64,
    index_price: f64,
    started: bool,
}

impl Inner {
    fn new(max_size: usize) -> Self {
        let mut klines = std::collections::HashMap::new();
        for tf in Timeframe::ALL {
            klines.insert(tf, KlineBuffer::new(max_size));
        }
        Self {
            klines,
            orderbook: OrderbookSnapshot::default(),
            bbo: BBO::default(),
            funding: FundingRate::default(),
            open_interest: OpenInterest::default(),
            traders_oi: TradersOI::default(),
            ticker: TickerData::default(),
            recent_trades: VecDeque::new(),
            mark_price: 0.0,
            index_price: 0.0,
            started: false,
        }
    }
}

/// Collects and merges every market-data stream for one symbol.
pub struct Collector {
    symbol: String,
    rest_base_url: String,
    http: reqwest::Client,
    inner: RwLock<Inner>,
}

impl Collector {
    pub fn new(symbol: impl Into<String>, rest_base_url: impl Into<String>, max_size: usize) -> Self {
        Self {
            symbol: symbol.into(),
            rest_base_url: rest_base_url.into(),
            http: reqwest::Client::new(),
            inner: RwLock::new(Inner::new(max_size)),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Idempotent. The actual stream subscription is established by the
    /// background task that owns the transport connection (`main.rs`); this
    /// just marks the collector ready to accept ingest.
    pub fn start(&self) {
        let mut inner = self.inner.write();
        if inner.started {
            return;
        }
        inner.started = true;
        debug!(symbol = %self.symbol, "collector started");
    }

    /// Idempotent.
    pub fn stop(&self) {
        let mut inner = self.inner.write();
        inner.started = false;
        debug!(symbol = %self.symbol, "collector stopped");
    }

    /// Fetch historical candles for each tracked timeframe via REST and load
    /// them in bulk. Each timeframe is independent: a failure on one is
    /// logged and swallowed, the buffer is simply left empty, and backfill
    /// continues with the remaining timeframes.
    pub async fn backfill_klines(&self) {
        for tf in Timeframe::ALL {
            if let Err(e) = self.backfill_one(tf).await {
                warn!(symbol = %self.symbol, timeframe = %tf, error = %e, "kline backfill failed");
            }
        }
    }

    async fn backfill_one(&self, tf: Timeframe) -> Result<()> {
        let max_size = {
            let inner = self.inner.read();
            inner.klines.get(&tf).map(|b| b.max_size).unwrap_or(200)
        };
        let now = now_secs();
        let from = now - (max_size as f64) * (tf.minutes() as f64) * 60.0;

        let url = format!("{}/v1/tv/history", self.rest_base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("symbol", self.symbol.as_str()),
                ("resolution", tf.resolution()),
                ("from", &format!("{:.0}", from)),
                ("to", &format!("{:.0}", now)),
            ])
            .timeout(std::time::Duration::from_secs(BACKFILL_TIMEOUT_SECS))
            .send()
            .await
            .context("backfill request failed")?;

        let body: BackfillResponse = resp.json().await.context("invalid backfill response body")?;

        if body.t.is_empty() {
            return Ok(());
        }

        let mut inner = self.inner.write();
        if let Some(buf) = inner.klines.get_mut(&tf) {
            buf.load_bulk(&body.o, &body.h, &body.l, &body.c, &body.v, &body.t);
        }
        Ok(())
    }

    /// Returns a fully independent deep copy of current market state.
    pub fn get_snapshot(&self) -> MarketSnapshot {
        let inner = self.inner.read();

        let mut buy_volume = 0.0;
        let mut sell_volume = 0.0;
        for t in &inner.recent_trades {
            if t.side == "BUY" {
                buy_volume += t.quantity;
            } else {
                sell_volume += t.quantity;
            }
        }
        let volume_delta = VolumeDelta {
            buy_volume,
            sell_volume,
            trade_count: inner.recent_trades.len() as u32,
        };

        MarketSnapshot {
            symbol: self.symbol.clone(),
            snapshot_time: now_secs(),
            klines: inner.klines.clone(),
            orderbook: inner.orderbook.clone(),
            bbo: inner.bbo,
            funding: inner.funding.clone(),
            open_interest: inner.open_interest.clone(),
            traders_oi: inner.traders_oi.clone(),
            volume_delta,
            recent_trades: inner.recent_trades.iter().cloned().collect(),
            ticker: inner.ticker.clone(),
            mark_price: inner.mark_price,
            index_price: inner.index_price,
        }
    }

    /// First positive of: mark_price, bbo.mid, last 5m close, else 0.
    pub fn current_price(&self) -> f64 {
        let inner = self.inner.read();
        if inner.mark_price > 0.0 {
            return inner.mark_price;
        }
        let mid = inner.bbo.mid_price();
        if mid > 0.0 {
            return mid;
        }
        if let Some(buf) = inner.klines.get(&Timeframe::M5) {
            if let Some(&c) = buf.close.last() {
                if c > 0.0 {
                    return c;
                }
            }
        }
        0.0
    }

    /// Route an inbound `{ "topic": ..., "data": ... }` message. Malformed
    /// JSON and `null` data are dropped silently; any per-handler failure is
    /// logged and isolated — it never propagates to the caller.
    pub fn ingest(&self, raw: &str) {
        let root: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(_) => return,
        };
        let Some(topic) = root.get("topic").and_then(Value::as_str) else {
            return;
        };
        let data = root.get("data").cloned();
        if matches!(data, None | Some(Value::Null)) {
            return;
        }
        self.handle_message(topic, data.unwrap());
    }

    fn handle_message(&self, topic: &str, data: Value) {
        let result = if topic.contains("@kline_5m") {
            self.handle_kline(Timeframe::M5, &data)
        } else if topic.contains("@kline_15m") {
            self.handle_kline(Timeframe::M15, &data)
        } else if topic.contains("@kline_1h") {
            self.handle_kline(Timeframe::H1, &data)
        } else if topic.contains("@orderbook") && !topic.contains("@orderbookupdate") {
            self.handle_orderbook(&data)
        } else if topic.contains("@bbo") {
            self.handle_bbo(&data)
        } else if topic.contains("@trade") {
            self.handle_trade(&data)
        } else if topic.contains("@ticker") {
            self.handle_ticker(&data)
        } else if topic.contains("@estfundingrate") {
            self.handle_funding(&data)
        } else if topic.contains("@openinterest") {
            self.handle_open_interest(&data)
        } else if topic.contains("@markprice") {
            self.handle_mark_price(&data)
        } else if topic.contains("@indexprice") {
            self.handle_index_price(&data)
        } else {
            Ok(())
        };

        if let Err(e) = result {
            warn!(symbol = %self.symbol, topic = %topic, error = %e, "failed to handle market data message");
        }
    }

    fn handle_kline(&self, tf: Timeframe, data: &Value) -> Result<()> {
        let o = as_f64(data, "open")?;
        let h = as_f64(data, "high")?;
        let l = as_f64(data, "low")?;
        let c = as_f64(data, "close")?;
        let v = as_f64(data, "volume")?;
        let ts = as_f64(data, "startTime")?;

        let mut inner = self.inner.write();
        if let Some(buf) = inner.klines.get_mut(&tf) {
            buf.append(o, h, l, c, v, ts);
        }
        Ok(())
    }

    fn handle_orderbook(&self, data: &Value) -> Result<()> {
        let bids = parse_levels(data, "bids")?;
        let asks = parse_levels(data, "asks")?;
        let ts = as_f64(data, "ts").unwrap_or_else(|_| now_secs());

        let mut inner = self.inner.write();
        inner.orderbook.replace(bids, asks, ts);
        Ok(())
    }

    fn handle_bbo(&self, data: &Value) -> Result<()> {
        let bid_price = as_f64(data, "bid")?;
        let bid_qty = as_f64(data, "bidSize")?;
        let ask_price = as_f64(data, "ask")?;
        let ask_qty = as_f64(data, "askSize")?;
        let timestamp = as_f64(data, "timestamp").unwrap_or_else(|_| now_secs());

        let mut inner = self.inner.write();
        inner.bbo = BBO { bid_price, bid_qty, ask_price, ask_qty, timestamp };
        Ok(())
    }

    fn handle_trade(&self, data: &Value) -> Result<()> {
        let price = as_f64(data, "price")?;
        let quantity = as_f64(data, "size")?;
        let side = data
            .get("side")
            .and_then(Value::as_str)
            .context("missing field side")?
            .to_string();
        let timestamp = as_f64(data, "timestamp").unwrap_or_else(|_| now_secs());

        let mut inner = self.inner.write();
        inner.recent_trades.push_back(RecentTrade { price, quantity, side, timestamp });
        while inner.recent_trades.len() > MAX_RECENT_TRADES {
            inner.recent_trades.pop_front();
        }
        Ok(())
    }

    fn handle_ticker(&self, data: &Value) -> Result<()> {
        let open = as_f64(data, "open")?;
        let high = as_f64(data, "high")?;
        let low = as_f64(data, "low")?;
        let close = as_f64(data, "close")?;
        let volume = as_f64(data, "volume")?;
        let change_24h = if open > 0.0 { (close - open) / open * 100.0 } else { 0.0 };

        let mut inner = self.inner.write();
        inner.ticker = TickerData {
            symbol: self.symbol.clone(),
            open_24h: open,
            high_24h: high,
            low_24h: low,
            close_24h: close,
            volume_24h: volume,
            change_24h,
            timestamp: now_secs(),
        };
        Ok(())
    }

    fn handle_funding(&self, data: &Value) -> Result<()> {
        let est_funding_rate = as_f64(data, "estFundingRate")?;
        let funding_rate = as_f64(data, "lastFundingRate").unwrap_or(est_funding_rate);
        let next_funding_time = as_f64(data, "nextFundingTime").unwrap_or(0.0);

        let mut inner = self.inner.write();
        inner.funding = FundingRate {
            symbol: self.symbol.clone(),
            funding_rate,
            est_funding_rate,
            next_funding_time,
            timestamp: now_secs(),
        };
        Ok(())
    }

    fn handle_open_interest(&self, data: &Value) -> Result<()> {
        let open_interest = as_f64(data, "openInterest")?;
        let mut inner = self.inner.write();
        inner.open_interest = OpenInterest {
            symbol: self.symbol.clone(),
            open_interest,
            timestamp: now_secs(),
        };
        Ok(())
    }

    fn handle_mark_price(&self, data: &Value) -> Result<()> {
        let price = as_f64(data, "price")?;
        self.inner.write().mark_price = price;
        Ok(())
    }

    fn handle_index_price(&self, data: &Value) -> Result<()> {
        let price = as_f64(data, "price")?;
        self.inner.write().index_price = price;
        Ok(())
    }

    /// Exposed for the traders'-open-interest long/short ratio feed, which
    /// is not listed among the raw exchange topics (§6.2) but is folded in
    /// here as another scalar overwrite, matching how funding/OI are merged.
    pub fn update_traders_oi(&self, long_ratio: f64, short_ratio: f64) {
        let mut inner = self.inner.write();
        inner.traders_oi = TradersOI {
            symbol: self.symbol.clone(),
            long_ratio,
            short_ratio,
            timestamp: now_secs(),
        };
    }
}

fn as_f64(data: &Value, field: &str) -> Result<f64> {
    data.get(field)
        .and_then(Value::as_f64)
        .with_context(|| format!("missing or non-numeric field {field}"))
}

fn parse_levels(data: &Value, field: &str) -> Result<Vec<OrderbookLevel>> {
    let arr = data
        .get(field)
        .and_then(Value::as_array)
        .with_context(|| format!("missing field {field}"))?;
    let mut levels = Vec::with_capacity(arr.len());
    for row in arr {
        let pair = row.as_array().context("level row is not an array")?;
        let price = pair.first().and_then(Value::as_f64).context("missing level price")?;
        let quantity = pair.get(1).and_then(Value::as_f64).context("missing level quantity")?;
        levels.push(OrderbookLevel { price, quantity });
    }
    Ok(levels)
}

#[derive(Debug, Deserialize)]
struct BackfillResponse {
    #[serde(default)]
    t: Vec<f64>,
    #[serde(default)]
    o: Vec<f64>,
    #[serde(default)]
    h: Vec<f64>,
    #[serde(default)]
    l: Vec<f64>,
    #[serde(default)]
    c: Vec<f64>,
    #[serde(default)]
    v: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collector() -> Collector {
        Collector::new("PERP_ETH_USDC", "https://example.invalid", 200)
    }

    #[test]
    fn spot_symbol_replaces_perp_prefix() {
        assert_eq!(spot_symbol("PERP_ETH_USDC"), "SPOT_ETH_USDC");
        assert_eq!(spot_symbol("ETH_USDC"), "ETH_USDC");
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let c = collector();
        c.start();
        c.start();
        c.stop();
        c.stop();
    }

    #[test]
    fn malformed_json_is_dropped_silently() {
        let c = collector();
        c.ingest("not json");
        c.ingest(r#"{"topic": "PERP_ETH_USDC@bbo", "data": null}"#);
        assert_eq!(c.current_price(), 0.0);
    }

    #[test]
    fn kline_dispatch_updates_buffer_and_current_price() {
        let c = collector();
        let msg = r#"{"topic": "PERP_ETH_USDC@kline_5m", "data": {"open": 3000, "high": 3010, "low": 2990, "close": 3005, "volume": 12.5, "startTime": 1000}}"#;
        c.ingest(msg);
        assert_eq!(c.current_price(), 3005.0);
    }

    #[test]
    fn mark_price_wins_over_bbo_and_kline() {
        let c = collector();
        c.ingest(r#"{"topic":"PERP_ETH_USDC@kline_5m","data":{"open":1,"high":1,"low":1,"close":3000,"volume":1,"startTime":0}}"#);
        c.ingest(r#"{"topic":"PERP_ETH_USDC@bbo","data":{"bid":3100,"bidSize":1,"ask":3102,"askSize":1,"timestamp":0}}"#);
        assert!((c.current_price() - 3101.0).abs() < 1e-9);
        c.ingest(r#"{"topic":"PERP_ETH_USDC@markprice","data":{"price":3200}}"#);
        assert_eq!(c.current_price(), 3200.0);
    }

    #[test]
    fn trade_fifo_caps_at_500() {
        let c = collector();
        for i in 0..600 {
            let msg = format!(
                r#"{{"topic":"PERP_ETH_USDC@trade","data":{{"price":100,"size":1,"side":"BUY","timestamp":{i}}}}}"#
            );
            c.ingest(&msg);
        }
        let snap = c.get_snapshot();
        assert_eq!(snap.recent_trades.len(), MAX_RECENT_TRADES);
        assert_eq!(snap.volume_delta.trade_count, MAX_RECENT_TRADES as u32);
        assert_eq!(snap.volume_delta.sell_volume, 0.0);
    }

    #[test]
    fn ticker_change_24h_zero_when_open_is_zero() {
        let c = collector();
        c.ingest(r#"{"topic":"PERP_ETH_USDC@ticker","data":{"open":0,"high":1,"low":1,"close":1,"volume":1}}"#);
        let snap = c.get_snapshot();
        assert_eq!(snap.ticker.change_24h, 0.0);
    }

    #[test]
    fn orderbook_excludes_orderbookupdate_topic() {
        let c = collector();
        // @orderbookupdate must NOT be routed to the orderbook handler.
        c.ingest(r#"{"topic":"PERP_ETH_USDC@orderbookupdate","data":{"bids":[[1,1]],"asks":[[2,1]],"ts":0}}"#);
        let snap = c.get_snapshot();
        assert!(snap.orderbook.bids.is_empty());
    }

    #[test]
    fn get_snapshot_is_independent_of_later_mutation() {
        let c = collector();
        c.ingest(r#"{"topic":"PERP_ETH_USDC@markprice","data":{"price":100}}"#);
        let snap = c.get_snapshot();
        c.ingest(r#"{"topic":"PERP_ETH_USDC@markprice","data":{"price":200}}"#);
        assert_eq!(snap.mark_price, 100.0);
        assert_eq!(c.current_price(), 200.0);
    }
}
