//! Public WebSocket ingest for one symbol's [`Collector`] (C2 transport).
//!
//! Connects to the Orderly Network public stream, subscribes to every topic
//! the collector understands, and feeds raw frames straight into
//! [`Collector::ingest`]. Reconnects with a fixed backoff on any read error
//! or stream close — the caller is expected to loop this forever in its own
//! spawned task, mirroring how the teacher's per-stream tasks reconnect.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

use crate::market_data::{spot_symbol, Collector};

const RECONNECT_BACKOFF_SECS: u64 = 5;

fn topics_for(symbol: &str) -> Vec<String> {
    vec![
        format!("{symbol}@kline_5m"),
        format!("{symbol}@kline_15m"),
        format!("{symbol}@kline_1h"),
        format!("{symbol}@orderbook"),
        format!("{symbol}@bbo"),
        format!("{symbol}@trade"),
        format!("{symbol}@ticker"),
        format!("{symbol}@estfundingrate"),
        format!("{symbol}@openinterest"),
        format!("{symbol}@markprice"),
        format!("{}@indexprice", spot_symbol(symbol)),
    ]
}

/// Run the ingest stream for `collector` until an error occurs, then return.
/// The caller is expected to call this in a retry loop.
async fn run_once(ws_base_url: &str, collector: &Collector) -> Result<()> {
    let symbol = collector.symbol().to_string();
    let ws_id = format!("trader-{symbol}");
    let url = format!("{ws_base_url}/{ws_id}");

    info!(url = %url, symbol = %symbol, "connecting to market data WebSocket");
    let (ws_stream, _response) = connect_async(&url)
        .await
        .context("failed to connect to market data WebSocket")?;
    info!(symbol = %symbol, "market data WebSocket connected");

    let (mut write, mut read) = ws_stream.split();

    for topic in topics_for(&symbol) {
        let sub = json!({ "event": "subscribe", "topic": topic });
        write
            .send(Message::Text(sub.to_string()))
            .await
            .context("failed to send subscribe message")?;
    }

    collector.start();

    loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => collector.ingest(&text),
            Some(Ok(Message::Ping(payload))) => {
                let _ = write.send(Message::Pong(payload)).await;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                error!(symbol = %symbol, error = %e, "market data WebSocket read error");
                collector.stop();
                return Err(e.into());
            }
            None => {
                warn!(symbol = %symbol, "market data WebSocket closed");
                collector.stop();
                return Ok(());
            }
        }
    }
}

/// Forever-reconnecting ingest task. Intended to be `tokio::spawn`ed once
/// per symbol for the lifetime of the process.
pub async fn run_ingest_loop(ws_base_url: String, collector: Arc<Collector>) {
    loop {
        if let Err(e) = run_once(&ws_base_url, &collector).await {
            error!(symbol = %collector.symbol(), error = %e, "market data stream error — reconnecting");
        }
        tokio::time::sleep(Duration::from_secs(RECONNECT_BACKOFF_SECS)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_cover_every_collector_handler() {
        let topics = topics_for("PERP_ETH_USDC");
        assert!(topics.iter().any(|t| t == "PERP_ETH_USDC@kline_5m"));
        assert!(topics.iter().any(|t| t == "PERP_ETH_USDC@orderbook"));
        assert!(topics.iter().any(|t| t == "SPOT_ETH_USDC@indexprice"));
        assert_eq!(topics.len(), 11);
    }
}
