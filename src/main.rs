// =============================================================================
// Meridian Swing Engine — Main Entry Point
// =============================================================================
//
// Starts a Collector + ingest task per configured symbol, backfills klines
// over REST, then drives the analysis cycle on a fixed cadence: snapshot all
// symbols, build the indicator report, call the LLM oracle, validate through
// the risk manager, and apply approved decisions to the paper portfolio. A
// separate, tighter loop sweeps every open position for stop-loss/take-profit
// hits using live collector prices.
// =============================================================================

mod config;
mod indicators;
mod ingest;
mod market_data;
mod models;
mod oracle;
mod risk_manager;
mod strategy;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::TradingConfig;
use crate::market_data::Collector;
use crate::oracle::{LlmOracle, OpenRouterOracle};
use crate::strategy::StrategyEngine;

const CONFIG_PATH: &str = "trading_config.json";
const SL_TP_SWEEP_SECS: u64 = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    let config = TradingConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load {CONFIG_PATH}, using defaults");
        let mut cfg = TradingConfig::default();
        cfg.oracle.api_key = std::env::var("OPENROUTER_API_KEY").unwrap_or_default();
        cfg
    });

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    info!("================================================================");
    info!("  Meridian Swing Engine — starting up (paper_trading={})", config.paper_trading);
    info!("================================================================");
    info!(symbols = ?config.symbols, interval_secs = config.analysis_interval_seconds, "configuration loaded");

    if config.oracle.api_key.is_empty() {
        warn!("OPENROUTER_API_KEY is not set — oracle calls will fail");
    }

    // ── Collectors + ingest tasks ────────────────────────────────────────
    let mut collectors: HashMap<String, Arc<Collector>> = HashMap::new();
    for symbol in &config.symbols {
        let collector = Arc::new(Collector::new(symbol.clone(), config.rest_base_url.clone(), 200));
        collector.backfill_klines().await;
        collectors.insert(symbol.clone(), collector);
    }

    let ws_base_url =
        std::env::var("ORDERLY_WS_BASE_URL").unwrap_or_else(|_| "wss://ws-evm.orderly.org/ws/stream".to_string());

    for collector in collectors.values() {
        let collector = collector.clone();
        let ws_base_url = ws_base_url.clone();
        tokio::spawn(async move {
            ingest::run_ingest_loop(ws_base_url, collector).await;
        });
    }
    info!(count = collectors.len(), "market data collectors running");

    // ── Strategy engine + oracle ─────────────────────────────────────────
    let oracle: Arc<dyn LlmOracle> = Arc::new(OpenRouterOracle::new(config.oracle.clone()));
    let engine = Arc::new(Mutex::new(StrategyEngine::new(config.clone())));

    // ── Stop-loss / take-profit sweep ────────────────────────────────────
    {
        let engine = engine.clone();
        let collectors = collectors.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(SL_TP_SWEEP_SECS));
            loop {
                interval.tick().await;
                let prices: HashMap<String, f64> = collectors
                    .iter()
                    .map(|(symbol, c)| (symbol.clone(), c.current_price()))
                    .filter(|(_, price)| *price > 0.0)
                    .collect();
                let messages = engine.lock().check_stop_loss_take_profit(&prices);
                for msg in messages {
                    info!("{msg}");
                }
            }
        });
    }

    // ── Analysis cycle ───────────────────────────────────────────────────
    info!("all subsystems running — press Ctrl+C to stop");
    let cycle_interval = std::time::Duration::from_secs(config.analysis_interval_seconds);
    let mut interval = tokio::time::interval(cycle_interval);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_analysis_cycle(&engine, &collectors, oracle.as_ref()).await;
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("shutdown signal received — stopping gracefully");
                break;
            }
        }
    }

    let portfolio = engine.lock().portfolio().clone();
    info!(
        budget = portfolio.current_budget,
        trades = portfolio.total_trades(),
        win_rate = portfolio.win_rate(),
        "meridian swing engine shut down complete"
    );
    Ok(())
}

async fn run_analysis_cycle(
    engine: &Arc<Mutex<StrategyEngine>>,
    collectors: &HashMap<String, Arc<Collector>>,
    oracle: &dyn LlmOracle,
) {
    let mut snapshots = HashMap::new();
    let mut prices = HashMap::new();
    for (symbol, collector) in collectors {
        snapshots.insert(symbol.clone(), collector.get_snapshot());
        prices.insert(symbol.clone(), collector.current_price());
    }

    let (system_prompt, user_prompt) = engine.lock().prepare_analysis(&snapshots, &prices);

    let response_text = match oracle.complete(&system_prompt, &user_prompt).await {
        Ok(resp) => resp.content,
        Err(e) => {
            error!(error = %e, "oracle call failed — treating cycle as all-HOLD");
            String::new()
        }
    };

    let validated = engine.lock().process_response(&response_text);
    info!(decisions = validated.len(), "analysis cycle complete");
}
