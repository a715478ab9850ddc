// =============================================================================
// Strategy Orchestrator — the cycle driver that ties snapshots, indicators,
// the oracle, and the risk manager together
// =============================================================================
//
// One logical cycle is split into two calls so the caller can own the
// (uncancellable, slow) oracle round-trip between them:
//
//   prepare_analysis(snapshots, prices) -> (system_prompt, user_prompt)
//   ... caller invokes the LLM oracle ...
//   process_response(raw_text) -> Vec<ValidatedDecision>
//
// check_stop_loss_take_profit runs independently of the cycle, on a tighter
// cadence driven by live collector prices.
// =============================================================================

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::config::TradingConfig;
use crate::indicators::{compute_indicators, IndicatorReport};
use crate::models::{
    Action, AnalysisCycle, MultiSymbolDecision, Position, TradeDecision, ValidatedDecision,
};
use crate::models::market::MarketSnapshot;
use crate::models::position::PortfolioState;
use crate::risk_manager::RiskManager;

pub const SYSTEM_PROMPT: &str = include_str!("strategy_system_prompt.md");

fn now_secs() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
}

/// Orchestrates one analysis cycle: snapshot -> indicators -> oracle prompt
/// -> parse -> validate -> apply. Owns the portfolio and the risk manager
/// exclusively; never touched from the collectors' ingest threads.
pub struct StrategyEngine {
    config: TradingConfig,
    portfolio: PortfolioState,
    risk_manager: RiskManager,
    cycles: Vec<AnalysisCycle>,

    // Intermediate state bridging prepare_analysis -> process_response.
    pending_reports: HashMap<String, IndicatorReport>,
    pending_prices: HashMap<String, f64>,
}

impl StrategyEngine {
    pub fn new(config: TradingConfig) -> Self {
        let portfolio = PortfolioState::new(config.initial_budget);
        let risk_manager = RiskManager::new(config.risk.clone(), config.leverage_scale.clone());
        Self {
            config,
            portfolio,
            risk_manager,
            cycles: Vec::new(),
            pending_reports: HashMap::new(),
            pending_prices: HashMap::new(),
        }
    }

    pub fn portfolio(&self) -> &PortfolioState {
        &self.portfolio
    }

    pub fn cycles(&self) -> &[AnalysisCycle] {
        &self.cycles
    }

    /// Phase 1: compute indicators for every snapshot and build the prompt
    /// pair the oracle should be called with.
    pub fn prepare_analysis(
        &mut self,
        snapshots: &HashMap<String, MarketSnapshot>,
        prices: &HashMap<String, f64>,
    ) -> (String, String) {
        let mut reports = HashMap::new();
        for (symbol, snapshot) in snapshots {
            reports.insert(symbol.clone(), compute_indicators(snapshot));
        }

        let user_prompt = self.build_user_prompt(&reports, prices);
        debug!(chars = user_prompt.len(), "built user prompt");

        self.pending_reports = reports;
        self.pending_prices = prices.clone();

        (SYSTEM_PROMPT.to_string(), user_prompt)
    }

    /// Phase 2: parse the oracle's raw text, validate every decision through
    /// the risk manager, apply the approved ones, and record the cycle.
    pub fn process_response(&mut self, response_text: &str) -> Vec<ValidatedDecision> {
        let reports = std::mem::take(&mut self.pending_reports);
        let prices = std::mem::take(&mut self.pending_prices);

        let mut cycle = AnalysisCycle {
            timestamp: now_secs(),
            portfolio_state_before: Some(self.portfolio.to_summary(|s| prices.get(s).copied())),
            ..Default::default()
        };

        let multi = self.parse_response(response_text);
        cycle.llm_output = Some(multi.clone());

        let mut validated = Vec::with_capacity(multi.decisions.len());
        for decision in &multi.decisions {
            let price = prices.get(&decision.symbol).copied().unwrap_or(0.0);
            let report = reports.get(&decision.symbol);
            let v = match (report, price > 0.0) {
                (Some(report), true) => {
                    self.risk_manager.validate_decision(decision, &self.portfolio, report, price)
                }
                _ => ValidatedDecision::rejected(decision.clone(), "No price/indicator data"),
            };
            info!(
                symbol = %decision.symbol,
                action = decision.action.as_str(),
                approved = v.approved,
                leverage = v.final_leverage(),
                quantity = v.final_quantity(),
                "decision validated"
            );
            validated.push(v);
        }

        self.execute_decisions(&validated, &prices);

        cycle.validated_decisions = validated.clone();
        cycle.portfolio_state_after = Some(self.portfolio.to_summary(|s| prices.get(s).copied()));
        self.cycles.push(cycle.clone());
        if self.config.store_reasoning {
            self.portfolio.analysis_cycles.push(cycle);
        }

        validated
    }

    /// Sweep every open position against a fresh price map, closing any that
    /// hit their stop-loss or take-profit. Iterates in insertion order; if
    /// both SL and TP would fire in the same tick, SL wins.
    pub fn check_stop_loss_take_profit(&mut self, prices: &HashMap<String, f64>) -> Vec<String> {
        let mut to_close: Vec<(Position, f64, &'static str)> = Vec::new();

        for pos in &self.portfolio.open_positions {
            let Some(&price) = prices.get(&pos.symbol) else { continue };
            if pos.should_stop_loss(price) {
                to_close.push((pos.clone(), price, "SL"));
            } else if pos.should_take_profit(price) {
                to_close.push((pos.clone(), price, "TP"));
            }
        }

        let mut messages = Vec::with_capacity(to_close.len());
        for (pos, price, reason) in to_close {
            let trade = self.portfolio.close_position(pos.clone(), price, reason, now_secs());
            let msg = format!(
                "Closed {} {} @ {:.2} ({reason}) PnL: ${:.2}",
                pos.symbol,
                pos.side.as_str(),
                price,
                trade.pnl
            );
            info!("{msg}");
            messages.push(msg);
        }
        messages
    }

    fn execute_decisions(&mut self, validated: &[ValidatedDecision], prices: &HashMap<String, f64>) {
        for v in validated {
            if !v.approved {
                continue;
            }
            let decision = &v.original;

            match decision.action {
                Action::Close => {
                    let price = prices.get(&decision.symbol).copied().unwrap_or(0.0);
                    let to_close: Vec<Position> = self
                        .portfolio
                        .get_positions_for_symbol(&decision.symbol)
                        .into_iter()
                        .cloned()
                        .collect();
                    for pos in to_close {
                        let trade = self.portfolio.close_position(pos.clone(), price, "LLM_CLOSE", now_secs());
                        info!(
                            symbol = %pos.symbol,
                            side = pos.side.as_str(),
                            price,
                            pnl = trade.pnl,
                            "closed position on LLM decision"
                        );
                    }
                }
                Action::Long | Action::Short => {
                    let price = prices.get(&decision.symbol).copied().unwrap_or(0.0);
                    if price <= 0.0 {
                        continue;
                    }
                    let notional = v.final_quantity() * price;
                    let margin = if v.final_leverage() > 0.0 { notional / v.final_leverage() } else { notional };

                    let position = Position {
                        symbol: decision.symbol.clone(),
                        side: decision.action,
                        entry_price: price,
                        quantity: v.final_quantity(),
                        leverage: v.final_leverage(),
                        stop_loss: decision.stop_loss,
                        take_profit: decision.take_profit,
                        margin,
                        opened_at: now_secs(),
                        confidence: decision.confidence,
                        reasoning: decision.reasoning.clone(),
                    };
                    info!(
                        symbol = %decision.symbol,
                        action = decision.action.as_str(),
                        price,
                        quantity = v.final_quantity(),
                        leverage = v.final_leverage(),
                        margin,
                        "opened position"
                    );
                    self.portfolio.open_position(position);
                }
                Action::Hold => {}
            }
        }
    }

    /// Lenient parse: strip code fences, fall back to the outermost `{...}`
    /// substring, and synthesize an all-HOLD response on total failure.
    /// Every configured symbol ends up with exactly one decision.
    fn parse_response(&self, response_text: &str) -> MultiSymbolDecision {
        let stripped = strip_code_fences(response_text);

        let parsed: Option<serde_json::Value> = serde_json::from_str(&stripped).ok().or_else(|| {
            let start = stripped.find('{')?;
            let end = stripped.rfind('}')?;
            if end > start {
                serde_json::from_str(&stripped[start..=end]).ok()
            } else {
                None
            }
        });

        let mut decisions = Vec::new();
        match parsed {
            Some(value) => {
                if let Some(arr) = value.get("decisions").and_then(|d| d.as_array()) {
                    for raw in arr {
                        match serde_json::from_value::<TradeDecision>(raw.clone()) {
                            Ok(d) => decisions.push(d),
                            Err(e) => warn!(error = %e, "skipping malformed decision"),
                        }
                    }
                }
            }
            None => {
                warn!("failed to parse oracle response as JSON — defaulting to HOLD for all symbols");
            }
        }

        let seen: std::collections::HashSet<&str> =
            decisions.iter().map(|d| d.symbol.as_str()).collect();
        for symbol in &self.config.symbols {
            if !seen.contains(symbol.as_str()) {
                decisions.push(TradeDecision::hold(symbol.clone(), "No decision provided"));
            }
        }
        // Unknown symbols (not in config) are dropped, per the oracle contract.
        decisions.retain(|d| self.config.symbols.iter().any(|s| s == &d.symbol));

        MultiSymbolDecision {
            decisions,
            raw_response: response_text.to_string(),
            reasoning_content: String::new(),
            model: String::new(),
            timestamp: now_secs(),
        }
    }

    fn build_user_prompt(
        &self,
        reports: &HashMap<String, IndicatorReport>,
        prices: &HashMap<String, f64>,
    ) -> String {
        let mut parts = Vec::new();
        parts.push("## Current Market Data".to_string());

        for (symbol, report) in reports {
            parts.push(format!("### {symbol}"));
            parts.push(format!("Mark Price: {:.2}", report.mark_price));
            parts.push(format!("Index Price: {:.2}", report.index_price));
            parts.push(format!("24h Change: {:.2}%", report.ticker_change_24h));
            parts.push(format!("24h Volume: {:.0}", report.ticker_volume_24h));
            parts.push(String::new());

            for (tf_name, ti) in &report.timeframes {
                parts.push(format!("**{tf_name} Timeframe:**"));
                parts.push(format!("  Last Close: {:.2}", ti.last_close));
                parts.push(format!("  RSI(14): {:.1}", ti.rsi_14));
                parts.push(format!(
                    "  MACD: line={:.4} signal={:.4} hist={:.4}",
                    ti.macd_line, ti.macd_signal, ti.macd_histogram
                ));
                parts.push(format!(
                    "  Bollinger: upper={:.2} mid={:.2} lower={:.2} %B={:.3}",
                    ti.bb_upper, ti.bb_middle, ti.bb_lower, ti.bb_pct_b
                ));
                parts.push(format!(
                    "  EMA: 9={:.2} 21={:.2} 50={:.2} alignment={}",
                    ti.ema_9, ti.ema_21, ti.ema_50, ti.ema_alignment
                ));
                parts.push(format!("  VWAP: {:.2} (price {})", ti.vwap_value, ti.price_vs_vwap));
                parts.push(format!("  ATR(14): {:.4}", ti.atr_14));
                parts.push(format!(
                    "  Recent: {:+.2}% last 3 candles, {} red / {} green streak, trend={}",
                    ti.recent_change_pct, ti.consecutive_red, ti.consecutive_green, ti.candle_trend
                ));
                parts.push(String::new());
            }

            let ob = &report.orderbook;
            parts.push(format!(
                "**Orderbook:** imbalance={:.3} ({}) spread={:.1}bps bid_depth={:.2} ask_depth={:.2}",
                ob.imbalance, ob.interpretation, ob.spread_bps, ob.bid_depth, ob.ask_depth
            ));

            let dv = &report.derivatives;
            parts.push(format!(
                "**Derivatives:** funding={:.6} ({}) OI={:.0} L/S={:.2} ({})",
                dv.funding_rate, dv.funding_interpretation, dv.open_interest, dv.ls_ratio, dv.sentiment
            ));

            parts.push(format!(
                "**Volume Delta:** {:.2} (ratio={:.3})",
                report.volume_delta, report.volume_delta_ratio
            ));
            parts.push(String::new());
        }

        parts.push("## Portfolio State".to_string());
        parts.push(format!(
            "Budget: ${:.2} (initial: ${:.2})",
            self.portfolio.current_budget, self.portfolio.initial_budget
        ));
        parts.push(format!("Available for trades: ${:.2}", self.portfolio.available_budget()));
        parts.push(format!("Margin in use: ${:.2}", self.portfolio.total_margin_in_use()));
        let unrealized = self.portfolio.total_unrealized_pnl(|symbol| prices.get(symbol).copied());
        parts.push(format!("Unrealized PnL: ${unrealized:.2}"));
        parts.push(format!(
            "Win rate: {:.1}% ({} trades)",
            self.portfolio.win_rate() * 100.0,
            self.portfolio.total_trades()
        ));
        parts.push(format!("Current losing streak: {}", self.portfolio.losing_streak()));
        parts.push(format!("Drawdown from peak: {:.1}%", self.portfolio.drawdown_from_peak() * 100.0));
        parts.push(String::new());

        let drawdown = self.portfolio.drawdown_from_peak();
        if drawdown >= self.config.risk.drawdown_halt_pct {
            parts.push("**WARNING: TRADING HALTED — drawdown exceeds halt threshold. Output HOLD for all symbols.**".to_string());
        } else if drawdown >= self.config.risk.drawdown_reduce_pct {
            parts.push(format!("**CAUTION: Position sizes reduced — drawdown at {:.1}%.**", drawdown * 100.0));
        }

        if !self.portfolio.open_positions.is_empty() {
            parts.push("\n## Open Positions".to_string());
            parts.push(
                "**Default action for open positions is HOLD.** Only CLOSE if the entry thesis is broken.\n"
                    .to_string(),
            );
            for pos in &self.portfolio.open_positions {
                let price = prices.get(&pos.symbol).copied().unwrap_or(pos.entry_price);
                let upnl = pos.unrealized_pnl(price);

                let sl_dist_pct = if price > 0.0 { (price - pos.stop_loss).abs() / price * 100.0 } else { 0.0 };
                let tp_dist_pct = if price > 0.0 { (pos.take_profit - price).abs() / price * 100.0 } else { 0.0 };

                let total_range = (pos.take_profit - pos.entry_price).abs();
                let progress = if total_range > 0.0 {
                    match pos.side {
                        Action::Long => (price - pos.entry_price) / total_range * 100.0,
                        _ => (pos.entry_price - price) / total_range * 100.0,
                    }
                } else {
                    0.0
                };

                let held_min = ((now_secs() - pos.opened_at) / 60.0) as i64;

                parts.push(format!(
                    "- {} {} @ {:.2} (qty={:.4}, lev={:.0}x, uPnL=${:.2})\n  SL={:.2} ({:.1}% away) | TP={:.2} ({:.1}% away) | Progress to TP: {:.0}% | Held: {}min",
                    pos.symbol, pos.side.as_str(), pos.entry_price, pos.quantity, pos.leverage, upnl,
                    pos.stop_loss, sl_dist_pct, pos.take_profit, tp_dist_pct, progress, held_min
                ));
            }
        }

        if !self.portfolio.closed_trades.is_empty() {
            parts.push("\n## Recent Closed Trades".to_string());
            for t in self.portfolio.closed_trades.iter().rev().take(5) {
                parts.push(format!(
                    "- {} {} PnL=${:.2} ({})",
                    t.symbol,
                    t.side.as_str(),
                    t.pnl,
                    t.close_reason
                ));
            }
        }

        parts.push("\nAnalyze all symbols. Output your decisions as JSON.".to_string());
        parts.join("\n")
    }
}

fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    trimmed
        .lines()
        .filter(|l| !l.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> StrategyEngine {
        let mut cfg = TradingConfig::default();
        cfg.symbols = vec!["PERP_ETH_USDC".to_string(), "PERP_BTC_USDC".to_string()];
        StrategyEngine::new(cfg)
    }

    #[test]
    fn parse_response_fills_missing_symbols_with_hold() {
        let e = engine();
        let multi = e.parse_response(r#"{"decisions": [{"symbol": "PERP_ETH_USDC", "action": "LONG"}]}"#);
        assert_eq!(multi.decisions.len(), 2);
        assert!(multi.decisions.iter().any(|d| d.symbol == "PERP_BTC_USDC" && d.action == Action::Hold));
    }

    #[test]
    fn parse_response_strips_code_fences() {
        let e = engine();
        let raw = "```json\n{\"decisions\": []}\n```";
        let multi = e.parse_response(raw);
        assert_eq!(multi.decisions.len(), 2);
        assert!(multi.decisions.iter().all(|d| d.action == Action::Hold));
    }

    #[test]
    fn parse_response_extracts_brace_substring_on_prefix_noise() {
        let e = engine();
        let raw = "here is my answer: {\"decisions\": [{\"symbol\": \"PERP_ETH_USDC\", \"action\": \"HOLD\"}]} thanks";
        let multi = e.parse_response(raw);
        assert_eq!(multi.decisions.len(), 2);
    }

    #[test]
    fn parse_response_total_failure_synthesizes_all_holds() {
        let e = engine();
        let multi = e.parse_response("not json at all");
        assert_eq!(multi.decisions.len(), 2);
        assert!(multi.decisions.iter().all(|d| d.action == Action::Hold));
    }

    #[test]
    fn parse_response_drops_unknown_symbols() {
        let e = engine();
        let multi = e.parse_response(r#"{"decisions": [{"symbol": "PERP_DOGE_USDC", "action": "LONG"}]}"#);
        assert!(!multi.decisions.iter().any(|d| d.symbol == "PERP_DOGE_USDC"));
        assert_eq!(multi.decisions.len(), 2);
    }

    // S7: profitable LONG hits TP and the portfolio equity reflects the win.
    #[test]
    fn s7_profit_path_closes_on_take_profit() {
        let mut e = engine();
        e.portfolio.open_position(Position {
            symbol: "PERP_ETH_USDC".to_string(),
            side: Action::Long,
            entry_price: 3000.0,
            quantity: 0.1,
            leverage: 5.0,
            stop_loss: 2900.0,
            take_profit: 3050.0,
            margin: 60.0,
            opened_at: 0.0,
            confidence: 0.8,
            reasoning: String::new(),
        });

        let mut prices = HashMap::new();
        prices.insert("PERP_ETH_USDC".to_string(), 3060.0);
        let messages = e.check_stop_loss_take_profit(&prices);

        assert_eq!(messages.len(), 1);
        assert_eq!(e.portfolio.closed_trades.len(), 1);
        assert!(e.portfolio.closed_trades[0].is_win());
        assert!((e.portfolio.current_budget - 1006.0).abs() < 1e-9);
    }

    #[test]
    fn sl_wins_when_both_sl_and_tp_would_fire() {
        let mut e = engine();
        // A degenerate position where SL and TP are the same price: both
        // conditions are true at that price, and SL must win.
        e.portfolio.open_position(Position {
            symbol: "PERP_ETH_USDC".to_string(),
            side: Action::Long,
            entry_price: 3000.0,
            quantity: 0.1,
            leverage: 5.0,
            stop_loss: 2950.0,
            take_profit: 2950.0,
            margin: 60.0,
            opened_at: 0.0,
            confidence: 0.8,
            reasoning: String::new(),
        });
        let mut prices = HashMap::new();
        prices.insert("PERP_ETH_USDC".to_string(), 2950.0);
        e.check_stop_loss_take_profit(&prices);
        assert_eq!(e.portfolio.closed_trades[0].close_reason, "SL");
    }

    #[test]
    fn llm_close_closes_every_position_for_symbol() {
        let mut e = engine();
        e.portfolio.open_position(Position {
            symbol: "PERP_ETH_USDC".to_string(),
            side: Action::Long,
            entry_price: 3000.0,
            quantity: 0.1,
            leverage: 5.0,
            stop_loss: 2900.0,
            take_profit: 3200.0,
            margin: 60.0,
            opened_at: 0.0,
            confidence: 0.8,
            reasoning: String::new(),
        });
        let v = ValidatedDecision {
            original: TradeDecision {
                symbol: "PERP_ETH_USDC".to_string(),
                action: Action::Close,
                leverage: 1.0,
                quantity: 0.0,
                stop_loss: 0.0,
                take_profit: 0.0,
                confidence: 0.0,
                reasoning: "thesis broken".to_string(),
            },
            approved: true,
            adjusted_leverage: 1.0,
            adjusted_quantity: 0.0,
            rejection_reasons: Vec::new(),
            margin_required: 0.0,
            max_loss: 0.0,
        };
        let mut prices = HashMap::new();
        prices.insert("PERP_ETH_USDC".to_string(), 3100.0);
        e.execute_decisions(&[v], &prices);
        assert!(e.portfolio.open_positions.is_empty());
        assert_eq!(e.portfolio.closed_trades[0].close_reason, "LLM_CLOSE");
    }

    #[test]
    fn process_response_always_records_cycle_but_gates_portfolio_archive_on_store_reasoning() {
        let mut cfg = TradingConfig::default();
        cfg.symbols = vec!["PERP_ETH_USDC".to_string(), "PERP_BTC_USDC".to_string()];
        cfg.store_reasoning = false;
        let mut e = StrategyEngine::new(cfg);

        let mut prices = HashMap::new();
        prices.insert("PERP_ETH_USDC".to_string(), 3000.0);
        prices.insert("PERP_BTC_USDC".to_string(), 60000.0);
        e.prepare_analysis(&HashMap::new(), &prices);
        e.process_response("not json at all");

        assert_eq!(e.cycles().len(), 1);
        assert!(e.portfolio.analysis_cycles.is_empty());
        assert!(e.cycles()[0].portfolio_state_before.is_some());
        assert!(e.cycles()[0].portfolio_state_after.is_some());
    }

    #[test]
    fn process_response_archives_onto_portfolio_when_store_reasoning_enabled() {
        let mut cfg = TradingConfig::default();
        cfg.symbols = vec!["PERP_ETH_USDC".to_string(), "PERP_BTC_USDC".to_string()];
        assert!(cfg.store_reasoning);
        let mut e = StrategyEngine::new(cfg);

        e.prepare_analysis(&HashMap::new(), &HashMap::new());
        e.process_response("not json at all");

        assert_eq!(e.cycles().len(), 1);
        assert_eq!(e.portfolio.analysis_cycles.len(), 1);
    }
}
