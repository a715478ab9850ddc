// =============================================================================
// Trading Configuration — hot-reloadable engine settings with atomic save
// =============================================================================
//
// Central configuration hub for the trading engine. Every tunable parameter
// lives here so the engine can be reconfigured without a code change.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry a serde default so that adding new fields never
// breaks loading an older config file.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_symbols() -> Vec<String> {
    vec![
        "PERP_ETH_USDC".to_string(),
        "PERP_BTC_USDC".to_string(),
        "PERP_SOL_USDC".to_string(),
    ]
}

fn default_analysis_interval_seconds() -> u64 {
    300
}

fn default_initial_budget() -> f64 {
    1000.0
}

fn default_true() -> bool {
    true
}

fn default_rest_base_url() -> String {
    "https://api-evm.orderly.org".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_oracle_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_oracle_model() -> String {
    "x-ai/grok-3-mini".to_string()
}

fn default_reasoning_effort() -> String {
    "high".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f64 {
    0.2
}

fn default_oracle_timeout() -> f64 {
    60.0
}

fn default_free_pct() -> f64 {
    0.70
}

fn default_guarded_pct() -> f64 {
    0.20
}

fn default_guarded_win_rate() -> f64 {
    0.45
}

fn default_guarded_min_trades() -> u32 {
    20
}

fn default_guarded_max_losing_streak() -> u32 {
    3
}

fn default_guarded_min_confidence() -> f64 {
    0.75
}

fn default_guarded_min_rr() -> f64 {
    2.0
}

fn default_guarded_max_leverage() -> f64 {
    3.0
}

fn default_floor_pct() -> f64 {
    0.05
}

fn default_floor_win_rate() -> f64 {
    0.60
}

fn default_floor_min_trades() -> u32 {
    30
}

fn default_lockout_pct() -> f64 {
    0.05
}

fn default_max_loss_per_trade_pct() -> f64 {
    0.02
}

fn default_max_total_exposure_pct() -> f64 {
    0.80
}

fn default_min_sl_atr_multiple() -> f64 {
    0.5
}

fn default_max_sl_atr_multiple() -> f64 {
    3.0
}

fn default_drawdown_reduce_pct() -> f64 {
    0.10
}

fn default_drawdown_halt_pct() -> f64 {
    0.20
}

fn default_leverage_thresholds() -> Vec<(f64, f64, f64)> {
    vec![
        (0.0, 0.3, 1.0),
        (0.3, 0.5, 2.0),
        (0.5, 0.7, 5.0),
        (0.7, 0.85, 7.0),
        (0.85, 1.01, 10.0),
    ]
}

// =============================================================================
// OracleConfig
// =============================================================================

/// Connection settings for the LLM oracle adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Read from the `OPENROUTER_API_KEY` environment variable, never
    /// persisted to disk alongside the rest of the config.
    #[serde(skip)]
    pub api_key: String,

    #[serde(default = "default_oracle_base_url")]
    pub base_url: String,

    #[serde(default = "default_oracle_model")]
    pub model: String,

    #[serde(default = "default_reasoning_effort")]
    pub reasoning_effort: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_oracle_timeout")]
    pub timeout_secs: f64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_oracle_base_url(),
            model: default_oracle_model(),
            reasoning_effort: default_reasoning_effort(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_oracle_timeout(),
        }
    }
}

// =============================================================================
// ReserveThresholds
// =============================================================================

/// Graduated reserve system thresholds (§4.4.4 budget zones).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveThresholds {
    #[serde(default = "default_free_pct")]
    pub free_pct: f64,

    #[serde(default = "default_guarded_pct")]
    pub guarded_pct: f64,
    #[serde(default = "default_guarded_win_rate")]
    pub guarded_win_rate: f64,
    #[serde(default = "default_guarded_min_trades")]
    pub guarded_min_trades: u32,
    #[serde(default = "default_guarded_max_losing_streak")]
    pub guarded_max_losing_streak: u32,
    #[serde(default = "default_guarded_min_confidence")]
    pub guarded_min_confidence: f64,
    #[serde(default = "default_guarded_min_rr")]
    pub guarded_min_rr: f64,
    #[serde(default = "default_guarded_max_leverage")]
    pub guarded_max_leverage: f64,

    #[serde(default = "default_floor_pct")]
    pub floor_pct: f64,
    #[serde(default = "default_floor_win_rate")]
    pub floor_win_rate: f64,
    #[serde(default = "default_floor_min_trades")]
    pub floor_min_trades: u32,

    #[serde(default = "default_lockout_pct")]
    pub lockout_pct: f64,
}

impl Default for ReserveThresholds {
    fn default() -> Self {
        Self {
            free_pct: default_free_pct(),
            guarded_pct: default_guarded_pct(),
            guarded_win_rate: default_guarded_win_rate(),
            guarded_min_trades: default_guarded_min_trades(),
            guarded_max_losing_streak: default_guarded_max_losing_streak(),
            guarded_min_confidence: default_guarded_min_confidence(),
            guarded_min_rr: default_guarded_min_rr(),
            guarded_max_leverage: default_guarded_max_leverage(),
            floor_pct: default_floor_pct(),
            floor_win_rate: default_floor_win_rate(),
            floor_min_trades: default_floor_min_trades(),
            lockout_pct: default_lockout_pct(),
        }
    }
}

// =============================================================================
// RiskConfig
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(default)]
    pub reserve: ReserveThresholds,

    #[serde(default = "default_max_loss_per_trade_pct")]
    pub max_loss_per_trade_pct: f64,
    #[serde(default = "default_max_total_exposure_pct")]
    pub max_total_exposure_pct: f64,
    #[serde(default = "default_min_sl_atr_multiple")]
    pub min_sl_atr_multiple: f64,
    #[serde(default = "default_max_sl_atr_multiple")]
    pub max_sl_atr_multiple: f64,
    #[serde(default = "default_drawdown_reduce_pct")]
    pub drawdown_reduce_pct: f64,
    #[serde(default = "default_drawdown_halt_pct")]
    pub drawdown_halt_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            reserve: ReserveThresholds::default(),
            max_loss_per_trade_pct: default_max_loss_per_trade_pct(),
            max_total_exposure_pct: default_max_total_exposure_pct(),
            min_sl_atr_multiple: default_min_sl_atr_multiple(),
            max_sl_atr_multiple: default_max_sl_atr_multiple(),
            drawdown_reduce_pct: default_drawdown_reduce_pct(),
            drawdown_halt_pct: default_drawdown_halt_pct(),
        }
    }
}

// =============================================================================
// LeverageScale
// =============================================================================

/// Confidence-to-leverage mapping: `(min_confidence, max_confidence, max_leverage)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeverageScale {
    #[serde(default = "default_leverage_thresholds")]
    pub thresholds: Vec<(f64, f64, f64)>,
}

impl Default for LeverageScale {
    fn default() -> Self {
        Self {
            thresholds: default_leverage_thresholds(),
        }
    }
}

impl LeverageScale {
    /// Highest leverage allowed at `confidence`, per the first matching
    /// `[min, max)` band. Falls back to 1.0x if confidence falls outside
    /// every configured band.
    pub fn max_leverage_for(&self, confidence: f64) -> f64 {
        for &(lo, hi, lev) in &self.thresholds {
            if confidence >= lo && confidence < hi {
                return lev;
            }
        }
        1.0
    }
}

// =============================================================================
// TradingConfig
// =============================================================================

/// Top-level configuration for the trading engine.
///
/// Every field has a serde default so older JSON files missing new fields
/// still deserialize correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    #[serde(default = "default_analysis_interval_seconds")]
    pub analysis_interval_seconds: u64,

    #[serde(default = "default_initial_budget")]
    pub initial_budget: f64,

    #[serde(default = "default_true")]
    pub paper_trading: bool,

    #[serde(default)]
    pub oracle: OracleConfig,

    #[serde(default)]
    pub risk: RiskConfig,

    #[serde(default)]
    pub leverage_scale: LeverageScale,

    #[serde(default = "default_rest_base_url")]
    pub rest_base_url: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_true")]
    pub store_reasoning: bool,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            analysis_interval_seconds: default_analysis_interval_seconds(),
            initial_budget: default_initial_budget(),
            paper_trading: true,
            oracle: OracleConfig::default(),
            risk: RiskConfig::default(),
            leverage_scale: LeverageScale::default(),
            rest_base_url: default_rest_base_url(),
            log_level: default_log_level(),
            store_reasoning: true,
        }
    }
}

impl TradingConfig {
    /// Load configuration from a JSON file at `path`. The oracle API key is
    /// always taken from `OPENROUTER_API_KEY`, never from the file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read trading config from {}", path.display()))?;

        let mut config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse trading config from {}", path.display()))?;

        config.oracle.api_key = std::env::var("OPENROUTER_API_KEY").unwrap_or_default();

        info!(
            path = %path.display(),
            symbols = ?config.symbols,
            paper_trading = config.paper_trading,
            "trading config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename). The API key is never written out.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialize trading config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "trading config saved (atomic)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = TradingConfig::default();
        assert_eq!(cfg.symbols.len(), 3);
        assert_eq!(cfg.symbols[0], "PERP_ETH_USDC");
        assert!(cfg.paper_trading);
        assert_eq!(cfg.analysis_interval_seconds, 300);
        assert!((cfg.initial_budget - 1000.0).abs() < f64::EPSILON);
        assert!((cfg.risk.reserve.free_pct - 0.70).abs() < f64::EPSILON);
        assert!((cfg.risk.max_loss_per_trade_pct - 0.02).abs() < f64::EPSILON);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: TradingConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.symbols.len(), 3);
        assert!(cfg.paper_trading);
        assert_eq!(cfg.oracle.model, "x-ai/grok-3-mini");
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "symbols": ["PERP_BTC_USDC"], "initial_budget": 5000.0 }"#;
        let cfg: TradingConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.symbols, vec!["PERP_BTC_USDC"]);
        assert!((cfg.initial_budget - 5000.0).abs() < f64::EPSILON);
        assert_eq!(cfg.analysis_interval_seconds, 300);
    }

    #[test]
    fn roundtrip_serialisation() {
        let cfg = TradingConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: TradingConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.symbols, cfg2.symbols);
        assert_eq!(cfg.analysis_interval_seconds, cfg2.analysis_interval_seconds);
    }

    #[test]
    fn leverage_scale_picks_matching_band() {
        let scale = LeverageScale::default();
        assert_eq!(scale.max_leverage_for(0.0), 1.0);
        assert_eq!(scale.max_leverage_for(0.6), 5.0);
        assert_eq!(scale.max_leverage_for(0.9), 10.0);
    }

    #[test]
    fn leverage_scale_falls_back_to_one_outside_bands() {
        let scale = LeverageScale { thresholds: vec![(0.5, 0.6, 4.0)] };
        assert_eq!(scale.max_leverage_for(0.9), 1.0);
    }

    #[test]
    fn api_key_is_never_serialised() {
        let mut cfg = TradingConfig::default();
        cfg.oracle.api_key = "secret".to_string();
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(!json.contains("secret"));
    }
}
