// =============================================================================
// Risk Manager — graduated reserve system + ten-layer decision validator
// =============================================================================
//
// The risk manager has veto power over every decision the orchestrator wants
// to apply: nothing reaches the portfolio without passing every applicable
// layer below, in order. The first failing layer returns a rejection with
// the reasons accumulated up to that point; layers that only adjust sizing
// (drawdown size-halving, budget-zone restriction) continue to the next
// layer rather than stopping.
// =============================================================================

use tracing::debug;

use crate::config::{LeverageScale, ReserveThresholds, RiskConfig};
use crate::indicators::IndicatorReport;
use crate::models::{Action, PortfolioState, TradeDecision, ValidatedDecision};

/// Computed budget partition for one validation call.
#[derive(Debug, Clone, Copy, Default)]
pub struct BudgetZones {
    pub total: f64,
    pub free: f64,
    pub guarded: f64,
    pub floor: f64,
    pub lockout: f64,
    /// How much is actually usable right now, after subtracting margin in use.
    pub accessible: f64,
}

/// Graduated reserve + multi-layer decision validator.
pub struct RiskManager {
    risk: RiskConfig,
    leverage_scale: LeverageScale,
}

impl RiskManager {
    pub fn new(risk: RiskConfig, leverage_scale: LeverageScale) -> Self {
        Self { risk, leverage_scale }
    }

    fn reserve(&self) -> &ReserveThresholds {
        &self.risk.reserve
    }

    /// Partition `portfolio.current_budget` into free/guarded/floor/lockout
    /// and determine how much of it is accessible right now.
    pub fn compute_budget_zones(&self, portfolio: &PortfolioState) -> BudgetZones {
        let total = portfolio.current_budget;
        let r = self.reserve();

        let mut zones = BudgetZones {
            total,
            free: total * r.free_pct,
            guarded: total * r.guarded_pct,
            floor: total * r.floor_pct,
            lockout: total * r.lockout_pct,
            accessible: 0.0,
        };

        zones.accessible = zones.free;
        if self.guarded_unlocked(portfolio) {
            zones.accessible += zones.guarded;
        }
        if self.floor_unlocked(portfolio) {
            zones.accessible += zones.floor;
        }
        zones.accessible = (zones.accessible - portfolio.total_margin_in_use()).max(0.0);
        zones
    }

    fn guarded_unlocked(&self, portfolio: &PortfolioState) -> bool {
        let r = self.reserve();
        portfolio.total_trades() >= r.guarded_min_trades as usize
            && portfolio.win_rate_last_n(r.guarded_min_trades as usize) >= r.guarded_win_rate
            && portfolio.losing_streak() < r.guarded_max_losing_streak as usize
    }

    fn floor_unlocked(&self, portfolio: &PortfolioState) -> bool {
        let r = self.reserve();
        portfolio.total_trades() >= r.floor_min_trades as usize
            && portfolio.win_rate_last_n(r.floor_min_trades as usize) >= r.floor_win_rate
    }

    /// Best available ATR for stop-loss validation: prefer 15m, then 5m, 1h.
    fn get_atr(report: &IndicatorReport) -> f64 {
        for tf in ["15m", "5m", "1h"] {
            if let Some(ti) = report.timeframes.get(tf) {
                if ti.atr_14 > 0.0 {
                    return ti.atr_14;
                }
            }
        }
        0.0
    }

    /// Run every layer against a single decision and return the verdict.
    pub fn validate_decision(
        &self,
        decision: &TradeDecision,
        portfolio: &PortfolioState,
        report: &IndicatorReport,
        current_price: f64,
    ) -> ValidatedDecision {
        let mut reasons: Vec<String> = Vec::new();

        // Layer 1: HOLD / CLOSE pass-through — no risk checks apply.
        if matches!(decision.action, Action::Hold | Action::Close) {
            return ValidatedDecision {
                original: decision.clone(),
                approved: true,
                adjusted_leverage: decision.leverage,
                adjusted_quantity: decision.quantity,
                rejection_reasons: Vec::new(),
                margin_required: 0.0,
                max_loss: 0.0,
            };
        }

        // Layer 2: drawdown circuit breaker.
        let drawdown = portfolio.drawdown_from_peak();
        if drawdown >= self.risk.drawdown_halt_pct {
            let reason = format!(
                "HALTED: drawdown {:.1}% >= {:.0}% halt threshold",
                drawdown * 100.0,
                self.risk.drawdown_halt_pct * 100.0
            );
            debug!(symbol = %decision.symbol, reason = %reason, "decision rejected");
            return ValidatedDecision::rejected(decision.clone(), reason);
        }
        let mut size_multiplier = 1.0;
        if drawdown >= self.risk.drawdown_reduce_pct {
            size_multiplier = 0.5;
            reasons.push(format!(
                "Size halved: drawdown {:.1}% >= reduce threshold",
                drawdown * 100.0
            ));
        }

        // Layer 3: confidence floor.
        let confidence = decision.confidence.clamp(0.0, 1.0);
        if confidence < 0.10 {
            let reason = format!("Confidence too low: {confidence:.2}");
            debug!(symbol = %decision.symbol, reason = %reason, "decision rejected");
            return ValidatedDecision::rejected(decision.clone(), reason);
        }

        // Layer 4: leverage cap by confidence.
        let max_lev = self.leverage_scale.max_leverage_for(confidence);
        let mut adjusted_leverage = decision.leverage.min(max_lev);

        // Layer 5: budget-zone access.
        let mut zones = self.compute_budget_zones(portfolio);
        let dipping_into_guarded = portfolio.available_budget() - zones.free > 0.0;
        if dipping_into_guarded && confidence < self.reserve().guarded_min_confidence {
            zones.accessible = zones
                .accessible
                .min((zones.free - portfolio.total_margin_in_use()).max(0.0));
            adjusted_leverage = adjusted_leverage.min(self.reserve().guarded_max_leverage);
        }
        if zones.accessible <= 0.0 {
            reasons.push("No accessible budget (all zones locked or in use)".to_string());
            debug!(symbol = %decision.symbol, "decision rejected: no accessible budget");
            return ValidatedDecision {
                original: decision.clone(),
                approved: false,
                adjusted_leverage: 0.0,
                adjusted_quantity: 0.0,
                rejection_reasons: reasons,
                margin_required: 0.0,
                max_loss: 0.0,
            };
        }

        // Layer 6: stop-loss validity.
        if decision.stop_loss <= 0.0 {
            reasons.push("No stop-loss provided".to_string());
            return ValidatedDecision {
                original: decision.clone(),
                approved: false,
                adjusted_leverage: 0.0,
                adjusted_quantity: 0.0,
                rejection_reasons: reasons,
                margin_required: 0.0,
                max_loss: 0.0,
            };
        }
        match decision.action {
            Action::Long if decision.stop_loss >= current_price => {
                reasons.push("LONG stop-loss must be below current price".to_string());
                return ValidatedDecision {
                    original: decision.clone(),
                    approved: false,
                    adjusted_leverage: 0.0,
                    adjusted_quantity: 0.0,
                    rejection_reasons: reasons,
                    margin_required: 0.0,
                    max_loss: 0.0,
                };
            }
            Action::Short if decision.stop_loss <= current_price => {
                reasons.push("SHORT stop-loss must be above current price".to_string());
                return ValidatedDecision {
                    original: decision.clone(),
                    approved: false,
                    adjusted_leverage: 0.0,
                    adjusted_quantity: 0.0,
                    rejection_reasons: reasons,
                    margin_required: 0.0,
                    max_loss: 0.0,
                };
            }
            _ => {}
        }

        let sl_distance = (current_price - decision.stop_loss).abs();
        let sl_pct = if current_price > 0.0 { sl_distance / current_price } else { 0.0 };

        let atr_value = Self::get_atr(report);
        if atr_value > 0.0 {
            let sl_atr_ratio = sl_distance / atr_value;
            if sl_atr_ratio < self.risk.min_sl_atr_multiple {
                reasons.push(format!(
                    "SL too tight: {:.2}x ATR (min {}x)",
                    sl_atr_ratio, self.risk.min_sl_atr_multiple
                ));
                return ValidatedDecision {
                    original: decision.clone(),
                    approved: false,
                    adjusted_leverage: 0.0,
                    adjusted_quantity: 0.0,
                    rejection_reasons: reasons,
                    margin_required: 0.0,
                    max_loss: 0.0,
                };
            }
            if sl_atr_ratio > self.risk.max_sl_atr_multiple {
                reasons.push(format!(
                    "SL too wide: {:.2}x ATR (max {}x)",
                    sl_atr_ratio, self.risk.max_sl_atr_multiple
                ));
                return ValidatedDecision {
                    original: decision.clone(),
                    approved: false,
                    adjusted_leverage: 0.0,
                    adjusted_quantity: 0.0,
                    rejection_reasons: reasons,
                    margin_required: 0.0,
                    max_loss: 0.0,
                };
            }
        }

        // Layer 7: risk/reward ratio.
        if decision.take_profit > 0.0 {
            let tp_distance = (decision.take_profit - current_price).abs();
            let rr_ratio = if sl_distance > 0.0 { tp_distance / sl_distance } else { 0.0 };

            let mut min_rr: f64 = 1.5;
            if zones.accessible > zones.free {
                min_rr = min_rr.max(self.reserve().guarded_min_rr);
            }
            if rr_ratio < min_rr {
                reasons.push(format!("R:R ratio {rr_ratio:.2} below minimum {min_rr}"));
                return ValidatedDecision {
                    original: decision.clone(),
                    approved: false,
                    adjusted_leverage: 0.0,
                    adjusted_quantity: 0.0,
                    rejection_reasons: reasons,
                    margin_required: 0.0,
                    max_loss: 0.0,
                };
            }
        }

        // Layer 8: position sizing (2% rule).
        let max_loss_budget = zones.accessible * self.risk.max_loss_per_trade_pct * size_multiplier;
        let max_quantity = if sl_pct > 0.0 {
            max_loss_budget / (current_price * sl_pct)
        } else {
            0.0
        };
        let mut adjusted_quantity = if max_quantity > 0.0 {
            decision.quantity.min(max_quantity)
        } else {
            0.0
        };
        if adjusted_quantity <= 0.0 {
            reasons.push("Position size rounds to zero after risk limits".to_string());
            return ValidatedDecision {
                original: decision.clone(),
                approved: false,
                adjusted_leverage: 0.0,
                adjusted_quantity: 0.0,
                rejection_reasons: reasons,
                margin_required: 0.0,
                max_loss: 0.0,
            };
        }

        // Layer 9: margin and total-exposure clamp.
        let mut margin_needed = if adjusted_leverage > 0.0 {
            adjusted_quantity * current_price / adjusted_leverage
        } else {
            adjusted_quantity * current_price
        };

        if margin_needed > zones.accessible {
            margin_needed = zones.accessible;
            let notional = margin_needed * adjusted_leverage;
            adjusted_quantity = if current_price > 0.0 { notional / current_price } else { 0.0 };
        }

        let max_exposure = portfolio.current_budget * self.risk.max_total_exposure_pct;
        if portfolio.total_margin_in_use() + margin_needed > max_exposure {
            let allowed = (max_exposure - portfolio.total_margin_in_use()).max(0.0);
            if allowed <= 0.0 {
                reasons.push("Total exposure limit reached".to_string());
                return ValidatedDecision {
                    original: decision.clone(),
                    approved: false,
                    adjusted_leverage: 0.0,
                    adjusted_quantity: 0.0,
                    rejection_reasons: reasons,
                    margin_required: 0.0,
                    max_loss: 0.0,
                };
            }
            margin_needed = allowed;
            let notional = margin_needed * adjusted_leverage;
            adjusted_quantity = if current_price > 0.0 { notional / current_price } else { 0.0 };
        }

        // Layer 10: position conflict.
        for pos in portfolio.get_positions_for_symbol(&decision.symbol) {
            let reason = if pos.side == decision.action {
                format!("already have {} position on {}", pos.side.as_str(), decision.symbol)
            } else {
                format!(
                    "have opposite {} position on {} — CLOSE it first",
                    pos.side.as_str(),
                    decision.symbol
                )
            };
            return ValidatedDecision {
                original: decision.clone(),
                approved: false,
                adjusted_leverage: 0.0,
                adjusted_quantity: 0.0,
                rejection_reasons: vec![reason],
                margin_required: 0.0,
                max_loss: 0.0,
            };
        }

        let max_loss = adjusted_quantity * sl_distance;
        ValidatedDecision {
            original: decision.clone(),
            approved: true,
            adjusted_leverage,
            adjusted_quantity,
            rejection_reasons: reasons,
            margin_required: margin_needed,
            max_loss,
        }
    }
}
