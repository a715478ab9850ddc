//! Trade decisions: what the oracle outputs and what the risk manager
//! validates them into.

use serde::{Deserialize, Serialize};

use crate::models::position::PortfolioSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Long,
    Short,
    Hold,
    Close,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Long => "LONG",
            Action::Short => "SHORT",
            Action::Hold => "HOLD",
            Action::Close => "CLOSE",
        }
    }

    /// Parse from an upper- or lower-case action string, defaulting to
    /// `Hold` on anything unrecognized (mirrors the oracle response parser's
    /// fallback posture: an unparseable action never escalates to a trade).
    pub fn parse(raw: &str) -> Action {
        match raw.to_uppercase().as_str() {
            "LONG" => Action::Long,
            "SHORT" => Action::Short,
            "CLOSE" => Action::Close,
            _ => Action::Hold,
        }
    }
}

/// Single per-symbol decision from the oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeDecision {
    pub symbol: String,
    pub action: Action,
    #[serde(default = "default_leverage")]
    pub leverage: f64,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub stop_loss: f64,
    #[serde(default)]
    pub take_profit: f64,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
}

fn default_leverage() -> f64 {
    1.0
}

impl TradeDecision {
    pub fn hold(symbol: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            action: Action::Hold,
            leverage: 1.0,
            quantity: 0.0,
            stop_loss: 0.0,
            take_profit: 0.0,
            confidence: 0.0,
            reasoning: reasoning.into(),
        }
    }
}

/// Array of per-symbol decisions returned by a single oracle call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultiSymbolDecision {
    pub decisions: Vec<TradeDecision>,
    pub raw_response: String,
    pub reasoning_content: String,
    pub model: String,
    pub timestamp: f64,
}

/// A decision after risk manager processing.
///
/// `adjusted_leverage`/`adjusted_quantity` hold the risk manager's clamped
/// values regardless of approval; `final_leverage()`/`final_quantity()` are
/// the accessors callers should actually execute against, since they
/// collapse to zero when the decision was rejected rather than silently
/// trading a reduced, still-nonzero size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedDecision {
    pub original: TradeDecision,
    pub approved: bool,
    pub adjusted_leverage: f64,
    pub adjusted_quantity: f64,
    pub rejection_reasons: Vec<String>,
    pub margin_required: f64,
    pub max_loss: f64,
}

impl ValidatedDecision {
    pub fn rejected(original: TradeDecision, reason: impl Into<String>) -> Self {
        Self {
            original,
            approved: false,
            adjusted_leverage: 0.0,
            adjusted_quantity: 0.0,
            rejection_reasons: vec![reason.into()],
            margin_required: 0.0,
            max_loss: 0.0,
        }
    }

    pub fn final_leverage(&self) -> f64 {
        if self.approved {
            self.adjusted_leverage
        } else {
            0.0
        }
    }

    pub fn final_quantity(&self) -> f64 {
        if self.approved {
            self.adjusted_quantity
        } else {
            0.0
        }
    }
}

/// Full audit record for one analysis cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisCycle {
    pub timestamp: f64,
    pub reasoning_content: String,
    pub llm_output: Option<MultiSymbolDecision>,
    pub validated_decisions: Vec<ValidatedDecision>,
    pub portfolio_state_before: Option<PortfolioSummary>,
    pub portfolio_state_after: Option<PortfolioSummary>,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive_and_defaults_to_hold() {
        assert_eq!(Action::parse("long"), Action::Long);
        assert_eq!(Action::parse("SHORT"), Action::Short);
        assert_eq!(Action::parse("garbage"), Action::Hold);
    }

    #[test]
    fn final_leverage_and_quantity_zero_when_not_approved() {
        let d = TradeDecision::hold("BTC", "no edge");
        let mut v = ValidatedDecision::rejected(d, "confidence too low");
        v.adjusted_leverage = 5.0;
        v.adjusted_quantity = 1.5;
        assert_eq!(v.final_leverage(), 0.0);
        assert_eq!(v.final_quantity(), 0.0);
        // adjusted_* fields are untouched — only the accessor gates on approval.
        assert_eq!(v.adjusted_leverage, 5.0);
        assert_eq!(v.adjusted_quantity, 1.5);
    }

    #[test]
    fn final_leverage_and_quantity_pass_through_when_approved() {
        let d = TradeDecision::hold("BTC", "");
        let mut v = ValidatedDecision::rejected(d, "placeholder");
        v.approved = true;
        v.adjusted_leverage = 3.0;
        v.adjusted_quantity = 0.8;
        assert_eq!(v.final_leverage(), 3.0);
        assert_eq!(v.final_quantity(), 0.8);
    }

    #[test]
    fn hold_decision_has_zeroed_fields() {
        let d = TradeDecision::hold("ETH", "nothing to do");
        assert_eq!(d.action, Action::Hold);
        assert_eq!(d.quantity, 0.0);
        assert_eq!(d.leverage, 1.0);
    }
}
