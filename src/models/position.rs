//! Open positions, closed trades, and the portfolio state that tracks both
//! across a paper-trading session.

use serde::{Deserialize, Serialize};

use crate::models::decision::{Action, AnalysisCycle};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: Action,
    pub entry_price: f64,
    pub quantity: f64,
    pub leverage: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub margin: f64,
    pub opened_at: f64,
    pub confidence: f64,
    pub reasoning: String,
}

impl Position {
    pub fn notional(&self) -> f64 {
        self.quantity * self.entry_price
    }

    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        match self.side {
            Action::Long => self.quantity * (current_price - self.entry_price),
            Action::Short => self.quantity * (self.entry_price - current_price),
            Action::Hold | Action::Close => 0.0,
        }
    }

    pub fn unrealized_pnl_pct(&self, current_price: f64) -> f64 {
        if self.margin == 0.0 {
            0.0
        } else {
            self.unrealized_pnl(current_price) / self.margin * 100.0
        }
    }

    pub fn should_stop_loss(&self, current_price: f64) -> bool {
        if self.stop_loss <= 0.0 {
            return false;
        }
        match self.side {
            Action::Long => current_price <= self.stop_loss,
            Action::Short => current_price >= self.stop_loss,
            Action::Hold | Action::Close => false,
        }
    }

    pub fn should_take_profit(&self, current_price: f64) -> bool {
        if self.take_profit <= 0.0 {
            return false;
        }
        match self.side {
            Action::Long => current_price >= self.take_profit,
            Action::Short => current_price <= self.take_profit,
            Action::Hold | Action::Close => false,
        }
    }
}

/// A completed trade with realized PnL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub symbol: String,
    pub side: Action,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: f64,
    pub leverage: f64,
    pub margin: f64,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub opened_at: f64,
    pub closed_at: f64,
    /// "SL", "TP", "LLM_CLOSE", or "TIME".
    pub close_reason: String,
}

impl ClosedTrade {
    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }
}

/// Full portfolio across all symbols, tracked as paper equity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioState {
    pub initial_budget: f64,
    pub current_budget: f64,
    pub peak_budget: f64,
    pub open_positions: Vec<Position>,
    pub closed_trades: Vec<ClosedTrade>,
    /// Reasoning archive: every analysis cycle, kept only when
    /// `store_reasoning` is enabled (see `StrategyEngine::process_response`).
    /// This lives alongside `StrategyEngine::cycles`, which is always kept
    /// regardless of the flag — this copy is the one that travels with the
    /// portfolio if it's ever persisted or inspected on its own.
    #[serde(default)]
    pub analysis_cycles: Vec<AnalysisCycle>,
}

impl PortfolioState {
    pub fn new(initial_budget: f64) -> Self {
        Self {
            initial_budget,
            current_budget: initial_budget,
            peak_budget: initial_budget,
            open_positions: Vec::new(),
            closed_trades: Vec::new(),
            analysis_cycles: Vec::new(),
        }
    }

    pub fn total_margin_in_use(&self) -> f64 {
        self.open_positions.iter().map(|p| p.margin).sum()
    }

    pub fn available_budget(&self) -> f64 {
        self.current_budget - self.total_margin_in_use()
    }

    /// Sum of unrealized PnL across open positions. `current_price` is
    /// called per position and should fall back to entry price when no
    /// live price is available for that symbol.
    pub fn total_unrealized_pnl(&self, current_price: impl Fn(&str) -> Option<f64>) -> f64 {
        self.open_positions
            .iter()
            .map(|p| p.unrealized_pnl(current_price(&p.symbol).unwrap_or(p.entry_price)))
            .sum()
    }

    pub fn total_trades(&self) -> usize {
        self.closed_trades.len()
    }

    pub fn winning_trades(&self) -> usize {
        self.closed_trades.iter().filter(|t| t.is_win()).count()
    }

    pub fn win_rate(&self) -> f64 {
        if self.closed_trades.is_empty() {
            0.0
        } else {
            self.winning_trades() as f64 / self.total_trades() as f64
        }
    }

    pub fn win_rate_last_n(&self, n: usize) -> f64 {
        let recent = &self.closed_trades[self.closed_trades.len().saturating_sub(n)..];
        if recent.is_empty() {
            0.0
        } else {
            recent.iter().filter(|t| t.is_win()).count() as f64 / recent.len() as f64
        }
    }

    /// Consecutive losses counting back from the most recent closed trade.
    pub fn losing_streak(&self) -> usize {
        let mut streak = 0;
        for trade in self.closed_trades.iter().rev() {
            if !trade.is_win() {
                streak += 1;
            } else {
                break;
            }
        }
        streak
    }

    /// Drawdown as a fraction of peak budget (0.0 = at peak, 0.2 = 20% down).
    pub fn drawdown_from_peak(&self) -> f64 {
        if self.peak_budget == 0.0 {
            0.0
        } else {
            (self.peak_budget - self.current_budget) / self.peak_budget
        }
    }

    pub fn update_peak(&mut self) {
        if self.current_budget > self.peak_budget {
            self.peak_budget = self.current_budget;
        }
    }

    /// Close `position` at `exit_price`, record the realized trade, and
    /// fold its PnL into `current_budget`. Margin release is implicit: it
    /// leaves `open_positions` along with the position itself.
    pub fn close_position(&mut self, position: Position, exit_price: f64, reason: &str, closed_at: f64) -> ClosedTrade {
        let pnl = position.unrealized_pnl(exit_price);
        let pnl_pct = position.unrealized_pnl_pct(exit_price);

        let trade = ClosedTrade {
            symbol: position.symbol.clone(),
            side: position.side,
            entry_price: position.entry_price,
            exit_price,
            quantity: position.quantity,
            leverage: position.leverage,
            margin: position.margin,
            pnl,
            pnl_pct,
            opened_at: position.opened_at,
            closed_at,
            close_reason: reason.to_string(),
        };

        self.current_budget += pnl;
        self.closed_trades.push(trade.clone());
        if let Some(idx) = self.open_positions.iter().position(|p| *p == position) {
            self.open_positions.remove(idx);
        }
        self.update_peak();
        trade
    }

    pub fn open_position(&mut self, position: Position) {
        self.open_positions.push(position);
    }

    pub fn get_positions_for_symbol(&self, symbol: &str) -> Vec<&Position> {
        self.open_positions.iter().filter(|p| p.symbol == symbol).collect()
    }

    /// A lightweight, non-recursive snapshot for an `AnalysisCycle`'s
    /// before/after audit fields. Deliberately excludes `analysis_cycles`
    /// itself and `closed_trades` in full — embedding the whole portfolio
    /// (including its own cycle history) would make every cycle record grow
    /// without bound.
    pub fn to_summary(&self, current_price: impl Fn(&str) -> Option<f64>) -> PortfolioSummary {
        PortfolioSummary {
            initial_budget: self.initial_budget,
            current_budget: self.current_budget,
            available_budget: self.available_budget(),
            margin_in_use: self.total_margin_in_use(),
            unrealized_pnl: self.total_unrealized_pnl(&current_price),
            total_trades: self.total_trades(),
            win_rate: self.win_rate(),
            losing_streak: self.losing_streak(),
            drawdown_from_peak: self.drawdown_from_peak(),
            open_positions: self
                .open_positions
                .iter()
                .map(|p| PositionSummary {
                    symbol: p.symbol.clone(),
                    side: p.side,
                    entry: p.entry_price,
                    quantity: p.quantity,
                    leverage: p.leverage,
                    stop_loss: p.stop_loss,
                    take_profit: p.take_profit,
                    unrealized_pnl: p.unrealized_pnl(current_price(&p.symbol).unwrap_or(p.entry_price)),
                })
                .collect(),
        }
    }
}

/// Point-in-time summary of a single open position, as carried in an
/// `AnalysisCycle`'s portfolio snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSummary {
    pub symbol: String,
    pub side: Action,
    pub entry: f64,
    pub quantity: f64,
    pub leverage: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub unrealized_pnl: f64,
}

/// Point-in-time summary of the portfolio, carried in an `AnalysisCycle`
/// rather than a full `PortfolioState` clone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub initial_budget: f64,
    pub current_budget: f64,
    pub available_budget: f64,
    pub margin_in_use: f64,
    pub unrealized_pnl: f64,
    pub total_trades: usize,
    pub win_rate: f64,
    pub losing_streak: usize,
    pub drawdown_from_peak: f64,
    pub open_positions: Vec<PositionSummary>,
}
