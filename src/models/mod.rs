//! Shared domain types: market data records, decisions, and portfolio state.

pub mod decision;
pub mod market;
pub mod position;

pub use decision::{Action, AnalysisCycle, MultiSymbolDecision, TradeDecision, ValidatedDecision};
pub use market::{
    FundingRate, MarketSnapshot, OpenInterest, RecentTrade, TickerData, Timeframe, TradersOI,
    VolumeDelta,
};
pub use position::{ClosedTrade, PortfolioState, PortfolioSummary, Position, PositionSummary};
