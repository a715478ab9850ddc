pub mod collector;
pub mod kline_buffer;
pub mod orderbook;

pub use collector::{spot_symbol, Collector};
pub use kline_buffer::KlineBuffer;
pub use orderbook::{OrderbookLevel, OrderbookSnapshot, BBO};
