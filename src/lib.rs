//! Futures Paper Trader
//!
//! A simulated USDⓈ-M futures exchange that strategy code cannot tell apart
//! from the live one: wallet balance, netted positions with weighted-average
//! entry, resting LIMIT / STOP_MARKET / TAKE_PROFIT orders triggered on price
//! ticks, maker/taker commission and an append-only trade journal. A live
//! Binance adapter implements the same [`FuturesExchange`] trait, and the
//! [`intent`] module layers one-cancels-other TP/SL brackets on top of either.

pub mod binance;
pub mod config;
pub mod error;
pub mod exchange;
pub mod intent;
pub mod market;
pub mod oms;
pub mod paper;
pub mod replay;
pub mod types;

pub use config::Config;
pub use error::{ExchangeError, ExchangeResult, JournalError};
pub use exchange::{AccountSummary, FuturesExchange, PositionRecord};
pub use market::{PriceBoard, PriceFeed};
pub use paper::PaperExchange;
pub use types::*;
