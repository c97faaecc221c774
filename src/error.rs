//! Error types for the exchange surface and the trade journal

use thiserror::Error;

use crate::oms::OrderId;

/// Errors returned by any [`FuturesExchange`](crate::exchange::FuturesExchange) implementation.
///
/// None of these are fatal to the engine: a rejected call leaves the ledger
/// untouched and may be retried.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Non-positive quantity/price, missing price for the order type, or an
    /// unparseable side/type string
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("unknown order id {0}")]
    UnknownOrder(OrderId),

    /// A mark price needed for a fill or PnL computation was not available
    #[error("market data unavailable for {symbol}")]
    MarketDataUnavailable { symbol: String },

    /// The fill was applied but the durable mirror could not be written
    #[error("trade journal write failed: {0}")]
    JournalWriteFailed(String),

    #[error("exchange API error {status} (code {code:?}): {message}")]
    Api {
        status: u16,
        code: Option<i64>,
        message: String,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to decode exchange response: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Errors from a durable journal mirror
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<JournalError> for ExchangeError {
    fn from(err: JournalError) -> Self {
        Self::JournalWriteFailed(err.to_string())
    }
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;
