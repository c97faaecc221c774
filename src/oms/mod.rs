//! Order Management System (OMS) for the simulated exchange
//!
//! - Resting LIMIT / STOP_MARKET / TAKE_PROFIT orders keyed by id
//! - Tick-driven trigger evaluation with maker/taker fees
//! - Netted positions with weighted-average entry and realized PnL
//! - Append-only trade journal with durable mirrors

pub mod journal;
pub mod ledger;
pub mod matching;
pub mod orderbook;
pub mod types;

pub use journal::{
    load_json_journal, load_sqlite_journal, JournalSink, JournalSummary, JournalWriter,
    JsonFileSink, SqliteSink, TradeJournalEntry,
};
pub use ledger::{AccountLedger, FillOutcome, PositionState};
pub use matching::{is_triggered, FeeSchedule};
pub use orderbook::OrderBook;
pub use types::{
    FilledOrder, OrderAck, OrderId, OrderRequest, OrderStatus, OrderType, RestingOrder,
    FIRST_ORDER_ID,
};
