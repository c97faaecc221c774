//! Exchange client interface
//!
//! Strategy code depends only on [`FuturesExchange`]. Two implementations exist:
//! [`PaperExchange`](crate::paper::PaperExchange), which simulates fills
//! locally, and [`BinanceFuturesClient`](crate::binance::BinanceFuturesClient),
//! which talks to the live USDⓈ-M futures API.

use serde::{Deserialize, Serialize};

use crate::error::ExchangeResult;
use crate::oms::{FilledOrder, OrderAck, OrderId, OrderRequest, RestingOrder};
use crate::{Money, Symbol};

/// Account summary. The paper engine has no margin model, so all three equal
/// the wallet balance there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub total_margin_balance: Money,
    pub total_wallet_balance: Money,
    pub available_balance: Money,
}

/// Position snapshot in the shape the live exchange reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub symbol: Symbol,
    pub position_amt: Money,
    pub entry_price: Money,
    /// `None` only for a flat position whose price is unknown
    pub mark_price: Option<Money>,
    pub unrealized_pnl: Money,
    pub notional: Money,
    pub leverage: u32,
    /// Placeholder, liquidation is not simulated
    pub liquidation_price: Money,
    pub accrued_commission: Money,
}

impl PositionRecord {
    pub fn is_flat(&self) -> bool {
        self.position_amt.is_zero()
    }
}

pub trait FuturesExchange: Send + Sync {
    /// USDT wallet balance
    fn balance(&self) -> ExchangeResult<Money>;

    fn account(&self) -> ExchangeResult<AccountSummary>;

    /// With a symbol: exactly one record, even when flat.
    /// Without: only non-flat positions.
    fn positions(&self, symbol: Option<&Symbol>) -> ExchangeResult<Vec<PositionRecord>>;

    fn open_orders(&self, symbol: Option<&Symbol>) -> ExchangeResult<Vec<RestingOrder>>;

    fn place_order(&self, request: OrderRequest) -> ExchangeResult<OrderAck>;

    fn cancel_order(&self, symbol: &Symbol, order_id: OrderId) -> ExchangeResult<()>;

    /// Idempotent: succeeds when there is nothing to cancel
    fn cancel_all_open_orders(&self, symbol: Option<&Symbol>) -> ExchangeResult<()>;

    fn change_leverage(&self, symbol: &Symbol, leverage: u32) -> ExchangeResult<()>;

    /// Evaluate resting orders on `symbol` against a new price.
    ///
    /// A live exchange triggers its own orders, so adapters for one return
    /// nothing here.
    fn check_orders(&self, symbol: &Symbol, price: Money) -> ExchangeResult<Vec<FilledOrder>>;
}
