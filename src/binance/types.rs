//! Wire types for the USDⓈ-M futures REST API
//!
//! Binance sends decimals as JSON strings, which `Money` deserializes
//! directly. Conversions into the exchange-neutral types live here too.

use serde::Deserialize;
use tracing::debug;

use crate::error::{ExchangeError, ExchangeResult};
use crate::exchange::{AccountSummary, PositionRecord};
use crate::oms::{OrderAck, OrderStatus, OrderType, RestingOrder};
use crate::{Money, Side, Symbol};

/// Error body: `{"code": -2011, "msg": "Unknown order sent."}`
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub code: i64,
    pub msg: String,
}

/// Binance code for cancelling an order that is not on the book
pub const UNKNOWN_ORDER_CODE: i64 = -2011;

/// One row of `GET /fapi/v2/balance`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetBalance {
    pub asset: String,
    pub balance: Money,
    #[serde(default)]
    pub available_balance: Money,
}

/// `GET /fapi/v2/account` (only the fields we read)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub total_margin_balance: Money,
    pub total_wallet_balance: Money,
    pub available_balance: Money,
}

impl From<AccountInfo> for AccountSummary {
    fn from(a: AccountInfo) -> Self {
        AccountSummary {
            total_margin_balance: a.total_margin_balance,
            total_wallet_balance: a.total_wallet_balance,
            available_balance: a.available_balance,
        }
    }
}

/// One row of `GET /fapi/v2/positionRisk`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRisk {
    pub symbol: Symbol,
    pub position_amt: Money,
    pub entry_price: Money,
    pub mark_price: Money,
    pub un_realized_profit: Money,
    #[serde(default)]
    pub notional: Money,
    pub leverage: String,
    pub liquidation_price: Money,
}

impl TryFrom<PositionRisk> for PositionRecord {
    type Error = ExchangeError;

    fn try_from(p: PositionRisk) -> ExchangeResult<Self> {
        let leverage = p
            .leverage
            .parse()
            .map_err(|_| ExchangeError::Decode(format!("bad leverage '{}'", p.leverage)))?;
        Ok(PositionRecord {
            symbol: p.symbol,
            position_amt: p.position_amt,
            entry_price: p.entry_price,
            mark_price: Some(p.mark_price),
            unrealized_pnl: p.un_realized_profit,
            notional: p.notional,
            leverage,
            liquidation_price: p.liquidation_price,
            // Not reported per position by the exchange
            accrued_commission: Money::ZERO,
        })
    }
}

/// Order object returned by placement, cancellation and `openOrders`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: u64,
    pub symbol: Symbol,
    pub status: String,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: String,
    #[serde(default)]
    pub orig_qty: Money,
    #[serde(default)]
    pub price: Money,
    #[serde(default)]
    pub stop_price: Money,
    #[serde(default)]
    pub avg_price: Money,
    #[serde(default)]
    pub executed_qty: Money,
    #[serde(default)]
    pub cum_quote: Money,
    #[serde(default)]
    pub reduce_only: bool,
}

impl OrderResponse {
    pub fn into_ack(self) -> ExchangeResult<OrderAck> {
        Ok(OrderAck {
            order_id: self.order_id,
            status: self.status.parse()?,
            // "0" until the order has traded
            avg_price: self.avg_price.is_positive().then_some(self.avg_price),
            executed_qty: self.executed_qty,
            cum_quote: self.cum_quote,
            symbol: self.symbol,
        })
    }

    /// `None` for order types the engine does not model (trailing, STOP, ...)
    pub fn into_resting(self) -> Option<RestingOrder> {
        let order_type = match self.order_type.parse::<OrderType>() {
            Ok(t) => t,
            Err(_) => {
                debug!(
                    "Skipping {} order {} of type {}",
                    self.symbol, self.order_id, self.order_type
                );
                return None;
            }
        };
        Some(RestingOrder {
            id: self.order_id,
            symbol: self.symbol,
            side: self.side,
            order_type,
            quantity: self.orig_qty,
            limit_price: self.price,
            stop_price: self.stop_price,
            reduce_only: self.reduce_only,
            status: self.status.parse().unwrap_or(OrderStatus::New),
        })
    }
}

/// `GET /fapi/v1/ticker/price?symbol=...`
#[derive(Debug, Clone, Deserialize)]
pub struct TickerPrice {
    pub symbol: Symbol,
    pub price: Money,
}
