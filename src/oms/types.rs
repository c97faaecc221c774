//! Core OMS types
//!
//! Defines order requests, resting orders, acknowledgements and fills.
//! All prices and quantities are `Money` to prevent floating-point drift.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{ExchangeError, ExchangeResult};
use crate::{Money, Side, Symbol};

/// Order ID type
pub type OrderId = u64;

/// First id handed out by a fresh engine instance is `FIRST_ORDER_ID + 1`
pub const FIRST_ORDER_ID: OrderId = 1000;

/// Order type - determines execution logic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Fills immediately at the current price (taker)
    Market,

    /// Buy limit: fills when price <= limit_price
    /// Sell limit: fills when price >= limit_price
    Limit,

    /// Stop-loss: converts to market when stop triggered
    /// Buy stop: triggers when price >= stop_price
    /// Sell stop: triggers when price <= stop_price
    StopMarket,

    /// Take-profit: converts to market when the target is touched
    /// Sell TP: triggers when price >= stop_price
    /// Buy TP: triggers when price <= stop_price
    TakeProfit,
}

impl OrderType {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
            OrderType::StopMarket => "STOP_MARKET",
            OrderType::TakeProfit => "TAKE_PROFIT",
        }
    }

    /// Orders that wait on the book before filling pay the maker rate
    pub fn is_maker(self) -> bool {
        matches!(self, OrderType::Limit)
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderType {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MARKET" => Ok(OrderType::Market),
            "LIMIT" => Ok(OrderType::Limit),
            "STOP_MARKET" => Ok(OrderType::StopMarket),
            "TAKE_PROFIT" => Ok(OrderType::TakeProfit),
            other => Err(ExchangeError::InvalidOrder(format!(
                "unknown order type '{}'",
                other
            ))),
        }
    }
}

/// Order status as reported by an exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
}

impl FromStr for OrderStatus {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NEW" => Ok(OrderStatus::New),
            "PARTIALLY_FILLED" => Ok(OrderStatus::PartiallyFilled),
            "FILLED" => Ok(OrderStatus::Filled),
            "CANCELED" | "CANCELLED" => Ok(OrderStatus::Canceled),
            "REJECTED" => Ok(OrderStatus::Rejected),
            "EXPIRED" | "EXPIRED_IN_MATCH" => Ok(OrderStatus::Expired),
            other => Err(ExchangeError::Decode(format!("unknown order status '{}'", other))),
        }
    }
}

/// Order placement request, the same shape for the live and the paper exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Money,
    pub limit_price: Option<Money>,
    pub stop_price: Option<Money>,
    #[serde(default)]
    pub reduce_only: bool,
}

impl OrderRequest {
    pub fn market(symbol: Symbol, side: Side, quantity: Money) -> Self {
        Self {
            symbol,
            side,
            order_type: OrderType::Market,
            quantity,
            limit_price: None,
            stop_price: None,
            reduce_only: false,
        }
    }

    pub fn limit(symbol: Symbol, side: Side, quantity: Money, price: Money) -> Self {
        Self {
            symbol,
            side,
            order_type: OrderType::Limit,
            quantity,
            limit_price: Some(price),
            stop_price: None,
            reduce_only: false,
        }
    }

    pub fn stop_market(symbol: Symbol, side: Side, quantity: Money, stop_price: Money) -> Self {
        Self {
            symbol,
            side,
            order_type: OrderType::StopMarket,
            quantity,
            limit_price: None,
            stop_price: Some(stop_price),
            reduce_only: false,
        }
    }

    /// Take-profit with price and stop price set to the same target
    pub fn take_profit(symbol: Symbol, side: Side, quantity: Money, target: Money) -> Self {
        Self {
            symbol,
            side,
            order_type: OrderType::TakeProfit,
            quantity,
            limit_price: Some(target),
            stop_price: Some(target),
            reduce_only: false,
        }
    }

    pub fn reduce_only(mut self) -> Self {
        self.reduce_only = true;
        self
    }

    /// Reject requests the exchange would refuse before touching any state
    pub fn validate(&self) -> ExchangeResult<()> {
        if !self.quantity.is_positive() {
            return Err(ExchangeError::InvalidOrder(format!(
                "quantity must be > 0, got {}",
                self.quantity
            )));
        }

        let require_positive = |name: &str, value: Option<Money>| match value {
            Some(v) if v.is_positive() => Ok(()),
            Some(v) => Err(ExchangeError::InvalidOrder(format!(
                "{} must be > 0, got {}",
                name, v
            ))),
            None => Err(ExchangeError::InvalidOrder(format!(
                "{} is required for {} orders",
                name, self.order_type
            ))),
        };

        match self.order_type {
            OrderType::Market => Ok(()),
            OrderType::Limit => require_positive("price", self.limit_price),
            OrderType::StopMarket => require_positive("stop_price", self.stop_price),
            OrderType::TakeProfit => {
                require_positive("stop_price", self.stop_price)?;
                match self.limit_price {
                    Some(p) if !p.is_positive() => Err(ExchangeError::InvalidOrder(format!(
                        "price must be > 0, got {}",
                        p
                    ))),
                    _ => Ok(()),
                }
            }
        }
    }
}

/// An order sitting on the simulated book waiting for its trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestingOrder {
    pub id: OrderId,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Money,
    pub limit_price: Money,
    pub stop_price: Money,
    pub reduce_only: bool,
    pub status: OrderStatus,
}

impl RestingOrder {
    pub fn from_request(id: OrderId, request: OrderRequest) -> Self {
        Self {
            id,
            symbol: request.symbol,
            side: request.side,
            order_type: request.order_type,
            quantity: request.quantity,
            limit_price: request.limit_price.unwrap_or(Money::ZERO),
            stop_price: request.stop_price.unwrap_or(Money::ZERO),
            reduce_only: request.reduce_only,
            status: OrderStatus::New,
        }
    }
}

/// Acknowledgement returned by `place_order`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub status: OrderStatus,
    pub avg_price: Option<Money>,
    pub executed_qty: Money,
    pub cum_quote: Money,
}

/// A resting order that fired on a tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilledOrder {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub fill_price: Money,
    pub quantity: Money,
    /// Gross PnL realized by this fill (zero for opening fills)
    pub realized_pnl: Money,
    pub commission: Money,
}

impl FilledOrder {
    /// Net effect of this fill on the account balance
    pub fn net_pnl(&self) -> Money {
        self.realized_pnl - self.commission
    }
}
