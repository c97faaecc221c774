//! Trigger predicates and fee schedule for resting orders
//!
//! Triggered orders fill at the tick price, not at their own limit/stop price:
//! no slippage model, one execution price per tick.

use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::oms::types::{OrderType, RestingOrder};
use crate::{Money, Side};

/// Does `price` fire this resting order?
pub fn is_triggered(order: &RestingOrder, price: Money) -> bool {
    match (order.order_type, order.side) {
        (OrderType::StopMarket, Side::Sell) => price <= order.stop_price,
        (OrderType::StopMarket, Side::Buy) => price >= order.stop_price,
        (OrderType::TakeProfit, Side::Sell) => price >= order.stop_price,
        (OrderType::TakeProfit, Side::Buy) => price <= order.stop_price,
        (OrderType::Limit, Side::Buy) => price <= order.limit_price,
        (OrderType::Limit, Side::Sell) => price >= order.limit_price,
        // Market orders never rest on the book
        (OrderType::Market, _) => false,
    }
}

/// Maker/taker commission rates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub maker: Money,
    pub taker: Money,
}

impl FeeSchedule {
    pub fn new(maker: Money, taker: Money) -> Self {
        Self { maker, taker }
    }

    pub fn rate_for(&self, order_type: OrderType) -> Money {
        if order_type.is_maker() {
            self.maker
        } else {
            self.taker
        }
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        // 0.02% maker, 0.05% taker
        Self::new(
            Money::from_decimal(dec!(0.0002)),
            Money::from_decimal(dec!(0.0005)),
        )
    }
}
