//! Resting-order book for the simulated exchange
//!
//! Orders are keyed by id in a BTreeMap, so iteration order is placement order.
//! There is no depth simulation: the book only answers "which orders are
//! waiting, and which of them does this price trigger".

use crate::oms::matching::is_triggered;
use crate::oms::types::{OrderId, RestingOrder};
use crate::{Money, Symbol};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct OrderBook {
    orders: BTreeMap<OrderId, RestingOrder>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self {
            orders: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, order: RestingOrder) {
        self.orders.insert(order.id, order);
    }

    pub fn get(&self, order_id: OrderId) -> Option<&RestingOrder> {
        self.orders.get(&order_id)
    }

    /// Remove one order. Returns `None` if it was never placed or is already gone.
    pub fn remove(&mut self, order_id: OrderId) -> Option<RestingOrder> {
        self.orders.remove(&order_id)
    }

    /// Remove every order, or every order on `symbol`. Returns the removed ids.
    pub fn remove_all(&mut self, symbol: Option<&Symbol>) -> Vec<OrderId> {
        let ids: Vec<OrderId> = self
            .orders
            .values()
            .filter(|o| symbol.map_or(true, |s| &o.symbol == s))
            .map(|o| o.id)
            .collect();
        for id in &ids {
            self.orders.remove(id);
        }
        ids
    }

    /// Snapshot of open orders in ascending id order
    pub fn snapshot(&self, symbol: Option<&Symbol>) -> Vec<RestingOrder> {
        self.orders
            .values()
            .filter(|o| symbol.map_or(true, |s| &o.symbol == s))
            .cloned()
            .collect()
    }

    /// Ids of orders on `symbol` whose trigger condition holds at `price`
    pub fn triggered(&self, symbol: &Symbol, price: Money) -> Vec<OrderId> {
        self.orders
            .values()
            .filter(|o| &o.symbol == symbol && is_triggered(o, price))
            .map(|o| o.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}
