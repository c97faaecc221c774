//! Market-data collaborator consumed by the paper exchange
//!
//! The engine never owns price data. It asks a [`PriceFeed`] for the current
//! mark price when it needs one (MARKET fills, unrealized PnL) and treats a
//! missing price as `MarketDataUnavailable`.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::{ExchangeError, ExchangeResult};
use crate::{Money, Symbol};

pub trait PriceFeed: Send + Sync {
    fn mark_price(&self, symbol: &Symbol) -> ExchangeResult<Money>;
}

/// Latest pushed price per symbol
///
/// Written by the per-symbol market-data streams, read by the engine.
#[derive(Debug, Default)]
pub struct PriceBoard {
    prices: RwLock<HashMap<Symbol, Money>>,
}

impl PriceBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, symbol: &Symbol, price: Money) {
        self.prices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(symbol.clone(), price);
    }

    pub fn get(&self, symbol: &Symbol) -> Option<Money> {
        self.prices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(symbol)
            .copied()
    }
}

impl PriceFeed for PriceBoard {
    fn mark_price(&self, symbol: &Symbol) -> ExchangeResult<Money> {
        self.get(symbol)
            .ok_or_else(|| ExchangeError::MarketDataUnavailable {
                symbol: symbol.to_string(),
            })
    }
}
