//! Trade intents: strategy-side bookkeeping for one bracketed position
//!
//! The exchange knows nothing about intents. An intent only remembers the ids
//! of its take-profit and stop-loss legs and reconciles them against the fills
//! the exchange reports, cancelling the sibling leg (one-cancels-other) before
//! it marks itself closed.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ExchangeError, ExchangeResult};
use crate::exchange::FuturesExchange;
use crate::oms::{FilledOrder, OrderId, OrderRequest};
use crate::{Money, Side, Symbol};

/// How TP/SL multipliers translate into price distances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TpSlUnit {
    /// Multiplier is a percentage of the entry price
    Percent,
    /// Multiplier is a USDT amount on the whole position
    Usdt,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TpSlRule {
    pub unit: TpSlUnit,
    pub tp_mult: Money,
    pub sl_mult: Money,
}

impl TpSlRule {
    /// Price distances `(Δtp, Δsl)` from the entry price
    pub fn distances(&self, entry: Money, size: Money) -> (Money, Money) {
        let hundred = Money::from_i64(100);
        match self.unit {
            TpSlUnit::Percent => (
                entry * self.tp_mult / hundred,
                entry * self.sl_mult / hundred,
            ),
            TpSlUnit::Usdt => (self.tp_mult / size, self.sl_mult / size),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeDirection {
    Long,
    Short,
}

impl TradeDirection {
    pub fn entry_side(self) -> Side {
        match self {
            TradeDirection::Long => Side::Buy,
            TradeDirection::Short => Side::Sell,
        }
    }

    pub fn exit_side(self) -> Side {
        self.entry_side().opposite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TrailingStop,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentStatus {
    Open,
    Closed(ExitReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeIntent {
    pub index: usize,
    pub symbol: Symbol,
    pub direction: TradeDirection,
    pub entry_price: Money,
    pub size: Money,
    pub take_profit: Money,
    pub stop_loss: Money,
    pub tp_order_id: Option<OrderId>,
    pub sl_order_id: Option<OrderId>,
    pub status: IntentStatus,
    pub exit_price: Option<Money>,
    /// Highest price seen since entry
    pub highest: Money,
    /// Lowest price seen since entry
    pub lowest: Money,
    /// Retracement in % that closes the trade once trailing is active
    pub trailing_callback: Option<Money>,
    pub trailing_activated: bool,
}

impl TradeIntent {
    /// TP/SL prices are fixed here and never recomputed
    pub fn new(
        index: usize,
        symbol: Symbol,
        direction: TradeDirection,
        entry_price: Money,
        size: Money,
        tp_distance: Money,
        sl_distance: Money,
    ) -> Self {
        let (take_profit, stop_loss) = match direction {
            TradeDirection::Long => (entry_price + tp_distance, entry_price - sl_distance),
            TradeDirection::Short => (entry_price - tp_distance, entry_price + sl_distance),
        };
        Self {
            index,
            symbol,
            direction,
            entry_price,
            size,
            take_profit,
            stop_loss,
            tp_order_id: None,
            sl_order_id: None,
            status: IntentStatus::Open,
            exit_price: None,
            highest: entry_price,
            lowest: entry_price,
            trailing_callback: None,
            trailing_activated: false,
        }
    }

    /// Round TP/SL onto the exchange price grid.
    ///
    /// Each level moves toward the entry so the distances never widen. A
    /// level that would land on or past the entry goes one tick outward
    /// instead.
    pub fn snapped_to_tick(mut self, tick: Money) -> Self {
        self.take_profit = snap_toward(self.take_profit, self.entry_price, tick);
        self.stop_loss = snap_toward(self.stop_loss, self.entry_price, tick);
        self
    }

    pub fn with_trailing(mut self, callback: Money) -> Self {
        self.trailing_callback = Some(callback);
        self
    }

    pub fn is_open(&self) -> bool {
        self.status == IntentStatus::Open
    }

    /// Update watermarks and arm the trailing stop once TP is reached
    pub fn record_price(&mut self, price: Money) {
        self.highest = self.highest.max(price);
        self.lowest = self.lowest.min(price);

        if self.trailing_callback.is_some() && !self.trailing_activated {
            let reached = match self.direction {
                TradeDirection::Long => price >= self.take_profit,
                TradeDirection::Short => price <= self.take_profit,
            };
            if reached {
                self.trailing_activated = true;
                debug!(
                    "Intent {} {}: trailing stop armed at {}",
                    self.index, self.symbol, price
                );
            }
        }
    }

    /// Whether `price` has retraced far enough from the watermark
    pub fn trailing_stop_hit(&self, price: Money) -> bool {
        let Some(callback) = self.trailing_callback else {
            return false;
        };
        if !self.trailing_activated {
            return false;
        }
        let ratio = callback / Money::from_i64(100);
        match self.direction {
            TradeDirection::Long => price <= self.highest * (Money::ONE - ratio),
            TradeDirection::Short => price >= self.lowest * (Money::ONE + ratio),
        }
    }

    /// Which leg `order_id` is, and the id of its sibling
    fn leg(&self, order_id: OrderId) -> Option<(ExitReason, Option<OrderId>)> {
        if self.tp_order_id == Some(order_id) {
            Some((ExitReason::TakeProfit, self.sl_order_id))
        } else if self.sl_order_id == Some(order_id) {
            Some((ExitReason::StopLoss, self.tp_order_id))
        } else {
            None
        }
    }

    fn close(&mut self, reason: ExitReason, price: Money) {
        self.status = IntentStatus::Closed(reason);
        self.exit_price = Some(price);
        info!(
            "Intent {} {} {:?} closed by {:?} @ {} (entry {})",
            self.index, self.symbol, self.direction, reason, price, self.entry_price
        );
    }
}

fn snap_toward(level: Money, entry: Money, tick: Money) -> Money {
    if level > entry {
        let snapped = level.floor_to_step(tick);
        if snapped > entry {
            snapped
        } else {
            level.ceil_to_step(tick)
        }
    } else {
        let snapped = level.ceil_to_step(tick);
        if snapped < entry {
            snapped
        } else {
            level.floor_to_step(tick)
        }
    }
}

/// Parameters for [`IntentTracker::open_bracket`]
#[derive(Debug, Clone)]
pub struct BracketPlan {
    pub index: usize,
    pub symbol: Symbol,
    pub direction: TradeDirection,
    pub size: Money,
    pub rule: TpSlRule,
    /// Replaces the TP leg with a trailing stop
    pub trailing_callback: Option<Money>,
    /// Price tick the TP/SL legs are rounded to; `None` leaves them exact
    pub tick_size: Option<Money>,
}

/// Cancel `order_id`, treating an order that already left the book as done
fn cancel_leg(
    exchange: &dyn FuturesExchange,
    symbol: &Symbol,
    order_id: OrderId,
) -> ExchangeResult<()> {
    match exchange.cancel_order(symbol, order_id) {
        Ok(()) => Ok(()),
        Err(ExchangeError::UnknownOrder(_)) => {
            debug!("Leg {} on {} already gone", order_id, symbol);
            Ok(())
        }
        Err(err) => Err(err),
    }
}

#[derive(Debug, Default)]
pub struct IntentTracker {
    intents: Vec<TradeIntent>,
}

impl IntentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// All intents, open and closed, in creation order
    pub fn intents(&self) -> &[TradeIntent] {
        &self.intents
    }

    pub fn open_for(&self, symbol: &Symbol) -> Option<&TradeIntent> {
        self.intents.iter().find(|t| t.is_open() && &t.symbol == symbol)
    }

    fn open_for_mut(&mut self, symbol: &Symbol) -> Option<&mut TradeIntent> {
        self.intents.iter_mut().find(|t| t.is_open() && &t.symbol == symbol)
    }

    /// Enter at market and protect the position with reduce-only exit legs.
    ///
    /// If a leg cannot be placed the entry is unwound before the error is
    /// returned, so no unprotected position is left behind.
    pub fn open_bracket(
        &mut self,
        exchange: &dyn FuturesExchange,
        plan: BracketPlan,
    ) -> ExchangeResult<&TradeIntent> {
        if self.open_for(&plan.symbol).is_some() {
            return Err(ExchangeError::InvalidOrder(format!(
                "an intent is already open on {}",
                plan.symbol
            )));
        }

        let entry_side = plan.direction.entry_side();
        let entry = OrderRequest::market(plan.symbol.clone(), entry_side, plan.size);
        let ack = exchange.place_order(entry)?;
        let entry_price = match ack.avg_price {
            Some(p) if p.is_positive() => p,
            // Live MARKET acks can come back before the fill price is known
            _ => exchange
                .positions(Some(&plan.symbol))?
                .first()
                .map(|p| p.entry_price)
                .filter(|p| p.is_positive())
                .ok_or_else(|| {
                    ExchangeError::Decode(format!("no entry price for {}", plan.symbol))
                })?,
        };

        let (tp_distance, sl_distance) = plan.rule.distances(entry_price, plan.size);
        let mut intent = TradeIntent::new(
            plan.index,
            plan.symbol.clone(),
            plan.direction,
            entry_price,
            plan.size,
            tp_distance,
            sl_distance,
        );
        if let Some(tick) = plan.tick_size {
            intent = intent.snapped_to_tick(tick);
        }
        if let Some(callback) = plan.trailing_callback {
            intent = intent.with_trailing(callback);
        }

        if let Err(err) = self.place_legs(exchange, &mut intent) {
            warn!("Bracket legs for {} failed ({}), unwinding entry", plan.symbol, err);
            for id in [intent.tp_order_id, intent.sl_order_id].into_iter().flatten() {
                cancel_leg(exchange, &plan.symbol, id)?;
            }
            let unwind = OrderRequest::market(plan.symbol, plan.direction.exit_side(), plan.size);
            exchange.place_order(unwind.reduce_only())?;
            return Err(err);
        }

        info!(
            "Intent {} opened: {} {:?} size={} entry={} TP={} SL={}",
            intent.index,
            intent.symbol,
            intent.direction,
            intent.size,
            intent.entry_price,
            intent.take_profit,
            intent.stop_loss
        );
        self.intents.push(intent);
        let idx = self.intents.len() - 1;
        Ok(&self.intents[idx])
    }

    fn place_legs(
        &self,
        exchange: &dyn FuturesExchange,
        intent: &mut TradeIntent,
    ) -> ExchangeResult<()> {
        let exit_side = intent.direction.exit_side();
        let symbol = intent.symbol.clone();

        let sl =
            OrderRequest::stop_market(symbol.clone(), exit_side, intent.size, intent.stop_loss);
        intent.sl_order_id = Some(exchange.place_order(sl.reduce_only())?.order_id);

        if intent.trailing_callback.is_none() {
            let tp = OrderRequest::take_profit(symbol, exit_side, intent.size, intent.take_profit);
            intent.tp_order_id = Some(exchange.place_order(tp.reduce_only())?.order_id);
        }
        Ok(())
    }

    /// Reconcile fills reported by `check_orders`.
    ///
    /// A fill on either leg cancels the other leg first, then closes the
    /// intent. Returns the intents closed by these fills.
    ///
    /// The fills are already off the book, so every intent they belong to is
    /// closed even when a sibling cancel fails. The first such failure is
    /// returned after all fills are reconciled.
    pub fn on_fills(
        &mut self,
        exchange: &dyn FuturesExchange,
        fills: &[FilledOrder],
    ) -> ExchangeResult<Vec<TradeIntent>> {
        let mut closed = Vec::new();
        let mut first_error = None;
        for fill in fills {
            let Some(intent) = self
                .intents
                .iter_mut()
                .find(|t| t.is_open() && t.symbol == fill.symbol && t.leg(fill.order_id).is_some())
            else {
                continue;
            };
            let Some((reason, sibling)) = intent.leg(fill.order_id) else {
                continue;
            };

            if let Some(sibling) = sibling {
                if let Err(err) = cancel_leg(exchange, &intent.symbol, sibling) {
                    warn!(
                        "Intent {} {}: cancelling sibling leg {} failed: {}",
                        intent.index, intent.symbol, sibling, err
                    );
                    first_error.get_or_insert(err);
                }
            }
            intent.close(reason, fill.fill_price);
            closed.push(intent.clone());
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(closed),
        }
    }

    /// Feed a tick to the open intent on `symbol`, closing it at market if its
    /// trailing stop fires.
    pub fn on_price(
        &mut self,
        exchange: &dyn FuturesExchange,
        symbol: &Symbol,
        price: Money,
    ) -> ExchangeResult<Option<TradeIntent>> {
        let Some(intent) = self.open_for_mut(symbol) else {
            return Ok(None);
        };
        intent.record_price(price);
        if !intent.trailing_stop_hit(price) {
            return Ok(None);
        }
        Self::exit_at_market(exchange, intent, ExitReason::TrailingStop, price)?;
        Ok(Some(intent.clone()))
    }

    /// Close the open intent on `symbol` at market, e.g. on an opposite signal
    pub fn close_manual(
        &mut self,
        exchange: &dyn FuturesExchange,
        symbol: &Symbol,
        price: Money,
    ) -> ExchangeResult<Option<TradeIntent>> {
        let Some(intent) = self.open_for_mut(symbol) else {
            return Ok(None);
        };
        Self::exit_at_market(exchange, intent, ExitReason::Manual, price)?;
        Ok(Some(intent.clone()))
    }

    fn exit_at_market(
        exchange: &dyn FuturesExchange,
        intent: &mut TradeIntent,
        reason: ExitReason,
        price: Money,
    ) -> ExchangeResult<()> {
        for id in [intent.tp_order_id, intent.sl_order_id].into_iter().flatten() {
            cancel_leg(exchange, &intent.symbol, id)?;
        }

        let close =
            OrderRequest::market(intent.symbol.clone(), intent.direction.exit_side(), intent.size);
        let exit_price = match exchange.place_order(close.reduce_only()) {
            Ok(ack) => ack.avg_price.unwrap_or(price),
            // Position already flat: nothing left to close
            Err(ExchangeError::InvalidOrder(msg)) => {
                warn!("Intent {} {}: {}", intent.index, intent.symbol, msg);
                price
            }
            Err(err) => return Err(err),
        };
        intent.close(reason, exit_price);
        Ok(())
    }
}
