//! Paper-trading exchange
//!
//! Reproduces futures-exchange semantics locally: wallet balance, netted
//! positions with weighted-average entry, resting-order triggering on price
//! ticks, maker/taker commission and realized-PnL bookkeeping.
//!
//! Ticks for different symbols arrive from independent tasks. Every mutating
//! call takes one write guard over the whole engine state, so two symbols can
//! never update the balance concurrently; snapshots take the read guard.
//! Durable journal mirroring is queued to a writer thread, so a slow disk
//! never holds the guard.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

use crate::config::PaperConfig;
use crate::error::{ExchangeError, ExchangeResult};
use crate::exchange::{AccountSummary, FuturesExchange, PositionRecord};
use crate::market::PriceFeed;
use crate::oms::{
    AccountLedger, FeeSchedule, FilledOrder, JournalSink, JournalWriter, OrderAck, OrderBook,
    OrderId, OrderRequest, OrderStatus, OrderType, PositionState, RestingOrder,
    TradeJournalEntry, FIRST_ORDER_ID,
};
use crate::{Money, Side, Symbol};

struct EngineState {
    ledger: AccountLedger,
    book: OrderBook,
    journal: Vec<TradeJournalEntry>,
    last_order_id: OrderId,
    leverage: HashMap<Symbol, u32>,
}

impl EngineState {
    fn next_order_id(&mut self) -> OrderId {
        self.last_order_id += 1;
        self.last_order_id
    }

    /// Apply a fill and journal it if it realized PnL
    fn fill(
        &mut self,
        symbol: &Symbol,
        side: Side,
        qty: Money,
        price: Money,
        fee_rate: Money,
        pending: &mut Vec<TradeJournalEntry>,
    ) -> (Money, Money) {
        let outcome = self.ledger.apply_fill(symbol, side, qty, price, fee_rate);
        if let Some(entry) = outcome.journal_entry {
            info!(
                "PaperTrading - Trade Executed: {} {} @ {}. PnL: {}. Comm: {}. New Balance: {}",
                symbol,
                side,
                price,
                entry.realized_pnl.round_dp(2),
                entry.commission.round_dp(4),
                self.ledger.balance().round_dp(2)
            );
            self.journal.push(entry.clone());
            pending.push(entry);
        }
        (outcome.realized_pnl, outcome.commission)
    }
}

/// Point-in-time ledger totals
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedgerSnapshot {
    pub initial_balance: Money,
    pub balance: Money,
    pub total_commission: Money,
    pub total_realized_pnl: Money,
}

pub struct PaperExchange {
    state: RwLock<EngineState>,
    prices: Arc<dyn PriceFeed>,
    fees: FeeSchedule,
    default_leverage: u32,
    journal_writer: Option<JournalWriter>,
}

impl PaperExchange {
    pub fn new(config: &PaperConfig, prices: Arc<dyn PriceFeed>) -> Self {
        Self::with_fees(
            config.initial_balance(),
            config.fee_schedule(),
            config.leverage,
            prices,
        )
    }

    pub fn with_fees(
        initial_balance: Money,
        fees: FeeSchedule,
        default_leverage: u32,
        prices: Arc<dyn PriceFeed>,
    ) -> Self {
        info!(
            "Paper exchange started: balance={}, maker={}, taker={}",
            initial_balance, fees.maker, fees.taker
        );
        Self {
            state: RwLock::new(EngineState {
                ledger: AccountLedger::new(initial_balance),
                book: OrderBook::new(),
                journal: Vec::new(),
                last_order_id: FIRST_ORDER_ID,
                leverage: HashMap::new(),
            }),
            prices,
            fees,
            default_leverage,
            journal_writer: None,
        }
    }

    /// Mirror every journal entry to `sink` from now on, on a writer thread
    pub fn with_journal_sink(mut self, sink: Box<dyn JournalSink>) -> Self {
        self.journal_writer = Some(JournalWriter::spawn(sink));
        self
    }

    /// Snapshot of the append-only trade journal
    pub fn journal(&self) -> Vec<TradeJournalEntry> {
        self.read().journal.clone()
    }

    pub fn ledger(&self) -> LedgerSnapshot {
        let state = self.read();
        LedgerSnapshot {
            initial_balance: state.ledger.initial_balance(),
            balance: state.ledger.balance(),
            total_commission: state.ledger.total_commission(),
            total_realized_pnl: state.ledger.total_realized_pnl(),
        }
    }

    /// Block until every queued journal entry has reached the durable mirror
    pub fn flush_journal(&self) {
        if let Some(writer) = &self.journal_writer {
            writer.flush();
        }
    }

    /// Number of journal entries the durable mirror failed to write.
    ///
    /// Waits for queued writes first so the count covers every fill so far.
    pub fn journal_failures(&self) -> u64 {
        self.flush_journal();
        self.journal_writer.as_ref().map_or(0, JournalWriter::failures)
    }

    fn read(&self) -> RwLockReadGuard<'_, EngineState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, EngineState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `entries` for the durable mirror, then release the state guard.
    ///
    /// Entries are queued while the guard is held, so concurrent ticks reach
    /// the mirror in the same order as the in-memory journal. Queueing never
    /// waits on I/O.
    fn release_and_mirror(
        &self,
        state: RwLockWriteGuard<'_, EngineState>,
        entries: Vec<TradeJournalEntry>,
    ) {
        if let Some(writer) = &self.journal_writer {
            for entry in entries {
                writer.send(entry);
            }
        }
        drop(state);
    }

    fn position_record(
        &self,
        symbol: &Symbol,
        pos: PositionState,
        leverage: u32,
    ) -> ExchangeResult<PositionRecord> {
        let mark_price = if pos.is_flat() {
            self.prices.mark_price(symbol).ok()
        } else {
            Some(self.prices.mark_price(symbol)?)
        };
        let (unrealized_pnl, notional) = match mark_price {
            Some(mark) => (pos.unrealized_pnl(mark), pos.amount * mark),
            None => (Money::ZERO, Money::ZERO),
        };
        Ok(PositionRecord {
            symbol: symbol.clone(),
            position_amt: pos.amount,
            entry_price: pos.entry_price,
            mark_price,
            unrealized_pnl,
            notional,
            leverage,
            liquidation_price: Money::ZERO,
            accrued_commission: pos.accrued_commission,
        })
    }

    /// Fill a triggered resting order, honouring reduce-only.
    ///
    /// Returns `None` when a reduce-only order has nothing left to reduce and
    /// expires instead of filling.
    fn execute_resting(
        &self,
        state: &mut EngineState,
        order: RestingOrder,
        price: Money,
        pending: &mut Vec<TradeJournalEntry>,
    ) -> Option<FilledOrder> {
        let mut qty = order.quantity;
        if order.reduce_only {
            let current = state.ledger.position(&order.symbol).amount;
            let reduces = (current.is_positive() && order.side == Side::Sell)
                || (current.is_negative() && order.side == Side::Buy);
            if !reduces {
                warn!(
                    "PaperTrading - Reduce-only order {} expired: {} {} has no position to reduce",
                    order.id, order.symbol, order.side
                );
                return None;
            }
            qty = qty.min(current.abs());
        }

        let fee_rate = self.fees.rate_for(order.order_type);
        let (realized_pnl, commission) =
            state.fill(&order.symbol, order.side, qty, price, fee_rate, pending);

        debug!(
            "PaperTrading - Order {} triggered: {} {} {} qty={} @ {}",
            order.id, order.symbol, order.order_type, order.side, qty, price
        );

        Some(FilledOrder {
            order_id: order.id,
            symbol: order.symbol,
            side: order.side,
            order_type: order.order_type,
            fill_price: price,
            quantity: qty,
            realized_pnl,
            commission,
        })
    }
}

impl FuturesExchange for PaperExchange {
    fn balance(&self) -> ExchangeResult<Money> {
        Ok(self.read().ledger.balance())
    }

    fn account(&self) -> ExchangeResult<AccountSummary> {
        let balance = self.read().ledger.balance();
        Ok(AccountSummary {
            total_margin_balance: balance,
            total_wallet_balance: balance,
            available_balance: balance,
        })
    }

    fn positions(&self, symbol: Option<&Symbol>) -> ExchangeResult<Vec<PositionRecord>> {
        // Copy what we need, then price it outside the lock
        let (snapshot, leverage) = {
            let state = self.read();
            let snapshot = match symbol {
                Some(s) => vec![(s.clone(), state.ledger.position(s))],
                None => state.ledger.open_positions(),
            };
            (snapshot, state.leverage.clone())
        };

        snapshot
            .into_iter()
            .map(|(s, pos)| {
                let lev = leverage.get(&s).copied().unwrap_or(self.default_leverage);
                self.position_record(&s, pos, lev)
            })
            .collect()
    }

    fn open_orders(&self, symbol: Option<&Symbol>) -> ExchangeResult<Vec<RestingOrder>> {
        Ok(self.read().book.snapshot(symbol))
    }

    fn place_order(&self, request: OrderRequest) -> ExchangeResult<OrderAck> {
        request.validate()?;

        if request.order_type == OrderType::Market {
            // Price lookup happens before any mutation so a missing price leaves no trace
            let price = self.prices.mark_price(&request.symbol)?;
            let mut state = self.write();

            let mut qty = request.quantity;
            if request.reduce_only {
                let current = state.ledger.position(&request.symbol).amount;
                let reduces = (current.is_positive() && request.side == Side::Sell)
                    || (current.is_negative() && request.side == Side::Buy);
                if !reduces {
                    return Err(ExchangeError::InvalidOrder(format!(
                        "reduce-only {} on {} would open a position",
                        request.side, request.symbol
                    )));
                }
                qty = qty.min(current.abs());
            }

            let order_id = state.next_order_id();
            let mut pending = Vec::new();
            state.fill(
                &request.symbol,
                request.side,
                qty,
                price,
                self.fees.taker,
                &mut pending,
            );
            info!(
                "PaperTrading - Market Order Filled: {} {} qty={} @ {}",
                request.symbol, request.side, qty, price
            );
            self.release_and_mirror(state, pending);

            return Ok(OrderAck {
                order_id,
                symbol: request.symbol,
                status: OrderStatus::Filled,
                avg_price: Some(price),
                executed_qty: qty,
                cum_quote: price * qty,
            });
        }

        let mut state = self.write();
        let order_id = state.next_order_id();
        let order = RestingOrder::from_request(order_id, request);
        info!(
            "PaperTrading - Order Placed: {} {} {} Qty:{} Price:{} Stop:{}",
            order.symbol,
            order.side,
            order.order_type,
            order.quantity,
            order.limit_price,
            order.stop_price
        );
        let ack = OrderAck {
            order_id,
            symbol: order.symbol.clone(),
            status: OrderStatus::New,
            avg_price: None,
            executed_qty: Money::ZERO,
            cum_quote: Money::ZERO,
        };
        state.book.insert(order);
        Ok(ack)
    }

    fn cancel_order(&self, symbol: &Symbol, order_id: OrderId) -> ExchangeResult<()> {
        let mut state = self.write();
        match state.book.get(order_id) {
            Some(order) if &order.symbol == symbol => {
                state.book.remove(order_id);
                debug!("PaperTrading - Order {} cancelled", order_id);
                Ok(())
            }
            _ => Err(ExchangeError::UnknownOrder(order_id)),
        }
    }

    fn cancel_all_open_orders(&self, symbol: Option<&Symbol>) -> ExchangeResult<()> {
        let removed = self.write().book.remove_all(symbol);
        if !removed.is_empty() {
            debug!("PaperTrading - Cancelled orders {:?}", removed);
        }
        Ok(())
    }

    fn change_leverage(&self, symbol: &Symbol, leverage: u32) -> ExchangeResult<()> {
        if leverage == 0 {
            return Err(ExchangeError::InvalidOrder("leverage must be >= 1".to_string()));
        }
        self.write().leverage.insert(symbol.clone(), leverage);
        Ok(())
    }

    fn check_orders(&self, symbol: &Symbol, price: Money) -> ExchangeResult<Vec<FilledOrder>> {
        if !price.is_positive() {
            return Err(ExchangeError::MarketDataUnavailable {
                symbol: symbol.to_string(),
            });
        }

        let mut state = self.write();
        let mut filled = Vec::new();
        let mut pending = Vec::new();

        for id in state.book.triggered(symbol, price) {
            let Some(order) = state.book.remove(id) else {
                continue;
            };
            if let Some(fill) = self.execute_resting(&mut state, order, price, &mut pending) {
                filled.push(fill);
            }
        }

        self.release_and_mirror(state, pending);
        Ok(filled)
    }
}
