//! Account ledger and position accounting
//!
//! One netted position per symbol with a signed amount (+long / -short) and a
//! quantity-weighted average entry price. Every fill pays commission; fills
//! against the position realize PnL on the closed quantity.
//!
//! Ledger invariant, checked by the tests with exact decimal equality:
//! `balance == initial_balance - total_commission + total_realized_pnl`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::oms::journal::TradeJournalEntry;
use crate::{Money, Side, Symbol, POSITION_EPSILON};

/// Netted position for one symbol
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionState {
    /// Signed quantity, positive for long
    pub amount: Money,
    /// Weighted average entry price, zero while flat
    pub entry_price: Money,
    /// Commission paid since the position was opened
    pub accrued_commission: Money,
}

impl PositionState {
    pub fn is_flat(&self) -> bool {
        self.amount.is_zero()
    }

    /// Unrealized PnL against `mark`, zero while flat
    pub fn unrealized_pnl(&self, mark: Money) -> Money {
        if self.amount.is_positive() {
            (mark - self.entry_price) * self.amount.abs()
        } else if self.amount.is_negative() {
            (self.entry_price - mark) * self.amount.abs()
        } else {
            Money::ZERO
        }
    }
}

/// Result of applying one fill to the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct FillOutcome {
    pub commission: Money,
    pub realized_pnl: Money,
    /// Quantity that reduced an existing position (zero for opening fills)
    pub closed_qty: Money,
    /// Present for fills that realized PnL
    pub journal_entry: Option<TradeJournalEntry>,
}

/// Balance, positions and lifetime totals for one paper-trading session
#[derive(Debug, Clone)]
pub struct AccountLedger {
    initial_balance: Money,
    balance: Money,
    total_commission: Money,
    total_realized_pnl: Money,
    positions: HashMap<Symbol, PositionState>,
}

impl AccountLedger {
    pub fn new(initial_balance: Money) -> Self {
        Self {
            initial_balance,
            balance: initial_balance,
            total_commission: Money::ZERO,
            total_realized_pnl: Money::ZERO,
            positions: HashMap::new(),
        }
    }

    pub fn initial_balance(&self) -> Money {
        self.initial_balance
    }

    pub fn balance(&self) -> Money {
        self.balance
    }

    pub fn total_commission(&self) -> Money {
        self.total_commission
    }

    pub fn total_realized_pnl(&self) -> Money {
        self.total_realized_pnl
    }

    /// Position for `symbol`, flat if the symbol has never traded
    pub fn position(&self, symbol: &Symbol) -> PositionState {
        self.positions.get(symbol).copied().unwrap_or_default()
    }

    /// All non-flat positions, sorted by symbol
    pub fn open_positions(&self) -> Vec<(Symbol, PositionState)> {
        let mut open: Vec<(Symbol, PositionState)> = self
            .positions
            .iter()
            .filter(|(_, p)| !p.is_flat())
            .map(|(s, p)| (s.clone(), *p))
            .collect();
        open.sort_by(|a, b| a.0.cmp(&b.0));
        open
    }

    /// Apply one fill of `qty` at `price` paying `fee_rate` commission.
    ///
    /// A fill larger than an opposite position closes it (realizing PnL on the
    /// closed part only) and opens a fresh position for the excess at the fill
    /// price, carrying this fill's commission as its accrued commission.
    pub fn apply_fill(
        &mut self,
        symbol: &Symbol,
        side: Side,
        qty: Money,
        price: Money,
        fee_rate: Money,
    ) -> FillOutcome {
        let mut pos = self.position(symbol);
        let current = pos.amount;

        let commission = price * qty * fee_rate;
        self.balance -= commission;
        self.total_commission += commission;
        pos.accrued_commission += commission;

        let new_amount = current + side.sign() * qty;
        let increasing = (current.is_positive() && side == Side::Buy)
            || (current.is_negative() && side == Side::Sell);

        let mut realized_pnl = Money::ZERO;
        let mut closed_qty = Money::ZERO;
        let mut journal_entry = None;

        if current.is_zero() {
            pos.entry_price = price;
        } else if increasing {
            pos.entry_price = (current.abs() * pos.entry_price + qty * price) / new_amount.abs();
        } else {
            closed_qty = current.abs().min(qty);
            let direction = if current.is_positive() {
                Money::ONE
            } else {
                -Money::ONE
            };
            realized_pnl = (price - pos.entry_price) * closed_qty * direction;
            self.balance += realized_pnl;
            self.total_realized_pnl += realized_pnl;

            journal_entry = Some(TradeJournalEntry {
                symbol: symbol.clone(),
                side,
                fill_price: price,
                quantity: closed_qty,
                realized_pnl,
                commission,
                timestamp: Utc::now(),
            });

            let flipped = (current.is_positive() && new_amount.is_negative())
                || (current.is_negative() && new_amount.is_positive());
            if flipped && new_amount.abs() >= POSITION_EPSILON {
                pos.entry_price = price;
                pos.accrued_commission = commission;
            }
        }

        if new_amount.abs() < POSITION_EPSILON {
            pos = PositionState::default();
        } else {
            pos.amount = new_amount;
        }
        self.positions.insert(symbol.clone(), pos);

        FillOutcome {
            commission,
            realized_pnl,
            closed_qty,
            journal_entry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(s: &str) -> Money {
        s.parse().unwrap()
    }

    fn btc() -> Symbol {
        Symbol::new("BTCUSDT")
    }

    fn assert_invariant(ledger: &AccountLedger) {
        assert_eq!(
            ledger.balance(),
            ledger.initial_balance() - ledger.total_commission() + ledger.total_realized_pnl()
        );
    }

    #[test]
    fn test_open_from_flat_sets_entry_to_fill_price() {
        let mut ledger = AccountLedger::new(m("10000"));
        let out = ledger.apply_fill(&btc(), Side::Buy, m("1"), m("50000"), m("0.0005"));

        assert_eq!(out.commission, m("25"));
        assert_eq!(out.realized_pnl, Money::ZERO);
        assert!(out.journal_entry.is_none());
        assert_eq!(ledger.balance(), m("9975"));

        let pos = ledger.position(&btc());
        assert_eq!(pos.amount, m("1"));
        assert_eq!(pos.entry_price, m("50000"));
        assert_eq!(pos.accrued_commission, m("25"));
    }

    #[test]
    fn test_increase_uses_weighted_average() {
        let mut ledger = AccountLedger::new(m("10000"));
        ledger.apply_fill(&btc(), Side::Buy, m("1"), m("50000"), Money::ZERO);
        ledger.apply_fill(&btc(), Side::Buy, m("3"), m("52000"), Money::ZERO);

        let pos = ledger.position(&btc());
        assert_eq!(pos.amount, m("4"));
        // (1*50000 + 3*52000) / 4
        assert_eq!(pos.entry_price, m("51500"));
    }

    #[test]
    fn test_short_increase_uses_weighted_average() {
        let mut ledger = AccountLedger::new(m("10000"));
        ledger.apply_fill(&btc(), Side::Sell, m("2"), m("3000"), Money::ZERO);
        ledger.apply_fill(&btc(), Side::Sell, m("2"), m("3100"), Money::ZERO);

        let pos = ledger.position(&btc());
        assert_eq!(pos.amount, m("-4"));
        assert_eq!(pos.entry_price, m("3050"));
    }

    #[test]
    fn test_partial_close_keeps_entry() {
        let mut ledger = AccountLedger::new(m("10000"));
        ledger.apply_fill(&btc(), Side::Buy, m("2"), m("50000"), Money::ZERO);
        let out = ledger.apply_fill(&btc(), Side::Sell, m("0.5"), m("52000"), Money::ZERO);

        assert_eq!(out.closed_qty, m("0.5"));
        assert_eq!(out.realized_pnl, m("1000"));
        let pos = ledger.position(&btc());
        assert_eq!(pos.amount, m("1.5"));
        assert_eq!(pos.entry_price, m("50000"));
    }

    #[test]
    fn test_short_close_realizes_inverse_pnl() {
        let mut ledger = AccountLedger::new(m("10000"));
        ledger.apply_fill(&btc(), Side::Sell, m("1"), m("50000"), Money::ZERO);
        let out = ledger.apply_fill(&btc(), Side::Buy, m("1"), m("48000"), Money::ZERO);

        assert_eq!(out.realized_pnl, m("2000"));
        assert!(ledger.position(&btc()).is_flat());
    }

    #[test]
    fn test_full_close_resets_position() {
        let mut ledger = AccountLedger::new(m("10000"));
        ledger.apply_fill(&btc(), Side::Buy, m("1"), m("50000"), m("0.0005"));
        let out = ledger.apply_fill(&btc(), Side::Sell, m("1"), m("51000"), m("0.0002"));

        assert_eq!(out.commission, m("10.2"));
        assert_eq!(out.realized_pnl, m("1000"));
        let entry = out.journal_entry.expect("closing fill is journaled");
        assert_eq!(entry.quantity, m("1"));
        assert_eq!(entry.fill_price, m("51000"));

        assert_eq!(ledger.position(&btc()), PositionState::default());
        assert_eq!(ledger.balance(), m("10000") - m("25") + m("1000") - m("10.2"));
        assert_invariant(&ledger);
    }

    #[test]
    fn test_dust_below_epsilon_is_reset() {
        let mut ledger = AccountLedger::new(m("10000"));
        ledger.apply_fill(&btc(), Side::Buy, m("1.000000001"), m("100"), Money::ZERO);
        ledger.apply_fill(&btc(), Side::Sell, m("1"), m("100"), Money::ZERO);

        let pos = ledger.position(&btc());
        assert_eq!(pos.amount, Money::ZERO);
        assert_eq!(pos.entry_price, Money::ZERO);
        assert!(ledger.open_positions().is_empty());
    }

    #[test]
    fn test_flip_opens_fresh_position_at_fill_price() {
        let mut ledger = AccountLedger::new(m("10000"));
        ledger.apply_fill(&btc(), Side::Buy, m("1"), m("50000"), Money::ZERO);
        let out = ledger.apply_fill(&btc(), Side::Sell, m("3"), m("52000"), m("0.0005"));

        // PnL only on the closed unit
        assert_eq!(out.closed_qty, m("1"));
        assert_eq!(out.realized_pnl, m("2000"));

        let pos = ledger.position(&btc());
        assert_eq!(pos.amount, m("-2"));
        assert_eq!(pos.entry_price, m("52000"));
        assert_eq!(pos.accrued_commission, out.commission);
        assert_invariant(&ledger);

        // Closing the flipped short is priced from the fresh entry
        let close = ledger.apply_fill(&btc(), Side::Buy, m("2"), m("51000"), Money::ZERO);
        assert_eq!(close.realized_pnl, m("2000"));
        assert!(ledger.position(&btc()).is_flat());
    }

    #[test]
    fn test_unrealized_pnl_by_direction() {
        let long = PositionState {
            amount: m("2"),
            entry_price: m("100"),
            accrued_commission: Money::ZERO,
        };
        assert_eq!(long.unrealized_pnl(m("110")), m("20"));

        let short = PositionState {
            amount: m("-2"),
            entry_price: m("100"),
            accrued_commission: Money::ZERO,
        };
        assert_eq!(short.unrealized_pnl(m("110")), m("-20"));
        assert_eq!(PositionState::default().unrealized_pnl(m("110")), Money::ZERO);
    }

    #[test]
    fn test_invariant_over_mixed_sequence() {
        let mut ledger = AccountLedger::new(m("10000"));
        let fills = [
            (Side::Buy, "0.3", "50010.5", "0.0005"),
            (Side::Buy, "0.2", "49870.25", "0.0002"),
            (Side::Sell, "0.1", "50500", "0.0002"),
            (Side::Sell, "0.9", "50100.1", "0.0005"),
            (Side::Buy, "0.5", "49000", "0.0005"),
            (Side::Sell, "0.123", "49999.99", "0.0002"),
        ];
        for (side, qty, price, fee) in fills {
            ledger.apply_fill(&btc(), side, m(qty), m(price), m(fee));
            assert_invariant(&ledger);
        }
    }
}
