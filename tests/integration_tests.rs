//! Integration tests for the paper exchange
//!
//! These drive the public `FuturesExchange` surface the way a strategy would.

use rust_decimal_macros::dec;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use futures_paper_trader::intent::{
    BracketPlan, ExitReason, IntentStatus, IntentTracker, TpSlRule, TpSlUnit, TradeDirection,
};
use futures_paper_trader::oms::{
    load_json_journal, load_sqlite_journal, FeeSchedule, JsonFileSink, OrderRequest, OrderType,
    SqliteSink,
};
use futures_paper_trader::{
    ExchangeError, FuturesExchange, Money, PaperExchange, PriceBoard, Side, Symbol,
};

// =============================================================================
// Test Utilities
// =============================================================================

fn m(s: &str) -> Money {
    s.parse().unwrap()
}

fn new_engine(balance: &str) -> (PaperExchange, Arc<PriceBoard>) {
    let board = Arc::new(PriceBoard::new());
    let exchange = PaperExchange::with_fees(m(balance), FeeSchedule::default(), 10, board.clone());
    (exchange, board)
}

fn btc() -> Symbol {
    Symbol::new("BTCUSDT")
}

fn assert_ledger_invariant(exchange: &PaperExchange) {
    let l = exchange.ledger();
    assert_eq!(
        l.balance,
        l.initial_balance - l.total_commission + l.total_realized_pnl,
        "balance drifted from initial - commission + realized"
    );
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_scenario_a_market_buy_from_flat() {
    let (ex, board) = new_engine("10000");
    board.update(&btc(), m("50000"));

    let ack = ex.place_order(OrderRequest::market(btc(), Side::Buy, m("1"))).unwrap();
    assert_eq!(ack.avg_price, Some(m("50000")));
    assert_eq!(ack.executed_qty, m("1"));
    assert_eq!(ack.cum_quote, m("50000"));

    assert_eq!(ex.balance().unwrap(), m("9975"));
    let pos = &ex.positions(Some(&btc())).unwrap()[0];
    assert_eq!(pos.position_amt, m("1"));
    assert_eq!(pos.entry_price, m("50000"));
    assert_eq!(pos.accrued_commission, m("25"));
}

#[test]
fn test_scenario_b_limit_sell_closes_at_maker_fee() {
    let (ex, board) = new_engine("10000");
    board.update(&btc(), m("50000"));
    ex.place_order(OrderRequest::market(btc(), Side::Buy, m("1"))).unwrap();
    let before = ex.balance().unwrap();

    let ack = ex
        .place_order(OrderRequest::limit(btc(), Side::Sell, m("1"), m("51000")))
        .unwrap();
    // Resting: no effect yet
    assert_eq!(ex.balance().unwrap(), before);

    board.update(&btc(), m("51000"));
    let fills = ex.check_orders(&btc(), m("51000")).unwrap();
    assert_eq!(fills.len(), 1);
    let fill = &fills[0];
    assert_eq!(fill.order_id, ack.order_id);
    assert_eq!(fill.fill_price, m("51000"));
    assert_eq!(fill.commission, m("10.2"));
    assert_eq!(fill.realized_pnl, m("1000"));
    assert_eq!(fill.net_pnl(), m("989.8"));

    assert_eq!(ex.balance().unwrap(), before + m("989.8"));
    let pos = &ex.positions(Some(&btc())).unwrap()[0];
    assert!(pos.is_flat());
    assert_eq!(pos.entry_price, Money::ZERO);
    assert_eq!(pos.accrued_commission, Money::ZERO);

    let journal = ex.journal();
    assert_eq!(journal.len(), 1);
    assert_eq!(journal[0].quantity, m("1"));
    assert_eq!(journal[0].realized_pnl, m("1000"));
    assert_ledger_invariant(&ex);
}

#[test]
fn test_scenario_c_stop_fills_at_tick_price() {
    let (ex, board) = new_engine("10000");
    board.update(&btc(), m("50000"));
    ex.place_order(OrderRequest::market(btc(), Side::Buy, m("1"))).unwrap();
    ex.place_order(OrderRequest::stop_market(btc(), Side::Sell, m("0.5"), m("49000")))
        .unwrap();

    assert!(ex.check_orders(&btc(), m("49100")).unwrap().is_empty());

    board.update(&btc(), m("48900"));
    let fills = ex.check_orders(&btc(), m("48900")).unwrap();
    assert_eq!(fills.len(), 1);
    assert_eq!(fills[0].fill_price, m("48900"));
    assert_eq!(fills[0].quantity, m("0.5"));
    assert_eq!(fills[0].realized_pnl, m("-550"));
    assert_eq!(fills[0].commission, m("12.225"));

    let pos = &ex.positions(Some(&btc())).unwrap()[0];
    assert_eq!(pos.position_amt, m("0.5"));
    assert_eq!(pos.entry_price, m("50000"));
    assert_ledger_invariant(&ex);
}

#[test]
fn test_scenario_d_unknown_symbol_reports_flat_record() {
    let (ex, _board) = new_engine("10000");
    let eth = Symbol::new("ETHUSDT");

    let positions = ex.positions(Some(&eth)).unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].symbol, eth);
    assert_eq!(positions[0].position_amt, Money::ZERO);
    assert_eq!(positions[0].entry_price, Money::ZERO);
    assert_eq!(positions[0].unrealized_pnl, Money::ZERO);

    assert!(ex.positions(None).unwrap().is_empty());
}

// =============================================================================
// Properties
// =============================================================================

#[test]
fn test_balance_invariant_over_mixed_fills() {
    let (ex, board) = new_engine("25000");
    let prices = ["100", "101.5", "99.25", "103", "97.8", "100.01", "104.4", "95"];
    let mut expected_commission = Money::ZERO;

    for (i, p) in prices.iter().enumerate() {
        board.update(&btc(), m(p));
        let side = if i % 3 == 2 { Side::Sell } else { Side::Buy };
        let qty = m(&format!("{}.{}", i % 4 + 1, i));
        ex.place_order(OrderRequest::market(btc(), side, qty)).unwrap();
        expected_commission += m(p) * qty * m("0.0005");
        assert_ledger_invariant(&ex);
    }

    let l = ex.ledger();
    assert_eq!(l.total_commission, expected_commission);
    let realized: Money = ex.journal().iter().map(|e| e.realized_pnl).sum();
    assert_eq!(l.total_realized_pnl, realized);
}

#[test]
fn test_increasing_position_moves_entry_between_prices() {
    let (ex, board) = new_engine("100000");
    board.update(&btc(), m("100"));
    ex.place_order(OrderRequest::market(btc(), Side::Sell, m("2"))).unwrap();
    board.update(&btc(), m("90"));
    ex.place_order(OrderRequest::market(btc(), Side::Sell, m("1"))).unwrap();

    let pos = &ex.positions(Some(&btc())).unwrap()[0];
    assert_eq!(pos.position_amt, m("-3"));
    assert!(pos.entry_price > m("90") && pos.entry_price < m("100"));
    // (2*100 + 1*90) / 3
    assert_eq!(pos.entry_price.round_dp(8), m("96.66666667"));
}

#[test]
fn test_flip_opens_fresh_position_at_fill_price() {
    let (ex, board) = new_engine("10000");
    board.update(&btc(), m("100"));
    ex.place_order(OrderRequest::market(btc(), Side::Buy, m("1"))).unwrap();

    board.update(&btc(), m("110"));
    ex.place_order(OrderRequest::market(btc(), Side::Sell, m("3"))).unwrap();

    let journal = ex.journal();
    assert_eq!(journal.len(), 1);
    assert_eq!(journal[0].quantity, m("1"));
    assert_eq!(journal[0].realized_pnl, m("10"));

    let pos = &ex.positions(Some(&btc())).unwrap()[0];
    assert_eq!(pos.position_amt, m("-2"));
    assert_eq!(pos.entry_price, m("110"));
    assert_eq!(pos.accrued_commission, m("0.165"));
    assert_ledger_invariant(&ex);
}

#[test]
fn test_check_orders_reports_each_id_once() {
    let (ex, board) = new_engine("10000");
    board.update(&btc(), m("100"));
    ex.place_order(OrderRequest::market(btc(), Side::Buy, m("3"))).unwrap();

    let a = ex.place_order(OrderRequest::limit(btc(), Side::Sell, m("1"), m("101"))).unwrap();
    let b = ex
        .place_order(OrderRequest::take_profit(btc(), Side::Sell, m("1"), m("102")))
        .unwrap();
    let c = ex.place_order(OrderRequest::limit(btc(), Side::Buy, m("1"), m("95"))).unwrap();
    let eth = ex
        .place_order(OrderRequest::limit(Symbol::new("ETHUSDT"), Side::Sell, m("1"), m("1")))
        .unwrap();

    let fills = ex.check_orders(&btc(), m("102")).unwrap();
    let ids: Vec<_> = fills.iter().map(|f| f.order_id).collect();
    // Ascending id order
    assert_eq!(ids, vec![a.order_id, b.order_id]);
    assert_eq!(fills[0].order_type, OrderType::Limit);
    assert_eq!(fills[0].commission, m("102") * m("0.0002"));
    assert_eq!(fills[1].commission, m("102") * m("0.0005"));

    let open: HashSet<_> = ex.open_orders(None).unwrap().iter().map(|o| o.id).collect();
    assert_eq!(open, HashSet::from([c.order_id, eth.order_id]));

    assert!(ex.check_orders(&btc(), m("102")).unwrap().is_empty());
}

#[test]
fn test_invalid_orders_leave_ledger_unchanged() {
    let (ex, board) = new_engine("10000");
    board.update(&btc(), m("100"));

    let bad = [
        OrderRequest::market(btc(), Side::Buy, m("0")),
        OrderRequest::limit(btc(), Side::Buy, m("1"), m("0")),
        OrderRequest::limit(btc(), Side::Buy, m("-1"), m("100")),
        OrderRequest::stop_market(btc(), Side::Sell, m("1"), m("-5")),
        OrderRequest {
            stop_price: None,
            ..OrderRequest::take_profit(btc(), Side::Sell, m("1"), m("110"))
        },
    ];
    for req in bad {
        assert!(matches!(ex.place_order(req), Err(ExchangeError::InvalidOrder(_))));
    }
    assert!(matches!("ICEBERG".parse::<OrderType>(), Err(ExchangeError::InvalidOrder(_))));
    assert!(matches!("HOLD".parse::<Side>(), Err(ExchangeError::InvalidOrder(_))));

    assert_eq!(ex.balance().unwrap(), m("10000"));
    assert!(ex.open_orders(None).unwrap().is_empty());

    // Ids were not consumed by rejected requests
    let ack = ex.place_order(OrderRequest::limit(btc(), Side::Buy, m("1"), m("90"))).unwrap();
    assert_eq!(ack.order_id, 1001);
}

#[test]
fn test_cancel_all_is_idempotent_and_filters_by_symbol() {
    let (ex, _board) = new_engine("10000");
    let eth = Symbol::new("ETHUSDT");
    ex.place_order(OrderRequest::limit(btc(), Side::Buy, m("1"), m("90"))).unwrap();
    ex.place_order(OrderRequest::limit(eth.clone(), Side::Buy, m("1"), m("9"))).unwrap();

    ex.cancel_all_open_orders(Some(&btc())).unwrap();
    assert_eq!(ex.open_orders(None).unwrap().len(), 1);
    assert_eq!(ex.open_orders(Some(&eth)).unwrap().len(), 1);

    ex.cancel_all_open_orders(None).unwrap();
    ex.cancel_all_open_orders(None).unwrap();
    assert!(ex.open_orders(None).unwrap().is_empty());
}

#[test]
fn test_account_mirrors_balance() {
    let (ex, board) = new_engine("10000");
    board.update(&btc(), m("200"));
    ex.place_order(OrderRequest::market(btc(), Side::Buy, m("1"))).unwrap();

    let account = ex.account().unwrap();
    assert_eq!(account.total_wallet_balance, m("9999.9"));
    assert_eq!(account.total_margin_balance, account.total_wallet_balance);
    assert_eq!(account.available_balance, account.total_wallet_balance);
}

// =============================================================================
// Reduce-only and OCO
// =============================================================================

#[test]
fn test_reduce_only_legs_never_flip() {
    let (ex, board) = new_engine("10000");
    board.update(&btc(), m("100"));
    ex.place_order(OrderRequest::market(btc(), Side::Buy, m("1"))).unwrap();

    // Both legs ask for the full size and both trigger on the same tick
    ex.place_order(OrderRequest::stop_market(btc(), Side::Sell, m("1"), m("99")).reduce_only())
        .unwrap();
    ex.place_order(OrderRequest::limit(btc(), Side::Sell, m("1"), m("98")).reduce_only())
        .unwrap();

    let fills = ex.check_orders(&btc(), m("99")).unwrap();
    assert_eq!(fills.len(), 1);
    assert!(ex.positions(Some(&btc())).unwrap()[0].is_flat());
    // The second leg had nothing left to reduce and expired
    assert!(ex.open_orders(None).unwrap().is_empty());
    assert_ledger_invariant(&ex);
}

#[test]
fn test_oco_bracket_through_public_api() {
    let (ex, board) = new_engine("10000");
    let mut tracker = IntentTracker::new();
    board.update(&btc(), m("20000"));

    tracker
        .open_bracket(
            &ex,
            BracketPlan {
                index: 0,
                symbol: btc(),
                direction: TradeDirection::Long,
                size: m("0.015"),
                rule: TpSlRule {
                    unit: TpSlUnit::Usdt,
                    tp_mult: m("3"),
                    sl_mult: m("1.5"),
                },
                trailing_callback: None,
                tick_size: None,
            },
        )
        .unwrap();
    let intent = tracker.open_for(&btc()).unwrap().clone();
    // 3 USDT / 0.015 = 200, 1.5 / 0.015 = 100
    assert_eq!(intent.take_profit, m("20200"));
    assert_eq!(intent.stop_loss, m("19900"));

    board.update(&btc(), m("19890"));
    let fills = ex.check_orders(&btc(), m("19890")).unwrap();
    assert_eq!(fills.len(), 1);
    assert_eq!(Some(fills[0].order_id), intent.sl_order_id);

    let closed = tracker.on_fills(&ex, &fills).unwrap();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].status, IntentStatus::Closed(ExitReason::StopLoss));
    assert!(ex.open_orders(None).unwrap().is_empty());

    // A replayed fill report is ignored once the intent is closed
    assert!(tracker.on_fills(&ex, &fills).unwrap().is_empty());
    assert_ledger_invariant(&ex);
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_concurrent_ticks_on_two_symbols_keep_ledger_consistent() {
    let (ex, board) = new_engine("1000000");
    let ex = Arc::new(ex);
    let symbols = [btc(), Symbol::new("ETHUSDT")];

    let handles: Vec<_> = symbols
        .iter()
        .cloned()
        .enumerate()
        .map(|(n, symbol)| {
            let ex = Arc::clone(&ex);
            let board = Arc::clone(&board);
            thread::spawn(move || {
                let base = Money::from_i64(if n == 0 { 500 } else { 50 });
                for i in 0..200i64 {
                    let price = base + Money::from_i64(i % 7);
                    board.update(&symbol, price);
                    ex.check_orders(&symbol, price).unwrap();
                    let side = if i % 2 == 0 { Side::Buy } else { Side::Sell };
                    ex.place_order(OrderRequest::market(symbol.clone(), side, m("1"))).unwrap();
                    if i % 10 == 0 {
                        let (bid_px, ask_px) = (base + m("1"), base + m("5"));
                        let bid = OrderRequest::limit(symbol.clone(), Side::Buy, m("1"), bid_px);
                        let ask = OrderRequest::limit(symbol.clone(), Side::Sell, m("1"), ask_px);
                        ex.place_order(bid).unwrap();
                        ex.place_order(ask).unwrap();
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_ledger_invariant(&ex);
    let l = ex.ledger();
    let journal = ex.journal();
    let realized: Money = journal.iter().map(|e| e.realized_pnl).sum();
    assert_eq!(l.total_realized_pnl, realized);

    // Ids handed out across both threads are unique
    let ids: Vec<_> = ex.open_orders(None).unwrap().iter().map(|o| o.id).collect();
    let unique: HashSet<_> = ids.iter().collect();
    assert_eq!(ids.len(), unique.len());
}

// =============================================================================
// Journal mirroring
// =============================================================================

fn round_trip(ex: &PaperExchange, board: &PriceBoard) {
    board.update(&btc(), m("100"));
    ex.place_order(OrderRequest::market(btc(), Side::Buy, m("2"))).unwrap();
    board.update(&btc(), m("105"));
    ex.place_order(OrderRequest::market(btc(), Side::Sell, m("1"))).unwrap();
    board.update(&btc(), m("95"));
    ex.place_order(OrderRequest::market(btc(), Side::Sell, m("1"))).unwrap();
}

#[test]
fn test_json_sink_mirrors_journal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trades_demo.json");
    let (ex, board) = new_engine("10000");
    let ex = ex.with_journal_sink(Box::new(JsonFileSink::open(&path).unwrap()));

    round_trip(&ex, &board);
    ex.flush_journal();

    let stored = load_json_journal(&path).unwrap();
    assert_eq!(stored, ex.journal());
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].realized_pnl, m("5"));
    assert_eq!(stored[1].realized_pnl, m("-5"));
    assert_eq!(ex.journal_failures(), 0);
}

#[test]
fn test_sqlite_sink_mirrors_journal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("journal.db");
    let (ex, board) = new_engine("10000");
    let ex = ex.with_journal_sink(Box::new(SqliteSink::open(&path).unwrap()));

    round_trip(&ex, &board);
    // Dropping the engine drains the writer thread
    drop(ex);

    let stored = load_sqlite_journal(&path).unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].fill_price, m("105"));
    assert_eq!(stored[1].fill_price, m("95"));
    assert_eq!(stored[1].commission, Money::from_decimal(dec!(0.0475)));
}

#[test]
fn test_unwritable_json_sink_never_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trades_demo.json");
    let (ex, board) = new_engine("10000");
    let ex = ex.with_journal_sink(Box::new(JsonFileSink::open(&path).unwrap()));

    // Replace the target with a directory so every rewrite fails
    std::fs::create_dir(&path).unwrap();
    round_trip(&ex, &board);

    assert_eq!(ex.journal().len(), 2);
    assert_eq!(ex.journal_failures(), 2);
    assert!(ex.positions(Some(&btc())).unwrap()[0].is_flat());
    assert_ledger_invariant(&ex);
}

#[test]
fn test_missing_price_is_reported_not_fatal() {
    let (ex, board) = new_engine("10000");
    let eth = Symbol::new("ETHUSDT");

    assert!(matches!(
        ex.place_order(OrderRequest::market(eth.clone(), Side::Buy, m("1"))),
        Err(ExchangeError::MarketDataUnavailable { .. })
    ));

    board.update(&eth, m("2000"));
    ex.place_order(OrderRequest::market(eth, Side::Buy, m("1"))).unwrap();
    assert_eq!(ex.balance().unwrap(), m("9999"));
}
