//! Tick replay driver
//!
//! Feeds recorded prices through the paper exchange the way live market-data
//! streams would: one tokio task per symbol, all sharing one engine. Each tick
//! updates the price board, triggers resting orders, reconciles the symbol's
//! trade intents and acts on an optional entry signal.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::ExchangeResult;
use crate::exchange::{FuturesExchange, PositionRecord};
use crate::intent::{BracketPlan, IntentTracker, TpSlRule, TradeDirection, TradeIntent};
use crate::market::PriceBoard;
use crate::oms::JournalSummary;
use crate::paper::{LedgerSnapshot, PaperExchange};
use crate::{Money, Symbol};

/// One recorded price, optionally carrying an entry signal
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub timestamp: DateTime<Utc>,
    pub symbol: Symbol,
    pub price: Money,
    pub signal: Option<TradeDirection>,
}

fn parse_signal(raw: &str) -> Result<Option<TradeDirection>> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "" => Ok(None),
        "LONG" | "BUY" => Ok(Some(TradeDirection::Long)),
        "SHORT" | "SELL" => Ok(Some(TradeDirection::Short)),
        other => anyhow::bail!("Unknown signal '{}'", other),
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
        })
        .with_context(|| format!("Failed to parse timestamp: {}", raw))
}

/// Load ticks from a CSV with columns `timestamp,symbol,price[,signal]`
pub fn load_ticks(path: impl AsRef<Path>) -> Result<Vec<Tick>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open tick file {}", path.display()))?;

    let mut ticks = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;

        let timestamp = parse_timestamp(record.get(0).context("Missing timestamp column")?)?;
        let symbol = Symbol::new(record.get(1).context("Missing symbol column")?);
        let price: Money = record
            .get(2)
            .context("Missing price column")?
            .parse()
            .with_context(|| format!("Failed to parse price on row {}", row_idx + 1))?;
        let signal = parse_signal(record.get(3).unwrap_or(""))?;

        ticks.push(Tick {
            timestamp,
            symbol,
            price,
            signal,
        });
    }

    info!("Loaded {} ticks from {}", ticks.len(), path.display());
    Ok(ticks)
}

/// Split ticks into per-symbol streams, keeping each stream in time order
pub fn split_by_symbol(ticks: Vec<Tick>) -> BTreeMap<Symbol, Vec<Tick>> {
    let mut streams: BTreeMap<Symbol, Vec<Tick>> = BTreeMap::new();
    for tick in ticks {
        streams.entry(tick.symbol.clone()).or_default().push(tick);
    }
    for stream in streams.values_mut() {
        stream.sort_by_key(|t| t.timestamp);
    }
    streams
}

/// Position size for one trade: a slice of the balance, levered, in base units
pub fn position_size(
    balance: Money,
    order_size_pct: Money,
    leverage: u32,
    price: Money,
    quantity_precision: u32,
) -> Money {
    let margin = balance * order_size_pct / Money::from_i64(100);
    (margin * Money::from_i64(leverage as i64) / price).floor_dp(quantity_precision)
}

/// Sizing and bracket settings shared by all symbol tasks
#[derive(Debug, Clone)]
pub struct ReplaySettings {
    pub order_size_pct: Money,
    pub leverage: u32,
    pub quantity_precision: u32,
    pub rule: TpSlRule,
    pub trailing_callback: Option<Money>,
    /// Symbols missing here get unrounded TP/SL levels
    pub tick_sizes: HashMap<Symbol, Money>,
}

impl ReplaySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            order_size_pct: Money::from_decimal(config.trading.order_size_pct),
            leverage: config.paper.leverage,
            quantity_precision: config.trading.quantity_precision,
            rule: config.trading.tp_sl_rule(),
            trailing_callback: config.trading.trailing_callback(),
            tick_sizes: config.trading.tick_sizes(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SymbolReport {
    pub symbol: Symbol,
    pub ticks: usize,
    pub intents: Vec<TradeIntent>,
    /// Recoverable errors logged and skipped during the run
    pub errors: usize,
}

#[derive(Debug, Clone)]
pub struct ReplayReport {
    pub symbols: Vec<SymbolReport>,
    pub ledger: LedgerSnapshot,
    pub journal: JournalSummary,
    pub open_positions: Vec<PositionRecord>,
    pub journal_failures: u64,
}

struct SymbolStream {
    index: usize,
    symbol: Symbol,
    ticks: Vec<Tick>,
}

fn process_tick(
    exchange: &PaperExchange,
    prices: &PriceBoard,
    tracker: &mut IntentTracker,
    settings: &ReplaySettings,
    index: usize,
    tick: &Tick,
) -> ExchangeResult<()> {
    prices.update(&tick.symbol, tick.price);

    let fills = exchange.check_orders(&tick.symbol, tick.price)?;
    tracker.on_fills(exchange, &fills)?;
    tracker.on_price(exchange, &tick.symbol, tick.price)?;

    let Some(direction) = tick.signal else {
        return Ok(());
    };
    if let Some(open) = tracker.open_for(&tick.symbol) {
        if open.direction == direction {
            debug!("{}: already {:?}, signal ignored", tick.symbol, direction);
            return Ok(());
        }
        tracker.close_manual(exchange, &tick.symbol, tick.price)?;
    }

    let size = position_size(
        exchange.balance()?,
        settings.order_size_pct,
        settings.leverage,
        tick.price,
        settings.quantity_precision,
    );
    if !size.is_positive() {
        warn!("{}: computed size is zero at {}, signal skipped", tick.symbol, tick.price);
        return Ok(());
    }

    tracker.open_bracket(
        exchange,
        BracketPlan {
            index,
            symbol: tick.symbol.clone(),
            direction,
            size,
            rule: settings.rule,
            trailing_callback: settings.trailing_callback,
            tick_size: settings.tick_sizes.get(&tick.symbol).copied(),
        },
    )?;
    Ok(())
}

async fn replay_symbol(
    exchange: Arc<PaperExchange>,
    prices: Arc<PriceBoard>,
    settings: Arc<ReplaySettings>,
    stream: SymbolStream,
) -> SymbolReport {
    let mut tracker = IntentTracker::new();
    let mut errors = 0;

    for tick in &stream.ticks {
        let outcome =
            process_tick(&exchange, &prices, &mut tracker, &settings, stream.index, tick);
        if let Err(e) = outcome {
            errors += 1;
            warn!("{} @ {}: {}", tick.symbol, tick.timestamp, e);
        }
        // Let the other symbol streams interleave
        tokio::task::yield_now().await;
    }

    info!(
        "{}: replayed {} ticks, {} intents, {} errors",
        stream.symbol,
        stream.ticks.len(),
        tracker.intents().len(),
        errors
    );

    SymbolReport {
        symbol: stream.symbol,
        ticks: stream.ticks.len(),
        intents: tracker.intents().to_vec(),
        errors,
    }
}

/// Replay `ticks` for `symbols` against `exchange`.
///
/// Ticks for symbols outside `symbols` are dropped. The intent index of a
/// symbol is its position in `symbols`.
pub async fn run_replay(
    exchange: Arc<PaperExchange>,
    prices: Arc<PriceBoard>,
    symbols: &[Symbol],
    ticks: Vec<Tick>,
    settings: ReplaySettings,
) -> Result<ReplayReport> {
    let mut streams = split_by_symbol(ticks);
    let settings = Arc::new(settings);

    for symbol in symbols {
        exchange.change_leverage(symbol, settings.leverage)?;
    }

    let mut tasks = JoinSet::new();
    for (index, symbol) in symbols.iter().enumerate() {
        let Some(ticks) = streams.remove(symbol) else {
            warn!("No ticks for {}", symbol);
            continue;
        };
        tasks.spawn(replay_symbol(
            exchange.clone(),
            prices.clone(),
            settings.clone(),
            SymbolStream {
                index,
                symbol: symbol.clone(),
                ticks,
            },
        ));
    }
    for skipped in streams.keys() {
        debug!("Ignoring ticks for unconfigured symbol {}", skipped);
    }

    let mut reports = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        reports.push(joined.context("Replay task panicked")?);
    }
    reports.sort_by(|a, b| a.symbol.cmp(&b.symbol));

    Ok(ReplayReport {
        symbols: reports,
        ledger: exchange.ledger(),
        journal: JournalSummary::from_entries(&exchange.journal()),
        open_positions: exchange.positions(None)?,
        journal_failures: exchange.journal_failures(),
    })
}
