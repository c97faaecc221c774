//! Replay command implementation

use anyhow::{Context, Result};
use futures_paper_trader::config::{JournalBackend, JournalConfig};
use futures_paper_trader::oms::{JournalSink, JsonFileSink, SqliteSink};
use futures_paper_trader::paper::PaperExchange;
use futures_paper_trader::replay::{self, ReplaySettings};
use futures_paper_trader::{Config, PriceBoard};
use std::sync::Arc;
use tracing::{debug, info};

fn open_sink(journal: &JournalConfig) -> Result<Option<Box<dyn JournalSink>>> {
    let sink: Box<dyn JournalSink> = match journal.backend {
        JournalBackend::None => return Ok(None),
        JournalBackend::Json => Box::new(JsonFileSink::open(&journal.path)?),
        JournalBackend::Sqlite => Box::new(SqliteSink::open(&journal.path)?),
    };
    info!("Mirroring trade journal to {} ({:?})", journal.path, journal.backend);
    Ok(Some(sink))
}

pub fn run(
    config_path: String,
    ticks_path: String,
    journal_override: Option<String>,
) -> Result<()> {
    info!("Starting replay");

    let mut config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    if let Some(path) = journal_override {
        info!("Overriding journal path to: {}", path);
        config.paper.journal.path = path;
    }

    let symbols = config.trading.symbols();
    debug!("Symbols: {:?}", symbols);
    let ticks = replay::load_ticks(&ticks_path)?;

    let prices = Arc::new(PriceBoard::new());
    let mut exchange = PaperExchange::new(&config.paper, prices.clone());
    if let Some(sink) = open_sink(&config.paper.journal).context("Failed to open trade journal")? {
        exchange = exchange.with_journal_sink(sink);
    }
    let exchange = Arc::new(exchange);

    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    let report = runtime.block_on(replay::run_replay(
        exchange,
        prices,
        &symbols,
        ticks,
        ReplaySettings::from_config(&config),
    ))?;

    println!("\n{}", "=".repeat(60));
    println!("REPLAY RESULTS");
    println!("{}", "=".repeat(60));
    println!("Initial Balance:    {:.2} USDT", report.ledger.initial_balance.round_dp(2));
    println!("Final Balance:      {:.2} USDT", report.ledger.balance.round_dp(2));
    println!("Realized PnL:       {:.2} USDT", report.ledger.total_realized_pnl.round_dp(2));
    println!("Commission Paid:    {:.4} USDT", report.ledger.total_commission.round_dp(4));
    println!("Closing Trades:     {}", report.journal.total_trades);
    println!("Win Rate:           {:.2}%", report.journal.win_rate());
    if report.journal_failures > 0 {
        println!("Journal Failures:   {}", report.journal_failures);
    }
    println!("{}", "-".repeat(60));

    for s in &report.symbols {
        let closed = s.intents.iter().filter(|t| !t.is_open()).count();
        println!(
            "{:<12} ticks={:<6} intents={:<4} closed={:<4} errors={}",
            s.symbol,
            s.ticks,
            s.intents.len(),
            closed,
            s.errors
        );
    }

    if !report.open_positions.is_empty() {
        println!("{}", "-".repeat(60));
        println!("Open positions:");
        for p in &report.open_positions {
            println!(
                "  {:<12} amt={} entry={} uPnL={}",
                p.symbol,
                p.position_amt,
                p.entry_price,
                p.unrealized_pnl.round_dp(2)
            );
        }
    }
    println!("{}", "=".repeat(60));

    Ok(())
}
