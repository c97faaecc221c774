//! Journal command implementation

use anyhow::{Context, Result};
use futures_paper_trader::oms::{
    load_json_journal, load_sqlite_journal, JournalSummary, TradeJournalEntry,
};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

fn load(path: &Path) -> Result<Vec<TradeJournalEntry>> {
    if !path.exists() {
        anyhow::bail!("Journal not found: {}", path.display());
    }
    let is_sqlite = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("db" | "sqlite" | "sqlite3")
    );
    let entries = if is_sqlite {
        load_sqlite_journal(path)?
    } else {
        load_json_journal(path)?
    };
    Ok(entries)
}

pub fn run(path: String) -> Result<()> {
    let entries =
        load(Path::new(&path)).with_context(|| format!("Failed to read journal {}", path))?;
    info!("Loaded {} journal entries from {}", entries.len(), path);

    let mut by_symbol: BTreeMap<String, Vec<TradeJournalEntry>> = BTreeMap::new();
    for entry in &entries {
        by_symbol
            .entry(entry.symbol.to_string())
            .or_default()
            .push(entry.clone());
    }

    println!("\n{}", "=".repeat(60));
    println!("TRADE JOURNAL: {}", path);
    println!("{}", "=".repeat(60));
    println!(
        "{:<12} {:>7} {:>7} {:>14} {:>12}",
        "Symbol", "Trades", "Wins", "Net PnL", "Commission"
    );
    for (symbol, trades) in &by_symbol {
        let s = JournalSummary::from_entries(trades);
        println!(
            "{:<12} {:>7} {:>7} {:>14} {:>12}",
            symbol,
            s.total_trades,
            s.winning_trades,
            s.net_pnl().round_dp(2),
            s.total_commission.round_dp(4)
        );
    }

    let total = JournalSummary::from_entries(&entries);
    println!("{}", "-".repeat(60));
    println!("Total Trades:       {}", total.total_trades);
    println!("Win Rate:           {:.2}%", total.win_rate());
    println!("Gross PnL:          {}", total.gross_pnl.round_dp(2));
    println!("Net PnL:            {}", total.net_pnl().round_dp(2));
    println!("Largest Win:        {}", total.largest_win.round_dp(2));
    println!("Largest Loss:       {}", total.largest_loss.round_dp(2));
    println!("{}", "=".repeat(60));

    Ok(())
}
