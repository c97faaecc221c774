//! Append-only trade journal
//!
//! One entry per closing (PnL-realizing) fill. The in-memory journal owned by
//! the engine is authoritative; a [`JournalSink`] mirrors each appended entry
//! to durable storage. A sink failure never undoes the fill that produced it.
//!
//! Sinks run on a dedicated [`JournalWriter`] thread so file and database I/O
//! never happens under the engine lock.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

use crate::error::{ExchangeError, JournalError};
use crate::{Money, Side, Symbol};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeJournalEntry {
    pub symbol: Symbol,
    pub side: Side,
    pub fill_price: Money,
    pub quantity: Money,
    pub realized_pnl: Money,
    pub commission: Money,
    pub timestamp: DateTime<Utc>,
}

/// Durable mirror for journal entries
pub trait JournalSink: Send {
    fn append(&mut self, entry: &TradeJournalEntry) -> Result<(), JournalError>;
}

enum WriterCommand {
    Append(TradeJournalEntry),
    /// Acknowledged once every earlier entry has been handed to the sink
    Flush(Sender<()>),
}

/// Background thread that drains queued entries into a [`JournalSink`].
///
/// Entries are written in the order they were queued. Failed writes are
/// logged and counted, never retried.
pub struct JournalWriter {
    tx: Option<Sender<WriterCommand>>,
    handle: Option<JoinHandle<()>>,
    failures: Arc<AtomicU64>,
}

impl JournalWriter {
    pub fn spawn(sink: Box<dyn JournalSink>) -> Self {
        let (tx, rx) = mpsc::channel();
        let failures = Arc::new(AtomicU64::new(0));
        let counter = failures.clone();
        let handle = thread::spawn(move || Self::drain(sink, rx, &counter));
        Self {
            tx: Some(tx),
            handle: Some(handle),
            failures,
        }
    }

    fn drain(mut sink: Box<dyn JournalSink>, rx: Receiver<WriterCommand>, failures: &AtomicU64) {
        for command in rx {
            match command {
                WriterCommand::Append(entry) => {
                    if let Err(err) = sink.append(&entry) {
                        failures.fetch_add(1, Ordering::Relaxed);
                        let err = ExchangeError::from(err);
                        warn!("PaperTrading - {} ({} {})", err, entry.symbol, entry.side);
                    }
                }
                WriterCommand::Flush(ack) => {
                    let _ = ack.send(());
                }
            }
        }
        debug!("Journal writer stopped");
    }

    /// Queue `entry` without waiting for it to be written
    pub fn send(&self, entry: TradeJournalEntry) {
        let queued = self
            .tx
            .as_ref()
            .map(|tx| tx.send(WriterCommand::Append(entry)).is_ok())
            .unwrap_or(false);
        if !queued {
            self.failures.fetch_add(1, Ordering::Relaxed);
            warn!("PaperTrading - journal writer is gone, entry dropped");
        }
    }

    /// Block until everything queued so far has reached the sink
    pub fn flush(&self) {
        let Some(tx) = self.tx.as_ref() else {
            return;
        };
        let (ack_tx, ack_rx) = mpsc::channel();
        if tx.send(WriterCommand::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

impl Drop for JournalWriter {
    fn drop(&mut self) {
        // Closing the channel ends the drain loop after the backlog
        drop(self.tx.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("PaperTrading - journal writer panicked");
            }
        }
    }
}

/// Rewrites the whole journal as a pretty JSON array after every append
pub struct JsonFileSink {
    path: PathBuf,
    history: Vec<TradeJournalEntry>,
}

impl JsonFileSink {
    /// Start a sink at `path`, continuing any journal already stored there
    pub fn open(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let history = if path.exists() {
            load_json_journal(&path)?
        } else {
            Vec::new()
        };
        Ok(Self { path, history })
    }
}

impl JournalSink for JsonFileSink {
    fn append(&mut self, entry: &TradeJournalEntry) -> Result<(), JournalError> {
        self.history.push(entry.clone());
        std::fs::write(&self.path, serde_json::to_string_pretty(&self.history)?)?;
        debug!(
            "Journal mirrored to {} ({} entries)",
            self.path.display(),
            self.history.len()
        );
        Ok(())
    }
}

/// Read a journal previously written by [`JsonFileSink`]
pub fn load_json_journal(path: impl AsRef<Path>) -> Result<Vec<TradeJournalEntry>, JournalError> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&contents)?)
}

/// Inserts one row per entry into a `trade_journal` table
pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self, JournalError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, JournalError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS trade_journal (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                fill_price TEXT NOT NULL,
                quantity TEXT NOT NULL,
                realized_pnl TEXT NOT NULL,
                commission TEXT NOT NULL,
                timestamp TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trade_journal_symbol ON trade_journal(symbol)",
            [],
        )?;
        Ok(Self { conn })
    }

    /// All stored entries in insertion order
    pub fn entries(&self) -> Result<Vec<TradeJournalEntry>, JournalError> {
        read_sqlite_entries(&self.conn)
    }
}

/// Read a journal written by [`SqliteSink`] without creating or migrating it
pub fn load_sqlite_journal(path: impl AsRef<Path>) -> Result<Vec<TradeJournalEntry>, JournalError> {
    let conn = Connection::open_with_flags(
        path.as_ref(),
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    read_sqlite_entries(&conn)
}

fn read_sqlite_entries(conn: &Connection) -> Result<Vec<TradeJournalEntry>, JournalError> {
    let mut stmt = conn.prepare(
        "SELECT symbol, side, fill_price, quantity, realized_pnl, commission, timestamp
         FROM trade_journal ORDER BY id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    // Rows are only ever written by `append`, so a parse failure is corruption
    let corrupt = |what: &str| {
        JournalError::Sqlite(rusqlite::Error::InvalidColumnName(format!(
            "unparseable {} in trade_journal",
            what
        )))
    };
    rows.into_iter()
        .map(|(symbol, side, price, qty, pnl, commission, ts)| {
            Ok::<_, JournalError>(TradeJournalEntry {
                symbol: Symbol::new(symbol),
                side: side.parse().map_err(|_| corrupt("side"))?,
                fill_price: price.parse().map_err(|_| corrupt("fill_price"))?,
                quantity: qty.parse().map_err(|_| corrupt("quantity"))?,
                realized_pnl: pnl.parse().map_err(|_| corrupt("realized_pnl"))?,
                commission: commission.parse().map_err(|_| corrupt("commission"))?,
                timestamp: DateTime::parse_from_rfc3339(&ts)
                    .map_err(|_| corrupt("timestamp"))?
                    .with_timezone(&Utc),
            })
        })
        .collect()
}

impl JournalSink for SqliteSink {
    fn append(&mut self, entry: &TradeJournalEntry) -> Result<(), JournalError> {
        self.conn.execute(
            "INSERT INTO trade_journal
             (symbol, side, fill_price, quantity, realized_pnl, commission, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.symbol.as_str(),
                entry.side.as_str(),
                entry.fill_price.to_string(),
                entry.quantity.to_string(),
                entry.realized_pnl.to_string(),
                entry.commission.to_string(),
                entry.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

/// Aggregate statistics over a journal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JournalSummary {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub gross_pnl: Money,
    pub total_commission: Money,
    pub largest_win: Money,
    pub largest_loss: Money,
}

impl JournalSummary {
    pub fn from_entries(entries: &[TradeJournalEntry]) -> Self {
        let mut summary = Self::default();
        for entry in entries {
            summary.total_trades += 1;
            summary.gross_pnl += entry.realized_pnl;
            summary.total_commission += entry.commission;
            if entry.realized_pnl.is_positive() {
                summary.winning_trades += 1;
                summary.largest_win = summary.largest_win.max(entry.realized_pnl);
            } else if entry.realized_pnl.is_negative() {
                summary.losing_trades += 1;
                summary.largest_loss = summary.largest_loss.min(entry.realized_pnl);
            }
        }
        summary
    }

    /// Realized PnL after the commission charged on the closing fills
    pub fn net_pnl(&self) -> Money {
        self.gross_pnl - self.total_commission
    }

    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            return 0.0;
        }
        self.winning_trades as f64 / self.total_trades as f64 * 100.0
    }
}
