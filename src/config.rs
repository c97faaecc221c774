//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files with environment
//! variable support for API credentials. Money values are decimals so that
//! fee rates like 0.0002 are represented exactly.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use crate::intent::{TpSlRule, TpSlUnit};
use crate::oms::FeeSchedule;
use crate::{Money, Symbol};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paper: PaperConfig,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub trading: TradingConfig,
}

impl Config {
    /// Load configuration from a JSON file, then apply `.env` / environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        config.apply_env();
        Ok(config)
    }

    /// Load API credentials from environment if set
    pub fn apply_env(&mut self) {
        dotenv::dotenv().ok();
        if let Ok(api_key) = std::env::var("BINANCE_API_KEY") {
            self.exchange.api_key = Some(api_key);
        }
        if let Ok(api_secret) = std::env::var("BINANCE_API_SECRET") {
            self.exchange.api_secret = Some(api_secret);
        }
    }
}

/// Simulated exchange settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    pub initial_balance: Decimal,
    /// Fee for resting LIMIT orders
    pub maker_fee: Decimal,
    /// Fee for MARKET, STOP_MARKET and TAKE_PROFIT fills
    pub taker_fee: Decimal,
    /// Reported on position records only, no margin model
    pub leverage: u32,
    pub journal: JournalConfig,
}

impl Default for PaperConfig {
    fn default() -> Self {
        PaperConfig {
            initial_balance: dec!(10000),
            maker_fee: dec!(0.0002), // 0.02%
            taker_fee: dec!(0.0005), // 0.05%
            leverage: 10,
            journal: JournalConfig::default(),
        }
    }
}

impl PaperConfig {
    pub fn fee_schedule(&self) -> FeeSchedule {
        FeeSchedule::new(
            Money::from_decimal(self.maker_fee),
            Money::from_decimal(self.taker_fee),
        )
    }

    pub fn initial_balance(&self) -> Money {
        Money::from_decimal(self.initial_balance)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalBackend {
    /// In-memory only
    None,
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    pub backend: JournalBackend,
    pub path: String,
}

impl Default for JournalConfig {
    fn default() -> Self {
        JournalConfig {
            backend: JournalBackend::Json,
            path: "trades_demo.json".to_string(),
        }
    }
}

/// Live exchange settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,
    pub base_url: String,
    pub recv_window_ms: u64,
    pub timeout_secs: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig {
            api_key: None,
            api_secret: None,
            base_url: "https://fapi.binance.com".to_string(),
            recv_window_ms: 5000,
            timeout_secs: 30,
        }
    }
}

/// Strategy-layer settings used when opening TP/SL brackets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub symbols: Vec<String>,
    /// Margin committed per trade, as % of the balance
    pub order_size_pct: Decimal,
    pub tp_sl_unit: TpSlUnit,
    pub tp_mult: Decimal,
    pub sl_mult: Decimal,
    pub use_trailing_stop: bool,
    /// Retracement from the watermark, in %
    pub trailing_stop_callback: Decimal,
    /// Decimal places allowed on order quantities
    pub quantity_precision: u32,
    /// Price tick per symbol; TP/SL levels are rounded onto it
    pub tick_sizes: BTreeMap<String, Decimal>,
}

impl Default for TradingConfig {
    fn default() -> Self {
        TradingConfig {
            symbols: vec![
                "BTCUSDT".to_string(),
                "ETHUSDT".to_string(),
                "SOLUSDT".to_string(),
                "DOGEUSDT".to_string(),
            ],
            order_size_pct: dec!(3),
            tp_sl_unit: TpSlUnit::Percent,
            tp_mult: dec!(1),
            sl_mult: dec!(1.5),
            use_trailing_stop: false,
            trailing_stop_callback: dec!(0.1),
            quantity_precision: 3,
            tick_sizes: BTreeMap::from([
                ("BTCUSDT".to_string(), dec!(0.1)),
                ("ETHUSDT".to_string(), dec!(0.01)),
                ("SOLUSDT".to_string(), dec!(0.01)),
                ("DOGEUSDT".to_string(), dec!(0.00001)),
            ]),
        }
    }
}

impl TradingConfig {
    pub fn symbols(&self) -> Vec<Symbol> {
        self.symbols.iter().map(Symbol::new).collect()
    }

    pub fn tp_sl_rule(&self) -> TpSlRule {
        TpSlRule {
            unit: self.tp_sl_unit,
            tp_mult: Money::from_decimal(self.tp_mult),
            sl_mult: Money::from_decimal(self.sl_mult),
        }
    }

    /// Tick sizes keyed by normalized symbol
    pub fn tick_sizes(&self) -> HashMap<Symbol, Money> {
        self.tick_sizes
            .iter()
            .map(|(s, tick)| (Symbol::new(s), Money::from_decimal(*tick)))
            .collect()
    }

    /// Trailing callback when trailing stops are enabled
    pub fn trailing_callback(&self) -> Option<Money> {
        self.use_trailing_stop
            .then(|| Money::from_decimal(self.trailing_stop_callback))
    }
}
