//! Live USDⓈ-M futures adapter
//! Signed REST calls through a blocking HTTP client.

pub mod auth;
mod client;
pub mod types;

pub use auth::Credentials;
pub use client::BinanceFuturesClient;
