//! Blocking client for the Binance USDⓈ-M futures REST API
//!
//! Implements [`FuturesExchange`] so strategy code can run unchanged against
//! the live exchange or the paper engine.
//!
//! # Example
//! ```no_run
//! use futures_paper_trader::binance::{BinanceFuturesClient, Credentials};
//! use futures_paper_trader::config::ExchangeConfig;
//! use futures_paper_trader::exchange::FuturesExchange;
//!
//! let creds = Credentials::from_env()?;
//! let client = BinanceFuturesClient::new(creds, &ExchangeConfig::default())?;
//! println!("Balance: {}", client.balance()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use chrono::Utc;
use reqwest::blocking::Client;
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info};

use super::auth::{encode_params, Credentials};
use super::types::{
    AccountInfo, ApiErrorBody, AssetBalance, OrderResponse, PositionRisk, TickerPrice,
    UNKNOWN_ORDER_CODE,
};
use crate::config::ExchangeConfig;
use crate::error::{ExchangeError, ExchangeResult};
use crate::exchange::{AccountSummary, FuturesExchange, PositionRecord};
use crate::market::PriceFeed;
use crate::oms::{FilledOrder, OrderAck, OrderId, OrderRequest, OrderType, RestingOrder};
use crate::{Money, Symbol};

pub struct BinanceFuturesClient {
    client: Client,
    credentials: Credentials,
    base_url: String,
    recv_window_ms: u64,
}

impl BinanceFuturesClient {
    pub fn new(credentials: Credentials, config: &ExchangeConfig) -> ExchangeResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(BinanceFuturesClient {
            client,
            credentials,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            recv_window_ms: config.recv_window_ms,
        })
    }

    /// Unsigned market-data request
    fn public<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<T> {
        let mut url = format!("{}{}", self.base_url, path);
        if !params.is_empty() {
            url.push('?');
            url.push_str(&encode_params(params));
        }
        debug!("GET {}", url);
        let response = self.client.get(&url).send()?;
        Self::decode(response)
    }

    /// Signed request: timestamp and recvWindow appended, then signed
    fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        mut params: Vec<(&str, String)>,
    ) -> ExchangeResult<T> {
        params.push(("recvWindow", self.recv_window_ms.to_string()));
        params.push(("timestamp", Utc::now().timestamp_millis().to_string()));
        let query = self.credentials.signed_query(&params);
        let url = format!("{}{}?{}", self.base_url, path, query);

        debug!("{} {}", method, path);
        let response = self
            .client
            .request(method, &url)
            .header("X-MBX-APIKEY", self.credentials.api_key())
            .send()?;
        Self::decode(response)
    }

    fn decode<T: DeserializeOwned>(response: reqwest::blocking::Response) -> ExchangeResult<T> {
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            let (code, message) = match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(err) => (Some(err.code), err.msg),
                Err(_) => (None, body),
            };
            return Err(ExchangeError::Api {
                status: status.as_u16(),
                code,
                message,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }

    fn order_params(request: &OrderRequest) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("symbol", request.symbol.to_string()),
            ("side", request.side.as_str().to_string()),
            ("type", request.order_type.as_str().to_string()),
            ("quantity", request.quantity.normalize().to_string()),
        ];
        if let Some(price) = request.limit_price {
            params.push(("price", price.normalize().to_string()));
        }
        if let Some(stop) = request.stop_price {
            params.push(("stopPrice", stop.normalize().to_string()));
        }
        if matches!(request.order_type, OrderType::Limit | OrderType::TakeProfit) {
            params.push(("timeInForce", "GTC".to_string()));
        }
        if request.reduce_only {
            params.push(("reduceOnly", "true".to_string()));
        }
        params
    }
}

impl FuturesExchange for BinanceFuturesClient {
    fn balance(&self) -> ExchangeResult<Money> {
        let balances: Vec<AssetBalance> = self.signed(Method::GET, "/fapi/v2/balance", vec![])?;
        Ok(balances
            .into_iter()
            .find(|b| b.asset == "USDT")
            .map(|b| b.balance)
            .unwrap_or(Money::ZERO))
    }

    fn account(&self) -> ExchangeResult<AccountSummary> {
        let info: AccountInfo = self.signed(Method::GET, "/fapi/v2/account", vec![])?;
        Ok(info.into())
    }

    fn positions(&self, symbol: Option<&Symbol>) -> ExchangeResult<Vec<PositionRecord>> {
        let params = symbol
            .map(|s| vec![("symbol", s.to_string())])
            .unwrap_or_default();
        let rows: Vec<PositionRisk> = self.signed(Method::GET, "/fapi/v2/positionRisk", params)?;
        let records = rows
            .into_iter()
            .map(PositionRecord::try_from)
            .collect::<ExchangeResult<Vec<_>>>()?;

        Ok(match symbol {
            Some(_) => records,
            None => records.into_iter().filter(|r| !r.is_flat()).collect(),
        })
    }

    fn open_orders(&self, symbol: Option<&Symbol>) -> ExchangeResult<Vec<RestingOrder>> {
        let params = symbol
            .map(|s| vec![("symbol", s.to_string())])
            .unwrap_or_default();
        let orders: Vec<OrderResponse> = self.signed(Method::GET, "/fapi/v1/openOrders", params)?;
        Ok(orders.into_iter().filter_map(OrderResponse::into_resting).collect())
    }

    fn place_order(&self, request: OrderRequest) -> ExchangeResult<OrderAck> {
        request.validate()?;
        let response: OrderResponse =
            self.signed(Method::POST, "/fapi/v1/order", Self::order_params(&request))?;
        let ack = response.into_ack()?;
        info!(
            "Order placed: {} {} {} qty={} -> id={} status={:?}",
            request.symbol,
            request.side,
            request.order_type,
            request.quantity,
            ack.order_id,
            ack.status
        );
        Ok(ack)
    }

    fn cancel_order(&self, symbol: &Symbol, order_id: OrderId) -> ExchangeResult<()> {
        let params = vec![("symbol", symbol.to_string()), ("orderId", order_id.to_string())];
        match self.signed::<OrderResponse>(Method::DELETE, "/fapi/v1/order", params) {
            Ok(_) => Ok(()),
            Err(ExchangeError::Api {
                code: Some(UNKNOWN_ORDER_CODE),
                ..
            }) => Err(ExchangeError::UnknownOrder(order_id)),
            Err(err) => Err(err),
        }
    }

    fn cancel_all_open_orders(&self, symbol: Option<&Symbol>) -> ExchangeResult<()> {
        // The endpoint requires a symbol, so sweep every symbol with open orders
        let symbols = match symbol {
            Some(s) => vec![s.clone()],
            None => {
                let mut all: Vec<Symbol> =
                    self.open_orders(None)?.into_iter().map(|o| o.symbol).collect();
                all.sort();
                all.dedup();
                all
            }
        };
        for s in symbols {
            let _: serde_json::Value = self.signed(
                Method::DELETE,
                "/fapi/v1/allOpenOrders",
                vec![("symbol", s.to_string())],
            )?;
            debug!("Cancelled all open orders on {}", s);
        }
        Ok(())
    }

    fn change_leverage(&self, symbol: &Symbol, leverage: u32) -> ExchangeResult<()> {
        let _: serde_json::Value = self.signed(
            Method::POST,
            "/fapi/v1/leverage",
            vec![("symbol", symbol.to_string()), ("leverage", leverage.to_string())],
        )?;
        info!("Leverage for {} set to {}x", symbol, leverage);
        Ok(())
    }

    fn check_orders(&self, _symbol: &Symbol, _price: Money) -> ExchangeResult<Vec<FilledOrder>> {
        Ok(Vec::new())
    }
}

impl PriceFeed for BinanceFuturesClient {
    fn mark_price(&self, symbol: &Symbol) -> ExchangeResult<Money> {
        let ticker: TickerPrice = self
            .public("/fapi/v1/ticker/price", &[("symbol", symbol.to_string())])
            .map_err(|err| {
                debug!("Ticker lookup for {} failed: {}", symbol, err);
                ExchangeError::MarketDataUnavailable {
                    symbol: symbol.to_string(),
                }
            })?;
        Ok(ticker.price)
    }
}
