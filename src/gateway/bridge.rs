#![allow(dead_code)]
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, info};

use crate::types::{
    Candle, CloseOrderRequest, MarketOrderRequest, OrderOutcome, Position, Side, TickQuote,
    TimeFrame,
};

use super::{AccountSnapshot, MarketGateway, TerminalInfo};

type HmacSha256 = Hmac<Sha256>;

/// HTTP client for the local MT5 bridge service. The bridge owns the
/// terminal process; this client only speaks its small JSON API, signing
/// every request with the shared secret when one is configured.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    client: Client,
    base_url: String,
    api_key: String,
    secret_key: String,
}

impl BridgeClient {
    pub fn new(base_url: String, api_key: String, secret_key: String, timeout_seconds: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url,
            api_key,
            secret_key,
        }
    }

    /// Local bridges without auth configured still work; requests simply
    /// carry no signature headers.
    pub fn unsigned(base_url: String, timeout_seconds: u64) -> Self {
        Self::new(base_url, String::new(), String::new(), timeout_seconds)
    }

    fn sign(&self, payload: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(&url);
        if !self.api_key.is_empty() {
            let timestamp = Utc::now().timestamp_millis().to_string();
            let signature = self.sign(&format!("{}GET{}", timestamp, path));
            request = request
                .header("X-Bridge-Key", &self.api_key)
                .header("X-Bridge-Timestamp", timestamp)
                .header("X-Bridge-Signature", signature);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("bridge GET {} failed: {}", path, response.status()));
        }
        Ok(response.json().await?)
    }

    async fn post_json<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let payload = serde_json::to_string(body)?;
        let mut request = self.client.post(&url).body(payload.clone());
        request = request.header("Content-Type", "application/json");
        if !self.api_key.is_empty() {
            let timestamp = Utc::now().timestamp_millis().to_string();
            let signature = self.sign(&format!("{}POST{}{}", timestamp, path, payload));
            request = request
                .header("X-Bridge-Key", &self.api_key)
                .header("X-Bridge-Timestamp", timestamp)
                .header("X-Bridge-Signature", signature);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("bridge POST {} failed: {}", path, response.status()));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl MarketGateway for BridgeClient {
    async fn list_terminals(&self) -> Result<Vec<TerminalInfo>> {
        let response: TerminalsResponse = self.get_json("/terminals").await?;
        debug!("Bridge reported {} terminals", response.terminals.len());
        Ok(response.terminals)
    }

    async fn connect(&self, terminal: &TerminalInfo) -> Result<()> {
        let body = ConnectRequest {
            path: terminal.path.clone(),
        };
        let response: AckResponse = self.post_json("/connect", &body).await?;
        if !response.ok {
            return Err(anyhow!(
                "bridge refused connect to {}: {}",
                terminal.broker_name,
                response.reason.unwrap_or_default()
            ));
        }
        info!("Connected to terminal: {}", terminal.broker_name);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        let _: AckResponse = self.post_json("/shutdown", &()).await?;
        info!("Bridge connection shut down");
        Ok(())
    }

    async fn account_snapshot(&self) -> Result<Option<AccountSnapshot>> {
        let response: AccountResponse = self.get_json("/account").await?;
        Ok(response.account)
    }

    async fn open_positions(&self, symbol: &str) -> Result<Vec<Position>> {
        let path = format!("/positions?symbol={}", symbol);
        let response: PositionsResponse = self.get_json(&path).await?;
        response
            .positions
            .into_iter()
            .map(|row| {
                let side = match row.side.to_uppercase().as_str() {
                    "BUY" => Side::Buy,
                    "SELL" => Side::Sell,
                    other => return Err(anyhow!("unknown position side {}", other)),
                };
                // Swap and commission are folded in bridge-side; the core
                // never reconstructs pnl locally.
                Ok(Position {
                    id: row.ticket,
                    side,
                    volume: row.volume,
                    open_price: row.open_price,
                    current_price: row.current_price,
                    pnl: row.profit + row.swap + row.commission.unwrap_or(Decimal::ZERO),
                    open_time: Utc
                        .timestamp_opt(row.open_time, 0)
                        .single()
                        .ok_or_else(|| anyhow!("bad open_time {}", row.open_time))?,
                })
            })
            .collect()
    }

    async fn recent_candles(
        &self,
        symbol: &str,
        period: TimeFrame,
        count: usize,
    ) -> Result<Vec<Candle>> {
        let path = format!(
            "/candles?symbol={}&period={}&count={}",
            symbol,
            period.as_str(),
            count
        );
        let response: CandlesResponse = self.get_json(&path).await?;
        response
            .candles
            .into_iter()
            .map(|row| {
                Ok(Candle {
                    timeframe: period,
                    open_time: Utc
                        .timestamp_opt(row.time, 0)
                        .single()
                        .ok_or_else(|| anyhow!("bad candle time {}", row.time))?,
                    open: row.open,
                    high: row.high,
                    low: row.low,
                    close: row.close,
                    volume: row.volume,
                    is_closed: row.closed,
                })
            })
            .collect()
    }

    async fn tick(&self, symbol: &str) -> Result<TickQuote> {
        let path = format!("/tick?symbol={}", symbol);
        let response: TickResponse = self.get_json(&path).await?;
        Ok(TickQuote {
            bid: response.bid,
            ask: response.ask,
            at: Utc::now(),
        })
    }

    async fn submit_market_order(&self, request: &MarketOrderRequest) -> Result<OrderOutcome> {
        let response: OrderResponse = self.post_json("/order/market", request).await?;
        Ok(response.into_outcome())
    }

    async fn close_position(&self, request: &CloseOrderRequest) -> Result<OrderOutcome> {
        let response: OrderResponse = self.post_json("/order/close", request).await?;
        Ok(response.into_outcome())
    }
}

#[derive(Debug, Deserialize)]
struct TerminalsResponse {
    terminals: Vec<TerminalInfo>,
}

#[derive(Debug, Serialize)]
struct ConnectRequest {
    path: String,
}

#[derive(Debug, Deserialize)]
struct AckResponse {
    ok: bool,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    account: Option<AccountSnapshot>,
}

#[derive(Debug, Deserialize)]
struct PositionsResponse {
    positions: Vec<PositionRow>,
}

#[derive(Debug, Deserialize)]
struct PositionRow {
    ticket: u64,
    side: String,
    volume: Decimal,
    open_price: Decimal,
    current_price: Decimal,
    profit: Decimal,
    #[serde(default)]
    swap: Decimal,
    #[serde(default)]
    commission: Option<Decimal>,
    open_time: i64,
}

#[derive(Debug, Deserialize)]
struct CandlesResponse {
    candles: Vec<CandleRow>,
}

#[derive(Debug, Deserialize)]
struct CandleRow {
    time: i64,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
    #[serde(default = "default_closed")]
    closed: bool,
}

fn default_closed() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct TickResponse {
    bid: Decimal,
    ask: Decimal,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    accepted: bool,
    #[serde(default)]
    ticket: Option<u64>,
    #[serde(default)]
    reason: Option<String>,
}

impl OrderResponse {
    fn into_outcome(self) -> OrderOutcome {
        if self.accepted {
            OrderOutcome::Accepted { ticket: self.ticket }
        } else {
            OrderOutcome::Rejected {
                reason: self.reason.unwrap_or_else(|| "unspecified".to_string()),
            }
        }
    }
}
