#![allow(dead_code)]
pub mod bridge;

pub use bridge::*;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Candle, CloseOrderRequest, MarketOrderRequest, OrderOutcome, Position, TickQuote, TimeFrame};

/// A broker terminal the bridge can attach to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalInfo {
    pub broker_name: String,
    pub executable_kind: String,
    pub is_running: bool,
    pub path: String,
}

/// Account state as the broker reports it. `margin_level` is absent while
/// no position is open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub login: u64,
    pub balance: Decimal,
    pub equity: Decimal,
    pub margin_level: Option<Decimal>,
    pub free_margin: Decimal,
}

/// The only broker contract the decision core depends on. Everything here
/// is a bounded synchronous call from the core's point of view; the tick
/// loop wraps each in a timeout and treats overruns as soft failures.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketGateway: Send + Sync {
    async fn list_terminals(&self) -> anyhow::Result<Vec<TerminalInfo>>;
    async fn connect(&self, terminal: &TerminalInfo) -> anyhow::Result<()>;
    async fn shutdown(&self) -> anyhow::Result<()>;
    /// `None` when the terminal is attached but reports no account.
    async fn account_snapshot(&self) -> anyhow::Result<Option<AccountSnapshot>>;
    /// Authoritative open positions; pnl includes swap, commission optional.
    async fn open_positions(&self, symbol: &str) -> anyhow::Result<Vec<Position>>;
    /// Ordered oldest to newest; the core requests 5 and uses the last 3 closed.
    async fn recent_candles(
        &self,
        symbol: &str,
        period: TimeFrame,
        count: usize,
    ) -> anyhow::Result<Vec<Candle>>;
    async fn tick(&self, symbol: &str) -> anyhow::Result<TickQuote>;
    async fn submit_market_order(&self, request: &MarketOrderRequest)
        -> anyhow::Result<OrderOutcome>;
    async fn close_position(&self, request: &CloseOrderRequest) -> anyhow::Result<OrderOutcome>;
}
