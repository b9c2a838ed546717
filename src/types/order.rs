#![allow(dead_code)]
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Side;

/// Market entry order handed to the gateway. The engine never places
/// pending orders; every entry and exit is a market order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketOrderRequest {
    pub client_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub volume: Decimal,
    pub magic: u64,
    pub comment: String,
    pub deviation: u32,
}

impl MarketOrderRequest {
    pub fn new(symbol: &str, side: Side, volume: Decimal, magic: u64, comment: String) -> Self {
        Self {
            client_order_id: Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            side,
            volume,
            magic,
            comment,
            deviation: 20,
        }
    }
}

/// Close of an existing broker position, full volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseOrderRequest {
    pub client_order_id: String,
    pub position_id: u64,
    pub symbol: String,
    pub volume: Decimal,
    pub magic: u64,
    pub comment: String,
    pub deviation: u32,
}

impl CloseOrderRequest {
    pub fn new(position_id: u64, symbol: &str, volume: Decimal, magic: u64, comment: String) -> Self {
        Self {
            client_order_id: Uuid::new_v4().to_string(),
            position_id,
            symbol: symbol.to_string(),
            volume,
            magic,
            comment,
            deviation: 20,
        }
    }
}

/// Broker verdict on a submitted order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OrderOutcome {
    Accepted {
        #[serde(default)]
        ticket: Option<u64>,
    },
    Rejected {
        reason: String,
    },
}

impl OrderOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, OrderOutcome::Accepted { .. })
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        match self {
            OrderOutcome::Accepted { .. } => None,
            OrderOutcome::Rejected { reason } => Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn market_order_gets_unique_client_ids() {
        let a = MarketOrderRequest::new("XAUUSD.v", Side::Buy, dec!(0.02), 46_001, "pw entry".into());
        let b = MarketOrderRequest::new("XAUUSD.v", Side::Buy, dec!(0.02), 46_001, "pw entry".into());
        assert_ne!(a.client_order_id, b.client_order_id);
        assert_eq!(a.deviation, 20);
    }

    #[test]
    fn outcome_accessors() {
        let ok = OrderOutcome::Accepted { ticket: Some(99) };
        let no = OrderOutcome::Rejected { reason: "off quotes".into() };
        assert!(ok.is_accepted());
        assert_eq!(no.rejection_reason(), Some("off quotes"));
    }
}
