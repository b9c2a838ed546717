#![allow(dead_code)]
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::TimeFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandleColor {
    Green,
    Red,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub timeframe: TimeFrame,
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub is_closed: bool,
}

impl Candle {
    pub fn body_size(&self) -> Decimal {
        (self.close - self.open).abs()
    }

    pub fn range(&self) -> Decimal {
        self.high - self.low
    }

    /// Body as a fraction of the high-low range, zero on a flat candle.
    pub fn body_ratio(&self) -> Decimal {
        let range = self.range();
        if range.is_zero() {
            return Decimal::ZERO;
        }
        self.body_size() / range
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// Green iff close > open; a flat candle counts as red.
    pub fn color(&self) -> CandleColor {
        if self.is_bullish() {
            CandleColor::Green
        } else {
            CandleColor::Red
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CandleBuffer {
    pub candles: Vec<Candle>,
    pub max_size: usize,
}

impl CandleBuffer {
    pub fn new(max_size: usize) -> Self {
        Self {
            candles: Vec::with_capacity(max_size),
            max_size,
        }
    }

    pub fn from_candles(candles: Vec<Candle>, max_size: usize) -> Self {
        let mut buffer = Self::new(max_size);
        for candle in candles {
            buffer.push(candle);
        }
        buffer
    }

    pub fn push(&mut self, candle: Candle) {
        if self.candles.len() >= self.max_size {
            self.candles.remove(0);
        }
        self.candles.push(candle);
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// The most recent `n` closed candles, oldest first.
    pub fn last_closed(&self, n: usize) -> Vec<&Candle> {
        let closed: Vec<&Candle> = self.candles.iter().filter(|c| c.is_closed).collect();
        let len = closed.len();
        if n >= len {
            closed
        } else {
            closed[len - n..].to_vec()
        }
    }

    pub fn latest_closed(&self) -> Option<&Candle> {
        self.candles.iter().rev().find(|c| c.is_closed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TickQuote {
    pub bid: Decimal,
    pub ask: Decimal,
    pub at: DateTime<Utc>,
}

impl TickQuote {
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }

    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::from(2)
    }
}
