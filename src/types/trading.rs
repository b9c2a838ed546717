#![allow(dead_code)]
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeFrame {
    M1,
    M5,
    M15,
    H1,
    H4,
    D1,
}

impl TimeFrame {
    /// MT5-style period name, used verbatim on the bridge wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFrame::M1 => "M1",
            TimeFrame::M5 => "M5",
            TimeFrame::M15 => "M15",
            TimeFrame::H1 => "H1",
            TimeFrame::H4 => "H4",
            TimeFrame::D1 => "D1",
        }
    }

    pub fn to_minutes(&self) -> u64 {
        match self {
            TimeFrame::M1 => 1,
            TimeFrame::M5 => 5,
            TimeFrame::M15 => 15,
            TimeFrame::H1 => 60,
            TimeFrame::H4 => 240,
            TimeFrame::D1 => 1440,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "M1" => Some(TimeFrame::M1),
            "M5" => Some(TimeFrame::M5),
            "M15" => Some(TimeFrame::M15),
            "H1" => Some(TimeFrame::H1),
            "H4" => Some(TimeFrame::H4),
            "D1" => Some(TimeFrame::D1),
            _ => None,
        }
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse operational state derived from drawdown. Modulates signal
/// strength, lot sizing and close aggressiveness everywhere downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeMode {
    Normal,
    Conservative,
    Emergency,
    Recovery,
    Offline,
}

impl TradeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeMode::Normal => "normal",
            TradeMode::Conservative => "conservative",
            TradeMode::Emergency => "emergency",
            TradeMode::Recovery => "recovery",
            TradeMode::Offline => "offline",
        }
    }

    /// Conservative and Emergency both tighten profit taking.
    pub fn is_protective(&self) -> bool {
        matches!(self, TradeMode::Conservative | TradeMode::Emergency)
    }
}

impl fmt::Display for TradeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Slice of current equity governing base lot and max lot for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CapitalZone {
    Safe,
    Growth,
    Aggressive,
}

impl CapitalZone {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapitalZone::Safe => "safe",
            CapitalZone::Growth => "growth",
            CapitalZone::Aggressive => "aggressive",
        }
    }

    pub fn all() -> [CapitalZone; 3] {
        [CapitalZone::Safe, CapitalZone::Growth, CapitalZone::Aggressive]
    }
}

impl fmt::Display for CapitalZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-position behavioral role. The behavior tables live in
/// `roles::RoleProfile`; this is only the closed tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Hedge Guard: long-lived portfolio protection.
    HG,
    /// Profit Walker: default directional position.
    PW,
    /// Recovery Hunter: aggressive counter-position in drawdown.
    RH,
    /// Scalp Capture: short-lived quick-profit taker.
    SC,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::HG => "HG",
            Role::PW => "PW",
            Role::RH => "RH",
            Role::SC => "SC",
        }
    }

    pub fn full_name(&self) -> &'static str {
        match self {
            Role::HG => "Hedge Guard",
            Role::PW => "Profit Walker",
            Role::RH => "Recovery Hunter",
            Role::SC => "Scalp Capture",
        }
    }

    pub fn all() -> [Role; 4] {
        [Role::HG, Role::PW, Role::RH, Role::SC]
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalAction {
    Buy,
    Sell,
    Wait,
}

impl SignalAction {
    pub fn is_directional(&self) -> bool {
        !matches!(self, SignalAction::Wait)
    }

    pub fn side(&self) -> Option<Side> {
        match self {
            SignalAction::Buy => Some(Side::Buy),
            SignalAction::Sell => Some(Side::Sell),
            SignalAction::Wait => None,
        }
    }
}

impl fmt::Display for SignalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalAction::Buy => write!(f, "BUY"),
            SignalAction::Sell => write!(f, "SELL"),
            SignalAction::Wait => write!(f, "WAIT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_opposite_round_trips() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite().opposite(), Side::Sell);
    }

    #[test]
    fn timeframe_wire_names() {
        assert_eq!(TimeFrame::M5.as_str(), "M5");
        assert_eq!(TimeFrame::from_str("m5"), Some(TimeFrame::M5));
        assert_eq!(TimeFrame::from_str("M7"), None);
    }

    #[test]
    fn wait_is_not_directional() {
        assert!(!SignalAction::Wait.is_directional());
        assert_eq!(SignalAction::Sell.side(), Some(Side::Sell));
        assert_eq!(SignalAction::Wait.side(), None);
    }
}
