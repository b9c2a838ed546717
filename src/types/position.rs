use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{CapitalZone, Role, Side};

/// Mirror of a broker-side open position. Never mutated locally; `pnl` is
/// always the gateway's number (gross + swap + commission where reported).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Broker ticket.
    pub id: u64,
    pub side: Side,
    /// Lots.
    pub volume: Decimal,
    pub open_price: Decimal,
    pub current_price: Decimal,
    pub pnl: Decimal,
    pub open_time: DateTime<Utc>,
}

impl Position {
    pub fn age_hours(&self, now: DateTime<Utc>) -> Decimal {
        let minutes = (now - self.open_time).num_minutes().max(0);
        Decimal::from(minutes) / dec!(60)
    }

    pub fn profit_per_lot(&self) -> Decimal {
        if self.volume.is_zero() {
            return Decimal::ZERO;
        }
        self.pnl / self.volume
    }

    pub fn is_losing(&self) -> bool {
        self.pnl < Decimal::ZERO
    }

    /// Zone a position is accounted under, inferred from its lot size the
    /// same way entries are budgeted: safe lots are the smallest band.
    pub fn capital_zone(&self) -> CapitalZone {
        if self.volume <= dec!(0.05) {
            CapitalZone::Safe
        } else if self.volume <= dec!(0.10) {
            CapitalZone::Growth
        } else {
            CapitalZone::Aggressive
        }
    }
}

/// Profit-per-lot bucket, role-aware thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Efficiency {
    Excellent,
    Good,
    Fair,
    Poor,
    Terrible,
}

impl Efficiency {
    /// Per-lot thresholds (excellent, good, fair, poor) per role. SC and RH
    /// run looser books, HG is expected to earn its long holding time.
    pub fn classify(profit_per_lot: Decimal, role: Role) -> Self {
        let (excellent, good, fair, poor) = match role {
            Role::SC => (dec!(20), dec!(10), dec!(0), dec!(-20)),
            Role::RH => (dec!(30), dec!(15), dec!(0), dec!(-30)),
            Role::HG => (dec!(80), dec!(40), dec!(0), dec!(-60)),
            Role::PW => (dec!(60), dec!(30), dec!(0), dec!(-40)),
        };
        if profit_per_lot >= excellent {
            Efficiency::Excellent
        } else if profit_per_lot >= good {
            Efficiency::Good
        } else if profit_per_lot >= fair {
            Efficiency::Fair
        } else if profit_per_lot >= poor {
            Efficiency::Poor
        } else {
            Efficiency::Terrible
        }
    }

    pub fn is_weak(&self) -> bool {
        matches!(self, Efficiency::Poor | Efficiency::Terrible)
    }
}

/// Derived portfolio aggregates, rebuilt once per tick from the frozen
/// position snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfolioStats {
    pub buy_volume: Decimal,
    pub sell_volume: Decimal,
    pub buy_count: usize,
    pub sell_count: usize,
    pub losing_count: usize,
    pub total_pnl: Decimal,
    pub role_counts: HashMap<Role, usize>,
    pub zone_counts: HashMap<CapitalZone, usize>,
    pub margin_level: Option<Decimal>,
}

impl PortfolioStats {
    pub fn build(
        positions: &[Position],
        roles: &HashMap<u64, Role>,
        margin_level: Option<Decimal>,
    ) -> Self {
        let mut stats = PortfolioStats {
            margin_level,
            ..Default::default()
        };
        for position in positions {
            match position.side {
                Side::Buy => {
                    stats.buy_volume += position.volume;
                    stats.buy_count += 1;
                }
                Side::Sell => {
                    stats.sell_volume += position.volume;
                    stats.sell_count += 1;
                }
            }
            if position.is_losing() {
                stats.losing_count += 1;
            }
            stats.total_pnl += position.pnl;
            if let Some(role) = roles.get(&position.id) {
                *stats.role_counts.entry(*role).or_insert(0) += 1;
            }
            *stats.zone_counts.entry(position.capital_zone()).or_insert(0) += 1;
        }
        stats
    }

    pub fn total_count(&self) -> usize {
        self.buy_count + self.sell_count
    }

    pub fn total_volume(&self) -> Decimal {
        self.buy_volume + self.sell_volume
    }

    /// |buy − sell| / (buy + sell) on volume; zero with no exposure.
    pub fn imbalance(&self) -> Decimal {
        let total = self.total_volume();
        if total.is_zero() {
            return Decimal::ZERO;
        }
        (self.buy_volume - self.sell_volume).abs() / total
    }

    /// Which side carries the excess volume, if any.
    pub fn oversupplied_side(&self) -> Option<Side> {
        if self.buy_volume > self.sell_volume {
            Some(Side::Buy)
        } else if self.sell_volume > self.buy_volume {
            Some(Side::Sell)
        } else {
            None
        }
    }

    /// Fraction of positions (by count) on the Buy side; 0.5 with none.
    pub fn buy_fraction(&self) -> Decimal {
        let total = self.total_count();
        if total == 0 {
            return dec!(0.5);
        }
        Decimal::from(self.buy_count) / Decimal::from(total)
    }

    pub fn role_count(&self, role: Role) -> usize {
        self.role_counts.get(&role).copied().unwrap_or(0)
    }

    pub fn role_fraction(&self, role: Role) -> Decimal {
        let total = self.total_count();
        if total == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.role_count(role)) / Decimal::from(total)
    }
}
