use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::config::{EntrySettings, OrderRoleSettings};
use crate::types::{CapitalZone, Role, TradeMode};

/// Hard bounds shared by every zone.
pub const GLOBAL_LOT_FLOOR: Decimal = dec!(0.01);
pub const GLOBAL_LOT_CAP: Decimal = dec!(0.25);
/// Below this equity everything trades the floor lot.
const MICRO_ACCOUNT_EQUITY: Decimal = dec!(1000);

/// Base and ceiling lot per capital zone.
pub fn zone_lot_band(zone: CapitalZone) -> (Decimal, Decimal) {
    match zone {
        CapitalZone::Safe => (dec!(0.01), dec!(0.05)),
        CapitalZone::Growth => (dec!(0.02), dec!(0.10)),
        CapitalZone::Aggressive => (dec!(0.03), dec!(0.20)),
    }
}

/// Everything the sizer reads. The caller freezes these from the tick
/// snapshot; the sizer itself holds no state, so same inputs always give
/// the same lot.
#[derive(Debug, Clone)]
pub struct LotInputs {
    pub zone: CapitalZone,
    pub role: Role,
    pub mode: TradeMode,
    pub signal_strength: Decimal,
    pub trend_strength: Decimal,
    pub balance_factor: Decimal,
    /// Total high-low range over the recent candles, in points.
    pub movement_points: Decimal,
    pub efficiency: Decimal,
    pub drawdown_pct: Decimal,
    pub current_equity: Decimal,
}

/// Full multiplier breakdown, kept for the audit trail and debug logging.
#[derive(Debug, Clone, Serialize)]
pub struct LotMultipliers {
    pub signal: Decimal,
    pub trend: Decimal,
    pub balance: Decimal,
    pub movement: Decimal,
    pub capital: Decimal,
    pub role: Decimal,
    pub mode: Decimal,
    pub drawdown: Decimal,
    pub recovery_boost: Decimal,
}

impl LotMultipliers {
    pub fn product(&self) -> Decimal {
        self.signal
            * self.trend
            * self.balance
            * self.movement
            * self.capital
            * self.role
            * self.mode
            * self.drawdown
            * self.recovery_boost
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LotComputation {
    pub lot: Decimal,
    pub zone: CapitalZone,
    pub role: Role,
    pub multipliers: LotMultipliers,
    pub fallback: bool,
}

/// Computes order size from the combined signal, zone, role and capital
/// context. Pure: all state lives in the inputs and the config.
pub struct LotSizer {
    entry: EntrySettings,
    roles: OrderRoleSettings,
    recovery_boost_enabled: bool,
}

impl LotSizer {
    pub fn new(entry: EntrySettings, roles: OrderRoleSettings, recovery_boost_enabled: bool) -> Self {
        Self {
            entry,
            roles,
            recovery_boost_enabled,
        }
    }

    pub fn calculate(&self, inputs: &LotInputs) -> LotComputation {
        // Offline sizing makes no sense; hand back the safe fallback.
        if inputs.mode == TradeMode::Offline || inputs.signal_strength <= Decimal::ZERO {
            return self.fallback(inputs.zone, inputs.role);
        }

        let (base, zone_max) = zone_lot_band(inputs.zone);
        let multipliers = self.multipliers(inputs);
        let mut lot = base * multipliers.product();

        let ceiling = zone_max.min(GLOBAL_LOT_CAP);
        lot = lot.clamp(GLOBAL_LOT_FLOOR, ceiling);

        if inputs.mode == TradeMode::Emergency {
            lot = lot.min(dec!(0.5) * zone_max);
        }
        if inputs.current_equity < MICRO_ACCOUNT_EQUITY {
            lot = GLOBAL_LOT_FLOOR;
        }

        lot = round_lot(lot).max(GLOBAL_LOT_FLOOR);

        LotComputation {
            lot,
            zone: inputs.zone,
            role: inputs.role,
            multipliers,
            fallback: false,
        }
    }

    /// Safe sizes used when the pipeline cannot run: recovery positions may
    /// carry a little more, scalps a touch, everything else the floor.
    pub fn fallback(&self, zone: CapitalZone, role: Role) -> LotComputation {
        let lot = match role {
            Role::RH => dec!(0.03),
            Role::SC => dec!(0.02),
            Role::HG | Role::PW => dec!(0.01),
        };
        LotComputation {
            lot,
            zone,
            role,
            multipliers: LotMultipliers {
                signal: Decimal::ONE,
                trend: Decimal::ONE,
                balance: Decimal::ONE,
                movement: Decimal::ONE,
                capital: Decimal::ONE,
                role: Decimal::ONE,
                mode: Decimal::ONE,
                drawdown: Decimal::ONE,
                recovery_boost: Decimal::ONE,
            },
            fallback: true,
        }
    }

    fn multipliers(&self, inputs: &LotInputs) -> LotMultipliers {
        let factors = &self.entry.dynamic_lot_sizing;

        let signal = if factors.signal_strength_factor.enabled {
            factors.signal_strength_factor.base
                + factors.signal_strength_factor.slope * inputs.signal_strength
        } else {
            Decimal::ONE
        };

        let trend = if factors.trend_strength_factor.enabled {
            if inputs.trend_strength >= factors.trend_strength_factor.threshold {
                factors.trend_strength_factor.strong_multiplier
            } else {
                factors.trend_strength_factor.weak_multiplier
            }
        } else {
            Decimal::ONE
        };

        let balance = if factors.balance_factor.enabled {
            if inputs.balance_factor > factors.balance_factor.high_threshold {
                factors.balance_factor.high_multiplier
            } else if inputs.balance_factor < factors.balance_factor.low_threshold {
                factors.balance_factor.low_multiplier
            } else {
                Decimal::ONE
            }
        } else {
            Decimal::ONE
        };

        let movement = if factors.movement_factor.enabled {
            movement_multiplier(
                inputs.movement_points,
                factors.movement_factor.min_points,
                factors.movement_factor.min_multiplier,
                factors.movement_factor.max_points,
                factors.movement_factor.max_multiplier,
            )
        } else {
            Decimal::ONE
        };

        let capital = if factors.capital_factor.enabled {
            capital_multiplier(inputs.efficiency)
        } else {
            Decimal::ONE
        };

        let role = if factors.role_factor.enabled {
            self.role_multiplier(inputs.role)
        } else {
            Decimal::ONE
        };

        let mode = match inputs.mode {
            TradeMode::Normal => dec!(1.0),
            TradeMode::Conservative => dec!(0.6),
            TradeMode::Emergency => dec!(0.3),
            TradeMode::Recovery => dec!(1.4),
            TradeMode::Offline => dec!(1.0),
        };

        let drawdown = drawdown_multiplier(inputs.drawdown_pct);

        let recovery_boost = if inputs.mode == TradeMode::Recovery && self.recovery_boost_enabled {
            recovery_boost(inputs.signal_strength, inputs.drawdown_pct)
        } else {
            Decimal::ONE
        };

        LotMultipliers {
            signal,
            trend,
            balance,
            movement,
            capital,
            role,
            mode,
            drawdown,
            recovery_boost,
        }
    }

    fn role_multiplier(&self, role: Role) -> Decimal {
        let settings = self.roles.settings(role);
        match role {
            Role::HG => dec!(0.8),
            Role::PW => dec!(1.0),
            Role::RH => {
                let base = dec!(1.5);
                if settings.aggressive_sizing {
                    base * dec!(1.2)
                } else {
                    base
                }
            }
            Role::SC => {
                let base = dec!(1.2);
                if settings.quick_profit {
                    base * dec!(1.1)
                } else {
                    base
                }
            }
        }
    }
}

fn capital_multiplier(efficiency: Decimal) -> Decimal {
    if efficiency >= dec!(1.5) {
        dec!(1.4)
    } else if efficiency >= dec!(1.2) {
        dec!(1.2)
    } else if efficiency >= dec!(1.0) {
        dec!(1.0)
    } else if efficiency >= dec!(0.8) {
        dec!(0.8)
    } else {
        dec!(0.6)
    }
}

fn drawdown_multiplier(drawdown_pct: Decimal) -> Decimal {
    if drawdown_pct >= dec!(25) {
        dec!(0.4)
    } else if drawdown_pct >= dec!(20) {
        dec!(0.6)
    } else if drawdown_pct >= dec!(15) {
        dec!(0.8)
    } else if drawdown_pct >= dec!(10) {
        dec!(0.9)
    } else {
        dec!(1.0)
    }
}

fn recovery_boost(strength: Decimal, drawdown_pct: Decimal) -> Decimal {
    if strength >= dec!(0.8) && drawdown_pct >= dec!(15) {
        dec!(1.6)
    } else if strength >= dec!(0.7) && drawdown_pct >= dec!(10) {
        dec!(1.4)
    } else if strength >= dec!(0.6) {
        dec!(1.2)
    } else {
        dec!(1.0)
    }
}

/// Linear interpolation between the two anchor points, clamped at the ends.
fn movement_multiplier(
    points: Decimal,
    min_points: Decimal,
    min_multiplier: Decimal,
    max_points: Decimal,
    max_multiplier: Decimal,
) -> Decimal {
    if points <= min_points {
        return min_multiplier;
    }
    if points >= max_points {
        return max_multiplier;
    }
    let span = max_points - min_points;
    if span.is_zero() {
        return min_multiplier;
    }
    let fraction = (points - min_points) / span;
    min_multiplier + fraction * (max_multiplier - min_multiplier)
}

/// Lots are a 0.01 grid; always round toward zero so a clamp is never
/// overshot.
fn round_lot(lot: Decimal) -> Decimal {
    (lot * dec!(100)).floor() / dec!(100)
}
