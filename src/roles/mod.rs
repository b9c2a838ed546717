pub mod registry;

pub use registry::*;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::types::Role;

/// Pure role-evolution function: `(role, pnl, age, volume)` to the
/// suggested next role. Rows are checked in table order, first match wins.
pub fn evaluate_transition(
    role: Role,
    pnl: Decimal,
    age_hours: Decimal,
    volume: Decimal,
) -> Option<(Role, &'static str)> {
    match role {
        Role::HG => {
            if pnl > dec!(3) && age_hours > dec!(4) {
                return Some((Role::PW, "hedge turned profitable, walking it"));
            }
            if pnl >= dec!(0.5) && pnl <= dec!(2) && age_hours > dec!(12) {
                return Some((Role::SC, "stale hedge with small profit, scalping out"));
            }
        }
        Role::PW => {
            if pnl >= dec!(1) && pnl <= dec!(4) && age_hours > dec!(8) {
                return Some((Role::SC, "slow walker with small profit, scalping out"));
            }
            if pnl < dec!(-10) && age_hours > dec!(6) {
                return Some((Role::HG, "aged loser converted to hedge"));
            }
            if pnl < dec!(-20) && volume >= dec!(0.05) {
                return Some((Role::RH, "heavy loser escalated to recovery"));
            }
        }
        Role::RH => {
            if pnl > dec!(2) {
                return Some((Role::PW, "recovery succeeded, walking profit"));
            }
            if pnl >= Decimal::ZERO && pnl <= dec!(1.5) && age_hours > dec!(4) {
                return Some((Role::SC, "recovery stalled near break-even"));
            }
            if pnl < dec!(-30) && age_hours > dec!(8) {
                return Some((Role::HG, "failed recovery parked as hedge"));
            }
        }
        Role::SC => {
            if pnl > dec!(5) {
                return Some((Role::PW, "scalp outgrew its role"));
            }
            if pnl < dec!(-8) {
                return Some((Role::HG, "scalp underwater, parked as hedge"));
            }
        }
    }
    None
}
