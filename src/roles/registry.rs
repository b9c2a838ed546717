#![allow(dead_code)]
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::config::OrderRoleSettings;
use crate::types::{CapitalZone, Position, Role};

use super::evaluate_transition;

#[derive(Debug, Clone, Serialize)]
pub struct RoleTransition {
    pub from: Role,
    pub to: Role,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Core-owned metadata for one open position. Created when the position is
/// first observed, purged when the broker stops reporting it.
#[derive(Debug, Clone, Serialize)]
pub struct RoleBinding {
    pub role: Role,
    pub original_role: Role,
    pub assigned_at: DateTime<Utc>,
    pub history: Vec<RoleTransition>,
}

impl RoleBinding {
    pub fn evolution_count(&self) -> usize {
        self.history.len()
    }
}

/// Suggested role change for one position; the caller decides whether to
/// apply it.
#[derive(Debug, Clone, Serialize)]
pub struct RoleEvolution {
    pub position_id: u64,
    pub from: Role,
    pub to: Role,
    pub reason: String,
}

/// Everything role assignment looks at, frozen for the tick.
#[derive(Debug, Clone)]
pub struct AssignmentContext {
    pub drawdown_pct: Decimal,
    pub imbalance: Decimal,
    pub losing_count: usize,
    pub signal_strength: Decimal,
    pub volume: Decimal,
    pub zone: CapitalZone,
    pub high_volatility_session: bool,
    /// Current share of open positions per role, 0..1.
    pub role_fractions: HashMap<Role, Decimal>,
}

/// Assigns and evolves behavioral roles. One binding per open position,
/// no exceptions; scoring never fails, the fallback role is PW.
pub struct RoleRegistry {
    settings: OrderRoleSettings,
    bindings: HashMap<u64, RoleBinding>,
}

impl RoleRegistry {
    pub fn new(settings: OrderRoleSettings) -> Self {
        Self {
            settings,
            bindings: HashMap::new(),
        }
    }

    /// Score all four roles for a newly observed position and bind the
    /// winner. Quotas are a soft target applied as a score correction, not
    /// a hard cap.
    pub fn on_new_position(&mut self, position: &Position, ctx: &AssignmentContext) -> Role {
        let role = self.pick_role(ctx);
        let now = Utc::now();
        self.bindings.insert(
            position.id,
            RoleBinding {
                role,
                original_role: role,
                assigned_at: now,
                history: Vec::new(),
            },
        );
        info!(
            "Position #{} assigned role {} ({})",
            position.id,
            role,
            role.full_name()
        );
        role
    }

    fn pick_role(&self, ctx: &AssignmentContext) -> Role {
        let mut best = Role::PW;
        let mut best_score = Decimal::MIN;
        for role in Role::all() {
            let raw = Self::base_score(role, ctx);
            let corrected = (raw + self.balance_correction(role, ctx)).max(Decimal::ZERO);
            debug!("Role {} scored {:.2}", role, corrected);
            if corrected > best_score {
                best_score = corrected;
                best = role;
            }
        }
        best
    }

    fn base_score(role: Role, ctx: &AssignmentContext) -> Decimal {
        let mut score = Decimal::ZERO;
        match role {
            Role::HG => {
                if ctx.drawdown_pct > dec!(15) {
                    score += dec!(0.4);
                }
                if ctx.imbalance > dec!(0.6) {
                    score += dec!(0.3);
                }
                if ctx.losing_count > 10 {
                    score += dec!(0.3);
                }
                if ctx.volume <= dec!(0.05) {
                    score += dec!(0.2);
                }
            }
            Role::PW => {
                score += dec!(0.5);
                if ctx.signal_strength >= dec!(0.6) && ctx.signal_strength <= dec!(0.8) {
                    score += dec!(0.3);
                }
                if matches!(ctx.zone, CapitalZone::Safe | CapitalZone::Growth) {
                    score += dec!(0.2);
                }
                if ctx.drawdown_pct < dec!(10) {
                    score += dec!(0.2);
                }
            }
            Role::RH => {
                if ctx.drawdown_pct > dec!(20) {
                    score += dec!(0.5);
                }
                if ctx.losing_count > 15 {
                    score += dec!(0.3);
                }
                if ctx.signal_strength > dec!(0.8) {
                    score += dec!(0.3);
                }
                if ctx.zone == CapitalZone::Aggressive {
                    score += dec!(0.2);
                }
            }
            Role::SC => {
                if ctx.signal_strength > dec!(0.7) {
                    score += dec!(0.4);
                }
                if ctx.volume <= dec!(0.08) {
                    score += dec!(0.2);
                }
                if ctx.drawdown_pct < dec!(5) {
                    score += dec!(0.2);
                }
                if ctx.high_volatility_session {
                    score += dec!(0.3);
                }
            }
        }
        score
    }

    /// Nudge under-represented roles up and over-represented ones down,
    /// relative to the configured quota with a 20% tolerance band.
    fn balance_correction(&self, role: Role, ctx: &AssignmentContext) -> Decimal {
        let target = self.settings.quota(role);
        if target.is_zero() {
            return Decimal::ZERO;
        }
        let current = ctx.role_fractions.get(&role).copied().unwrap_or(Decimal::ZERO);
        let delta = current - target;
        let band = dec!(0.2) * target;
        if delta < -band {
            dec!(0.3)
        } else if delta > band {
            dec!(-0.3)
        } else {
            Decimal::ZERO
        }
    }

    /// Walk every bound position through the transition table. Unknown ids
    /// are skipped; nothing is applied here.
    pub fn evaluate_evolutions(&self, positions: &[Position], now: DateTime<Utc>) -> Vec<RoleEvolution> {
        let mut suggestions = Vec::new();
        for position in positions {
            let Some(binding) = self.bindings.get(&position.id) else {
                continue;
            };
            if let Some((to, reason)) = evaluate_transition(
                binding.role,
                position.pnl,
                position.age_hours(now),
                position.volume,
            ) {
                suggestions.push(RoleEvolution {
                    position_id: position.id,
                    from: binding.role,
                    to,
                    reason: reason.to_string(),
                });
            }
        }
        suggestions
    }

    /// Apply one suggested transition. Unknown ids are ignored.
    pub fn apply_evolution(&mut self, evolution: &RoleEvolution) {
        let Some(binding) = self.bindings.get_mut(&evolution.position_id) else {
            return;
        };
        if binding.role != evolution.from {
            return;
        }
        binding.history.push(RoleTransition {
            from: evolution.from,
            to: evolution.to,
            reason: evolution.reason.clone(),
            at: Utc::now(),
        });
        binding.role = evolution.to;
        info!(
            "Position #{} evolved {} -> {}: {}",
            evolution.position_id, evolution.from, evolution.to, evolution.reason
        );
    }

    /// Drop bindings for positions the broker no longer reports.
    pub fn sync(&mut self, open_ids: &HashSet<u64>) {
        let before = self.bindings.len();
        self.bindings.retain(|id, _| open_ids.contains(id));
        let purged = before - self.bindings.len();
        if purged > 0 {
            debug!("Purged {} role bindings for closed positions", purged);
        }
    }

    pub fn role_of(&self, position_id: u64) -> Option<Role> {
        self.bindings.get(&position_id).map(|b| b.role)
    }

    pub fn binding(&self, position_id: u64) -> Option<&RoleBinding> {
        self.bindings.get(&position_id)
    }

    pub fn roles_map(&self) -> HashMap<u64, Role> {
        self.bindings.iter().map(|(id, b)| (*id, b.role)).collect()
    }

    pub fn is_bound(&self, position_id: u64) -> bool {
        self.bindings.contains_key(&position_id)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
