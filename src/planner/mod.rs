use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::capital::CapitalContext;
use crate::config::{OrderRoleSettings, PositionSettings};
use crate::types::{Efficiency, PortfolioStats, Position, Role, Side, TradeMode};

/// Planner output cap per tick.
const MAX_ACTIONS_PER_TICK: usize = 10;
/// Margin level below which Pass D starts freeing margin.
const MARGIN_PRESSURE_LEVEL: Decimal = dec!(300);
/// Minimum estimated margin worth freeing, account currency.
const MIN_MARGIN_FREED: Decimal = dec!(50);
/// Losing threshold for recovery pairing.
const RECOVERY_LOSS_TRIGGER: Decimal = dec!(-10);
/// Profit threshold for recovery candidates.
const RECOVERY_PROFIT_FLOOR: Decimal = dec!(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CloseKind {
    RoleBased,
    MultiLevelProfit,
    CapitalRecovery,
    MarginOptimization,
    VolumeBalance,
}

/// One proposed close, single- or multi-position. All referenced positions
/// exist at emission time; ids never repeat across one planning pass.
#[derive(Debug, Clone, Serialize)]
pub struct CloseAction {
    pub kind: CloseKind,
    pub target_ids: Vec<u64>,
    pub projected_net_pnl: Decimal,
    /// 1 is most urgent, 5 least.
    pub priority: u8,
    pub reason: String,
    pub recovery_score: Option<Decimal>,
}

/// Frozen view of the tick the planner works on.
pub struct PlanInput<'a> {
    pub positions: &'a [Position],
    pub roles: &'a HashMap<u64, Role>,
    pub capital: &'a CapitalContext,
    pub stats: &'a PortfolioStats,
    pub now: DateTime<Utc>,
    /// Set by the risk gate once losses crossed the emergency line; flips
    /// the planner into drainage.
    pub emergency_stop: bool,
}

impl<'a> PlanInput<'a> {
    fn role_of(&self, id: u64) -> Role {
        self.roles.get(&id).copied().unwrap_or(Role::PW)
    }
}

/// Emits ranked close actions: role thresholds, layered profit taking,
/// recovery pairing, margin relief and volume rebalancing, in that order.
pub struct ClosePlanner {
    positions: PositionSettings,
    roles: OrderRoleSettings,
}

impl ClosePlanner {
    pub fn new(positions: PositionSettings, roles: OrderRoleSettings) -> Self {
        Self { positions, roles }
    }

    pub fn plan(&self, input: &PlanInput<'_>) -> Vec<CloseAction> {
        if input.positions.is_empty() {
            return Vec::new();
        }
        if input.emergency_stop {
            return self.plan_emergency(input);
        }

        let mut proposed: HashSet<u64> = HashSet::new();
        let mut actions: Vec<CloseAction> = Vec::new();

        self.pass_role_based(input, &mut proposed, &mut actions);
        self.pass_multi_level_profit(input, &mut proposed, &mut actions);
        self.pass_capital_recovery(input, &mut proposed, &mut actions);
        self.pass_margin_optimization(input, &mut proposed, &mut actions);
        self.pass_volume_balance(input, &mut proposed, &mut actions);

        // Stable sort keeps pass order inside each priority band.
        actions.sort_by_key(|a| a.priority);
        actions.truncate(MAX_ACTIONS_PER_TICK);
        debug!("Close planner emitted {} actions", actions.len());
        actions
    }

    /// Emergency drainage: realize every profit at once and cap the single
    /// worst loser; nothing else runs.
    fn plan_emergency(&self, input: &PlanInput<'_>) -> Vec<CloseAction> {
        let mut actions: Vec<CloseAction> = input
            .positions
            .iter()
            .filter(|p| p.pnl > Decimal::ZERO)
            .map(|p| CloseAction {
                kind: CloseKind::RoleBased,
                target_ids: vec![p.id],
                projected_net_pnl: p.pnl,
                priority: 1,
                reason: format!("emergency drain: ${:.2}", p.pnl),
                recovery_score: None,
            })
            .collect();

        if let Some(worst) = input
            .positions
            .iter()
            .filter(|p| p.pnl < Decimal::ZERO)
            .min_by_key(|p| p.pnl)
        {
            actions.push(CloseAction {
                kind: CloseKind::RoleBased,
                target_ids: vec![worst.id],
                projected_net_pnl: worst.pnl,
                priority: 1,
                reason: format!("emergency loss cap: ${:.2}", worst.pnl),
                recovery_score: None,
            });
        }
        info!("Emergency drainage planned for {} positions", actions.len());
        actions.truncate(MAX_ACTIONS_PER_TICK);
        actions
    }

    /// Pass A: each position against its role thresholds.
    fn pass_role_based(
        &self,
        input: &PlanInput<'_>,
        proposed: &mut HashSet<u64>,
        actions: &mut Vec<CloseAction>,
    ) {
        for position in input.positions {
            if proposed.contains(&position.id) {
                continue;
            }
            let role = input.role_of(position.id);
            let settings = self.roles.settings(role);
            let age = position.age_hours(input.now);

            let decision = if position.pnl >= settings.min_profit_threshold {
                let priority = match role {
                    Role::RH | Role::SC => 1,
                    Role::HG | Role::PW => 2,
                };
                Some((priority, format!("{} profit target: ${:.2}", role, position.pnl)))
            } else if position.pnl <= settings.max_loss_tolerance {
                Some((1, format!("{} loss limit: ${:.2}", role, position.pnl)))
            } else if age >= settings.max_age_hours {
                let priority = match role {
                    Role::RH | Role::SC => 2,
                    Role::HG | Role::PW => 3,
                };
                Some((priority, format!("{} max age: {:.1}h", role, age)))
            } else {
                None
            };

            if let Some((priority, reason)) = decision {
                proposed.insert(position.id);
                actions.push(CloseAction {
                    kind: CloseKind::RoleBased,
                    target_ids: vec![position.id],
                    projected_net_pnl: position.pnl,
                    priority,
                    reason,
                    recovery_score: None,
                });
            }
        }
    }

    /// Pass B: momentum / standard / micro profit bands against the
    /// dynamic per-position target.
    fn pass_multi_level_profit(
        &self,
        input: &PlanInput<'_>,
        proposed: &mut HashSet<u64>,
        actions: &mut Vec<CloseAction>,
    ) {
        if !self.positions.profit_taking.multi_level_enabled {
            return;
        }
        let bands = &self.positions.profit_taking;
        let mode = input.capital.mode;

        for position in input.positions {
            if proposed.contains(&position.id) {
                continue;
            }
            let role = input.role_of(position.id);
            let target = dynamic_profit_target(role, position.volume, mode);
            let pnl = position.pnl;
            let age = position.age_hours(input.now);

            let decision = if pnl >= bands.momentum_profits {
                Some((1, format!("momentum profit ${:.2} ({})", pnl, role)))
            } else if pnl >= bands.standard_profits {
                if mode.is_protective() {
                    Some((2, format!("standard profit ${:.2}, {} mode", pnl, mode)))
                } else if pnl >= target {
                    Some((2, format!("standard profit ${:.2} >= target ${:.2}", pnl, target)))
                } else {
                    None
                }
            } else if pnl >= bands.micro_profits {
                if role == Role::SC {
                    Some((2, format!("scalp micro profit ${:.2}", pnl)))
                } else if mode.is_protective() && pnl >= dec!(0.8) * target {
                    Some((3, format!("micro profit ${:.2} near target, {} mode", pnl, mode)))
                } else if age >= dec!(24) && pnl >= dec!(0.8) {
                    Some((4, format!("aged micro profit ${:.2} at {:.0}h", pnl, age)))
                } else {
                    None
                }
            } else {
                None
            };

            if let Some((priority, reason)) = decision {
                proposed.insert(position.id);
                actions.push(CloseAction {
                    kind: CloseKind::MultiLevelProfit,
                    target_ids: vec![position.id],
                    projected_net_pnl: pnl,
                    priority,
                    reason,
                    recovery_score: None,
                });
            }
        }
    }

    /// Pass C: pair each deep loser with a small set of winners whose
    /// combined close lands above the context-dependent floor. Subset
    /// search is a bounded heuristic over the top candidates by profit per
    /// lot, window sizes 1..=max.
    fn pass_capital_recovery(
        &self,
        input: &PlanInput<'_>,
        proposed: &mut HashSet<u64>,
        actions: &mut Vec<CloseAction>,
    ) {
        if !self.positions.recovery_combinations.enabled {
            return;
        }
        let capital = input.capital;
        let triggered = capital.drawdown_pct >= dec!(10)
            || matches!(capital.mode, TradeMode::Recovery | TradeMode::Conservative);
        if !triggered {
            return;
        }

        let losing: Vec<&Position> = input
            .positions
            .iter()
            .filter(|p| p.pnl < RECOVERY_LOSS_TRIGGER && !proposed.contains(&p.id))
            .collect();
        if losing.is_empty() {
            return;
        }

        for loser in losing {
            if proposed.contains(&loser.id) {
                continue;
            }
            let is_recovery_role = input.role_of(loser.id) == Role::RH;
            let min_net = recovery_min_net(capital, is_recovery_role);

            let mut candidates: Vec<&Position> = input
                .positions
                .iter()
                .filter(|p| p.pnl > RECOVERY_PROFIT_FLOOR && !proposed.contains(&p.id))
                .collect();
            if candidates.is_empty() {
                continue;
            }
            candidates.sort_by(|a, b| b.profit_per_lot().cmp(&a.profit_per_lot()));
            candidates.truncate(self.positions.recovery_combinations.top_candidates);

            let max_size = self
                .positions
                .recovery_combinations
                .max_combination_size
                .min(candidates.len());

            let mut best: Option<(Vec<u64>, Decimal, Decimal, Decimal)> = None;
            for size in 1..=max_size {
                for start in 0..=(candidates.len() - size) {
                    let window = &candidates[start..start + size];
                    let net: Decimal =
                        window.iter().map(|p| p.pnl).sum::<Decimal>() + loser.pnl;
                    if net < min_net {
                        continue;
                    }
                    let score = recovery_score(window, loser, capital, is_recovery_role);
                    let better = match &best {
                        Some((_, _, _, best_score)) => score > *best_score,
                        None => true,
                    };
                    if better {
                        let volume: Decimal = window.iter().map(|p| p.volume).sum();
                        best = Some((
                            window.iter().map(|p| p.id).collect(),
                            net,
                            volume,
                            score,
                        ));
                    }
                }
            }

            let Some((ids, net, _volume, score)) = best else {
                continue;
            };
            if score < dec!(0.4) {
                continue;
            }

            let mut target_ids = vec![loser.id];
            target_ids.extend(&ids);
            for id in &target_ids {
                proposed.insert(*id);
            }
            actions.push(CloseAction {
                kind: CloseKind::CapitalRecovery,
                target_ids,
                projected_net_pnl: net,
                priority: if is_recovery_role { 1 } else { 2 },
                reason: format!(
                    "recovery pairing: net ${:.2} (floor ${:.2}), {} mode",
                    net, min_net, capital.mode
                ),
                recovery_score: Some(score),
            });
        }
    }

    /// Pass D: under margin pressure, free margin from the weakest books.
    fn pass_margin_optimization(
        &self,
        input: &PlanInput<'_>,
        proposed: &mut HashSet<u64>,
        actions: &mut Vec<CloseAction>,
    ) {
        let Some(margin_level) = input.stats.margin_level else {
            return;
        };
        if margin_level >= MARGIN_PRESSURE_LEVEL {
            return;
        }

        let mut weak: Vec<&Position> = input
            .positions
            .iter()
            .filter(|p| {
                !proposed.contains(&p.id)
                    && Efficiency::classify(p.profit_per_lot(), input.role_of(p.id)).is_weak()
            })
            .collect();
        // Largest margin footprint first.
        weak.sort_by(|a, b| {
            (b.volume * b.current_price).cmp(&(a.volume * a.current_price))
        });

        for position in weak.into_iter().take(3) {
            let margin_freed = estimated_margin(position);
            if margin_freed <= MIN_MARGIN_FREED {
                continue;
            }
            proposed.insert(position.id);
            actions.push(CloseAction {
                kind: CloseKind::MarginOptimization,
                target_ids: vec![position.id],
                projected_net_pnl: position.pnl,
                priority: 1,
                reason: format!(
                    "free ${:.0} margin at {:.0}% level, impact ${:.2}",
                    margin_freed, margin_level, position.pnl
                ),
                recovery_score: None,
            });
        }
    }

    /// Pass E: shave the oversupplied side back toward balance.
    fn pass_volume_balance(
        &self,
        input: &PlanInput<'_>,
        proposed: &mut HashSet<u64>,
        actions: &mut Vec<CloseAction>,
    ) {
        let imbalance = input.stats.imbalance();
        if imbalance <= self.positions.volume_balance_tolerance {
            return;
        }
        let Some(excess_side) = input.stats.oversupplied_side() else {
            return;
        };

        let excess =
            (input.stats.buy_volume - input.stats.sell_volume).abs();
        let target_volume = excess / dec!(2);

        let mut pool: Vec<&Position> = input
            .positions
            .iter()
            .filter(|p| p.side == excess_side && !proposed.contains(&p.id))
            .collect();
        // Close the best earners per lot first so the pnl floor holds.
        pool.sort_by(|a, b| b.profit_per_lot().cmp(&a.profit_per_lot()));

        let mut selected: Vec<&Position> = Vec::new();
        let mut volume = Decimal::ZERO;
        let mut pnl = Decimal::ZERO;
        for position in pool {
            if volume + position.volume > target_volume * dec!(1.2) {
                continue;
            }
            if pnl + position.pnl < dec!(-10) {
                continue;
            }
            selected.push(position);
            volume += position.volume;
            pnl += position.pnl;
            if volume >= target_volume {
                break;
            }
        }
        if selected.is_empty() || volume < target_volume * dec!(0.8) {
            return;
        }

        let target_ids: Vec<u64> = selected.iter().map(|p| p.id).collect();
        for id in &target_ids {
            proposed.insert(*id);
        }
        actions.push(CloseAction {
            kind: CloseKind::VolumeBalance,
            target_ids,
            projected_net_pnl: pnl,
            priority: 2,
            reason: format!(
                "rebalance {} excess: {:.0}% imbalance, {:.2} lots",
                excess_side,
                imbalance * dec!(100),
                volume
            ),
            recovery_score: None,
        });
    }
}

/// Role base target scaled by volume and mode, floored at $0.5.
pub fn dynamic_profit_target(role: Role, volume: Decimal, mode: TradeMode) -> Decimal {
    let role_base = match role {
        Role::HG => dec!(4.0),
        Role::PW => dec!(2.5),
        Role::RH => dec!(1.0),
        Role::SC => dec!(0.5),
    };
    let volume_mult = (dec!(0.8) + dec!(2) * volume).clamp(Decimal::ZERO, dec!(1.5));
    let mode_mult = match mode {
        TradeMode::Normal | TradeMode::Offline => dec!(1.0),
        TradeMode::Conservative => dec!(0.7),
        TradeMode::Emergency => dec!(0.5),
        TradeMode::Recovery => dec!(0.8),
    };
    (role_base * volume_mult * mode_mult).max(dec!(0.5))
}

/// Net floor for a recovery pairing: RH books tolerate more, hard modes
/// and deep drawdown loosen it further.
fn recovery_min_net(capital: &CapitalContext, is_recovery_role: bool) -> Decimal {
    let base = if is_recovery_role { dec!(-5) } else { dec!(-2) };
    match capital.mode {
        TradeMode::Emergency => base - dec!(3),
        TradeMode::Recovery => base - dec!(2),
        _ if capital.drawdown_pct > dec!(25) => base - dec!(2),
        _ => base,
    }
}

fn recovery_profit_score(
    net: Decimal,
    mode: TradeMode,
    drawdown_pct: Decimal,
    is_recovery_role: bool,
) -> Decimal {
    let mut score = if net >= dec!(5) {
        dec!(1.0)
    } else if net >= Decimal::ZERO {
        dec!(0.7)
    } else if net >= dec!(-5) {
        dec!(0.5)
    } else {
        dec!(0.2)
    };
    match mode {
        TradeMode::Emergency => score += dec!(0.3),
        TradeMode::Recovery => score += dec!(0.2),
        _ => {}
    }
    if is_recovery_role {
        score += dec!(0.2);
    }
    if drawdown_pct > dec!(25) {
        score += dec!(0.3);
    } else if drawdown_pct > dec!(20) {
        score += dec!(0.2);
    }
    score.clamp(Decimal::ZERO, Decimal::ONE)
}

fn capital_urgency_score(capital: &CapitalContext, is_recovery_role: bool) -> Decimal {
    let mut score = if capital.efficiency > dec!(1.2) {
        dec!(0.3)
    } else if capital.efficiency > dec!(1.0) {
        dec!(0.5)
    } else if capital.efficiency > dec!(0.8) {
        dec!(0.7)
    } else {
        dec!(1.0)
    };
    if capital.drawdown_pct > dec!(25) {
        score += dec!(0.4);
    } else if capital.drawdown_pct > dec!(20) {
        score += dec!(0.3);
    } else if capital.drawdown_pct > dec!(15) {
        score += dec!(0.2);
    }
    if is_recovery_role {
        score += dec!(0.1);
    }
    score.clamp(Decimal::ZERO, Decimal::ONE)
}

fn recovery_score(
    window: &[&Position],
    loser: &Position,
    capital: &CapitalContext,
    is_recovery_role: bool,
) -> Decimal {
    let net: Decimal = window.iter().map(|p| p.pnl).sum::<Decimal>() + loser.pnl;
    let window_volume: Decimal = window.iter().map(|p| p.volume).sum();
    let volume_match = {
        let larger = window_volume.max(loser.volume);
        if larger.is_zero() {
            Decimal::ZERO
        } else {
            window_volume.min(loser.volume) / larger
        }
    };
    let profit = recovery_profit_score(net, capital.mode, capital.drawdown_pct, is_recovery_role);
    let urgency = capital_urgency_score(capital, is_recovery_role);
    dec!(0.5) * profit + dec!(0.3) * volume_match + dec!(0.2) * urgency
}

/// Rough per-position margin footprint for gold at 1:100 leverage.
fn estimated_margin(position: &Position) -> Decimal {
    position.volume * position.current_price
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capital::ZoneBudgets;
    use chrono::Duration;

    fn capital(mode: TradeMode, equity: Decimal, peak: Decimal) -> CapitalContext {
        let initial = dec!(5000);
        let drawdown = if peak.is_zero() {
            Decimal::ZERO
        } else {
            ((peak - equity) / peak * dec!(100)).max(Decimal::ZERO)
        };
        let safe = dec!(0.5) * equity;
        let growth = dec!(0.35) * equity;
        CapitalContext {
            initial_capital: initial,
            current_equity: equity,
            peak_equity: peak,
            drawdown_pct: drawdown,
            mode,
            zones: ZoneBudgets {
                safe,
                growth,
                aggressive: equity - safe - growth,
            },
            efficiency: equity / initial,
            updated_at: Utc::now(),
        }
    }

    fn position(id: u64, side: Side, volume: Decimal, pnl: Decimal, age_hours: i64) -> Position {
        Position {
            id,
            side,
            volume,
            open_price: dec!(2000),
            current_price: dec!(2000),
            pnl,
            open_time: Utc::now() - Duration::hours(age_hours),
        }
    }

    fn planner() -> ClosePlanner {
        ClosePlanner::new(PositionSettings::default(), OrderRoleSettings::default())
    }

    fn plan(
        planner: &ClosePlanner,
        positions: &[Position],
        roles: &HashMap<u64, Role>,
        capital: &CapitalContext,
        margin_level: Option<Decimal>,
        emergency_stop: bool,
    ) -> Vec<CloseAction> {
        let stats = PortfolioStats::build(positions, roles, margin_level);
        planner.plan(&PlanInput {
            positions,
            roles,
            capital,
            stats: &stats,
            now: Utc::now(),
            emergency_stop,
        })
    }

    #[test]
    fn scalp_takes_quick_profit_at_priority_one() {
        let positions = vec![position(1, Side::Buy, dec!(0.03), dec!(0.9), 1)];
        let roles: HashMap<u64, Role> = [(1, Role::SC)].into_iter().collect();
        let actions = plan(
            &planner(),
            &positions,
            &roles,
            &capital(TradeMode::Normal, dec!(5000), dec!(5000)),
            None,
            false,
        );
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, CloseKind::RoleBased);
        assert_eq!(actions[0].priority, 1);
    }

    #[test]
    fn loss_limit_closes_at_priority_one() {
        let positions = vec![position(2, Side::Sell, dec!(0.05), dec!(-31), 3)];
        let roles: HashMap<u64, Role> = [(2, Role::PW)].into_iter().collect();
        let actions = plan(
            &planner(),
            &positions,
            &roles,
            &capital(TradeMode::Normal, dec!(5000), dec!(5000)),
            None,
            false,
        );
        assert_eq!(actions[0].priority, 1);
        assert!(actions[0].reason.contains("loss limit"));
    }

    #[test]
    fn emergency_mode_takes_standard_profit_immediately() {
        // Scenario: profitable PW at $2.1 in Emergency mode. The dynamic
        // target would be above the pnl, but protective modes close as
        // soon as the standard band is entered.
        let positions = vec![position(3, Side::Buy, dec!(0.05), dec!(2.1), 2)];
        let roles: HashMap<u64, Role> = [(3, Role::PW)].into_iter().collect();
        let actions = plan(
            &planner(),
            &positions,
            &roles,
            &capital(TradeMode::Emergency, dec!(3700), dec!(5000)),
            None,
            false,
        );
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, CloseKind::MultiLevelProfit);
        assert_eq!(actions[0].priority, 2);
    }

    #[test]
    fn normal_mode_standard_band_respects_dynamic_target() {
        // PW at $2.0 with a $2.1 target holds in Normal mode.
        let positions = vec![position(4, Side::Buy, dec!(0.05), dec!(2.0), 6)];
        let roles: HashMap<u64, Role> = [(4, Role::PW)].into_iter().collect();
        let actions = plan(
            &planner(),
            &positions,
            &roles,
            &capital(TradeMode::Normal, dec!(5000), dec!(5000)),
            None,
            false,
        );
        assert!(actions.is_empty());
    }

    #[test]
    fn momentum_band_always_closes() {
        // Exercised directly: in a full plan the role pass claims a $9.50
        // winner first, at its own priority.
        let positions = vec![position(5, Side::Buy, dec!(0.02), dec!(9.5), 1)];
        let roles: HashMap<u64, Role> = [(5, Role::HG)].into_iter().collect();
        let capital = capital(TradeMode::Normal, dec!(5000), dec!(5000));
        let stats = PortfolioStats::build(&positions, &roles, None);
        let input = PlanInput {
            positions: &positions,
            roles: &roles,
            capital: &capital,
            stats: &stats,
            now: Utc::now(),
            emergency_stop: false,
        };
        let mut proposed = HashSet::new();
        let mut actions = Vec::new();
        planner().pass_multi_level_profit(&input, &mut proposed, &mut actions);
        assert_eq!(actions[0].kind, CloseKind::MultiLevelProfit);
        assert_eq!(actions[0].priority, 1);
        assert!(actions[0].reason.contains("momentum"));
    }

    #[test]
    fn recovery_pairing_realizes_acceptable_net() {
        // L1 Buy 0.10 at -$18 (RH) against three Sell winners 6/4/3. The
        // pass is exercised directly; in a full plan the winners may be
        // claimed by earlier passes first.
        let positions = vec![
            position(10, Side::Buy, dec!(0.10), dec!(-18), 5),
            position(11, Side::Sell, dec!(0.04), dec!(6), 2),
            position(12, Side::Sell, dec!(0.04), dec!(4), 2),
            position(13, Side::Sell, dec!(0.02), dec!(3), 2),
        ];
        let roles: HashMap<u64, Role> = [
            (10, Role::RH),
            (11, Role::PW),
            (12, Role::PW),
            (13, Role::PW),
        ]
        .into_iter()
        .collect();
        let capital = capital(TradeMode::Recovery, dec!(3900), dec!(5000));
        assert_eq!(capital.drawdown_pct, dec!(22));

        let stats = PortfolioStats::build(&positions, &roles, None);
        let input = PlanInput {
            positions: &positions,
            roles: &roles,
            capital: &capital,
            stats: &stats,
            now: Utc::now(),
            emergency_stop: false,
        };
        let mut proposed = HashSet::new();
        let mut actions = Vec::new();
        planner().pass_capital_recovery(&input, &mut proposed, &mut actions);

        assert_eq!(actions.len(), 1);
        let action = &actions[0];
        assert_eq!(action.kind, CloseKind::CapitalRecovery);
        assert_eq!(action.priority, 1);
        assert_eq!(action.projected_net_pnl, dec!(-5));
        assert!(action.recovery_score.unwrap() >= dec!(0.4));
        let mut ids = action.target_ids.clone();
        ids.sort_unstable();
        assert_eq!(ids, vec![10, 11, 12, 13]);
    }

    #[test]
    fn recovery_needs_trigger_context() {
        let positions = vec![
            position(10, Side::Buy, dec!(0.10), dec!(-18), 5),
            position(11, Side::Sell, dec!(0.10), dec!(20), 2),
        ];
        let roles: HashMap<u64, Role> = [(10, Role::PW), (11, Role::PW)].into_iter().collect();
        // 2% drawdown, Normal mode: pass C must not run. The winner still
        // closes through the momentum band, but no pairing is emitted.
        let actions = plan(
            &planner(),
            &positions,
            &roles,
            &capital(TradeMode::Normal, dec!(4900), dec!(5000)),
            None,
            false,
        );
        assert!(actions.iter().all(|a| a.kind != CloseKind::CapitalRecovery));
    }

    #[test]
    fn emitted_recovery_actions_are_admissible() {
        // Winners too small: net = -18 + 3 = -15 under every floor, so no
        // action may be emitted even with the pass run on a clean slate.
        let positions = vec![
            position(20, Side::Buy, dec!(0.10), dec!(-18), 5),
            position(21, Side::Sell, dec!(0.02), dec!(3), 2),
        ];
        let roles: HashMap<u64, Role> = [(20, Role::RH), (21, Role::PW)].into_iter().collect();
        let capital = capital(TradeMode::Recovery, dec!(3900), dec!(5000));
        let stats = PortfolioStats::build(&positions, &roles, None);
        let input = PlanInput {
            positions: &positions,
            roles: &roles,
            capital: &capital,
            stats: &stats,
            now: Utc::now(),
            emergency_stop: false,
        };
        let mut proposed = HashSet::new();
        let mut actions = Vec::new();
        planner().pass_capital_recovery(&input, &mut proposed, &mut actions);
        assert!(actions.is_empty());
    }

    #[test]
    fn margin_pressure_frees_weak_positions() {
        // Deeply inefficient books at low margin level.
        let positions = vec![
            position(30, Side::Buy, dec!(0.10), dec!(-25), 3),
            position(31, Side::Buy, dec!(0.05), dec!(-18), 3),
            position(32, Side::Buy, dec!(0.02), dec!(5), 1),
        ];
        let roles: HashMap<u64, Role> = [
            (30, Role::PW),
            (31, Role::PW),
            (32, Role::PW),
        ]
        .into_iter()
        .collect();
        let actions = plan(
            &planner(),
            &positions,
            &roles,
            &capital(TradeMode::Normal, dec!(5000), dec!(5000)),
            Some(dec!(250)),
            false,
        );
        let margin: Vec<&CloseAction> = actions
            .iter()
            .filter(|a| a.kind == CloseKind::MarginOptimization)
            .collect();
        assert_eq!(margin.len(), 2);
        assert!(margin.iter().all(|a| a.priority == 1));
        // Largest footprint first.
        assert_eq!(margin[0].target_ids, vec![30]);
    }

    #[test]
    fn volume_imbalance_is_shaved_from_the_heavy_side() {
        // 0.30 lots Buy vs 0.05 Sell: imbalance 0.714 > 0.35.
        let positions = vec![
            position(40, Side::Buy, dec!(0.10), dec!(1.5), 2),
            position(41, Side::Buy, dec!(0.10), dec!(0.2), 2),
            position(42, Side::Buy, dec!(0.10), dec!(-1), 2),
            position(43, Side::Sell, dec!(0.05), dec!(0.5), 2),
        ];
        let roles: HashMap<u64, Role> = [
            (40, Role::PW),
            (41, Role::PW),
            (42, Role::PW),
            (43, Role::PW),
        ]
        .into_iter()
        .collect();
        let actions = plan(
            &planner(),
            &positions,
            &roles,
            &capital(TradeMode::Normal, dec!(5000), dec!(5000)),
            None,
            false,
        );
        let balance: Vec<&CloseAction> = actions
            .iter()
            .filter(|a| a.kind == CloseKind::VolumeBalance)
            .collect();
        assert_eq!(balance.len(), 1);
        assert_eq!(balance[0].priority, 2);
        let closed_volume: Decimal = balance[0]
            .target_ids
            .iter()
            .map(|id| positions.iter().find(|p| p.id == *id).unwrap().volume)
            .sum();
        // Half the 0.25 excess is 0.125; selection stops once reached.
        assert!(closed_volume >= dec!(0.10));
        assert!(balance[0].target_ids.iter().all(|id| {
            positions.iter().find(|p| p.id == *id).unwrap().side == Side::Buy
        }));
    }

    #[test]
    fn no_position_appears_twice_in_one_pass() {
        // A position qualifying for several passes must be claimed once.
        let positions = vec![
            position(50, Side::Buy, dec!(0.10), dec!(-18), 5),
            position(51, Side::Sell, dec!(0.04), dec!(6), 2),
            position(52, Side::Sell, dec!(0.04), dec!(4), 2),
            position(53, Side::Sell, dec!(0.02), dec!(3), 2),
            position(54, Side::Buy, dec!(0.15), dec!(9), 1),
            position(55, Side::Buy, dec!(0.12), dec!(-31), 7),
        ];
        let roles: HashMap<u64, Role> = [
            (50, Role::RH),
            (51, Role::PW),
            (52, Role::PW),
            (53, Role::PW),
            (54, Role::PW),
            (55, Role::PW),
        ]
        .into_iter()
        .collect();
        let actions = plan(
            &planner(),
            &positions,
            &roles,
            &capital(TradeMode::Recovery, dec!(3900), dec!(5000)),
            Some(dec!(250)),
            false,
        );
        let mut seen: HashSet<u64> = HashSet::new();
        for action in &actions {
            for id in &action.target_ids {
                assert!(seen.insert(*id), "position {} proposed twice", id);
            }
        }
        assert!(actions.len() <= MAX_ACTIONS_PER_TICK);
        // Priorities are sorted ascending.
        for pair in actions.windows(2) {
            assert!(pair[0].priority <= pair[1].priority);
        }
    }

    #[test]
    fn emergency_stop_drains_profits_and_caps_worst_loss() {
        let positions = vec![
            position(60, Side::Buy, dec!(0.05), dec!(4), 2),
            position(61, Side::Sell, dec!(0.05), dec!(1), 2),
            position(62, Side::Buy, dec!(0.10), dec!(-40), 9),
            position(63, Side::Buy, dec!(0.10), dec!(-12), 9),
        ];
        let roles: HashMap<u64, Role> = HashMap::new();
        let actions = plan(
            &planner(),
            &positions,
            &roles,
            &capital(TradeMode::Emergency, dec!(3600), dec!(5000)),
            None,
            true,
        );
        assert_eq!(actions.len(), 3);
        assert!(actions.iter().all(|a| a.priority == 1));
        let ids: HashSet<u64> = actions.iter().flat_map(|a| a.target_ids.clone()).collect();
        assert!(ids.contains(&60) && ids.contains(&61));
        assert!(ids.contains(&62), "worst loser must be capped");
        assert!(!ids.contains(&63));
    }

    #[test]
    fn dynamic_target_floors_at_fifty_cents() {
        assert_eq!(
            dynamic_profit_target(Role::SC, dec!(0.01), TradeMode::Emergency),
            dec!(0.5)
        );
        // PW 2.5 * (0.8 + 0.2) * 1.0 = 2.5.
        assert_eq!(
            dynamic_profit_target(Role::PW, dec!(0.10), TradeMode::Normal),
            dec!(2.5)
        );
        // Volume multiplier caps at 1.5.
        assert_eq!(
            dynamic_profit_target(Role::HG, dec!(0.50), TradeMode::Normal),
            dec!(6.0)
        );
    }

    #[test]
    fn recovery_floor_depends_on_role_and_mode() {
        let recovery = capital(TradeMode::Recovery, dec!(3900), dec!(5000));
        assert_eq!(recovery_min_net(&recovery, true), dec!(-7));
        assert_eq!(recovery_min_net(&recovery, false), dec!(-4));
        let normal = capital(TradeMode::Normal, dec!(4900), dec!(5000));
        assert_eq!(recovery_min_net(&normal, false), dec!(-2));
        let emergency = capital(TradeMode::Emergency, dec!(3700), dec!(5000));
        assert_eq!(recovery_min_net(&emergency, true), dec!(-8));
    }
}
