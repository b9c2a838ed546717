#![allow(dead_code)]
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use tracing::{info, warn};

use crate::capital::CapitalContext;
use crate::config::RiskSettings;
use crate::types::{CapitalZone, PortfolioStats, Role, Side, TradeMode};

/// Ounces per lot for spot gold.
const GOLD_CONTRACT_OZ: Decimal = dec!(100);
/// Adverse move assumed when estimating per-trade risk, in points.
const ASSUMED_ADVERSE_POINTS: Decimal = dec!(2.0);
/// Broker order errors in a row that engage the emergency stop.
const MAX_CONSECUTIVE_ORDER_FAILURES: usize = 5;
/// Alternate roles tried when the proposed role's slots are full.
const ROLE_FALLBACK_ORDER: [Role; 4] = [Role::RH, Role::PW, Role::SC, Role::HG];

#[derive(Debug, Clone, Serialize)]
pub struct ProposedOrder {
    pub side: Side,
    pub volume: Decimal,
    pub zone: CapitalZone,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdmittedOrder {
    pub lot: Decimal,
    pub role: Role,
    pub confidence: Decimal,
    pub adjustments: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub enum Admission {
    Admit(AdmittedOrder),
    Reject { reason: String },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admit(_))
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        match self {
            Admission::Admit(_) => None,
            Admission::Reject { reason } => Some(reason),
        }
    }
}

/// Derived suggestion surface: how the operator could retune the gate for
/// the current mode and drawdown. Informational only.
#[derive(Debug, Clone, Serialize)]
pub struct RiskRecommendation {
    pub suggested_max_positions: usize,
    pub suggested_risk_percent: Decimal,
    pub notes: Vec<String>,
}

/// Final admission check on every proposed order. Owns the daily budget
/// counters, the consecutive-loss streak and the emergency stop flag.
pub struct RiskGate {
    settings: RiskSettings,
    day: NaiveDate,
    trades_today: usize,
    volume_today: Decimal,
    realized_pnl_today: Decimal,
    consecutive_losses: usize,
    consecutive_order_failures: usize,
    emergency_stop: bool,
}

impl RiskGate {
    pub fn new(settings: RiskSettings) -> Self {
        Self {
            settings,
            day: Utc::now().date_naive(),
            trades_today: 0,
            volume_today: Decimal::ZERO,
            realized_pnl_today: Decimal::ZERO,
            consecutive_losses: 0,
            consecutive_order_failures: 0,
            emergency_stop: false,
        }
    }

    pub fn admit(
        &mut self,
        order: &ProposedOrder,
        capital: &CapitalContext,
        stats: &PortfolioStats,
    ) -> Admission {
        self.roll_day();

        if self.emergency_stop {
            return self.reject("emergency stop active");
        }

        // Daily budgets.
        if self.trades_today >= self.settings.max_daily_trades {
            return self.reject("daily trade budget spent");
        }
        let day_pnl = self.realized_pnl_today + stats.total_pnl;
        if day_pnl <= self.settings.max_daily_loss {
            return self.reject("daily loss limit reached");
        }
        if self.volume_today + order.volume > self.settings.max_daily_volume {
            return self.reject("daily volume budget spent");
        }

        if let Some(margin_level) = stats.margin_level {
            if margin_level < self.settings.stop_trading_margin_level {
                return self.reject("margin level below trading floor");
            }
        }

        let total_open = stats.total_count();
        let position_ceiling = self.position_ceiling(capital.mode);
        if total_open >= position_ceiling {
            return self.reject("position ceiling reached");
        }

        let mut adjustments: Vec<String> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();

        // Per-role soft cap, 10% of grace over the configured share.
        let mut role = order.role;
        if !self.role_has_headroom(role, stats, capital.mode) {
            match ROLE_FALLBACK_ORDER
                .iter()
                .find(|r| self.role_has_headroom(**r, stats, capital.mode))
            {
                Some(alternate) => {
                    adjustments.push(format!("role reassigned {} -> {}", role, alternate));
                    role = *alternate;
                }
                None => return self.reject("all role slots full"),
            }
        }

        if self.consecutive_losses >= self.settings.max_consecutive_losses {
            self.engage_emergency("consecutive loss streak");
            return self.reject("consecutive loss streak");
        }

        // Per-trade risk budget; the lot only ever shrinks.
        let mut lot = order.volume;
        let allowed_risk_pct = self.allowed_risk_pct(order.zone, capital.mode);
        let risk_pct = estimated_risk_pct(lot, capital.current_equity);
        if risk_pct > allowed_risk_pct {
            let shrunk = max_lot_for_risk(allowed_risk_pct, capital.current_equity).min(lot);
            let shrunk = shrunk.max(dec!(0.01));
            if shrunk < lot {
                adjustments.push(format!("lot reduced {} -> {} for zone risk", lot, shrunk));
                lot = shrunk;
            }
        }

        if capital.drawdown_pct > dec!(15) {
            warnings.push(format!("drawdown elevated: {:.1}%", capital.drawdown_pct));
        }
        if let Some(margin_level) = stats.margin_level {
            if margin_level < self.settings.min_margin_level {
                warnings.push(format!("margin level thin: {:.0}%", margin_level));
            }
        }
        if day_pnl < self.settings.max_daily_loss * dec!(0.8) {
            warnings.push("approaching daily loss limit".to_string());
        }

        let risk_score = self.risk_score(capital, day_pnl);
        let confidence = (Decimal::ONE
            - dec!(0.3) * risk_score
            - dec!(0.1) * Decimal::from(adjustments.len() as u64)
            - dec!(0.05) * Decimal::from(warnings.len() as u64))
        .clamp(Decimal::ZERO, Decimal::ONE);

        Admission::Admit(AdmittedOrder {
            lot,
            role,
            confidence,
            adjustments,
            warnings,
        })
    }

    /// A filled entry consumes daily budget.
    pub fn record_fill(&mut self, volume: Decimal) {
        self.roll_day();
        self.trades_today += 1;
        self.volume_today += volume;
    }

    /// Every realized close feeds the loss streak and the daily pnl.
    pub fn record_close_result(&mut self, pnl: Decimal) {
        self.roll_day();
        self.realized_pnl_today += pnl;
        if pnl < Decimal::ZERO {
            self.consecutive_losses += 1;
            if self.consecutive_losses >= self.settings.max_consecutive_losses {
                self.engage_emergency("consecutive loss streak");
            }
        } else {
            self.consecutive_losses = 0;
        }
    }

    pub fn record_order_failure(&mut self) {
        self.consecutive_order_failures += 1;
        if self.consecutive_order_failures >= MAX_CONSECUTIVE_ORDER_FAILURES {
            self.engage_emergency("broker order failures accumulating");
        }
    }

    pub fn record_order_success(&mut self) {
        self.consecutive_order_failures = 0;
    }

    /// Cumulative loss line: realized today plus floating book.
    pub fn check_emergency_loss(&mut self, stats: &PortfolioStats) {
        let cumulative = self.realized_pnl_today + stats.total_pnl;
        if cumulative <= self.settings.emergency_close_loss {
            self.engage_emergency("cumulative loss past emergency line");
        }
    }

    pub fn emergency_stop_engaged(&self) -> bool {
        self.emergency_stop
    }

    /// Operator-level reset after the book is drained.
    pub fn reset_emergency(&mut self) {
        if self.emergency_stop {
            info!("Emergency stop reset by operator");
        }
        self.emergency_stop = false;
        self.consecutive_order_failures = 0;
        self.consecutive_losses = 0;
    }

    pub fn consecutive_losses(&self) -> usize {
        self.consecutive_losses
    }

    /// Mode- and drawdown-aware retuning hints.
    pub fn recommended_settings(&self, capital: &CapitalContext) -> RiskRecommendation {
        let mut notes = Vec::new();
        let (positions, risk_pct) = match capital.mode {
            TradeMode::Emergency => {
                notes.push("emergency: safe zone only, minimum size".to_string());
                (self.settings.max_positions / 4, dec!(0.25))
            }
            TradeMode::Conservative => {
                notes.push("conservative: reduce size and frequency".to_string());
                (self.settings.max_positions / 2, dec!(0.5))
            }
            TradeMode::Recovery => {
                notes.push("recovery: bonus slots for RH entries".to_string());
                (
                    self.settings.max_positions
                        + self.settings.recovery_exceptions.recovery_position_bonus,
                    self.settings.max_risk_per_trade.recovery_override,
                )
            }
            TradeMode::Normal | TradeMode::Offline => {
                (self.settings.max_positions, self.settings.max_risk_per_trade.growth)
            }
        };
        if capital.drawdown_pct > dec!(15) {
            notes.push(format!(
                "drawdown {:.1}%: prefer hedge and recovery roles",
                capital.drawdown_pct
            ));
        }
        RiskRecommendation {
            suggested_max_positions: positions.max(1),
            suggested_risk_percent: risk_pct,
            notes,
        }
    }

    fn reject(&self, reason: &str) -> Admission {
        info!("Order rejected by risk gate: {}", reason);
        Admission::Reject {
            reason: reason.to_string(),
        }
    }

    fn engage_emergency(&mut self, reason: &str) {
        if !self.emergency_stop {
            warn!("EMERGENCY STOP engaged: {}", reason);
        }
        self.emergency_stop = true;
    }

    fn roll_day(&mut self) {
        let today = Utc::now().date_naive();
        if today != self.day {
            self.day = today;
            self.trades_today = 0;
            self.volume_today = Decimal::ZERO;
            self.realized_pnl_today = Decimal::ZERO;
            info!("Daily risk counters reset");
        }
    }

    fn position_ceiling(&self, mode: TradeMode) -> usize {
        if mode == TradeMode::Recovery {
            self.settings.max_positions + self.settings.recovery_exceptions.recovery_position_bonus
        } else {
            self.settings.max_positions
        }
    }

    /// Soft cap plus 10% grace; in Recovery the bonus slots go to RH
    /// first, and to PW only while RH is not over its base cap.
    fn role_has_headroom(&self, role: Role, stats: &PortfolioStats, mode: TradeMode) -> bool {
        let total = stats.total_count();
        if total == 0 {
            return true;
        }
        let cap = self.settings.role_caps.cap(role) + dec!(0.10);
        let current = stats.role_fraction(role);
        if current < cap {
            return true;
        }
        if mode == TradeMode::Recovery {
            let bonus = self.settings.recovery_exceptions.recovery_position_bonus;
            let extra = Decimal::from(bonus as u64) / Decimal::from(total as u64);
            match role {
                Role::RH => return current < cap + extra,
                Role::PW => {
                    let rh_over =
                        stats.role_fraction(Role::RH) >= self.settings.role_caps.cap(Role::RH);
                    if !rh_over {
                        return current < cap + extra;
                    }
                }
                _ => {}
            }
        }
        false
    }

    fn allowed_risk_pct(&self, zone: CapitalZone, mode: TradeMode) -> Decimal {
        let base = self.settings.max_risk_per_trade.percent_for(zone, mode);
        if mode == TradeMode::Recovery {
            base + self.settings.recovery_exceptions.recovery_risk_bonus
        } else {
            base
        }
    }

    /// 0..1 pressure aggregate over the gate's own soft limits.
    fn risk_score(&self, capital: &CapitalContext, day_pnl: Decimal) -> Decimal {
        let drawdown = (capital.drawdown_pct / dec!(30)).clamp(Decimal::ZERO, Decimal::ONE);
        let trades = Decimal::from(self.trades_today as u64)
            / Decimal::from(self.settings.max_daily_trades.max(1) as u64);
        let loss = if self.settings.max_daily_loss.is_zero() {
            Decimal::ZERO
        } else {
            (day_pnl.min(Decimal::ZERO) / self.settings.max_daily_loss)
                .clamp(Decimal::ZERO, Decimal::ONE)
        };
        let streak = Decimal::from(self.consecutive_losses as u64)
            / Decimal::from(self.settings.max_consecutive_losses.max(1) as u64);
        ((drawdown + trades + loss + streak) / dec!(4)).clamp(Decimal::ZERO, Decimal::ONE)
    }
}

/// Risk of one lot as a percent of equity, assuming a fixed adverse move.
fn estimated_risk_pct(lot: Decimal, equity: Decimal) -> Decimal {
    if equity <= Decimal::ZERO {
        return dec!(100);
    }
    lot * GOLD_CONTRACT_OZ * ASSUMED_ADVERSE_POINTS / equity * dec!(100)
}

fn max_lot_for_risk(allowed_pct: Decimal, equity: Decimal) -> Decimal {
    let raw = allowed_pct / dec!(100) * equity / (GOLD_CONTRACT_OZ * ASSUMED_ADVERSE_POINTS);
    (raw * dec!(100)).floor() / dec!(100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capital::ZoneBudgets;
    use crate::types::Position;
    use std::collections::HashMap;

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

    fn order(volume: Decimal, zone: CapitalZone, role: Role) -> ProposedOrder {
        ProposedOrder {
            side: Side::Buy,
            volume,
            zone,
            role,
        }
    }

    fn stats_with_roles(counts: &[(Role, usize)]) -> PortfolioStats {
        let mut positions = Vec::new();
        let mut roles = HashMap::new();
        let mut id = 1u64;
        for (role, count) in counts {
            for _ in 0..*count {
                positions.push(Position {
                    id,
                    side: Side::Buy,
                    volume: dec!(0.02),
                    open_price: dec!(2000),
                    current_price: dec!(2000),
                    pnl: Decimal::ZERO,
                    open_time: Utc::now(),
                });
                roles.insert(id, *role);
                id += 1;
            }
        }
        PortfolioStats::build(&positions, &roles, Some(dec!(500)))
    }

    #[test]
    fn clean_book_is_admitted() {
        let mut gate = RiskGate::new(RiskSettings::default());
        let capital = capital(TradeMode::Normal, dec!(5000), dec!(5000));
        let stats = PortfolioStats::default();
        let admission = gate.admit(&order(dec!(0.02), CapitalZone::Growth, Role::PW), &capital, &stats);
        match admission {
            Admission::Admit(admitted) => {
                assert_eq!(admitted.lot, dec!(0.02));
                assert_eq!(admitted.role, Role::PW);
                assert_eq!(admitted.confidence, Decimal::ONE);
            }
            Admission::Reject { reason } => panic!("rejected: {}", reason),
        }
    }

    #[test]
    fn emergency_stop_rejects_everything() {
        let mut gate = RiskGate::new(RiskSettings::default());
        gate.engage_emergency("test");
        let capital = capital(TradeMode::Normal, dec!(5000), dec!(5000));
        let admission = gate.admit(
            &order(dec!(0.01), CapitalZone::Safe, Role::PW),
            &capital,
            &PortfolioStats::default(),
        );
        assert_eq!(admission.rejection_reason(), Some("emergency stop active"));
    }

    #[test]
    fn daily_trade_budget_is_enforced() {
        let mut settings = RiskSettings::default();
        settings.max_daily_trades = 2;
        let mut gate = RiskGate::new(settings);
        let capital = capital(TradeMode::Normal, dec!(5000), dec!(5000));
        let stats = PortfolioStats::default();

        gate.record_fill(dec!(0.02));
        gate.record_fill(dec!(0.02));
        let admission = gate.admit(&order(dec!(0.02), CapitalZone::Growth, Role::PW), &capital, &stats);
        assert_eq!(admission.rejection_reason(), Some("daily trade budget spent"));
    }

    #[test]
    fn daily_loss_with_floating_book_rejects() {
        let mut gate = RiskGate::new(RiskSettings::default());
        let capital = capital(TradeMode::Normal, dec!(5000), dec!(5000));
        gate.record_close_result(dec!(-150));
        let mut stats = PortfolioStats::default();
        stats.total_pnl = dec!(-160);
        let admission = gate.admit(&order(dec!(0.02), CapitalZone::Growth, Role::PW), &capital, &stats);
        assert_eq!(admission.rejection_reason(), Some("daily loss limit reached"));
    }

    #[test]
    fn margin_floor_blocks_trading() {
        let mut gate = RiskGate::new(RiskSettings::default());
        let capital = capital(TradeMode::Normal, dec!(5000), dec!(5000));
        let mut stats = PortfolioStats::default();
        stats.margin_level = Some(dec!(110));
        let admission = gate.admit(&order(dec!(0.02), CapitalZone::Growth, Role::PW), &capital, &stats);
        assert_eq!(
            admission.rejection_reason(),
            Some("margin level below trading floor")
        );
    }

    #[test]
    fn full_role_slot_suggests_alternate() {
        let mut gate = RiskGate::new(RiskSettings::default());
        let capital = capital(TradeMode::Normal, dec!(5000), dec!(5000));
        // 10 of 16 positions are SC: 62% against a 20%+10% cap.
        let stats = stats_with_roles(&[(Role::SC, 10), (Role::PW, 6)]);
        let admission = gate.admit(&order(dec!(0.02), CapitalZone::Growth, Role::SC), &capital, &stats);
        match admission {
            Admission::Admit(admitted) => {
                assert_eq!(admitted.role, Role::RH);
                assert_eq!(admitted.adjustments.len(), 1);
                assert!(admitted.confidence < Decimal::ONE);
            }
            Admission::Reject { reason } => panic!("rejected: {}", reason),
        }
    }

    #[test]
    fn consecutive_losses_trip_the_gate_and_emergency() {
        let mut settings = RiskSettings::default();
        settings.max_consecutive_losses = 3;
        let mut gate = RiskGate::new(settings);
        for _ in 0..3 {
            gate.record_close_result(dec!(-5));
        }
        assert!(gate.emergency_stop_engaged());
        let capital = capital(TradeMode::Normal, dec!(5000), dec!(5000));
        let admission = gate.admit(
            &order(dec!(0.02), CapitalZone::Growth, Role::PW),
            &capital,
            &PortfolioStats::default(),
        );
        assert!(!admission.is_admitted());
    }

    #[test]
    fn a_profit_resets_the_streak() {
        let mut gate = RiskGate::new(RiskSettings::default());
        gate.record_close_result(dec!(-5));
        gate.record_close_result(dec!(-5));
        gate.record_close_result(dec!(3));
        assert_eq!(gate.consecutive_losses(), 0);
        assert!(!gate.emergency_stop_engaged());
    }

    #[test]
    fn oversized_lot_is_shrunk_never_grown() {
        let mut gate = RiskGate::new(RiskSettings::default());
        let capital = capital(TradeMode::Normal, dec!(5000), dec!(5000));
        // Safe zone allows 0.5% of 5000 = $25; at $200/lot risk that caps
        // the lot at 0.12.
        let admission = gate.admit(
            &order(dec!(0.20), CapitalZone::Safe, Role::PW),
            &capital,
            &PortfolioStats::default(),
        );
        match admission {
            Admission::Admit(admitted) => {
                assert_eq!(admitted.lot, dec!(0.12));
                assert_eq!(admitted.adjustments.len(), 1);
            }
            Admission::Reject { reason } => panic!("rejected: {}", reason),
        }
    }

    #[test]
    fn order_failures_accumulate_into_emergency() {
        let mut gate = RiskGate::new(RiskSettings::default());
        for _ in 0..4 {
            gate.record_order_failure();
        }
        assert!(!gate.emergency_stop_engaged());
        gate.record_order_failure();
        assert!(gate.emergency_stop_engaged());

        gate.reset_emergency();
        assert!(!gate.emergency_stop_engaged());
    }

    #[test]
    fn cumulative_loss_line_engages_emergency() {
        let mut gate = RiskGate::new(RiskSettings::default());
        let mut stats = PortfolioStats::default();
        stats.total_pnl = dec!(-850);
        gate.check_emergency_loss(&stats);
        assert!(gate.emergency_stop_engaged());
    }

    #[test]
    fn recovery_mode_lifts_the_position_ceiling() {
        let mut settings = RiskSettings::default();
        settings.max_positions = 2;
        let mut gate = RiskGate::new(settings);
        let stats = stats_with_roles(&[(Role::PW, 2)]);

        let normal = capital(TradeMode::Normal, dec!(5000), dec!(5000));
        let refused = gate.admit(&order(dec!(0.02), CapitalZone::Growth, Role::PW), &normal, &stats);
        assert_eq!(refused.rejection_reason(), Some("position ceiling reached"));

        let recovery = capital(TradeMode::Recovery, dec!(4800), dec!(5000));
        let allowed = gate.admit(&order(dec!(0.02), CapitalZone::Growth, Role::RH), &recovery, &stats);
        assert!(allowed.is_admitted());
    }

    #[test]
    fn recommendations_track_mode() {
        let gate = RiskGate::new(RiskSettings::default());
        let emergency = capital(TradeMode::Emergency, dec!(3700), dec!(5000));
        let rec = gate.recommended_settings(&emergency);
        assert!(rec.suggested_max_positions < RiskSettings::default().max_positions);
        assert_eq!(rec.suggested_risk_percent, dec!(0.25));

        let recovery = capital(TradeMode::Recovery, dec!(4800), dec!(5000));
        let rec = gate.recommended_settings(&recovery);
        assert!(rec.suggested_max_positions > RiskSettings::default().max_positions);
    }
}
