use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::types::{CapitalZone, Role, TradeMode};

/// Whole engine configuration tree. Every threshold the decision core uses
/// is pinned here exactly once; module code reads the config and carries no
/// competing constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub trading: TradingSettings,
    pub capital_management: CapitalSettings,
    pub smart_entry_rules: EntrySettings,
    pub entry_filters: EntryFilterSettings,
    pub order_roles: OrderRoleSettings,
    pub risk_management: RiskSettings,
    pub position_management: PositionSettings,
    pub bridge: BridgeSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trading: TradingSettings::default(),
            capital_management: CapitalSettings::default(),
            smart_entry_rules: EntrySettings::default(),
            entry_filters: EntryFilterSettings::default(),
            order_roles: OrderRoleSettings::default(),
            risk_management: RiskSettings::default(),
            position_management: PositionSettings::default(),
            bridge: BridgeSettings::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.capital_management.initial_capital <= Decimal::ZERO {
            errors.push("capital_management.initial_capital must be > 0".to_string());
        }
        let zone_sum = self.capital_management.safe_zone_percent
            + self.capital_management.growth_zone_percent
            + self.capital_management.aggressive_zone_percent;
        if zone_sum != dec!(100) {
            errors.push(format!(
                "capital zone percentages must sum to 100, got {}",
                zone_sum
            ));
        }
        if self.capital_management.conservative_trigger >= self.capital_management.emergency_trigger
        {
            errors.push(
                "capital_management.conservative_trigger must be below emergency_trigger"
                    .to_string(),
            );
        }
        if self.capital_management.emergency_trigger > self.capital_management.max_drawdown_percent
        {
            errors.push(
                "capital_management.emergency_trigger must not exceed max_drawdown_percent"
                    .to_string(),
            );
        }

        if self.trading.symbol.is_empty() {
            errors.push("trading.symbol must not be empty".to_string());
        }
        if self.trading.signal_cooldown_seconds == 0 {
            errors.push("trading.signal_cooldown_seconds must be > 0".to_string());
        }
        if self.trading.max_signals_per_hour == 0 {
            errors.push("trading.max_signals_per_hour must be > 0".to_string());
        }

        if self.smart_entry_rules.mini_trend.min_body_ratio < Decimal::ZERO
            || self.smart_entry_rules.mini_trend.min_body_ratio >= Decimal::ONE
        {
            errors.push("smart_entry_rules.mini_trend.min_body_ratio must be in [0, 1)".to_string());
        }

        let quota_sum = self.order_roles.role_quotas.hg
            + self.order_roles.role_quotas.pw
            + self.order_roles.role_quotas.rh
            + self.order_roles.role_quotas.sc;
        if quota_sum != dec!(100) {
            errors.push(format!("order_roles.role_quotas must sum to 100, got {}", quota_sum));
        }
        for role in Role::all() {
            let settings = self.order_roles.settings(role);
            if settings.preferred_lot_min > settings.preferred_lot_max {
                errors.push(format!(
                    "order_roles.role_settings.{}: preferred_lot_min above preferred_lot_max",
                    role
                ));
            }
        }

        if self.risk_management.max_positions == 0 {
            errors.push("risk_management.max_positions must be > 0".to_string());
        }
        if self.risk_management.max_daily_loss >= Decimal::ZERO {
            errors.push("risk_management.max_daily_loss must be negative".to_string());
        }
        if self.risk_management.stop_trading_margin_level
            >= self.risk_management.min_margin_level
        {
            errors.push(
                "risk_management.stop_trading_margin_level must be below min_margin_level"
                    .to_string(),
            );
        }

        if self.position_management.volume_balance_tolerance <= Decimal::ZERO
            || self.position_management.volume_balance_tolerance >= Decimal::ONE
        {
            errors.push(
                "position_management.volume_balance_tolerance must be in (0, 1)".to_string(),
            );
        }
        if self.position_management.recovery_combinations.max_combination_size == 0 {
            errors.push(
                "position_management.recovery_combinations.max_combination_size must be > 0"
                    .to_string(),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingSettings {
    pub symbol: String,
    pub timeframe: String,
    pub signal_cooldown_seconds: u64,
    pub max_signals_per_hour: usize,
    pub high_frequency_mode: bool,
    /// Tick period while all components are ready.
    pub tick_interval_seconds: u64,
    /// Tick period while degraded (gateway flapping, components missing).
    pub degraded_tick_interval_seconds: u64,
    pub gateway_timeout_seconds: u64,
    /// Broker magic number stamped on every order this engine places.
    pub magic: u64,
}

impl Default for TradingSettings {
    fn default() -> Self {
        Self {
            symbol: "XAUUSD.v".to_string(),
            timeframe: "M5".to_string(),
            signal_cooldown_seconds: 45,
            max_signals_per_hour: 50,
            high_frequency_mode: false,
            tick_interval_seconds: 10,
            degraded_tick_interval_seconds: 30,
            gateway_timeout_seconds: 5,
            magic: 46_001,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapitalSettings {
    pub initial_capital: Decimal,
    pub safe_zone_percent: Decimal,
    pub growth_zone_percent: Decimal,
    pub aggressive_zone_percent: Decimal,
    pub max_drawdown_percent: Decimal,
    pub conservative_trigger: Decimal,
    pub emergency_trigger: Decimal,
    pub recovery_boost_enabled: bool,
}

impl Default for CapitalSettings {
    fn default() -> Self {
        Self {
            initial_capital: dec!(5000),
            safe_zone_percent: dec!(50),
            growth_zone_percent: dec!(35),
            aggressive_zone_percent: dec!(15),
            max_drawdown_percent: dec!(30),
            conservative_trigger: dec!(20),
            emergency_trigger: dec!(25),
            recovery_boost_enabled: true,
        }
    }
}

impl CapitalSettings {
    pub fn zone_share(&self, zone: CapitalZone) -> Decimal {
        let percent = match zone {
            CapitalZone::Safe => self.safe_zone_percent,
            CapitalZone::Growth => self.growth_zone_percent,
            CapitalZone::Aggressive => self.aggressive_zone_percent,
        };
        percent / dec!(100)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EntrySettings {
    pub mini_trend: MiniTrendSettings,
    pub dynamic_lot_sizing: LotFactorSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MiniTrendSettings {
    pub min_body_ratio: Decimal,
}

impl Default for MiniTrendSettings {
    fn default() -> Self {
        Self {
            min_body_ratio: dec!(0.03),
        }
    }
}

/// One `enabled` switch plus the named numeric fields per factor block,
/// mirroring the dynamic_lot_sizing config surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LotFactorSettings {
    pub signal_strength_factor: SignalStrengthFactor,
    pub trend_strength_factor: TrendStrengthFactor,
    pub balance_factor: BalanceFactor,
    pub movement_factor: MovementFactor,
    pub capital_factor: ToggleFactor,
    pub role_factor: ToggleFactor,
}

impl Default for LotFactorSettings {
    fn default() -> Self {
        Self {
            signal_strength_factor: SignalStrengthFactor::default(),
            trend_strength_factor: TrendStrengthFactor::default(),
            balance_factor: BalanceFactor::default(),
            movement_factor: MovementFactor::default(),
            capital_factor: ToggleFactor::default(),
            role_factor: ToggleFactor::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToggleFactor {
    pub enabled: bool,
}

impl Default for ToggleFactor {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalStrengthFactor {
    pub enabled: bool,
    pub base: Decimal,
    pub slope: Decimal,
}

impl Default for SignalStrengthFactor {
    fn default() -> Self {
        Self {
            enabled: true,
            base: dec!(0.5),
            slope: dec!(1.5),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendStrengthFactor {
    pub enabled: bool,
    pub threshold: Decimal,
    pub strong_multiplier: Decimal,
    pub weak_multiplier: Decimal,
}

impl Default for TrendStrengthFactor {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: dec!(0.5),
            strong_multiplier: dec!(1.8),
            weak_multiplier: dec!(0.8),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceFactor {
    pub enabled: bool,
    pub high_threshold: Decimal,
    pub high_multiplier: Decimal,
    pub low_threshold: Decimal,
    pub low_multiplier: Decimal,
}

impl Default for BalanceFactor {
    fn default() -> Self {
        Self {
            enabled: true,
            high_threshold: dec!(1.2),
            high_multiplier: dec!(1.4),
            low_threshold: dec!(0.8),
            low_multiplier: dec!(0.7),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementFactor {
    pub enabled: bool,
    pub min_points: Decimal,
    pub min_multiplier: Decimal,
    pub max_points: Decimal,
    pub max_multiplier: Decimal,
}

impl Default for MovementFactor {
    fn default() -> Self {
        Self {
            enabled: true,
            min_points: dec!(0.15),
            min_multiplier: dec!(0.8),
            max_points: dec!(2.50),
            max_multiplier: dec!(1.6),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryFilterSettings {
    pub price_movement_filter: PriceMovementFilter,
    pub session_activity_filter: SessionActivityFilter,
}

impl Default for EntryFilterSettings {
    fn default() -> Self {
        Self {
            price_movement_filter: PriceMovementFilter::default(),
            session_activity_filter: SessionActivityFilter::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceMovementFilter {
    pub enabled: bool,
    pub min_price_change_points: Decimal,
}

impl Default for PriceMovementFilter {
    fn default() -> Self {
        Self {
            enabled: true,
            min_price_change_points: dec!(0.15),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionActivityFilter {
    pub enabled: bool,
    pub min_activity_score: Decimal,
}

impl Default for SessionActivityFilter {
    fn default() -> Self {
        Self {
            enabled: true,
            min_activity_score: dec!(0.3),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderRoleSettings {
    pub role_quotas: RoleQuotas,
    pub role_settings: RoleSettingsTable,
}

impl Default for OrderRoleSettings {
    fn default() -> Self {
        Self {
            role_quotas: RoleQuotas::default(),
            role_settings: RoleSettingsTable::default(),
        }
    }
}

impl OrderRoleSettings {
    pub fn quota(&self, role: Role) -> Decimal {
        let percent = match role {
            Role::HG => self.role_quotas.hg,
            Role::PW => self.role_quotas.pw,
            Role::RH => self.role_quotas.rh,
            Role::SC => self.role_quotas.sc,
        };
        percent / dec!(100)
    }

    pub fn settings(&self, role: Role) -> &RoleBehaviorSettings {
        match role {
            Role::HG => &self.role_settings.hg,
            Role::PW => &self.role_settings.pw,
            Role::RH => &self.role_settings.rh,
            Role::SC => &self.role_settings.sc,
        }
    }
}

/// Soft distribution targets, in percent of open positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleQuotas {
    pub hg: Decimal,
    pub pw: Decimal,
    pub rh: Decimal,
    pub sc: Decimal,
}

impl Default for RoleQuotas {
    fn default() -> Self {
        Self {
            hg: dec!(25),
            pw: dec!(40),
            rh: dec!(20),
            sc: dec!(15),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleSettingsTable {
    pub hg: RoleBehaviorSettings,
    pub pw: RoleBehaviorSettings,
    pub rh: RoleBehaviorSettings,
    pub sc: RoleBehaviorSettings,
}

impl Default for RoleSettingsTable {
    fn default() -> Self {
        Self {
            hg: RoleBehaviorSettings {
                max_age_hours: dec!(48),
                min_profit_threshold: dec!(5),
                max_loss_tolerance: dec!(-50),
                preferred_lot_min: dec!(0.01),
                preferred_lot_max: dec!(0.05),
                aggressive_sizing: false,
                quick_profit: false,
            },
            pw: RoleBehaviorSettings {
                max_age_hours: dec!(24),
                min_profit_threshold: dec!(3),
                max_loss_tolerance: dec!(-30),
                preferred_lot_min: dec!(0.01),
                preferred_lot_max: dec!(0.10),
                aggressive_sizing: false,
                quick_profit: false,
            },
            rh: RoleBehaviorSettings {
                max_age_hours: dec!(12),
                min_profit_threshold: dec!(1),
                max_loss_tolerance: dec!(-20),
                preferred_lot_min: dec!(0.02),
                preferred_lot_max: dec!(0.20),
                aggressive_sizing: true,
                quick_profit: false,
            },
            sc: RoleBehaviorSettings {
                max_age_hours: dec!(2),
                min_profit_threshold: dec!(0.5),
                max_loss_tolerance: dec!(-5),
                preferred_lot_min: dec!(0.01),
                preferred_lot_max: dec!(0.15),
                aggressive_sizing: false,
                quick_profit: true,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleBehaviorSettings {
    pub max_age_hours: Decimal,
    pub min_profit_threshold: Decimal,
    pub max_loss_tolerance: Decimal,
    pub preferred_lot_min: Decimal,
    pub preferred_lot_max: Decimal,
    pub aggressive_sizing: bool,
    pub quick_profit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskSettings {
    pub max_positions: usize,
    pub max_daily_trades: usize,
    pub max_daily_loss: Decimal,
    pub max_daily_volume: Decimal,
    pub min_margin_level: Decimal,
    pub stop_trading_margin_level: Decimal,
    pub max_consecutive_losses: usize,
    /// Cumulative floating loss that engages the emergency stop.
    pub emergency_close_loss: Decimal,
    /// Hard per-role position share caps, percent of open positions.
    pub role_caps: RoleCaps,
    /// Per-zone risk budget for a single trade, percent of equity.
    pub max_risk_per_trade: ZoneRiskSettings,
    pub recovery_exceptions: RecoveryExceptions,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            max_positions: 50,
            max_daily_trades: 80,
            max_daily_loss: dec!(-300),
            max_daily_volume: dec!(15),
            min_margin_level: dec!(300),
            stop_trading_margin_level: dec!(120),
            max_consecutive_losses: 7,
            emergency_close_loss: dec!(-800),
            role_caps: RoleCaps::default(),
            max_risk_per_trade: ZoneRiskSettings::default(),
            recovery_exceptions: RecoveryExceptions::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleCaps {
    pub hg: Decimal,
    pub pw: Decimal,
    pub rh: Decimal,
    pub sc: Decimal,
}

impl Default for RoleCaps {
    fn default() -> Self {
        Self {
            hg: dec!(30),
            pw: dec!(45),
            rh: dec!(25),
            sc: dec!(20),
        }
    }
}

impl RoleCaps {
    pub fn cap(&self, role: Role) -> Decimal {
        let percent = match role {
            Role::HG => self.hg,
            Role::PW => self.pw,
            Role::RH => self.rh,
            Role::SC => self.sc,
        };
        percent / dec!(100)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneRiskSettings {
    pub safe: Decimal,
    pub growth: Decimal,
    pub aggressive: Decimal,
    /// Applied to every zone while the engine is in Recovery mode.
    pub recovery_override: Decimal,
}

impl Default for ZoneRiskSettings {
    fn default() -> Self {
        Self {
            safe: dec!(0.5),
            growth: dec!(1.0),
            aggressive: dec!(2.0),
            recovery_override: dec!(1.4),
        }
    }
}

impl ZoneRiskSettings {
    pub fn percent_for(&self, zone: CapitalZone, mode: TradeMode) -> Decimal {
        if mode == TradeMode::Recovery {
            return self.recovery_override;
        }
        match zone {
            CapitalZone::Safe => self.safe,
            CapitalZone::Growth => self.growth,
            CapitalZone::Aggressive => self.aggressive,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryExceptions {
    pub recovery_position_bonus: usize,
    pub recovery_risk_bonus: Decimal,
}

impl Default for RecoveryExceptions {
    fn default() -> Self {
        Self {
            recovery_position_bonus: 10,
            recovery_risk_bonus: dec!(0.4),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionSettings {
    pub min_efficiency_per_lot: Decimal,
    pub volume_balance_tolerance: Decimal,
    pub partial_close_enabled: bool,
    pub smart_close_settings: SmartCloseSettings,
    pub profit_taking: ProfitTakingSettings,
    pub recovery_combinations: RecoveryCombinationSettings,
}

impl Default for PositionSettings {
    fn default() -> Self {
        Self {
            min_efficiency_per_lot: dec!(10),
            volume_balance_tolerance: dec!(0.35),
            partial_close_enabled: false,
            smart_close_settings: SmartCloseSettings::default(),
            profit_taking: ProfitTakingSettings::default(),
            recovery_combinations: RecoveryCombinationSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmartCloseSettings {
    pub max_losing_age_hours: Decimal,
}

impl Default for SmartCloseSettings {
    fn default() -> Self {
        Self {
            max_losing_age_hours: dec!(24),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfitTakingSettings {
    pub multi_level_enabled: bool,
    pub micro_profits: Decimal,
    pub standard_profits: Decimal,
    pub momentum_profits: Decimal,
}

impl Default for ProfitTakingSettings {
    fn default() -> Self {
        Self {
            multi_level_enabled: true,
            micro_profits: dec!(0.5),
            standard_profits: dec!(2),
            momentum_profits: dec!(8),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryCombinationSettings {
    pub enabled: bool,
    pub max_combination_size: usize,
    /// Profitable candidates considered per losing position, ranked by
    /// profit per lot.
    pub top_candidates: usize,
}

impl Default for RecoveryCombinationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_combination_size: 5,
            top_candidates: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    pub base_url: String,
    pub request_timeout_seconds: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8787".to_string(),
            request_timeout_seconds: 5,
        }
    }
}
