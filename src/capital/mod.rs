#![allow(dead_code)]
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{error, info, warn};

use crate::config::CapitalSettings;
use crate::gateway::AccountSnapshot;
use crate::types::{CapitalZone, EngineError, EngineResult, TradeMode};

const MODE_HISTORY_CAP: usize = 100;
const CAPITAL_HISTORY_CAP: usize = 1000;

/// Equity split across the three capital zones, in account currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneBudgets {
    pub safe: Decimal,
    pub growth: Decimal,
    pub aggressive: Decimal,
}

impl ZoneBudgets {
    pub fn sum(&self) -> Decimal {
        self.safe + self.growth + self.aggressive
    }

    pub fn budget_for(&self, zone: CapitalZone) -> Decimal {
        match zone {
            CapitalZone::Safe => self.safe,
            CapitalZone::Growth => self.growth,
            CapitalZone::Aggressive => self.aggressive,
        }
    }
}

/// Process-wide capital snapshot, rebuilt once per tick and handed to every
/// downstream component by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapitalContext {
    pub initial_capital: Decimal,
    pub current_equity: Decimal,
    pub peak_equity: Decimal,
    /// (peak − current) / peak · 100, never negative.
    pub drawdown_pct: Decimal,
    pub mode: TradeMode,
    pub zones: ZoneBudgets,
    /// current / initial.
    pub efficiency: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl CapitalContext {
    pub fn is_offline(&self) -> bool {
        self.mode == TradeMode::Offline
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeChange {
    pub from: TradeMode,
    pub to: TradeMode,
    pub drawdown_pct: Decimal,
    pub equity: Decimal,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapitalPoint {
    pub at: DateTime<Utc>,
    pub equity: Decimal,
    pub drawdown_pct: Decimal,
    pub mode: TradeMode,
}

/// Observability report published with the observer snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct CapitalReport {
    pub context: CapitalContext,
    pub mode_changes: Vec<ModeChange>,
    pub history_len: usize,
}

/// Owns peak/drawdown tracking, zone budgets and the trading mode. The
/// only writer of `CapitalContext`.
pub struct CapitalTracker {
    settings: CapitalSettings,
    context: CapitalContext,
    mode_changes: VecDeque<ModeChange>,
    capital_history: VecDeque<CapitalPoint>,
}

impl CapitalTracker {
    pub fn new(settings: CapitalSettings) -> EngineResult<Self> {
        if settings.initial_capital <= Decimal::ZERO {
            return Err(EngineError::Config(
                "initial_capital must be positive".to_string(),
            ));
        }
        let now = Utc::now();
        let context = CapitalContext {
            initial_capital: settings.initial_capital,
            current_equity: settings.initial_capital,
            peak_equity: settings.initial_capital,
            drawdown_pct: Decimal::ZERO,
            mode: TradeMode::Normal,
            zones: Self::split_zones(&settings, settings.initial_capital),
            efficiency: Decimal::ONE,
            updated_at: now,
        };
        Ok(Self {
            settings,
            context,
            mode_changes: VecDeque::new(),
            capital_history: VecDeque::new(),
        })
    }

    /// Recompute the capital context from a fresh account snapshot. With no
    /// snapshot the last good context is returned with an Offline overlay
    /// and nothing else is touched.
    pub fn update(&mut self, snapshot: Option<&AccountSnapshot>) -> EngineResult<CapitalContext> {
        let now = Utc::now();
        let snapshot = match snapshot {
            Some(s) => s,
            None => {
                if self.context.mode != TradeMode::Offline {
                    warn!("No account snapshot; capital context going offline");
                    self.record_mode_change(TradeMode::Offline, now);
                    self.context.mode = TradeMode::Offline;
                }
                return Ok(self.context.clone());
            }
        };

        let previous_mode = self.context.mode;
        let equity = snapshot.equity;
        let peak = self.context.peak_equity.max(equity);
        let drawdown_pct = if peak.is_zero() {
            Decimal::ZERO
        } else {
            ((peak - equity) / peak * dec!(100)).max(Decimal::ZERO)
        };

        let mode = self.derive_mode(previous_mode, drawdown_pct, equity, peak);
        let zones = Self::split_zones(&self.settings, equity);

        let context = CapitalContext {
            initial_capital: self.settings.initial_capital,
            current_equity: equity,
            peak_equity: peak,
            drawdown_pct,
            mode,
            zones,
            efficiency: equity / self.settings.initial_capital,
            updated_at: now,
        };
        self.check_invariants(&context)?;

        if mode != previous_mode {
            self.record_mode_change(mode, now);
            info!(
                "Trading mode {} -> {} (drawdown {:.2}%, equity ${:.2})",
                previous_mode, mode, drawdown_pct, equity
            );
        }

        self.context = context.clone();
        self.record_history(now);
        Ok(context)
    }

    pub fn context(&self) -> &CapitalContext {
        &self.context
    }

    /// Canonical lot recipe for a zone/strength/role triple against the
    /// tracker's current context, with neutral trend and balance factors.
    /// The signal path feeds the sizer richer inputs; this is the zone
    /// owner's direct surface.
    pub fn position_size(
        &self,
        zone: CapitalZone,
        signal_strength: Decimal,
        role: crate::types::Role,
        sizer: &crate::sizing::LotSizer,
    ) -> Decimal {
        sizer
            .calculate(&crate::sizing::LotInputs {
                zone,
                role,
                mode: self.context.mode,
                signal_strength,
                trend_strength: signal_strength,
                balance_factor: Decimal::ONE,
                movement_points: dec!(1.0),
                efficiency: self.context.efficiency,
                drawdown_pct: self.context.drawdown_pct,
                current_equity: self.context.current_equity,
            })
            .lot
    }

    pub fn report(&self) -> CapitalReport {
        CapitalReport {
            context: self.context.clone(),
            mode_changes: self.mode_changes.iter().cloned().collect(),
            history_len: self.capital_history.len(),
        }
    }

    pub fn history(&self) -> impl Iterator<Item = &CapitalPoint> {
        self.capital_history.iter()
    }

    fn derive_mode(
        &self,
        previous: TradeMode,
        drawdown_pct: Decimal,
        equity: Decimal,
        peak: Decimal,
    ) -> TradeMode {
        if drawdown_pct >= self.settings.emergency_trigger {
            return TradeMode::Emergency;
        }
        if drawdown_pct >= self.settings.conservative_trigger {
            return TradeMode::Conservative;
        }
        let recovered = drawdown_pct < dec!(5) && equity >= dec!(0.95) * peak;
        if matches!(previous, TradeMode::Conservative | TradeMode::Emergency) && recovered {
            return TradeMode::Recovery;
        }
        TradeMode::Normal
    }

    /// Aggressive takes the remainder so the three budgets always sum to
    /// equity exactly, independent of share rounding.
    fn split_zones(settings: &CapitalSettings, equity: Decimal) -> ZoneBudgets {
        let safe = settings.zone_share(CapitalZone::Safe) * equity;
        let growth = settings.zone_share(CapitalZone::Growth) * equity;
        ZoneBudgets {
            safe,
            growth,
            aggressive: equity - safe - growth,
        }
    }

    fn check_invariants(&mut self, context: &CapitalContext) -> EngineResult<()> {
        let zone_drift = (context.zones.sum() - context.current_equity).abs();
        let consistent =
            zone_drift <= dec!(0.000001) && context.peak_equity >= context.current_equity;
        debug_assert!(
            consistent,
            "capital invariant breach: zones {:?} equity {} peak {}",
            context.zones, context.current_equity, context.peak_equity
        );
        if consistent {
            return Ok(());
        }
        // Production path: keep running on the last consistent context and
        // raise an alert instead of propagating a corrupt snapshot.
        error!(
            "Capital invariant breach (zone drift {}, peak {}, equity {}); reusing last consistent context",
            zone_drift, context.peak_equity, context.current_equity
        );
        Err(EngineError::InvariantBreach(format!(
            "zones sum {} vs equity {}",
            context.zones.sum(),
            context.current_equity
        )))
    }

    fn record_mode_change(&mut self, to: TradeMode, at: DateTime<Utc>) {
        if self.mode_changes.len() >= MODE_HISTORY_CAP {
            self.mode_changes.pop_front();
        }
        self.mode_changes.push_back(ModeChange {
            from: self.context.mode,
            to,
            drawdown_pct: self.context.drawdown_pct,
            equity: self.context.current_equity,
            at,
        });
    }

    fn record_history(&mut self, at: DateTime<Utc>) {
        if self.capital_history.len() >= CAPITAL_HISTORY_CAP {
            self.capital_history.pop_front();
        }
        self.capital_history.push_back(CapitalPoint {
            at,
            equity: self.context.current_equity,
            drawdown_pct: self.context.drawdown_pct,
            mode: self.context.mode,
        });
    }
}
