use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use tracing::debug;

use crate::capital::CapitalContext;
use crate::config::{EntryFilterSettings, EntrySettings, TradingSettings};
use crate::session::{SessionSnapshot, SignalRateWindow};
use crate::sizing::{LotInputs, LotSizer};
use crate::types::{CandleBuffer, CandleColor, CapitalZone, PortfolioStats, Role, SignalAction, TradeMode};

const FINGERPRINT_LRU_CAP: usize = 100;
const MICRO_TREND_CANDLES: usize = 3;

/// One decision record per tick. `Wait` carries only the reason; a
/// directional signal carries the full recommendation set.
#[derive(Debug, Clone, Serialize)]
pub struct EntrySignal {
    pub action: SignalAction,
    pub strength: Decimal,
    pub confidence: Decimal,
    pub pattern: String,
    pub trend_strength: Decimal,
    pub balance_factor: Decimal,
    pub recommended_zone: Option<CapitalZone>,
    pub recommended_role: Option<Role>,
    pub dynamic_lot: Option<Decimal>,
    pub quality_score: Decimal,
    pub candle_fingerprint: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub reason: String,
}

impl EntrySignal {
    fn wait(reason: &str, at: DateTime<Utc>) -> Self {
        Self {
            action: SignalAction::Wait,
            strength: Decimal::ZERO,
            confidence: Decimal::ZERO,
            pattern: String::new(),
            trend_strength: Decimal::ZERO,
            balance_factor: Decimal::ONE,
            recommended_zone: None,
            recommended_role: None,
            dynamic_lot: None,
            quality_score: Decimal::ZERO,
            candle_fingerprint: None,
            created_at: at,
            reason: reason.to_string(),
        }
    }

    pub fn is_directional(&self) -> bool {
        self.action.is_directional()
    }
}

/// Bounded set of candle fingerprints already spent on a signal.
#[derive(Debug, Default)]
struct FingerprintLru {
    order: VecDeque<DateTime<Utc>>,
    seen: HashSet<DateTime<Utc>>,
}

impl FingerprintLru {
    fn contains(&self, fingerprint: DateTime<Utc>) -> bool {
        self.seen.contains(&fingerprint)
    }

    fn insert(&mut self, fingerprint: DateTime<Utc>) {
        if !self.seen.insert(fingerprint) {
            return;
        }
        self.order.push_back(fingerprint);
        while self.order.len() > FINGERPRINT_LRU_CAP {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

/// Synthesizes BUY/SELL/WAIT from recent candle micro-trends, modulated by
/// the capital state and the shape of the open book. At most one accepted
/// signal per candle.
pub struct SignalEngine {
    trading: TradingSettings,
    entry: EntrySettings,
    filters: EntryFilterSettings,
    fingerprints: FingerprintLru,
    rate_window: SignalRateWindow,
}

impl SignalEngine {
    pub fn new(trading: TradingSettings, entry: EntrySettings, filters: EntryFilterSettings) -> Self {
        Self {
            trading,
            entry,
            filters,
            fingerprints: FingerprintLru::default(),
            rate_window: SignalRateWindow::new(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn generate(
        &mut self,
        now: DateTime<Utc>,
        candles: &CandleBuffer,
        capital: &CapitalContext,
        stats: &PortfolioStats,
        session: &SessionSnapshot,
        sizer: &LotSizer,
    ) -> EntrySignal {
        if capital.is_offline() {
            return EntrySignal::wait("capital context offline", now);
        }

        // Rate limits before anything else; a throttled engine does not
        // even look at the candles.
        if let Some(elapsed) = self.rate_window.seconds_since_last(now) {
            let cooldown = self.trading.signal_cooldown_seconds as i64;
            if elapsed < cooldown {
                return EntrySignal::wait("cooldown active", now);
            }
        }
        if self.rate_window.count_last_hour(now) >= self.trading.max_signals_per_hour {
            return EntrySignal::wait("hourly signal budget spent", now);
        }

        let Some(latest_closed) = candles.latest_closed() else {
            return EntrySignal::wait("no closed candle", now);
        };
        let fingerprint = latest_closed.open_time;
        if self.fingerprints.contains(fingerprint) {
            debug!("Duplicate signal for candle {}", fingerprint);
            return EntrySignal::wait("candle already consumed", now);
        }

        let recent = candles.last_closed(MICRO_TREND_CANDLES);
        if recent.len() < MICRO_TREND_CANDLES {
            return EntrySignal::wait("insufficient closed candles", now);
        }

        let current = recent[recent.len() - 1];
        if current.body_ratio() < self.entry.mini_trend.min_body_ratio {
            return EntrySignal::wait("current candle body too thin", now);
        }

        let green = recent.iter().filter(|c| c.color() == CandleColor::Green).count();
        let red = recent.len() - green;
        let (action, matches, pattern) = if green >= 2 && current.color() == CandleColor::Green {
            (SignalAction::Buy, green, format!("GREEN_{}_of_3", green))
        } else if red >= 2 && current.color() == CandleColor::Red {
            (SignalAction::Sell, red, format!("RED_{}_of_3", red))
        } else {
            return EntrySignal::wait("no micro trend", now);
        };

        let trend_strength = trend_strength(&recent, matches);
        let confidence = (dec!(0.6) + dec!(0.2) * Decimal::from(matches as u64 - 2))
            .clamp(Decimal::ZERO, dec!(0.9));

        // Capital modulation.
        let efficiency_mult = capital.efficiency.clamp(dec!(0.8), dec!(1.2));
        let mode_mult = match capital.mode {
            TradeMode::Normal => dec!(1.0),
            TradeMode::Conservative => dec!(0.8),
            TradeMode::Emergency => dec!(0.6),
            TradeMode::Recovery => dec!(1.3),
            TradeMode::Offline => dec!(1.0),
        };
        let drawdown_mult = if capital.drawdown_pct > dec!(25) {
            dec!(0.7)
        } else if capital.drawdown_pct > dec!(15) {
            dec!(0.85)
        } else {
            dec!(1.0)
        };
        let mut strength = (trend_strength * efficiency_mult * mode_mult * drawdown_mult)
            .clamp(dec!(0.1), dec!(0.95));

        if !self.meets_mode_threshold(strength, capital.mode) {
            return EntrySignal::wait("strength below mode threshold", now);
        }

        // Quality filters.
        if self.filters.price_movement_filter.enabled
            && current.range() < self.filters.price_movement_filter.min_price_change_points
        {
            return EntrySignal::wait("price movement too small", now);
        }
        if self.filters.session_activity_filter.enabled
            && session.activity_score < self.filters.session_activity_filter.min_activity_score
        {
            return EntrySignal::wait("session too quiet", now);
        }

        // Portfolio balance: throttle the oversupplied side, reward the
        // starved one. The adjusted value still has to clear the mode
        // threshold.
        let buy_fraction = stats.buy_fraction();
        let balance_factor = match action {
            SignalAction::Buy => {
                if buy_fraction > dec!(0.70) {
                    dec!(0.7)
                } else if buy_fraction < dec!(0.30) {
                    dec!(1.4)
                } else {
                    dec!(1.0)
                }
            }
            SignalAction::Sell => {
                if buy_fraction < dec!(0.30) {
                    dec!(0.7)
                } else if buy_fraction > dec!(0.70) {
                    dec!(1.4)
                } else {
                    dec!(1.0)
                }
            }
            SignalAction::Wait => dec!(1.0),
        };
        strength = (strength * balance_factor).clamp(Decimal::ZERO, dec!(0.95));
        if !self.meets_mode_threshold(strength, capital.mode) {
            return EntrySignal::wait("strength below mode threshold after balance", now);
        }

        let zone = recommend_zone(capital.mode, strength);
        let role = recommend_role(capital, stats, session, strength);

        let movement_points: Decimal = recent.iter().map(|c| c.range()).sum();
        let lot = sizer.calculate(&LotInputs {
            zone,
            role,
            mode: capital.mode,
            signal_strength: strength,
            trend_strength,
            balance_factor,
            movement_points,
            efficiency: capital.efficiency,
            drawdown_pct: capital.drawdown_pct,
            current_equity: capital.current_equity,
        });

        debug!(
            "Lot {} for {}/{}: {:?}",
            lot.lot, zone, role, lot.multipliers
        );

        let quality_score = dec!(0.4) * strength
            + dec!(0.3) * trend_strength
            + dec!(0.2)
                * (capital.efficiency - capital.drawdown_pct / dec!(100)).max(Decimal::ZERO)
            + dec!(0.1) * (balance_factor / dec!(2)).min(Decimal::ONE);

        // Commit: this candle is spent and the rate window advances.
        self.fingerprints.insert(fingerprint);
        self.rate_window.record(now);

        EntrySignal {
            action,
            strength,
            confidence,
            pattern,
            trend_strength,
            balance_factor,
            recommended_zone: Some(zone),
            recommended_role: Some(role),
            dynamic_lot: Some(lot.lot),
            quality_score,
            candle_fingerprint: Some(fingerprint),
            created_at: now,
            reason: String::new(),
        }
    }

    fn meets_mode_threshold(&self, strength: Decimal, mode: TradeMode) -> bool {
        let floor = if mode == TradeMode::Recovery {
            dec!(0.3)
        } else {
            dec!(0.4)
        };
        if strength < floor {
            return false;
        }
        if mode == TradeMode::Emergency && strength < dec!(0.7) {
            return false;
        }
        true
    }

    #[cfg(test)]
    fn fingerprint_count(&self) -> usize {
        self.fingerprints.len()
    }
}

/// 0.4 base, plus color consistency, body size and total movement, clipped
/// to [0.3, 0.9].
fn trend_strength(candles: &[&crate::types::Candle], matches: usize) -> Decimal {
    let count = Decimal::from(candles.len() as u64);
    let color_consistency = Decimal::from(matches as u64) / count;
    let avg_body_ratio: Decimal =
        candles.iter().map(|c| c.body_ratio()).sum::<Decimal>() / count;
    let total_range: Decimal = candles.iter().map(|c| c.range()).sum();
    let movement_bonus = if total_range > dec!(2.0) {
        dec!(0.10)
    } else if total_range > dec!(1.0) {
        dec!(0.05)
    } else {
        Decimal::ZERO
    };
    (dec!(0.4) + dec!(0.3) * color_consistency + (dec!(2) * avg_body_ratio).min(dec!(0.3))
        + movement_bonus)
        .clamp(dec!(0.3), dec!(0.9))
}

fn recommend_zone(mode: TradeMode, strength: Decimal) -> CapitalZone {
    match mode {
        TradeMode::Emergency => CapitalZone::Safe,
        TradeMode::Conservative => {
            if strength >= dec!(0.8) {
                CapitalZone::Growth
            } else {
                CapitalZone::Safe
            }
        }
        TradeMode::Recovery => {
            if strength >= dec!(0.9) {
                CapitalZone::Aggressive
            } else if strength >= dec!(0.7) {
                CapitalZone::Growth
            } else {
                CapitalZone::Safe
            }
        }
        TradeMode::Normal | TradeMode::Offline => {
            if strength >= dec!(0.85) {
                CapitalZone::Aggressive
            } else if strength >= dec!(0.6) {
                CapitalZone::Growth
            } else {
                CapitalZone::Safe
            }
        }
    }
}

/// Candidate roles in fixed priority order HG, RH, SC, PW; PW is the
/// fallback when nothing else applies.
fn recommend_role(
    capital: &CapitalContext,
    stats: &PortfolioStats,
    session: &SessionSnapshot,
    strength: Decimal,
) -> Role {
    let drawdown = capital.drawdown_pct;
    if drawdown > dec!(15) || stats.imbalance() > dec!(0.65) {
        return Role::HG;
    }
    if capital.mode == TradeMode::Recovery || (drawdown > dec!(20) && strength > dec!(0.7)) {
        return Role::RH;
    }
    if strength > dec!(0.8) && session.high_volatility && drawdown < dec!(10) {
        return Role::SC;
    }
    if strength >= dec!(0.4)
        && strength <= dec!(0.8)
        && matches!(capital.mode, TradeMode::Normal | TradeMode::Recovery)
    {
        return Role::PW;
    }
    Role::PW
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capital::{CapitalContext, ZoneBudgets};
    use crate::config::OrderRoleSettings;
    use crate::types::{Candle, Position, Side, TimeFrame};
    use chrono::Duration;
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

    fn quiet_session() -> SessionSnapshot {
        SessionSnapshot {
            local_hour: 15,
            high_volatility: false,
            activity_score: dec!(0.7),
        }
    }

    fn candle_at(
        start: DateTime<Utc>,
        minutes: i64,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
    ) -> Candle {
        Candle {
            timeframe: TimeFrame::M5,
            open_time: start + Duration::minutes(minutes),
            open,
            high,
            low,
            close,
            volume: dec!(50),
            is_closed: true,
        }
    }

    /// Three green candles, bodies 0.4/0.5/0.6 over ranges 0.5/0.6/0.7.
    fn green_run(start: DateTime<Utc>) -> CandleBuffer {
        let mut buffer = CandleBuffer::new(10);
        buffer.push(candle_at(start, 0, dec!(2000.0), dec!(2000.5), dec!(2000.0), dec!(2000.4)));
        buffer.push(candle_at(start, 5, dec!(2000.4), dec!(2001.0), dec!(2000.4), dec!(2000.9)));
        buffer.push(candle_at(start, 10, dec!(2000.9), dec!(2001.6), dec!(2000.9), dec!(2001.5)));
        buffer
    }

    fn engine() -> SignalEngine {
        SignalEngine::new(
            TradingSettings::default(),
            EntrySettings::default(),
            EntryFilterSettings::default(),
        )
    }

    fn sizer() -> LotSizer {
        LotSizer::new(EntrySettings::default(), OrderRoleSettings::default(), true)
    }

    fn position(id: u64, side: Side) -> Position {
        Position {
            id,
            side,
            volume: dec!(0.02),
            open_price: dec!(2000),
            current_price: dec!(2000),
            pnl: Decimal::ZERO,
            open_time: Utc::now(),
        }
    }

    #[test]
    fn cold_start_green_run_buys() {
        let mut engine = engine();
        let now = Utc::now();
        let candles = green_run(now - Duration::minutes(15));
        let capital = capital(TradeMode::Normal, dec!(5000), dec!(5000));
        let stats = PortfolioStats::default();

        let signal = engine.generate(now, &candles, &capital, &stats, &quiet_session(), &sizer());
        assert_eq!(signal.action, SignalAction::Buy);
        assert_eq!(signal.pattern, "GREEN_3_of_3");
        // 0.4 + 0.3 + 0.3 + 0.05 clipped to 0.9, unchanged by a neutral book.
        assert_eq!(signal.strength, dec!(0.9));
        assert_eq!(signal.confidence, dec!(0.8));
        assert_eq!(signal.balance_factor, dec!(1.0));
        // Strength at the very top of the band routes to the aggressive zone.
        assert_eq!(signal.recommended_zone, Some(CapitalZone::Aggressive));
        assert_eq!(signal.recommended_role, Some(Role::PW));
        let lot = signal.dynamic_lot.unwrap();
        assert!(lot >= dec!(0.01) && lot <= dec!(0.20));
        assert!(signal.quality_score > dec!(0.7));
    }

    #[test]
    fn emergency_rejects_moderate_strength() {
        let mut engine = engine();
        let now = Utc::now();
        let candles = green_run(now - Duration::minutes(15));
        // 26% drawdown: strength 0.9 * 0.6 (mode) * 0.7 (dd) * 0.8 (eff floor)
        // lands far below the 0.7 emergency floor.
        let capital = capital(TradeMode::Emergency, dec!(3700), dec!(5000));
        let stats = PortfolioStats::default();

        let signal = engine.generate(now, &candles, &capital, &stats, &quiet_session(), &sizer());
        assert_eq!(signal.action, SignalAction::Wait);
        assert_eq!(signal.strength, Decimal::ZERO);
        assert_eq!(signal.reason, "strength below mode threshold");
    }

    #[test]
    fn fingerprint_replay_waits() {
        let mut engine = engine();
        let now = Utc::now();
        let candles = green_run(now - Duration::minutes(15));
        let capital = capital(TradeMode::Normal, dec!(5000), dec!(5000));
        let stats = PortfolioStats::default();

        let first = engine.generate(now, &candles, &capital, &stats, &quiet_session(), &sizer());
        assert!(first.is_directional());

        // Past the cooldown, same candle: still refused.
        let later = now + Duration::seconds(60);
        let second = engine.generate(later, &candles, &capital, &stats, &quiet_session(), &sizer());
        assert_eq!(second.action, SignalAction::Wait);
        assert_eq!(second.reason, "candle already consumed");
    }

    #[test]
    fn cooldown_throttles_fresh_candles() {
        let mut engine = engine();
        let now = Utc::now();
        let capital = capital(TradeMode::Normal, dec!(5000), dec!(5000));
        let stats = PortfolioStats::default();

        let first = engine.generate(
            now,
            &green_run(now - Duration::minutes(15)),
            &capital,
            &stats,
            &quiet_session(),
            &sizer(),
        );
        assert!(first.is_directional());

        // New candle 10 seconds later is inside the 45 s cooldown.
        let soon = now + Duration::seconds(10);
        let second = engine.generate(
            soon,
            &green_run(now - Duration::minutes(10)),
            &capital,
            &stats,
            &quiet_session(),
            &sizer(),
        );
        assert_eq!(second.reason, "cooldown active");
    }

    #[test]
    fn hourly_budget_is_enforced() {
        let mut settings = TradingSettings::default();
        settings.max_signals_per_hour = 2;
        settings.signal_cooldown_seconds = 1;
        let mut engine = SignalEngine::new(
            settings,
            EntrySettings::default(),
            EntryFilterSettings::default(),
        );
        let capital = capital(TradeMode::Normal, dec!(5000), dec!(5000));
        let stats = PortfolioStats::default();
        let start = Utc::now();

        for i in 0..2 {
            let now = start + Duration::minutes(i * 2);
            let candles = green_run(now - Duration::minutes(15));
            let signal =
                engine.generate(now, &candles, &capital, &stats, &quiet_session(), &sizer());
            assert!(signal.is_directional(), "signal {} should pass", i);
        }

        let now = start + Duration::minutes(6);
        let candles = green_run(now - Duration::minutes(15));
        let blocked = engine.generate(now, &candles, &capital, &stats, &quiet_session(), &sizer());
        assert_eq!(blocked.reason, "hourly signal budget spent");
    }

    #[test]
    fn crowded_buy_book_downweights_buy_and_routes_safe() {
        let mut engine = engine();
        let now = Utc::now();
        let candles = green_run(now - Duration::minutes(15));
        let capital = capital(TradeMode::Normal, dec!(5000), dec!(5000));

        // 24 buys vs 6 sells: b = 0.8.
        let mut positions = Vec::new();
        for i in 0..24 {
            positions.push(position(i, Side::Buy));
        }
        for i in 24..30 {
            positions.push(position(i, Side::Sell));
        }
        let stats = PortfolioStats::build(&positions, &HashMap::new(), None);

        let signal = engine.generate(now, &candles, &capital, &stats, &quiet_session(), &sizer());
        assert_eq!(signal.action, SignalAction::Buy);
        assert_eq!(signal.balance_factor, dec!(0.7));
        // 0.9 * 0.7 = 0.63: admissible in Normal, growth zone.
        assert_eq!(signal.strength, dec!(0.63));
        assert_eq!(signal.recommended_zone, Some(CapitalZone::Growth));
    }

    #[test]
    fn starved_sell_side_is_upweighted() {
        let mut engine = engine();
        let now = Utc::now();
        let start = now - Duration::minutes(15);
        // Three red candles mirroring the green run.
        let mut candles = CandleBuffer::new(10);
        candles.push(candle_at(start, 0, dec!(2001.5), dec!(2001.6), dec!(2000.9), dec!(2001.0)));
        candles.push(candle_at(start, 5, dec!(2001.0), dec!(2001.1), dec!(2000.4), dec!(2000.5)));
        candles.push(candle_at(start, 10, dec!(2000.5), dec!(2000.6), dec!(1999.8), dec!(1999.9)));

        let capital = capital(TradeMode::Normal, dec!(5000), dec!(5000));
        let mut positions = Vec::new();
        for i in 0..24 {
            positions.push(position(i, Side::Buy));
        }
        for i in 24..30 {
            positions.push(position(i, Side::Sell));
        }
        let stats = PortfolioStats::build(&positions, &HashMap::new(), None);

        let signal = engine.generate(now, &candles, &capital, &stats, &quiet_session(), &sizer());
        assert_eq!(signal.action, SignalAction::Sell);
        assert_eq!(signal.balance_factor, dec!(1.4));
        // Upweighted past the cap, clipped to 0.95.
        assert_eq!(signal.strength, dec!(0.95));
    }

    #[test]
    fn thin_body_waits() {
        let mut engine = engine();
        let now = Utc::now();
        let start = now - Duration::minutes(15);
        let mut candles = CandleBuffer::new(10);
        candles.push(candle_at(start, 0, dec!(2000.0), dec!(2000.5), dec!(2000.0), dec!(2000.4)));
        candles.push(candle_at(start, 5, dec!(2000.4), dec!(2001.0), dec!(2000.4), dec!(2000.9)));
        // Last candle: 0.01 body over a 1.0 range.
        candles.push(candle_at(start, 10, dec!(2000.9), dec!(2001.5), dec!(2000.5), dec!(2000.91)));

        let capital = capital(TradeMode::Normal, dec!(5000), dec!(5000));
        let signal = engine.generate(
            now,
            &candles,
            &capital,
            &PortfolioStats::default(),
            &quiet_session(),
            &sizer(),
        );
        assert_eq!(signal.reason, "current candle body too thin");
    }

    #[test]
    fn quiet_session_is_filtered() {
        let mut engine = engine();
        let now = Utc::now();
        let candles = green_run(now - Duration::minutes(15));
        let capital = capital(TradeMode::Normal, dec!(5000), dec!(5000));
        let sleepy = SessionSnapshot {
            local_hour: 5,
            high_volatility: false,
            activity_score: dec!(0.2),
        };
        let signal = engine.generate(
            now,
            &candles,
            &capital,
            &PortfolioStats::default(),
            &sleepy,
            &sizer(),
        );
        assert_eq!(signal.reason, "session too quiet");
    }

    #[test]
    fn recovery_mode_recommends_recovery_hunter() {
        let mut engine = engine();
        let now = Utc::now();
        let candles = green_run(now - Duration::minutes(15));
        let capital = capital(TradeMode::Recovery, dec!(4800), dec!(5000));
        let signal = engine.generate(
            now,
            &candles,
            &capital,
            &PortfolioStats::default(),
            &quiet_session(),
            &sizer(),
        );
        assert!(signal.is_directional());
        assert_eq!(signal.recommended_role, Some(Role::RH));
    }

    #[test]
    fn offline_context_waits() {
        let mut engine = engine();
        let now = Utc::now();
        let candles = green_run(now - Duration::minutes(15));
        let capital = capital(TradeMode::Offline, dec!(5000), dec!(5000));
        let signal = engine.generate(
            now,
            &candles,
            &capital,
            &PortfolioStats::default(),
            &quiet_session(),
            &sizer(),
        );
        assert_eq!(signal.reason, "capital context offline");
    }

    #[test]
    fn fingerprint_lru_is_bounded() {
        let mut engine = engine();
        let mut settings = TradingSettings::default();
        settings.signal_cooldown_seconds = 1;
        settings.max_signals_per_hour = 10_000;
        engine.trading = settings;

        let capital = capital(TradeMode::Normal, dec!(5000), dec!(5000));
        let stats = PortfolioStats::default();
        let start = Utc::now();
        for i in 0..150 {
            let now = start + Duration::minutes(i * 2);
            let candles = green_run(now - Duration::minutes(15));
            engine.generate(now, &candles, &capital, &stats, &quiet_session(), &sizer());
        }
        assert!(engine.fingerprint_count() <= FINGERPRINT_LRU_CAP);
    }
}
