use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::capital::{CapitalContext, CapitalReport, CapitalTracker};
use crate::config::EngineConfig;
use crate::gateway::{AccountSnapshot, MarketGateway};
use crate::planner::{ClosePlanner, PlanInput};
use crate::risk::{Admission, ProposedOrder, RiskGate};
use crate::roles::{AssignmentContext, RoleRegistry};
use crate::session::{SessionClock, SessionSnapshot};
use crate::signal::SignalEngine;
use crate::sizing::LotSizer;
use crate::types::{
    CandleBuffer, CapitalZone, CloseOrderRequest, EngineError, EngineResult, MarketOrderRequest,
    PortfolioStats, Position, Role, SignalAction, TimeFrame,
};

use super::EngineController;

const LOT_AUDIT_CAP: usize = 100;
const CANDLES_PER_TICK: usize = 5;

/// Everything one tick reads from the broker, fetched up front and frozen.
struct MarketView {
    account: AccountSnapshot,
    positions: Vec<Position>,
    candles: CandleBuffer,
}

#[derive(Debug, Clone, Serialize)]
pub struct TickOutcome {
    pub signal_action: SignalAction,
    pub order_submitted: bool,
    pub closes_executed: usize,
    pub degraded: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CloseAllReport {
    pub requested: usize,
    pub closed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LotAuditEntry {
    pub at: DateTime<Utc>,
    pub lot: Decimal,
    pub zone: CapitalZone,
    pub role: Role,
    pub pattern: String,
}

/// Read-only snapshot published to the operator surface after each tick.
/// The observer never mutates; it only gets values.
#[derive(Debug, Clone, Serialize)]
pub struct ObserverSnapshot {
    pub generated_at: DateTime<Utc>,
    pub capital: CapitalReport,
    pub stats: PortfolioStats,
    pub positions: Vec<Position>,
    pub session: SessionSnapshot,
    pub last_signal_action: SignalAction,
    pub last_signal_reason: String,
    pub health_score: Decimal,
    pub lot_audit: Vec<LotAuditEntry>,
}

/// The decision core: one cooperative worker ticking every few seconds.
/// All state mutation happens inside `run_tick` on one logical thread;
/// the observer snapshot is the only thing shared outward.
pub struct Engine {
    config: EngineConfig,
    timeframe: TimeFrame,
    gateway: Arc<dyn MarketGateway>,
    controller: Arc<EngineController>,
    capital: CapitalTracker,
    registry: RoleRegistry,
    signals: SignalEngine,
    sizer: LotSizer,
    planner: ClosePlanner,
    gate: RiskGate,
    clock: SessionClock,
    lot_audit: VecDeque<LotAuditEntry>,
    observer: Arc<RwLock<Option<ObserverSnapshot>>>,
}

impl Engine {
    pub fn new(config: EngineConfig, gateway: Arc<dyn MarketGateway>) -> EngineResult<Self> {
        config
            .validate()
            .map_err(|errors| EngineError::Config(errors.join(", ")))?;
        let timeframe = TimeFrame::from_str(&config.trading.timeframe)
            .ok_or_else(|| EngineError::Config(format!("bad timeframe {}", config.trading.timeframe)))?;

        let capital = CapitalTracker::new(config.capital_management.clone())?;
        let registry = RoleRegistry::new(config.order_roles.clone());
        let signals = SignalEngine::new(
            config.trading.clone(),
            config.smart_entry_rules.clone(),
            config.entry_filters.clone(),
        );
        let sizer = LotSizer::new(
            config.smart_entry_rules.clone(),
            config.order_roles.clone(),
            config.capital_management.recovery_boost_enabled,
        );
        let planner = ClosePlanner::new(
            config.position_management.clone(),
            config.order_roles.clone(),
        );
        let gate = RiskGate::new(config.risk_management.clone());

        Ok(Self {
            config,
            timeframe,
            gateway,
            controller: Arc::new(EngineController::new()),
            capital,
            registry,
            signals,
            sizer,
            planner,
            gate,
            clock: SessionClock::new(),
            lot_audit: VecDeque::new(),
            observer: Arc::new(RwLock::new(None)),
        })
    }

    pub fn controller(&self) -> Arc<EngineController> {
        Arc::clone(&self.controller)
    }

    pub fn observer(&self) -> Arc<RwLock<Option<ObserverSnapshot>>> {
        Arc::clone(&self.observer)
    }

    /// Tick loop. Runs until a stop is requested, then drains: the tick in
    /// flight completes before the loop exits.
    pub async fn run(&mut self) -> EngineResult<()> {
        if !self.controller.is_running() {
            self.controller
                .start()
                .await
                .map_err(EngineError::Config)?;
        }
        let mut status_rx = self.controller.subscribe();

        while self.controller.should_tick() {
            let degraded = match self.run_tick().await {
                Ok(outcome) => outcome.degraded,
                Err(e) => {
                    // No error escapes a tick boundary; log once, retry.
                    error!("Tick aborted: {}", e);
                    true
                }
            };
            let interval = if degraded {
                self.config.trading.degraded_tick_interval_seconds
            } else {
                self.config.trading.tick_interval_seconds
            };
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(interval)) => {}
                _ = status_rx.recv() => {}
            }
        }
        self.controller.finish_drain();
        Ok(())
    }

    /// One full control tick, §dataflow order: capital, roles, signal,
    /// sizing, admission, entry, close planning, observer publish.
    pub async fn run_tick(&mut self) -> EngineResult<TickOutcome> {
        let now = self.clock.now();
        let session = self.clock.snapshot();

        let view = match self.fetch_market_view().await {
            Ok(Some(view)) => view,
            Ok(None) | Err(_) => {
                // Soft failure: nothing dependent on the gateway mutates.
                let capital = self.capital.update(None)?;
                self.publish_observer(now, &capital, &PortfolioStats::default(), &[], &session, SignalAction::Wait, "gateway unavailable")
                    .await;
                self.controller.record_tick();
                return Ok(TickOutcome {
                    signal_action: SignalAction::Wait,
                    order_submitted: false,
                    closes_executed: 0,
                    degraded: true,
                });
            }
        };

        // 1. Capital state first; everything downstream reads it.
        let capital = self.capital.update(Some(&view.account))?;

        // 2. Role registry sync before anything consumes per-role counts.
        let open_ids: HashSet<u64> = view.positions.iter().map(|p| p.id).collect();
        self.registry.sync(&open_ids);
        self.assign_new_roles(&view, &capital, &session);
        for evolution in self.registry.evaluate_evolutions(&view.positions, now) {
            self.registry.apply_evolution(&evolution);
        }

        let roles = self.registry.roles_map();
        let stats = PortfolioStats::build(&view.positions, &roles, view.account.margin_level);
        self.gate.check_emergency_loss(&stats);

        // 3. Signal, sizing and admission on the frozen snapshot.
        let signal = self
            .signals
            .generate(now, &view.candles, &capital, &stats, &session, &self.sizer);
        let mut order_submitted = false;
        if let (Some(side), Some(zone), Some(role), Some(lot)) = (
            signal.action.side(),
            signal.recommended_zone,
            signal.recommended_role,
            signal.dynamic_lot,
        ) {
            self.record_lot_audit(now, lot, zone, role, &signal.pattern);
            let proposal = ProposedOrder {
                side,
                volume: lot,
                zone,
                role,
            };
            match self.gate.admit(&proposal, &capital, &stats) {
                Admission::Admit(admitted) => {
                    order_submitted = self.submit_entry(side, &admitted.role, admitted.lot, &signal.pattern).await;
                }
                Admission::Reject { reason } => {
                    debug!("Entry dropped by risk gate: {}", reason);
                }
            }
        }

        // 4. Close planning runs after entry handling, same snapshot.
        let plan_input = PlanInput {
            positions: &view.positions,
            roles: &roles,
            capital: &capital,
            stats: &stats,
            now,
            emergency_stop: self.gate.emergency_stop_engaged(),
        };
        let actions = self.planner.plan(&plan_input);
        let closes_executed = self.execute_close_actions(&view.positions, &actions).await;

        self.publish_observer(
            now,
            &capital,
            &stats,
            &view.positions,
            &session,
            signal.action,
            &signal.reason,
        )
        .await;
        self.controller.record_tick();

        Ok(TickOutcome {
            signal_action: signal.action,
            order_submitted,
            closes_executed,
            degraded: false,
        })
    }

    /// Close every open position sequentially, bypassing the planner.
    pub async fn close_all(&mut self) -> EngineResult<CloseAllReport> {
        let timeout = self.gateway_timeout();
        let symbol = self.config.trading.symbol.clone();
        let positions = call_gateway(timeout, self.gateway.open_positions(&symbol)).await?;

        let mut report = CloseAllReport {
            requested: positions.len(),
            closed: 0,
            failed: 0,
        };
        for position in &positions {
            let request = CloseOrderRequest::new(
                position.id,
                &symbol,
                position.volume,
                self.config.trading.magic,
                "close all".to_string(),
            );
            match call_gateway(timeout, self.gateway.close_position(&request)).await {
                Ok(outcome) if outcome.is_accepted() => {
                    self.gate.record_close_result(position.pnl);
                    report.closed += 1;
                }
                Ok(outcome) => {
                    warn!(
                        "Close-all rejected for #{}: {}",
                        position.id,
                        outcome.rejection_reason().unwrap_or("unknown")
                    );
                    report.failed += 1;
                }
                Err(e) => {
                    warn!("Close-all failed for #{}: {}", position.id, e);
                    report.failed += 1;
                }
            }
        }
        info!(
            "Close all: {}/{} closed, {} failed",
            report.closed, report.requested, report.failed
        );
        Ok(report)
    }

    /// Refresh the observer snapshot without trading.
    pub async fn refresh_snapshots(&mut self) -> EngineResult<()> {
        let now = self.clock.now();
        let session = self.clock.snapshot();
        match self.fetch_market_view().await {
            Ok(Some(view)) => {
                let capital = self.capital.update(Some(&view.account))?;
                let roles = self.registry.roles_map();
                let stats =
                    PortfolioStats::build(&view.positions, &roles, view.account.margin_level);
                self.publish_observer(
                    now,
                    &capital,
                    &stats,
                    &view.positions,
                    &session,
                    SignalAction::Wait,
                    "refresh",
                )
                .await;
                Ok(())
            }
            Ok(None) | Err(_) => {
                let capital = self.capital.update(None)?;
                self.publish_observer(
                    now,
                    &capital,
                    &PortfolioStats::default(),
                    &[],
                    &session,
                    SignalAction::Wait,
                    "gateway unavailable",
                )
                .await;
                Ok(())
            }
        }
    }

    async fn fetch_market_view(&self) -> EngineResult<Option<MarketView>> {
        let timeout = self.gateway_timeout();
        let symbol = &self.config.trading.symbol;

        let account = match call_gateway(timeout, self.gateway.account_snapshot()).await? {
            Some(account) => account,
            None => return Ok(None),
        };
        let positions = call_gateway(timeout, self.gateway.open_positions(symbol)).await?;
        let candles = call_gateway(
            timeout,
            self.gateway
                .recent_candles(symbol, self.timeframe, CANDLES_PER_TICK),
        )
        .await?;
        if candles.is_empty() {
            return Err(EngineError::GatewayUnavailable("no candles".to_string()));
        }
        Ok(Some(MarketView {
            account,
            positions,
            candles: CandleBuffer::from_candles(candles, CANDLES_PER_TICK * 2),
        }))
    }

    fn assign_new_roles(
        &mut self,
        view: &MarketView,
        capital: &CapitalContext,
        session: &SessionSnapshot,
    ) {
        let interim =
            PortfolioStats::build(&view.positions, &self.registry.roles_map(), view.account.margin_level);
        let mut fractions: HashMap<Role, Decimal> = HashMap::new();
        for role in Role::all() {
            fractions.insert(role, interim.role_fraction(role));
        }
        for position in &view.positions {
            if self.registry.is_bound(position.id) {
                continue;
            }
            let ctx = AssignmentContext {
                drawdown_pct: capital.drawdown_pct,
                imbalance: interim.imbalance(),
                losing_count: interim.losing_count,
                // Position arrived from outside a scored signal; neutral.
                signal_strength: dec!(0.5),
                volume: position.volume,
                zone: position.capital_zone(),
                high_volatility_session: session.high_volatility,
                role_fractions: fractions.clone(),
            };
            self.registry.on_new_position(position, &ctx);
        }
    }

    async fn submit_entry(&mut self, side: crate::types::Side, role: &Role, lot: Decimal, pattern: &str) -> bool {
        let request = MarketOrderRequest::new(
            &self.config.trading.symbol,
            side,
            lot,
            self.config.trading.magic,
            format!("{} entry {}", role, pattern),
        );
        info!("Submitting {} {} lots ({})", side, lot, pattern);
        match call_gateway(self.gateway_timeout(), self.gateway.submit_market_order(&request)).await
        {
            Ok(outcome) if outcome.is_accepted() => {
                self.gate.record_fill(lot);
                self.gate.record_order_success();
                self.controller.record_order();
                true
            }
            Ok(outcome) => {
                self.gate.record_order_failure();
                warn!(
                    "Entry rejected by broker: {}",
                    outcome.rejection_reason().unwrap_or("unknown")
                );
                false
            }
            Err(e) => {
                self.gate.record_order_failure();
                warn!("Entry submission failed: {}", e);
                false
            }
        }
    }

    /// Execute planned closes one by one. Partial failures are surfaced in
    /// the log and not retried within the tick.
    async fn execute_close_actions(
        &mut self,
        positions: &[Position],
        actions: &[crate::planner::CloseAction],
    ) -> usize {
        let timeout = self.gateway_timeout();
        let symbol = self.config.trading.symbol.clone();
        let mut closed = 0usize;

        for action in actions {
            let mut failed = 0usize;
            for id in &action.target_ids {
                let Some(position) = positions.iter().find(|p| p.id == *id) else {
                    continue;
                };
                let request = CloseOrderRequest::new(
                    position.id,
                    &symbol,
                    position.volume,
                    self.config.trading.magic,
                    action.reason.clone(),
                );
                match call_gateway(timeout, self.gateway.close_position(&request)).await {
                    Ok(outcome) if outcome.is_accepted() => {
                        self.gate.record_close_result(position.pnl);
                        self.gate.record_order_success();
                        closed += 1;
                        info!(
                            "Closed #{} (${:.2}): {}",
                            position.id, position.pnl, action.reason
                        );
                    }
                    Ok(outcome) => {
                        self.gate.record_order_failure();
                        failed += 1;
                        warn!(
                            "Close rejected for #{}: {}",
                            position.id,
                            outcome.rejection_reason().unwrap_or("unknown")
                        );
                    }
                    Err(e) => {
                        self.gate.record_order_failure();
                        failed += 1;
                        warn!("Close failed for #{}: {}", position.id, e);
                    }
                }
            }
            if failed > 0 {
                warn!(
                    "Close action partially failed: {}/{} targets",
                    failed,
                    action.target_ids.len()
                );
            }
        }
        closed
    }

    fn record_lot_audit(
        &mut self,
        at: DateTime<Utc>,
        lot: Decimal,
        zone: CapitalZone,
        role: Role,
        pattern: &str,
    ) {
        if self.lot_audit.len() >= LOT_AUDIT_CAP {
            self.lot_audit.pop_front();
        }
        self.lot_audit.push_back(LotAuditEntry {
            at,
            lot,
            zone,
            role,
            pattern: pattern.to_string(),
        });
    }

    #[allow(clippy::too_many_arguments)]
    async fn publish_observer(
        &self,
        now: DateTime<Utc>,
        capital: &CapitalContext,
        stats: &PortfolioStats,
        positions: &[Position],
        session: &SessionSnapshot,
        last_signal_action: SignalAction,
        last_signal_reason: &str,
    ) {
        let snapshot = ObserverSnapshot {
            generated_at: now,
            capital: self.capital.report(),
            stats: stats.clone(),
            positions: positions.to_vec(),
            session: *session,
            last_signal_action,
            last_signal_reason: last_signal_reason.to_string(),
            health_score: portfolio_health_score(stats, capital),
            lot_audit: self.lot_audit.iter().cloned().collect(),
        };
        *self.observer.write().await = Some(snapshot);
    }

    fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.config.trading.gateway_timeout_seconds)
    }
}

async fn call_gateway<T>(
    timeout: Duration,
    fut: impl Future<Output = anyhow::Result<T>>,
) -> EngineResult<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(EngineError::GatewayUnavailable(e.to_string())),
        Err(_) => Err(EngineError::GatewayUnavailable("call timed out".to_string())),
    }
}

/// 0..1 composite: profitable share, drawdown headroom and book balance.
fn portfolio_health_score(stats: &PortfolioStats, capital: &CapitalContext) -> Decimal {
    let drawdown_component =
        (Decimal::ONE - capital.drawdown_pct / dec!(30)).clamp(Decimal::ZERO, Decimal::ONE);
    let total = stats.total_count();
    if total == 0 {
        return (dec!(0.7) + dec!(0.3) * drawdown_component).clamp(Decimal::ZERO, Decimal::ONE);
    }
    let profitable_share =
        Decimal::from((total - stats.losing_count) as u64) / Decimal::from(total as u64);
    let balance_component = Decimal::ONE - stats.imbalance();
    (dec!(0.4) * profitable_share + dec!(0.3) * drawdown_component + dec!(0.3) * balance_component)
        .clamp(Decimal::ZERO, Decimal::ONE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockMarketGateway;
    use crate::types::{Candle, OrderOutcome, Side};
    use chrono::Duration as ChronoDuration;

    fn green_candles() -> Vec<Candle> {
        let start = Utc::now() - ChronoDuration::minutes(25);
        let mut rows = Vec::new();
        let legs = [
            (dec!(2000.0), dec!(2000.5), dec!(2000.0), dec!(2000.4)),
            (dec!(2000.4), dec!(2001.0), dec!(2000.4), dec!(2000.9)),
            (dec!(2000.9), dec!(2001.6), dec!(2000.9), dec!(2001.5)),
        ];
        for (i, (open, high, low, close)) in legs.into_iter().enumerate() {
            rows.push(Candle {
                timeframe: TimeFrame::M5,
                open_time: start + ChronoDuration::minutes(i as i64 * 5),
                open,
                high,
                low,
                close,
                volume: dec!(40),
                is_closed: true,
            });
        }
        rows
    }

    /// Two greens then a red: neither side reaches a micro trend, the
    /// engine stays flat.
    fn flat_candles() -> Vec<Candle> {
        let start = Utc::now() - ChronoDuration::minutes(25);
        let legs = [
            (dec!(2000.0), dec!(2000.5), dec!(1999.8), dec!(2000.4)),
            (dec!(2000.4), dec!(2001.0), dec!(2000.3), dec!(2000.9)),
            (dec!(2000.9), dec!(2001.0), dec!(2000.4), dec!(2000.5)),
        ];
        let mut rows = Vec::new();
        for (i, (open, high, low, close)) in legs.into_iter().enumerate() {
            rows.push(Candle {
                timeframe: TimeFrame::M5,
                open_time: start + ChronoDuration::minutes(i as i64 * 5),
                open,
                high,
                low,
                close,
                volume: dec!(40),
                is_closed: true,
            });
        }
        rows
    }

    fn account(equity: Decimal) -> AccountSnapshot {
        AccountSnapshot {
            login: 7,
            balance: equity,
            equity,
            margin_level: None,
            free_margin: equity,
        }
    }

    #[tokio::test]
    async fn cold_start_tick_submits_one_buy() {
        let mut gateway = MockMarketGateway::new();
        gateway
            .expect_account_snapshot()
            .returning(|| Ok(Some(account(dec!(5000)))));
        gateway.expect_open_positions().returning(|_| Ok(Vec::new()));
        gateway
            .expect_recent_candles()
            .returning(|_, _, _| Ok(green_candles()));
        gateway
            .expect_submit_market_order()
            .times(1)
            .withf(|req| req.side == Side::Buy && req.volume >= dec!(0.01))
            .returning(|_| Ok(OrderOutcome::Accepted { ticket: Some(501) }));

        let mut engine =
            Engine::new(EngineConfig::default(), Arc::new(gateway)).unwrap();
        let outcome = engine.run_tick().await.unwrap();

        assert_eq!(outcome.signal_action, SignalAction::Buy);
        assert!(outcome.order_submitted);
        assert!(!outcome.degraded);
        assert_eq!(outcome.closes_executed, 0);

        let observer = engine.observer();
        let snapshot = observer.read().await.clone().unwrap();
        assert_eq!(snapshot.capital.context.current_equity, dec!(5000));
        assert_eq!(snapshot.lot_audit.len(), 1);
    }

    #[tokio::test]
    async fn gateway_outage_degrades_without_orders() {
        let mut gateway = MockMarketGateway::new();
        gateway
            .expect_account_snapshot()
            .returning(|| Err(anyhow::anyhow!("connection refused")));

        let mut engine =
            Engine::new(EngineConfig::default(), Arc::new(gateway)).unwrap();
        let outcome = engine.run_tick().await.unwrap();

        assert!(outcome.degraded);
        assert!(!outcome.order_submitted);
        assert_eq!(outcome.signal_action, SignalAction::Wait);

        let observer = engine.observer();
        let snapshot = observer.read().await.clone().unwrap();
        assert!(snapshot.capital.context.is_offline());
    }

    #[tokio::test]
    async fn missing_account_goes_offline_then_recovers() {
        let mut gateway = MockMarketGateway::new();
        let mut call = 0;
        gateway.expect_account_snapshot().returning(move || {
            call += 1;
            if call == 1 {
                Ok(None)
            } else {
                Ok(Some(account(dec!(5000))))
            }
        });
        gateway.expect_open_positions().returning(|_| Ok(Vec::new()));
        gateway
            .expect_recent_candles()
            .returning(|_, _, _| Ok(flat_candles()));

        let mut engine =
            Engine::new(EngineConfig::default(), Arc::new(gateway)).unwrap();
        let first = engine.run_tick().await.unwrap();
        assert!(first.degraded);

        let second = engine.run_tick().await.unwrap();
        assert!(!second.degraded);
    }

    #[tokio::test]
    async fn profitable_position_is_closed_by_planner() {
        let position = Position {
            id: 42,
            side: Side::Buy,
            volume: dec!(0.03),
            open_price: dec!(2000),
            current_price: dec!(2001),
            pnl: dec!(2.5),
            open_time: Utc::now() - ChronoDuration::hours(2),
        };
        let mut gateway = MockMarketGateway::new();
        gateway
            .expect_account_snapshot()
            .returning(|| Ok(Some(account(dec!(5000)))));
        gateway
            .expect_open_positions()
            .returning(move |_| Ok(vec![position.clone()]));
        gateway
            .expect_recent_candles()
            .returning(|_, _, _| Ok(flat_candles()));
        gateway
            .expect_close_position()
            .times(1)
            .withf(|req| req.position_id == 42)
            .returning(|_| Ok(OrderOutcome::Accepted { ticket: None }));

        let mut engine =
            Engine::new(EngineConfig::default(), Arc::new(gateway)).unwrap();
        let outcome = engine.run_tick().await.unwrap();

        assert_eq!(outcome.signal_action, SignalAction::Wait);
        assert_eq!(outcome.closes_executed, 1);
    }

    #[tokio::test]
    async fn close_all_reports_partial_failure() {
        let positions = vec![
            Position {
                id: 1,
                side: Side::Buy,
                volume: dec!(0.02),
                open_price: dec!(2000),
                current_price: dec!(2000),
                pnl: dec!(1),
                open_time: Utc::now(),
            },
            Position {
                id: 2,
                side: Side::Sell,
                volume: dec!(0.02),
                open_price: dec!(2000),
                current_price: dec!(2000),
                pnl: dec!(-1),
                open_time: Utc::now(),
            },
        ];
        let mut gateway = MockMarketGateway::new();
        gateway
            .expect_open_positions()
            .returning(move |_| Ok(positions.clone()));
        gateway.expect_close_position().returning(|req| {
            if req.position_id == 1 {
                Ok(OrderOutcome::Accepted { ticket: None })
            } else {
                Ok(OrderOutcome::Rejected {
                    reason: "off quotes".to_string(),
                })
            }
        });

        let mut engine =
            Engine::new(EngineConfig::default(), Arc::new(gateway)).unwrap();
        let report = engine.close_all().await.unwrap();
        assert_eq!(report.requested, 2);
        assert_eq!(report.closed, 1);
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn health_score_tracks_book_quality() {
        let capital_ctx = CapitalContext {
            initial_capital: dec!(5000),
            current_equity: dec!(5000),
            peak_equity: dec!(5000),
            drawdown_pct: Decimal::ZERO,
            mode: crate::types::TradeMode::Normal,
            zones: crate::capital::ZoneBudgets {
                safe: dec!(2500),
                growth: dec!(1750),
                aggressive: dec!(750),
            },
            efficiency: Decimal::ONE,
            updated_at: Utc::now(),
        };
        let empty = PortfolioStats::default();
        assert_eq!(portfolio_health_score(&empty, &capital_ctx), Decimal::ONE);

        let mut hurting = capital_ctx.clone();
        hurting.drawdown_pct = dec!(30);
        assert!(portfolio_health_score(&empty, &hurting) < Decimal::ONE);
    }
}
