use chrono::{DateTime, Duration, Local, Timelike, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::VecDeque;

/// Session view for one tick: classification is done once and handed to
/// the components that care.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SessionSnapshot {
    pub local_hour: u32,
    pub high_volatility: bool,
    pub activity_score: Decimal,
}

/// Wall clock plus trading-session classification for the gold market.
/// Hours are local: the London/NY overlap and the Asian open carry the
/// volatility.
#[derive(Debug, Clone, Default)]
pub struct SessionClock;

impl SessionClock {
    pub fn new() -> Self {
        Self
    }

    pub fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let hour = Local::now().hour();
        SessionSnapshot {
            local_hour: hour,
            high_volatility: is_high_volatility_hour(hour),
            activity_score: activity_score_for_hour(hour),
        }
    }
}

pub fn is_high_volatility_hour(hour: u32) -> bool {
    matches!(hour, 8..=12 | 21..=23 | 0..=1)
}

pub fn activity_score_for_hour(hour: u32) -> Decimal {
    match hour {
        8..=12 => dec!(1.0),
        21..=23 | 0..=2 => dec!(0.9),
        13..=18 => dec!(0.7),
        _ => dec!(0.4),
    }
}

/// Rolling window of accepted directional signals, used for both the
/// cooldown and the per-hour ceiling. Entries older than one hour are
/// pruned on every touch.
#[derive(Debug, Default)]
pub struct SignalRateWindow {
    accepted: VecDeque<DateTime<Utc>>,
}

impl SignalRateWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, at: DateTime<Utc>) {
        self.prune(at);
        self.accepted.push_back(at);
    }

    pub fn last_accepted(&self) -> Option<DateTime<Utc>> {
        self.accepted.back().copied()
    }

    pub fn count_last_hour(&mut self, now: DateTime<Utc>) -> usize {
        self.prune(now);
        self.accepted.len()
    }

    pub fn seconds_since_last(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_accepted().map(|at| (now - at).num_seconds())
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let horizon = now - Duration::hours(1);
        while let Some(front) = self.accepted.front() {
            if *front < horizon {
                self.accepted.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volatility_windows() {
        for hour in [8, 12, 21, 23, 0, 1] {
            assert!(is_high_volatility_hour(hour), "hour {}", hour);
        }
        for hour in [2, 7, 13, 20] {
            assert!(!is_high_volatility_hour(hour), "hour {}", hour);
        }
    }

    #[test]
    fn activity_scores() {
        assert_eq!(activity_score_for_hour(10), dec!(1.0));
        assert_eq!(activity_score_for_hour(2), dec!(0.9));
        assert_eq!(activity_score_for_hour(15), dec!(0.7));
        assert_eq!(activity_score_for_hour(5), dec!(0.4));
    }

    #[test]
    fn window_prunes_entries_older_than_an_hour() {
        let mut window = SignalRateWindow::new();
        let now = Utc::now();
        window.record(now - Duration::minutes(90));
        window.record(now - Duration::minutes(30));
        window.record(now - Duration::minutes(1));
        assert_eq!(window.count_last_hour(now), 2);
        assert_eq!(window.seconds_since_last(now), Some(60));
    }

    #[test]
    fn sliding_count_never_exceeds_recorded_rate() {
        let mut window = SignalRateWindow::new();
        let start = Utc::now();
        for i in 0..120 {
            window.record(start + Duration::minutes(i));
        }
        // At any probe point the window only sees one hour of entries.
        let probe = start + Duration::minutes(119);
        assert!(window.count_last_hour(probe) <= 61);
    }
}
