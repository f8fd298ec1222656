// =============================================================================
// Dispatch Guard — per-symbol cooldown and daily cap
// =============================================================================
//
// Per symbol: ELIGIBLE ⇄ COOLDOWN, evaluated lazily on each check.
//   eligible  <=> no prior dispatch, or now - last >= cooldown
// Last-dispatch timestamps only move forward and are never removed.
//
// Daily counters reset once `now` falls on a later UTC date than any seen
// before. A cap of zero disables the limit.
//
// Both are rebuilt at startup from the persisted signal log, so a restart
// neither reopens a cooldown nor refills the day's cap.
// =============================================================================

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, NaiveDate};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

use crate::interfaces::DispatchRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    CoolingDown { remaining_secs: i64 },
    DailyCapReached { sent_today: u32 },
}

#[derive(Debug, Clone, Serialize)]
pub struct GuardSnapshot {
    pub cooldown_secs: i64,
    pub max_per_day: u32,
    pub current_date: Option<String>,
    /// symbol -> UNIX seconds of the last dispatch.
    pub last_dispatch: BTreeMap<String, i64>,
    pub sent_today: BTreeMap<String, u32>,
}

struct Inner {
    last_dispatch: HashMap<String, i64>,
    sent_today: HashMap<String, u32>,
    current_date: Option<NaiveDate>,
}

pub struct DispatchGuard {
    state: RwLock<Inner>,
    cooldown_secs: i64,
    max_per_day: u32,
}

fn utc_date(ts: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(ts, 0).map(|dt| dt.date_naive())
}

impl DispatchGuard {
    pub fn new(cooldown_secs: i64, max_per_day: u32) -> Self {
        info!(cooldown_secs, max_per_day, "dispatch guard initialised");
        Self {
            state: RwLock::new(Inner {
                last_dispatch: HashMap::new(),
                sent_today: HashMap::new(),
                current_date: None,
            }),
            cooldown_secs: cooldown_secs.max(0),
            max_per_day,
        }
    }

    /// Clear the daily counters when `now` falls on a later UTC day.
    fn maybe_reset_daily(&self, now: i64) {
        let Some(today) = utc_date(now) else {
            return;
        };
        let mut s = self.state.write();
        let current = s.current_date;
        match current {
            Some(date) if date >= today => {}
            previous => {
                if previous.is_some() {
                    info!(date = %today, "new UTC day, resetting daily signal counters");
                }
                s.sent_today.clear();
                s.current_date = Some(today);
            }
        }
    }

    pub fn check(&self, symbol: &str, now: i64) -> Eligibility {
        self.maybe_reset_daily(now);
        let s = self.state.read();

        if let Some(&last) = s.last_dispatch.get(symbol) {
            let elapsed = now - last;
            if elapsed < self.cooldown_secs {
                return Eligibility::CoolingDown {
                    remaining_secs: self.cooldown_secs - elapsed,
                };
            }
        }

        let sent_today = s.sent_today.get(symbol).copied().unwrap_or(0);
        if self.max_per_day > 0 && sent_today >= self.max_per_day {
            return Eligibility::DailyCapReached { sent_today };
        }

        Eligibility::Eligible
    }

    /// Mark `symbol` as dispatched at `now`. An older `now` never moves the
    /// timestamp backwards.
    pub fn record_dispatch(&self, symbol: &str, now: i64) {
        self.maybe_reset_daily(now);
        let mut s = self.state.write();

        let last = s.last_dispatch.entry(symbol.to_string()).or_insert(now);
        if now > *last {
            *last = now;
        }
        let last = *last;

        let count = s.sent_today.entry(symbol.to_string()).or_insert(0);
        *count += 1;
        debug!(symbol, last_dispatch = last, sent_today = *count, "dispatch recorded");
    }

    /// Seed cooldowns and today's counters from logged deliveries. One round
    /// is one (symbol, timestamp) pair, however many subscribers it reached.
    pub fn restore(&self, records: &[DispatchRecord], now: i64) {
        let mut s = self.state.write();
        let today = s.current_date.max(utc_date(now));
        let mut rounds: HashSet<(&str, i64)> = HashSet::new();

        for r in records {
            let last = s.last_dispatch.entry(r.symbol.clone()).or_insert(r.timestamp);
            if r.timestamp > *last {
                *last = r.timestamp;
            }
            if today.is_some() && utc_date(r.timestamp) == today && rounds.insert((r.symbol.as_str(), r.timestamp)) {
                *s.sent_today.entry(r.symbol.clone()).or_insert(0) += 1;
            }
        }
        s.current_date = today;

        info!(
            symbols = s.last_dispatch.len(),
            rounds_today = rounds.len(),
            "dispatch guard restored from signal log"
        );
    }

    #[cfg(test)]
    pub fn last_dispatch(&self, symbol: &str) -> Option<i64> {
        self.state.read().last_dispatch.get(symbol).copied()
    }

    pub fn snapshot(&self) -> GuardSnapshot {
        let s = self.state.read();
        GuardSnapshot {
            cooldown_secs: self.cooldown_secs,
            max_per_day: self.max_per_day,
            current_date: s.current_date.map(|d| d.format("%Y-%m-%d").to_string()),
            last_dispatch: s.last_dispatch.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            sent_today: s.sent_today.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-03-01 00:00:00 UTC
    const DAY_START: i64 = 1_709_251_200;
    const HOUR: i64 = 3600;

    #[test]
    fn fresh_symbol_is_eligible() {
        let guard = DispatchGuard::new(4 * HOUR, 3);
        assert_eq!(guard.check("BTCUSDT", DAY_START), Eligibility::Eligible);
        assert_eq!(guard.last_dispatch("BTCUSDT"), None);
    }

    #[test]
    fn cooldown_law() {
        let guard = DispatchGuard::new(4 * HOUR, 0);
        let t = DAY_START + HOUR;
        guard.record_dispatch("ETHUSDT", t);

        for offset in [0, 1, HOUR, 4 * HOUR - 1] {
            assert!(matches!(
                guard.check("ETHUSDT", t + offset),
                Eligibility::CoolingDown { .. }
            ));
        }
        assert_eq!(
            guard.check("ETHUSDT", t + HOUR),
            Eligibility::CoolingDown {
                remaining_secs: 3 * HOUR
            }
        );
        // Eligible again at exactly last + cooldown: `now - last >= cooldown`.
        assert_eq!(guard.check("ETHUSDT", t + 4 * HOUR), Eligibility::Eligible);
        // Other symbols are unaffected.
        assert_eq!(guard.check("BTCUSDT", t + 1), Eligibility::Eligible);
    }

    #[test]
    fn timestamps_only_move_forward() {
        let guard = DispatchGuard::new(HOUR, 0);
        guard.record_dispatch("SOLUSDT", DAY_START + 500);
        guard.record_dispatch("SOLUSDT", DAY_START + 100);
        assert_eq!(guard.last_dispatch("SOLUSDT"), Some(DAY_START + 500));
        guard.record_dispatch("SOLUSDT", DAY_START + 900);
        assert_eq!(guard.last_dispatch("SOLUSDT"), Some(DAY_START + 900));
    }

    #[test]
    fn daily_cap_blocks_then_resets_next_day() {
        let guard = DispatchGuard::new(HOUR, 2);
        guard.record_dispatch("BNBUSDT", DAY_START + HOUR);
        guard.record_dispatch("BNBUSDT", DAY_START + 3 * HOUR);

        assert_eq!(
            guard.check("BNBUSDT", DAY_START + 10 * HOUR),
            Eligibility::DailyCapReached { sent_today: 2 }
        );

        let next_day = DAY_START + 24 * HOUR + 60;
        assert_eq!(guard.check("BNBUSDT", next_day), Eligibility::Eligible);
        let snap = guard.snapshot();
        assert_eq!(snap.current_date.as_deref(), Some("2024-03-02"));
        assert!(snap.sent_today.is_empty());
        assert_eq!(snap.last_dispatch["BNBUSDT"], DAY_START + 3 * HOUR);
    }

    #[test]
    fn cooldown_boundary_is_inclusive() {
        let guard = DispatchGuard::new(60, 0);
        guard.record_dispatch("ADAUSDT", DAY_START);
        assert_eq!(
            guard.check("ADAUSDT", DAY_START + 59),
            Eligibility::CoolingDown { remaining_secs: 1 }
        );
        assert_eq!(guard.check("ADAUSDT", DAY_START + 60), Eligibility::Eligible);
    }

    fn logged(subscriber_id: i64, symbol: &str, timestamp: i64) -> DispatchRecord {
        DispatchRecord {
            subscriber_id,
            symbol: symbol.to_string(),
            side: crate::types::Side::Long,
            price: 1.0,
            confidence: 90,
            timestamp,
        }
    }

    #[test]
    fn restore_rebuilds_cooldown_and_todays_rounds() {
        let guard = DispatchGuard::new(4 * HOUR, 2);
        let now = DAY_START + 10 * HOUR;
        let log = vec![
            // Yesterday: cooldown history only.
            logged(1, "BTCUSDT", DAY_START - 2 * HOUR),
            // Today: two rounds for BTCUSDT, the second reached two subscribers.
            logged(1, "BTCUSDT", DAY_START + HOUR),
            logged(1, "BTCUSDT", DAY_START + 8 * HOUR),
            logged(2, "BTCUSDT", DAY_START + 8 * HOUR),
            logged(3, "ETHUSDT", DAY_START + 2 * HOUR),
        ];
        guard.restore(&log, now);

        assert_eq!(guard.last_dispatch("BTCUSDT"), Some(DAY_START + 8 * HOUR));
        assert_eq!(
            guard.check("BTCUSDT", now),
            Eligibility::CoolingDown { remaining_secs: 2 * HOUR }
        );
        assert_eq!(
            guard.check("BTCUSDT", now + 3 * HOUR),
            Eligibility::DailyCapReached { sent_today: 2 }
        );
        assert_eq!(guard.check("ETHUSDT", now), Eligibility::Eligible);

        let snap = guard.snapshot();
        assert_eq!(snap.sent_today["ETHUSDT"], 1);
        assert_eq!(snap.current_date.as_deref(), Some("2024-03-01"));
    }

    #[test]
    fn restore_from_empty_log_changes_nothing() {
        let guard = DispatchGuard::new(HOUR, 1);
        guard.restore(&[], DAY_START);
        assert_eq!(guard.check("BTCUSDT", DAY_START), Eligibility::Eligible);
        assert!(guard.snapshot().last_dispatch.is_empty());
    }

    #[test]
    fn zero_cap_is_unlimited() {
        let guard = DispatchGuard::new(0, 0);
        for i in 0..50 {
            guard.record_dispatch("XRPUSDT", DAY_START + i);
        }
        assert_eq!(guard.check("XRPUSDT", DAY_START + 60), Eligibility::Eligible);
    }
}
