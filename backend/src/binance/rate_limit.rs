// =============================================================================
// Request-Weight Budget — keeps public REST usage under Binance's limit
// =============================================================================
//
// Binance counts request weight per IP per clock minute (limit 1200). We stop
// at 1000 to leave headroom for anything else sharing the IP.
//
// Accounting per request:
//   1. `try_acquire` charges the documented weight up front, or refuses.
//   2. The `X-MBX-USED-WEIGHT-1M` header, when present, replaces our estimate
//      with the server's figure.
// The window rolls over by itself when the UTC minute changes.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::{debug, warn};

pub const WEIGHT_LIMIT: u32 = 1000;
const WEIGHT_WARN_AT: u32 = 800;

pub const HEADER_USED_WEIGHT_1M: &str = "X-MBX-USED-WEIGHT-1M";

/// UNIX minute in the high 32 bits, weight used in that minute in the low 32.
/// Both halves change in one atomic step, so a rollover can't drop a charge.
pub struct RateLimitTracker {
    state: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitSnapshot {
    pub used_weight_1m: u32,
    pub limit: u32,
    pub window_minute: i64,
}

fn pack(minute: u32, used: u32) -> u64 {
    (u64::from(minute) << 32) | u64::from(used)
}

fn unpack(state: u64) -> (u32, u32) {
    ((state >> 32) as u32, state as u32)
}

fn minute_of(now_secs: i64) -> u32 {
    now_secs.div_euclid(60).clamp(0, i64::from(u32::MAX)) as u32
}

/// Usage carried into `minute`: zero for a newer minute, unchanged otherwise.
/// A clock reading from an older minute never moves the window back.
fn roll(state: u64, minute: u32) -> (u32, u32) {
    let (window, used) = unpack(state);
    if minute > window {
        (minute, 0)
    } else {
        (window, used)
    }
}

impl RateLimitTracker {
    pub fn new() -> Self {
        Self {
            state: AtomicU64::new(0),
        }
    }

    /// Charge `weight` against the current minute. `false` means the request
    /// must not be sent.
    pub fn try_acquire(&self, weight: u32, now_secs: i64) -> bool {
        let minute = minute_of(now_secs);
        let charged = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
                let (window, used) = roll(state, minute);
                let next = used.saturating_add(weight);
                (next <= WEIGHT_LIMIT).then(|| pack(window, next))
            });

        match charged {
            Ok(prev) => {
                let (_, before) = roll(prev, minute);
                let after = before + weight;
                if before < WEIGHT_WARN_AT && after >= WEIGHT_WARN_AT {
                    warn!(used_weight = after, limit = WEIGHT_LIMIT, "request weight above warning level");
                }
                true
            }
            Err(state) => {
                let (_, used) = roll(state, minute);
                warn!(used_weight = used, requested = weight, limit = WEIGHT_LIMIT, "request refused, minute budget spent");
                false
            }
        }
    }

    /// Adopt the server-reported usage from a response's headers.
    pub fn observe_headers(&self, headers: &reqwest::header::HeaderMap, now_secs: i64) {
        let reported = headers
            .get(HEADER_USED_WEIGHT_1M)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u32>().ok());
        if let Some(used) = reported {
            self.observe(used, now_secs);
        }
    }

    /// Replace the estimate for the current minute. A report stamped with an
    /// older minute than the window is ignored.
    pub fn observe(&self, used: u32, now_secs: i64) {
        let minute = minute_of(now_secs);
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
                let (window, _) = unpack(state);
                (minute >= window).then(|| pack(minute, used))
            });
        debug!(used_weight_1m = used, "server-reported request weight");
    }

    pub fn snapshot(&self) -> RateLimitSnapshot {
        let (window, used) = unpack(self.state.load(Ordering::Acquire));
        RateLimitSnapshot {
            used_weight_1m: used,
            limit: WEIGHT_LIMIT,
            window_minute: i64::from(window),
        }
    }
}

impl Default for RateLimitTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RateLimitTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snap = self.snapshot();
        f.debug_struct("RateLimitTracker")
            .field("used_weight_1m", &snap.used_weight_1m)
            .field("window_minute", &snap.window_minute)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};

    const T0: i64 = 1_700_000_040; // minute boundary

    #[test]
    fn charges_until_limit() {
        let budget = RateLimitTracker::new();
        assert!(budget.try_acquire(600, T0));
        assert!(budget.try_acquire(400, T0 + 10));
        assert!(!budget.try_acquire(1, T0 + 20));
        assert_eq!(budget.snapshot().used_weight_1m, WEIGHT_LIMIT);
    }

    #[test]
    fn new_minute_resets() {
        let budget = RateLimitTracker::new();
        assert!(budget.try_acquire(WEIGHT_LIMIT, T0));
        assert!(!budget.try_acquire(2, T0 + 59));
        assert!(budget.try_acquire(2, T0 + 60));
        assert_eq!(budget.snapshot().used_weight_1m, 2);
    }

    #[test]
    fn header_overrides_estimate() {
        let budget = RateLimitTracker::new();
        assert!(budget.try_acquire(2, T0));

        let mut headers = HeaderMap::new();
        headers.insert(HEADER_USED_WEIGHT_1M, HeaderValue::from_static("997"));
        budget.observe_headers(&headers, T0 + 1);
        assert_eq!(budget.snapshot().used_weight_1m, 997);
        assert!(!budget.try_acquire(4, T0 + 2));

        headers.insert(HEADER_USED_WEIGHT_1M, HeaderValue::from_static("lots"));
        budget.observe_headers(&headers, T0 + 3);
        assert_eq!(budget.snapshot().used_weight_1m, 997);
    }

    #[test]
    fn late_clock_does_not_reopen_old_minute() {
        let budget = RateLimitTracker::new();
        assert!(budget.try_acquire(900, T0));
        assert!(budget.try_acquire(5, T0 + 60));
        // A caller still reading the previous minute is charged to the new one.
        assert!(budget.try_acquire(5, T0 + 59));
        assert!(budget.try_acquire(5, T0 + 61));
        let snap = budget.snapshot();
        assert_eq!(snap.used_weight_1m, 15);
        assert_eq!(snap.window_minute, (T0 + 60) / 60);
    }

    #[test]
    fn concurrent_rollover_loses_no_charges() {
        use std::sync::Arc;

        let budget = Arc::new(RateLimitTracker::new());
        assert!(budget.try_acquire(WEIGHT_LIMIT, T0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let budget = budget.clone();
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        assert!(budget.try_acquire(1, T0 + 60));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(budget.snapshot().used_weight_1m, 80);
    }
}
