//! Broadcast throttles.

use std::time::{Duration, Instant};

/// Lets an action through at most once per `period`.
#[derive(Debug, Clone, Copy)]
pub struct PeriodicGate {
    period: Duration,
    last: Option<Instant>,
}

impl PeriodicGate {
    /// Create a gate that opens on its first check.
    pub fn new(period: Duration) -> Self {
        Self { period, last: None }
    }

    /// True on the first call and whenever `period` has elapsed since the last pass.
    pub fn ready(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last {
            if now.saturating_duration_since(last) < self.period {
                return false;
            }
        }
        self.last = Some(now);
        true
    }

    /// Open the gate again on the next check.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Remaining range, reported only when the whole-kilometer value changes.
#[derive(Debug, Clone, Copy)]
pub struct RangeTracker {
    remaining_km: f64,
    last_reported: Option<i64>,
}

impl RangeTracker {
    /// Start from a full range.
    pub fn new(initial_km: f64) -> Self {
        Self {
            remaining_km: initial_km.max(0.0),
            last_reported: None,
        }
    }

    /// Remaining range in kilometers.
    pub fn remaining_km(&self) -> f64 {
        self.remaining_km
    }

    /// Burn `meters` of range. Returns the new value when it should be broadcast.
    pub fn consume(&mut self, meters: f64) -> Option<f64> {
        if meters.is_finite() && meters > 0.0 {
            self.remaining_km = (self.remaining_km - meters / 1000.0).max(0.0);
        }
        self.report()
    }

    /// Current value if its rounded integer differs from the last broadcast.
    pub fn report(&mut self) -> Option<f64> {
        let rounded = self.remaining_km.round() as i64;
        if self.last_reported == Some(rounded) {
            return None;
        }
        self.last_reported = Some(rounded);
        Some(self.remaining_km)
    }

    /// Back to a full tank; the next report always goes out.
    pub fn reset(&mut self, km: f64) {
        self.remaining_km = km.max(0.0);
        self.last_reported = None;
    }
}
