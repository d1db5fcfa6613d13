//! Master key age policy.

use chrono::{DateTime, Utc};
use serde::Serialize;

pub const DEFAULT_ROTATION_DAYS: u32 = 90;

/// Whole days elapsed from `created_at` to `now`, truncated toward zero.
pub fn key_age_days(created_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - created_at).num_days()
}

/// True once the key is at least `threshold_days` old.
///
/// A creation time in the future is never due.
pub fn is_rotation_due(created_at: DateTime<Utc>, now: DateTime<Utc>, threshold_days: u32) -> bool {
    created_at <= now && key_age_days(created_at, now) >= i64::from(threshold_days)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    pub threshold_days: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RotationStatus {
    pub age_days: i64,
    pub threshold_days: u32,
    pub due: bool,
}

impl RotationPolicy {
    pub fn new(threshold_days: u32) -> Self {
        Self { threshold_days }
    }

    pub fn is_due(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        is_rotation_due(created_at, now, self.threshold_days)
    }

    pub fn evaluate(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> RotationStatus {
        RotationStatus {
            age_days: key_age_days(created_at, now),
            threshold_days: self.threshold_days,
            due: self.is_due(created_at, now),
        }
    }
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ROTATION_DAYS)
    }
}
