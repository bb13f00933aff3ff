//! Reconnect backoff policy.
//!
//! Delay for zero-based attempt `n` is `base_delay * multiplier^n`, clamped to
//! `max_delay`. Once `max_attempts` reconnects have been scheduled without a
//! successful open, automatic reconnection stops.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default growth factor between attempts.
pub const DEFAULT_MULTIPLIER: f64 = 1.5;
/// Default number of automatic reconnect attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default delay cap in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 60_000;

/// Reconnect schedule parameters.
///
/// Delays follow `base_delay_ms * multiplier^n` exactly until that value
/// exceeds `max_delay_ms`, after which every delay equals the cap. With the
/// defaults (1000 ms, 1.5, 5 attempts) the largest delay is 5063 ms, so the
/// 60 s cap is never reached.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect, in ms.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Growth factor applied per attempt.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Attempts before automatic reconnection gives up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Upper bound on any single delay, in ms.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_multiplier() -> f64 {
    DEFAULT_MULTIPLIER
}
fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            multiplier: DEFAULT_MULTIPLIER,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt`, or `None` once the budget is spent.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        (attempt < self.max_attempts).then(|| {
            Duration::from_millis(reconnect_delay_ms(
                attempt,
                self.base_delay_ms,
                self.multiplier,
                self.max_delay_ms,
            ))
        })
    }
}

/// `min(max_delay_ms, base_delay_ms * multiplier^attempt)`, rounded to whole ms.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]
pub fn reconnect_delay_ms(attempt: u32, base_delay_ms: u64, multiplier: f64, max_delay_ms: u64) -> u64 {
    let exponent = attempt.min(i32::MAX as u32) as i32;
    let raw = (base_delay_ms as f64) * multiplier.max(1.0).powi(exponent);
    if !raw.is_finite() || raw >= max_delay_ms as f64 {
        return max_delay_ms;
    }
    raw.round() as u64
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
