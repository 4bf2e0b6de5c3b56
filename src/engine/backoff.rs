//! Wait time between attempts as a function of attempt number

use crate::config::{BackoffConfig, BackoffKind};
use std::time::Duration;

/// Deterministic, cap-bounded backoff curve
///
/// `delay(n)` is non-decreasing in `n` and never exceeds the cap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackoffPolicy {
    /// `min(base * n, cap)`
    Linear { base: Duration, cap: Duration },

    /// `min(base * multiplier^(n-1), cap)`
    Exponential {
        base: Duration,
        multiplier: f64,
        cap: Duration,
    },
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::Linear {
            base: Duration::from_millis(2000),
            cap: Duration::from_secs(60),
        }
    }
}

impl BackoffPolicy {
    pub fn linear(base: Duration, cap: Duration) -> Self {
        Self::Linear { base, cap }
    }

    /// Multipliers below 1.0 are raised to 1.0 to keep the curve non-decreasing
    pub fn exponential(base: Duration, multiplier: f64, cap: Duration) -> Self {
        let multiplier = if multiplier.is_finite() {
            multiplier.max(1.0)
        } else {
            1.0
        };
        Self::Exponential {
            base,
            multiplier,
            cap,
        }
    }

    pub fn from_config(config: &BackoffConfig) -> Self {
        let base = Duration::from_millis(config.base_ms);
        let cap = Duration::from_millis(config.cap_ms);
        match config.kind {
            BackoffKind::Linear => Self::linear(base, cap),
            BackoffKind::Exponential => Self::exponential(base, config.multiplier, cap),
        }
    }

    /// Wait after the attempt numbered `attempt` (1-based) fails
    ///
    /// An attempt number of 0 is treated as 1.
    pub fn delay(&self, attempt: u32) -> Duration {
        let n = attempt.max(1);
        match *self {
            Self::Linear { base, cap } => base.saturating_mul(n).min(cap),
            Self::Exponential {
                base,
                multiplier,
                cap,
            } => {
                let exponent = i32::try_from(n - 1).unwrap_or(i32::MAX);
                let secs = base.as_secs_f64() * multiplier.powi(exponent);
                if !secs.is_finite() || secs >= cap.as_secs_f64() {
                    cap
                } else {
                    Duration::from_secs_f64(secs)
                }
            }
        }
    }

    pub fn cap(&self) -> Duration {
        match *self {
            Self::Linear { cap, .. } | Self::Exponential { cap, .. } => cap,
        }
    }
}
