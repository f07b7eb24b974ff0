//! Retry policy with exponential backoff and jitter.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Retry configuration for a dispatch attempt sequence.
///
/// Encapsulates all retry-related configuration and provides methods for
/// determining retry behavior without exposing the backoff arithmetic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of send attempts before giving up.
    ///
    /// Default: 5 attempts
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential backoff (in milliseconds).
    ///
    /// The actual delay is calculated as: `base * 2^(attempt - 1)`
    ///
    /// Default: 500 ms
    #[serde(default = "defaults::base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff delay (in milliseconds).
    ///
    /// Caps the exponential backoff to prevent excessively long waits.
    ///
    /// Default: 60000 ms (1 minute)
    #[serde(default = "defaults::max_delay_ms")]
    pub max_delay_ms: u64,

    /// Jitter factor for randomizing backoff delays.
    ///
    /// Jitter prevents thundering herd problems when many sends back off
    /// simultaneously. The delay is randomized within ±`jitter_factor`.
    ///
    /// Default: 0.2 (±20%)
    #[serde(default = "defaults::jitter_factor")]
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            base_delay_ms: defaults::base_delay_ms(),
            max_delay_ms: defaults::max_delay_ms(),
            jitter_factor: defaults::jitter_factor(),
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if another attempt should be made after `attempt_count`
    /// attempts have already failed.
    #[must_use]
    pub const fn should_retry(&self, attempt_count: u32) -> bool {
        attempt_count < self.max_attempts
    }

    /// How long to back off before the next attempt.
    ///
    /// # Arguments
    /// * `attempt_count` - Number of attempts made so far (the calculation
    ///   treats the next attempt as 1-indexed)
    #[must_use]
    pub fn backoff_delay(&self, attempt_count: u32) -> Duration {
        calculate_backoff_delay(
            attempt_count + 1,
            self.base_delay_ms,
            self.max_delay_ms,
            self.jitter_factor,
        )
    }

    /// Number of attempts remaining. Returns `0` once exhausted.
    #[must_use]
    pub const fn remaining_attempts(&self, attempt_count: u32) -> u32 {
        self.max_attempts.saturating_sub(attempt_count)
    }
}

/// Calculate a backoff delay using exponential backoff with jitter.
///
/// # Formula
/// `delay = min(base * 2^(attempt - 1), max_delay) * (1 ± jitter)`
///
/// # Arguments
/// * `attempt` - The attempt number (1-indexed)
/// * `base_delay_ms` - Base delay in milliseconds
/// * `max_delay_ms` - Maximum delay in milliseconds
/// * `jitter_factor` - Jitter factor (e.g., 0.2 for ±20%)
#[must_use]
pub fn calculate_backoff_delay(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_factor: f64,
) -> Duration {
    // Exponential backoff with saturating arithmetic to prevent overflow.
    let exponent = attempt.saturating_sub(1);
    let delay = if exponent >= 63 {
        max_delay_ms
    } else {
        let multiplier = 1u64 << exponent;
        base_delay_ms.saturating_mul(multiplier).min(max_delay_ms)
    };

    // Apply jitter: delay * (1 ± jitter_factor)
    // Intentional precision loss and casting for randomization
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let jittered = {
        let jitter_range = (delay as f64) * jitter_factor;
        if jitter_range > 0.0 {
            let mut rng = rand::rng();
            let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);
            ((delay as f64) + jitter).max(0.0) as u64
        } else {
            delay
        }
    };

    Duration::from_millis(jittered)
}

mod defaults {
    pub const fn max_attempts() -> u32 {
        5
    }

    pub const fn base_delay_ms() -> u64 {
        500
    }

    pub const fn max_delay_ms() -> u64 {
        60_000 // 1 minute
    }

    pub const fn jitter_factor() -> f64 {
        0.2 // ±20%
    }
}
