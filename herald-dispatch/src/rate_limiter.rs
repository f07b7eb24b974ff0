//! Per-channel rate limiting using the token bucket algorithm.
//!
//! Local pacing in front of the providers: each channel has its own bucket
//! with configurable limits, so a burst of email sends cannot starve SMS
//! traffic or trip provider-side throttles unnecessarily.
//!
//! - Tokens are added to the bucket at a constant rate (`refill_rate`)
//! - Each message consumes one token
//! - If no tokens are available, the send is delayed
//! - The bucket has a maximum capacity (allows bursts)

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use herald_common::Channel;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for rate limiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Default messages per second per channel.
    #[serde(default = "default_messages_per_second")]
    pub messages_per_second: f64,

    /// Default burst size (max tokens in bucket).
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,

    /// Per-channel rate limit overrides.
    #[serde(default)]
    pub channel_limits: ahash::AHashMap<Channel, ChannelRateLimit>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            messages_per_second: default_messages_per_second(),
            burst_size: default_burst_size(),
            channel_limits: ahash::AHashMap::default(),
        }
    }
}

const fn default_messages_per_second() -> f64 {
    50.0
}

const fn default_burst_size() -> u32 {
    100
}

/// Per-channel rate limit configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelRateLimit {
    /// Messages per second for this channel.
    pub messages_per_second: f64,
    /// Burst size for this channel.
    pub burst_size: u32,
}

/// Token bucket for a single channel.
#[derive(Debug)]
struct TokenBucket {
    /// Current number of tokens.
    tokens: f64,
    /// Maximum tokens (burst size).
    capacity: f64,
    /// Tokens added per second.
    refill_rate: f64,
    /// Last time tokens were added.
    last_refill: Instant,
}

impl TokenBucket {
    fn new(messages_per_second: f64, burst_size: u32) -> Self {
        let capacity = f64::from(burst_size);
        Self {
            tokens: capacity, // Start with full bucket
            capacity,
            refill_rate: messages_per_second,
            last_refill: Instant::now(),
        }
    }

    /// Refill tokens based on elapsed time.
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();

        let tokens_to_add = elapsed * self.refill_rate;
        self.tokens = (self.tokens + tokens_to_add).min(self.capacity);
        self.last_refill = now;
    }

    /// Try to consume one token, returns true if successful.
    fn try_consume(&mut self) -> bool {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Calculate wait time until a token becomes available.
    fn time_until_available(&mut self) -> Duration {
        self.refill();

        if self.tokens >= 1.0 {
            return Duration::ZERO;
        }

        let tokens_needed = 1.0 - self.tokens;
        let seconds = tokens_needed / self.refill_rate;
        Duration::from_secs_f64(seconds)
    }
}

/// Per-channel rate limiter manager.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: DashMap<Channel, Arc<parking_lot::Mutex<TokenBucket>>>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given configuration.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
        }
    }

    /// Get or create a token bucket for a channel.
    fn get_bucket(&self, channel: Channel) -> Arc<parking_lot::Mutex<TokenBucket>> {
        self.buckets
            .entry(channel)
            .or_insert_with(|| {
                let (messages_per_second, burst_size) =
                    self.config.channel_limits.get(&channel).map_or_else(
                        || (self.config.messages_per_second, self.config.burst_size),
                        |limit| (limit.messages_per_second, limit.burst_size),
                    );

                Arc::new(parking_lot::Mutex::new(TokenBucket::new(
                    messages_per_second,
                    burst_size,
                )))
            })
            .clone()
    }

    /// Check if a message can be sent on the channel.
    ///
    /// Returns `Ok(())` if allowed, `Err(Duration)` with the wait time if
    /// rate limited.
    ///
    /// # Errors
    /// The error carries the wait until a token becomes available.
    pub fn check_rate_limit(&self, channel: Channel) -> Result<(), Duration> {
        let bucket = self.get_bucket(channel);
        let mut bucket = bucket.lock();

        if bucket.try_consume() {
            Ok(())
        } else {
            let wait_time = bucket.time_until_available();
            drop(bucket);
            debug!(
                %channel,
                wait_seconds = wait_time.as_secs_f64(),
                "Channel rate limit exceeded, must wait"
            );
            Err(wait_time)
        }
    }
}
