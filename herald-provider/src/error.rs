//! Typed error handling and transport-error classification.
//!
//! Real transports disagree about how they signal throttling: a 429 status,
//! a named `ThrottleError`, a "rate limit exceeded" message, or any of those
//! buried in a nested cause. The one classifier below folds every shape into
//! the fixed taxonomy the dispatcher retries against:
//! - `Throttled` - back off and retry, never a terminal failure on its own
//! - `Transient` - bounded retry (network-class failures)
//! - `Fatal` - no retry, immediate terminal failure

use thiserror::Error;

use crate::transport::TransportError;

/// Invalid or missing provider configuration. Surfaced at boot, not retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required configuration field is missing or empty.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A configuration value is present but invalid.
    #[error("Invalid configuration for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// A provider's connectivity check failed.
///
/// The provider is reported unavailable; the dispatcher keeps running.
#[derive(Debug, Clone, Error)]
#[error("Connection check failed: {0}")]
pub struct ConnectionError(#[from] pub TransportError);

/// A classified send failure.
#[derive(Debug, Clone, Error)]
pub enum SendError {
    /// The transport reported a rate-limit signal. Retried with backoff.
    #[error("Throttled: {0}")]
    Throttled(TransportError),

    /// A network-class failure likely to succeed on retry.
    #[error("Transient failure: {0}")]
    Transient(TransportError),

    /// A permanent failure. Not retried.
    #[error("Fatal failure: {0}")]
    Fatal(TransportError),
}

/// Status codes that signal throttling regardless of transport family.
const THROTTLE_STATUSES: [u16; 2] = [420, 429];

/// Status codes treated as transient: request timeout, SMTP 4xx service
/// conditions, and gateway-class HTTP errors.
const TRANSIENT_STATUSES: [u16; 7] = [408, 421, 450, 451, 452, 503, 504];

impl SendError {
    /// Classify an arbitrary transport error into the send taxonomy.
    ///
    /// Throttling wins over every other signal and is recognized via status
    /// code, error name, message substring, or any nested cause. A
    /// transient-network class is recognized next; everything else is fatal.
    #[must_use]
    pub fn classify(error: TransportError) -> Self {
        if is_throttle(&error) {
            Self::Throttled(error)
        } else if is_transient(&error) {
            Self::Transient(error)
        } else {
            Self::Fatal(error)
        }
    }

    /// Returns `true` if this is a throttle signal.
    #[must_use]
    pub const fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled(_))
    }

    /// Returns `true` if this failure warrants a bounded retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Returns `true` if this failure is terminal.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// The underlying transport error.
    #[must_use]
    pub const fn transport_error(&self) -> &TransportError {
        match self {
            Self::Throttled(error) | Self::Transient(error) | Self::Fatal(error) => error,
        }
    }
}

fn is_throttle(error: &TransportError) -> bool {
    if error
        .status
        .is_some_and(|status| THROTTLE_STATUSES.contains(&status))
    {
        return true;
    }

    if error.name.as_deref().is_some_and(|name| {
        let name = name.to_ascii_lowercase();
        name.contains("throttle") || name == "toomanyrequests" || name == "ratelimitexceeded"
    }) {
        return true;
    }

    let message = error.message.to_ascii_lowercase();
    if message.contains("throttle")
        || message.contains("rate limit")
        || message.contains("too many requests")
    {
        return true;
    }

    error.cause.as_deref().is_some_and(is_throttle)
}

fn is_transient(error: &TransportError) -> bool {
    if error
        .status
        .is_some_and(|status| TRANSIENT_STATUSES.contains(&status))
    {
        return true;
    }

    if error.name.as_deref().is_some_and(|name| {
        let name = name.to_ascii_lowercase();
        name.contains("timeout") || name.contains("timedout") || name.contains("connection")
    }) {
        return true;
    }

    let message = error.message.to_ascii_lowercase();
    if message.contains("timed out")
        || message.contains("connection refused")
        || message.contains("connection reset")
        || message.contains("temporarily unavailable")
    {
        return true;
    }

    error.cause.as_deref().is_some_and(is_transient)
}
