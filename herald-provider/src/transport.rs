//! The seam between channel providers and the transport layer.
//!
//! Concrete transports (an SMTP session, an HTTP client, a push gateway SDK)
//! live outside this crate; providers only see the [`Transport`] trait. The
//! error shape is deliberately loose because real transports disagree about
//! how they report failure: some carry a status code, some a named error
//! kind, some only a message, and some wrap another error as a cause.

use std::{
    collections::VecDeque,
    fmt,
    sync::{Arc, Mutex},
};

use ahash::AHashMap;
use async_trait::async_trait;

/// A channel-neutral submission handed to the transport.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
    pub headers: AHashMap<String, String>,
}

/// The transport's answer to a successful submission.
#[derive(Debug, Clone, Default)]
pub struct TransportResponse {
    /// Transport-assigned message identifier, when one was issued.
    pub message_id: Option<String>,
    /// Raw result detail, e.g. an SMTP reply line or HTTP status text.
    pub detail: Option<String>,
}

/// A transport failure in whatever shape the transport produced it.
#[derive(Debug, Clone, Default)]
pub struct TransportError {
    /// Numeric status or reply code, when the transport has one.
    pub status: Option<u16>,
    /// Named error kind, e.g. `ThrottleError` or `ConnectionRefused`.
    pub name: Option<String>,
    /// Human-readable failure description.
    pub message: String,
    /// Wrapped underlying error, when the transport nests its causes.
    pub cause: Option<Box<TransportError>>,
}

impl TransportError {
    /// A plain message-only error.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Attach a status code.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach a named error kind.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Wrap an underlying cause.
    #[must_use]
    pub fn with_cause(mut self, cause: Self) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            write!(f, "{name}: ")?;
        }
        f.write_str(&self.message)?;
        if let Some(status) = self.status {
            write!(f, " (status {status})")?;
        }
        if let Some(cause) = &self.cause {
            write!(f, "; caused by: {cause}")?;
        }
        Ok(())
    }
}

impl std::error::Error for TransportError {}

/// Contract implemented by concrete transports.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Lightweight connectivity/auth probe. Must not deliver anything.
    ///
    /// # Errors
    /// Returns the transport's failure shape if the probe fails.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Submit one message for delivery.
    ///
    /// # Errors
    /// Returns the transport's failure shape if submission fails.
    async fn submit(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// Scripted transport for tests and local development.
///
/// Outcomes are consumed in order, one per `submit` call; once the script is
/// exhausted every further submission succeeds with an empty response.
/// Submitted requests are recorded for inspection.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    outcomes: Arc<Mutex<VecDeque<Result<TransportResponse, TransportError>>>>,
    requests: Arc<Mutex<Vec<TransportRequest>>>,
    refuse_connect: Arc<Mutex<Option<TransportError>>>,
}

impl MockTransport {
    /// A transport that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome for the next submission.
    #[must_use]
    pub fn with_outcome(self, outcome: Result<TransportResponse, TransportError>) -> Self {
        self.push_outcome(outcome);
        self
    }

    /// Queue an outcome without consuming the transport.
    ///
    /// # Panics
    /// Panics if the outcome queue mutex is poisoned.
    pub fn push_outcome(&self, outcome: Result<TransportResponse, TransportError>) {
        self.outcomes
            .lock()
            .expect("MockTransport outcomes mutex poisoned")
            .push_back(outcome);
    }

    /// Make `connect` fail with the given error.
    ///
    /// # Panics
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn refusing_connections(self, error: TransportError) -> Self {
        *self
            .refuse_connect
            .lock()
            .expect("MockTransport connect mutex poisoned") = Some(error);
        self
    }

    /// All requests submitted so far.
    ///
    /// # Panics
    /// Panics if the request log mutex is poisoned.
    #[must_use]
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests
            .lock()
            .expect("MockTransport requests mutex poisoned")
            .clone()
    }

    /// Number of submissions observed.
    ///
    /// # Panics
    /// Panics if the request log mutex is poisoned.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .expect("MockTransport requests mutex poisoned")
            .len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        match &*self
            .refuse_connect
            .lock()
            .map_err(|_| TransportError::message("connect mutex poisoned"))?
        {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn submit(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        self.requests
            .lock()
            .map_err(|_| TransportError::message("request mutex poisoned"))?
            .push(request);

        self.outcomes
            .lock()
            .map_err(|_| TransportError::message("outcome mutex poisoned"))?
            .pop_front()
            .unwrap_or_else(|| Ok(TransportResponse::default()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_all_parts() {
        let error = TransportError::message("slow down")
            .with_status(429)
            .with_name("ThrottleError")
            .with_cause(TransportError::message("bucket empty"));

        assert_eq!(
            error.to_string(),
            "ThrottleError: slow down (status 429); caused by: bucket empty"
        );
    }

    #[tokio::test]
    async fn mock_consumes_outcomes_in_order() {
        let transport = MockTransport::new()
            .with_outcome(Err(TransportError::message("first fails")))
            .with_outcome(Ok(TransportResponse {
                message_id: Some("m-1".to_string()),
                detail: None,
            }));

        let request = TransportRequest {
            recipient: "user@example.com".to_string(),
            subject: None,
            body: "hi".to_string(),
            headers: AHashMap::new(),
        };

        assert!(transport.submit(request.clone()).await.is_err());
        let response = transport.submit(request.clone()).await.unwrap();
        assert_eq!(response.message_id.as_deref(), Some("m-1"));
        // Script exhausted: further submissions succeed.
        assert!(transport.submit(request).await.is_ok());
        assert_eq!(transport.request_count(), 3);
    }
}
