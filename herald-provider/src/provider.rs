//! The capability contract all channel providers implement.

use async_trait::async_trait;
use herald_common::{Channel, Message};

use crate::error::{ConnectionError, SendError};

/// A successful delivery as reported by the provider.
#[derive(Debug, Clone, Default)]
pub struct Delivery {
    /// Provider-assigned message identifier, when one was issued.
    pub provider_message_id: Option<String>,
    /// Raw result detail for ledger metadata, e.g. an SMTP reply line.
    pub detail: Option<String>,
}

/// One channel provider.
///
/// Providers contribute configuration schema and message shaping; retry and
/// classification logic lives outside them. `configure` is the inherent
/// constructor on each concrete provider (it validates before any network
/// use), `verify` probes connectivity without sending user content, and
/// `send` performs exactly one delivery attempt.
///
/// Implementations must report transport failures through the classified
/// [`SendError`] taxonomy and may never downgrade a `Throttled` signal.
#[async_trait]
pub trait Provider: Send + Sync + std::fmt::Debug {
    /// Stable identifier recorded on delivery events (e.g. `"smtp"`).
    fn id(&self) -> &'static str;

    /// The channel this provider delivers on.
    fn channel(&self) -> Channel;

    /// Lightweight connectivity/auth check.
    ///
    /// # Errors
    /// Returns a [`ConnectionError`] if the transport probe fails; the
    /// caller marks the provider unavailable rather than crashing.
    async fn verify(&self) -> Result<(), ConnectionError>;

    /// Attempt one delivery.
    ///
    /// # Errors
    /// Returns a classified [`SendError`]; raw transport errors never
    /// escape this boundary.
    async fn send(&self, message: &Message) -> Result<Delivery, SendError>;
}

/// Submit a shaped message through a transport and classify any failure.
///
/// Shared by every provider variant so classification is composed once,
/// outside the variants.
pub(crate) async fn submit_shaped(
    transport: &dyn crate::transport::Transport,
    shaped: Message,
) -> Result<Delivery, SendError> {
    herald_common::outgoing!(
        level = TRACE,
        "Submitting {} message to {}",
        shaped.channel,
        shaped.recipient
    );

    let request = crate::transport::TransportRequest {
        recipient: shaped.recipient,
        subject: shaped.subject,
        body: shaped.body,
        headers: shaped.headers,
    };

    let response = transport.submit(request).await.map_err(SendError::classify)?;

    Ok(Delivery {
        provider_message_id: response.message_id,
        detail: response.detail,
    })
}
