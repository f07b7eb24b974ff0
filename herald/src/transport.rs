//! Local-development transport.

use async_trait::async_trait;
use herald_provider::{Transport, TransportError, TransportRequest, TransportResponse};
use tracing::info;

/// A transport that accepts every submission without touching the network.
///
/// Deployments plug real transports (an SMTP session pool, gateway SDKs)
/// into the providers; this sink exists so the daemon can run end-to-end in
/// development, logging each would-be delivery and issuing a synthetic
/// message id.
#[derive(Debug, Clone, Copy, Default)]
pub struct SinkTransport;

#[async_trait]
impl Transport for SinkTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn submit(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let message_id = ulid::Ulid::new().to_string();
        info!(
            recipient = %request.recipient,
            message_id = %message_id,
            "Sink transport accepted message"
        );
        Ok(TransportResponse {
            message_id: Some(message_id),
            detail: Some("accepted by sink".to_string()),
        })
    }
}
