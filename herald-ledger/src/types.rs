//! Row types persisted by the send ledger.

use std::fmt;

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use herald_common::Channel;
use serde::{Deserialize, Serialize};

/// The state of a send record.
///
/// `Sent` and `Failed` are terminal; a record leaves `Pending` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendState {
    Pending,
    Sent,
    Failed,
}

impl SendState {
    /// Returns `true` for `Sent` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }
}

impl fmt::Display for SendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        })
    }
}

/// The kind of a delivery event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Sent,
    Failed,
}

impl EventKind {
    /// The terminal send state this event corresponds to.
    #[must_use]
    pub const fn as_state(self) -> SendState {
        match self {
            Self::Sent => SendState::Sent,
            Self::Failed => SendState::Failed,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
        })
    }
}

/// The conflict key for ledger rows.
///
/// At most one terminal send record and one delivery event may exist per
/// key; stores enforce this with insert-or-ignore semantics rather than
/// read-then-write, which would be racy under concurrent dispatch and
/// reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventKey {
    pub campaign_id: u64,
    pub user_id: u64,
    pub channel: Channel,
    pub reference_id: String,
}

impl EventKey {
    #[must_use]
    pub fn new(
        campaign_id: u64,
        user_id: u64,
        channel: Channel,
        reference_id: impl Into<String>,
    ) -> Self {
        Self {
            campaign_id,
            user_id,
            channel,
            reference_id: reference_id.into(),
        }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "campaign {} / user {} / {} / ref {}",
            self.campaign_id, self.user_id, self.channel, self.reference_id
        )
    }
}

/// One attempt sequence of delivering one campaign to one recipient on one
/// channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRecord {
    pub project_id: u64,
    pub campaign_id: u64,
    pub user_id: u64,
    pub channel: Channel,
    /// When this send is scheduled to go out.
    pub send_at: DateTime<Utc>,
    /// Set once the record reaches a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    pub state: SendState,
    /// Reference pair correlating this record with an external message id.
    pub reference_type: Option<String>,
    pub reference_id: String,
    /// Opaque metadata, e.g. a provider result code or failure reason.
    pub metadata: Option<AHashMap<String, String>>,
}

impl SendRecord {
    /// Create a pending record scheduled at `send_at`.
    #[must_use]
    pub fn pending(
        project_id: u64,
        campaign_id: u64,
        user_id: u64,
        channel: Channel,
        send_at: DateTime<Utc>,
    ) -> Self {
        Self {
            project_id,
            campaign_id,
            user_id,
            channel,
            send_at,
            completed_at: None,
            state: SendState::Pending,
            reference_type: None,
            reference_id: "0".to_string(),
            metadata: None,
        }
    }

    /// Set the reference pair.
    #[must_use]
    pub fn with_reference(
        mut self,
        reference_type: impl Into<String>,
        reference_id: impl Into<String>,
    ) -> Self {
        self.reference_type = Some(reference_type.into());
        self.reference_id = reference_id.into();
        self
    }

    /// The conflict key for this record.
    #[must_use]
    pub fn key(&self) -> EventKey {
        EventKey::new(
            self.campaign_id,
            self.user_id,
            self.channel,
            self.reference_id.clone(),
        )
    }
}

/// The canonical, derived unit of truth for what happened to a send.
///
/// Delivery events are append-only and immutable once written; writers only
/// ever insert, never update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryEvent {
    pub project_id: u64,
    pub campaign_id: u64,
    pub user_id: u64,
    pub channel: Channel,
    pub event: EventKind,
    pub reference_type: Option<String>,
    pub reference_id: String,
    pub provider_id: Option<String>,
    pub provider_message_id: Option<String>,
    /// Optional detail map, e.g. `{result: "device_token_invalid"}`.
    pub meta: Option<AHashMap<String, String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryEvent {
    /// The conflict key for this event.
    #[must_use]
    pub fn key(&self) -> EventKey {
        EventKey::new(
            self.campaign_id,
            self.user_id,
            self.channel,
            self.reference_id.clone(),
        )
    }
}
