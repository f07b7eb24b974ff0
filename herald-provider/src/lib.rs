//! Provider abstraction for the delivery pipeline.
//!
//! Every channel provider implements the same small contract: validate its
//! configuration up front, verify connectivity without sending user content,
//! and perform one delivery per [`Provider::send`] call. Transport failures
//! never escape raw: they are folded into the fixed taxonomy
//! {throttled, transient, fatal} by one central classifier before the
//! dispatcher sees them.

pub mod config;
pub mod error;
pub mod esp;
pub mod provider;
pub mod push;
pub mod sms;
pub mod smtp;
pub mod transport;
pub mod webhook;

pub use config::{EspConfig, ProviderConfig, PushConfig, SmsConfig, SmtpAuth, SmtpConfig, WebhookConfig};
pub use error::{ConfigError, ConnectionError, SendError};
pub use esp::EspProvider;
pub use provider::{Delivery, Provider};
pub use push::PushProvider;
pub use sms::SmsProvider;
pub use smtp::SmtpProvider;
pub use transport::{MockTransport, Transport, TransportError, TransportRequest, TransportResponse};
pub use webhook::WebhookProvider;
