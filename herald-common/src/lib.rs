pub mod channel;
pub mod logging;
pub mod message;

pub use channel::{Channel, ChannelParseError};
pub use message::Message;

pub use tracing;

/// Control signal broadcast to long-running components.
#[derive(Debug, Clone, Copy)]
pub enum Signal {
    Shutdown,
    Finalised,
}
