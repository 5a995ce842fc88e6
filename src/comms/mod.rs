//! Radio link contract for remote (online) operation

pub mod messages;
pub mod link;
pub mod mock;

pub use messages::{ConfigRequest, ControlResponse, PacketId, TelemetryMessage};
pub use link::{LinkError, LinkResult, RadioEventHandler, RadioLink};
pub use mock::{MockRadioLink, SentPacket};
