//! Radio link to the base station

use crate::comms::{ConfigRequest, ControlResponse, PacketId, TelemetryMessage};
use std::io;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("radio link is not running")]
    NotRunning,
    #[error("radio I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to send packet: {0}")]
    Send(String),
}

pub type LinkResult<T> = Result<T, LinkError>;

/// Inbound events, invoked on the link's receive thread
pub trait RadioEventHandler: Send + Sync {
    fn on_sync_request(&self);
    fn on_start_request(&self);
    fn on_stop_request(&self);
    fn on_config_request(&self, request: ConfigRequest);
    /// The peer acknowledged the packet
    fn on_ack_success(&self, packet_id: PacketId);
    /// The packet was never acknowledged
    fn on_ack_timeout(&self, packet_id: PacketId);
}

/// Reliable-delivery packet link
///
/// Every send returns the packet identifier; its fate is reported later
/// through [`RadioEventHandler::on_ack_success`] or
/// [`RadioEventHandler::on_ack_timeout`].
pub trait RadioLink: Send + Sync {
    fn register_handler(&self, handler: Arc<dyn RadioEventHandler>);
    fn start(&self) -> LinkResult<()>;
    fn stop(&self);
    fn send_response(&self, response: ControlResponse) -> LinkResult<PacketId>;
    fn send_telemetry(&self, message: TelemetryMessage) -> LinkResult<PacketId>;
}
