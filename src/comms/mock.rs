//! In-process radio link for testing and bench runs
//!
//! Records every packet and lets the caller play the base station: deliver
//! requests and acknowledge (or time out) sent packets.

use crate::comms::{
    ConfigRequest, ControlResponse, LinkError, LinkResult, PacketId, RadioEventHandler, RadioLink,
    TelemetryMessage,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A packet handed to the link
#[derive(Debug, Clone, PartialEq)]
pub enum SentPacket {
    Response(ControlResponse),
    Telemetry(TelemetryMessage),
}

#[derive(Default)]
struct Inner {
    handler: Option<Arc<dyn RadioEventHandler>>,
    running: bool,
    fail_sends: bool,
    next_id: u32,
    sent: Vec<(PacketId, SentPacket)>,
}

#[derive(Default)]
pub struct MockRadioLink {
    inner: Mutex<Inner>,
}

impl MockRadioLink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handler(&self) -> Option<Arc<dyn RadioEventHandler>> {
        self.lock().handler.clone()
    }

    /// Make every send fail until cleared
    pub fn fail_sends(&self, fail: bool) {
        self.lock().fail_sends = fail;
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    pub fn sent(&self) -> Vec<(PacketId, SentPacket)> {
        self.lock().sent.clone()
    }

    pub fn responses(&self) -> Vec<(PacketId, ControlResponse)> {
        self.lock()
            .sent
            .iter()
            .filter_map(|(id, packet)| match packet {
                SentPacket::Response(response) => Some((*id, *response)),
                SentPacket::Telemetry(_) => None,
            })
            .collect()
    }

    pub fn telemetry(&self) -> Vec<TelemetryMessage> {
        self.lock()
            .sent
            .iter()
            .filter_map(|(_, packet)| match packet {
                SentPacket::Telemetry(message) => Some(message.clone()),
                SentPacket::Response(_) => None,
            })
            .collect()
    }

    pub fn last_response(&self) -> Option<(PacketId, ControlResponse)> {
        self.responses().pop()
    }

    // The handler is cloned out before each call so a handler may send
    // from inside the callback.

    pub fn deliver_sync_request(&self) {
        if let Some(handler) = self.handler() {
            handler.on_sync_request();
        }
    }

    pub fn deliver_start_request(&self) {
        if let Some(handler) = self.handler() {
            handler.on_start_request();
        }
    }

    pub fn deliver_stop_request(&self) {
        if let Some(handler) = self.handler() {
            handler.on_stop_request();
        }
    }

    pub fn deliver_config_request(&self, request: ConfigRequest) {
        if let Some(handler) = self.handler() {
            handler.on_config_request(request);
        }
    }

    pub fn acknowledge(&self, packet_id: PacketId) {
        if let Some(handler) = self.handler() {
            handler.on_ack_success(packet_id);
        }
    }

    pub fn time_out(&self, packet_id: PacketId) {
        if let Some(handler) = self.handler() {
            handler.on_ack_timeout(packet_id);
        }
    }

    fn send(&self, packet: SentPacket) -> LinkResult<PacketId> {
        let mut inner = self.lock();
        if !inner.running {
            return Err(LinkError::NotRunning);
        }
        if inner.fail_sends {
            return Err(LinkError::Send("injected failure".to_string()));
        }
        inner.next_id += 1;
        let id = PacketId(inner.next_id);
        inner.sent.push((id, packet));
        Ok(id)
    }
}

impl RadioLink for MockRadioLink {
    fn register_handler(&self, handler: Arc<dyn RadioEventHandler>) {
        self.lock().handler = Some(handler);
    }

    fn start(&self) -> LinkResult<()> {
        self.lock().running = true;
        Ok(())
    }

    fn stop(&self) {
        self.lock().running = false;
    }

    fn send_response(&self, response: ControlResponse) -> LinkResult<PacketId> {
        self.send(SentPacket::Response(response))
    }

    fn send_telemetry(&self, message: TelemetryMessage) -> LinkResult<PacketId> {
        self.send(SentPacket::Telemetry(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_requires_running_link() {
        let link = MockRadioLink::new();
        assert!(matches!(
            link.send_telemetry(TelemetryMessage::Error),
            Err(LinkError::NotRunning)
        ));

        link.start().unwrap();
        let first = link.send_response(ControlResponse::Sync { success: true }).unwrap();
        let second = link.send_telemetry(TelemetryMessage::Error).unwrap();
        assert!(second > first);
        assert_eq!(link.responses(), vec![(first, ControlResponse::Sync { success: true })]);
        assert_eq!(link.telemetry(), vec![TelemetryMessage::Error]);

        link.fail_sends(true);
        assert!(link.send_telemetry(TelemetryMessage::Error).is_err());
        assert_eq!(link.sent().len(), 2);
    }
}
