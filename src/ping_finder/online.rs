//! Radio-controlled ping finder
//!
//! Control requests are answered immediately, but the requested action only
//! runs once the base station acknowledges the response. Until then it waits
//! in a table keyed by the response's packet id. A response that is never
//! acknowledged discards its action.

use crate::api::records::FinalEstimate;
use crate::comms::{
    ConfigRequest, ControlResponse, LinkError, LinkResult, PacketId, RadioEventHandler, RadioLink, TelemetryMessage,
};
use crate::core::{GpsState, PingFinderEvent, PingFinderState, GPS_TELEMETRY_INTERVAL};
use crate::ping_finder::{Collaborators, PingFinderError, PingFinderModule, SdrType};
use crate::state::StateManager;
use crate::utils::config::{resolve_output_dir, usb_media_root, ConfigError, HardwareConfig, PingFinderConfig};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Action waiting for its response to be acknowledged
#[derive(Debug, Clone, PartialEq)]
pub enum PendingAction {
    Sync,
    Start,
    Stop,
    Config(PingFinderConfig),
}

impl PendingAction {
    pub fn kind(&self) -> &'static str {
        match self {
            PendingAction::Sync => "sync",
            PendingAction::Start => "start",
            PendingAction::Stop => "stop",
            PendingAction::Config(_) => "config",
        }
    }
}

#[derive(Debug, Clone)]
pub struct OnlineSettings {
    pub sdr_type: SdrType,
    pub use_usb_storage: bool,
    /// Fixed output directory, bypassing the storage policy
    pub output_dir: Option<PathBuf>,
    pub telemetry_interval: Duration,
}

impl OnlineSettings {
    pub fn from_hardware(hardware: &HardwareConfig) -> Self {
        Self {
            sdr_type: hardware.sdr_type,
            use_usb_storage: hardware.use_usb_storage,
            output_dir: None,
            telemetry_interval: GPS_TELEMETRY_INTERVAL,
        }
    }
}

struct TelemetryLoop {
    stop_tx: Sender<()>,
    thread: JoinHandle<()>,
}

impl TelemetryLoop {
    /// Push the current fix every `interval` while GPS is `Running`
    fn spawn(state_manager: Arc<StateManager>, link: Arc<dyn RadioLink>, interval: Duration) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let thread = thread::Builder::new().name("gps-telemetry".to_string()).spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
            if state_manager.get_gps_state() != GpsState::Running {
                continue;
            }
            let fix = state_manager.get_current_gps_data();
            if let Err(error) = link.send_telemetry(TelemetryMessage::gps(&fix)) {
                warn!(%error, "Failed to send GPS telemetry");
            }
        })?;
        Ok(Self { stop_tx, thread })
    }

    fn stop(self) {
        let _ = self.stop_tx.send(());
        if self.thread.join().is_err() {
            error!("GPS telemetry thread panicked");
        }
    }
}

struct Inner {
    state_manager: Arc<StateManager>,
    link: Arc<dyn RadioLink>,
    collaborators: Collaborators,
    settings: OnlineSettings,
    coordinator: Mutex<Option<PingFinderModule>>,
    pending: Mutex<HashMap<PacketId, PendingAction>>,
    telemetry: Mutex<Option<TelemetryLoop>>,
}

impl Inner {
    fn lock_coordinator(&self) -> MutexGuard<'_, Option<PingFinderModule>> {
        self.coordinator.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<PacketId, PendingAction>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn has_coordinator(&self) -> bool {
        self.lock_coordinator().is_some()
    }

    /// Send `response`, stashing `action` under its packet id when given
    ///
    /// The table stays locked across the send so an acknowledgment cannot
    /// overtake the insert.
    fn respond(&self, response: ControlResponse, action: Option<PendingAction>) {
        let mut pending = self.lock_pending();
        match self.link.send_response(response) {
            Ok(packet_id) => {
                debug!(packet = %packet_id, kind = response.kind(), success = response.success(), "Sent response");
                if let Some(action) = action {
                    pending.insert(packet_id, action);
                }
            }
            Err(error) => error!(%error, kind = response.kind(), "Failed to send response"),
        }
    }

    fn send_error(&self) {
        if let Err(error) = self.link.send_telemetry(TelemetryMessage::Error) {
            error!(%error, "Failed to send error message");
        }
    }

    fn output_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = &self.settings.output_dir {
            return Ok(dir.clone());
        }
        let cwd = env::current_dir().map_err(|source| ConfigError::Io {
            path: PathBuf::from("."),
            source,
        })?;
        resolve_output_dir(self.settings.use_usb_storage, &usb_media_root(), &cwd)
    }

    fn handle_sync(&self) {
        let success = self.state_manager.get_gps_state() == GpsState::Running;
        self.respond(ControlResponse::Sync { success }, Some(PendingAction::Sync));
    }

    fn handle_start(&self) {
        let success = self.has_coordinator();
        self.respond(ControlResponse::Start { success }, success.then_some(PendingAction::Start));
    }

    fn handle_stop(&self) {
        let success = self.has_coordinator();
        self.respond(ControlResponse::Stop { success }, success.then_some(PendingAction::Stop));
    }

    fn handle_config(&self, request: ConfigRequest) {
        let config = self.output_dir().and_then(|dir| {
            let config = request.into_config(dir);
            config.validate()?;
            Ok(config)
        });
        match config {
            Ok(config) => self.respond(ControlResponse::Config { success: true }, Some(PendingAction::Config(config))),
            Err(error) => {
                error!(%error, "Rejected ping finder configuration");
                self.send_error();
            }
        }
    }

    fn handle_ack_success(&self, packet_id: PacketId) {
        let Some(action) = self.lock_pending().remove(&packet_id) else {
            debug!(packet = %packet_id, "Acknowledgment for untracked packet");
            return;
        };
        let kind = action.kind();
        match self.execute(action) {
            Ok(()) => info!(packet = %packet_id, action = kind, "Executed acknowledged action"),
            Err(error) => {
                error!(%error, packet = %packet_id, action = kind, "Acknowledged action failed");
                self.send_error();
            }
        }
    }

    fn handle_ack_timeout(&self, packet_id: PacketId) {
        if let Some(action) = self.lock_pending().remove(&packet_id) {
            error!(packet = %packet_id, action = action.kind(), "Response not acknowledged, discarding action");
        }
    }

    fn execute(&self, action: PendingAction) -> Result<(), PingFinderError> {
        let mut coordinator = self.lock_coordinator();
        match action {
            PendingAction::Sync => {
                if let Some(module) = coordinator.take() {
                    module.stop();
                    self.state_manager.apply_ping_finder_event(PingFinderEvent::Released);
                }
                Ok(())
            }
            PendingAction::Start => {
                coordinator.as_ref().ok_or(PingFinderError::NotConfigured)?.start();
                Ok(())
            }
            PendingAction::Stop => {
                coordinator.as_ref().ok_or(PingFinderError::NotConfigured)?.stop();
                Ok(())
            }
            PendingAction::Config(config) => {
                match coordinator.as_ref() {
                    Some(module) => module.reconfigure(&config, self.settings.sdr_type)?,
                    None => {
                        let module = PingFinderModule::new(
                            &config,
                            self.settings.sdr_type,
                            Arc::clone(&self.state_manager),
                            self.collaborators.clone(),
                            Some(Arc::clone(&self.link)),
                        )?;
                        *coordinator = Some(module);
                    }
                }
                Ok(())
            }
        }
    }
}

/// Routes link events to the manager without keeping it alive
struct HandlerAdapter(Weak<Inner>);

impl RadioEventHandler for HandlerAdapter {
    fn on_sync_request(&self) {
        if let Some(inner) = self.0.upgrade() {
            inner.handle_sync();
        }
    }

    fn on_start_request(&self) {
        if let Some(inner) = self.0.upgrade() {
            inner.handle_start();
        }
    }

    fn on_stop_request(&self) {
        if let Some(inner) = self.0.upgrade() {
            inner.handle_stop();
        }
    }

    fn on_config_request(&self, request: ConfigRequest) {
        if let Some(inner) = self.0.upgrade() {
            inner.handle_config(request);
        }
    }

    fn on_ack_success(&self, packet_id: PacketId) {
        if let Some(inner) = self.0.upgrade() {
            inner.handle_ack_success(packet_id);
        }
    }

    fn on_ack_timeout(&self, packet_id: PacketId) {
        if let Some(inner) = self.0.upgrade() {
            inner.handle_ack_timeout(packet_id);
        }
    }
}

pub struct OnlinePingFinderManager {
    inner: Arc<Inner>,
}

impl OnlinePingFinderManager {
    pub fn new(
        state_manager: Arc<StateManager>,
        link: Arc<dyn RadioLink>,
        collaborators: Collaborators,
        settings: OnlineSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state_manager,
                link,
                collaborators,
                settings,
                coordinator: Mutex::new(None),
                pending: Mutex::new(HashMap::new()),
                telemetry: Mutex::new(None),
            }),
        }
    }

    /// Register with the link, start it and begin pushing GPS telemetry
    pub fn start(&self) -> LinkResult<()> {
        let inner = &self.inner;
        inner
            .link
            .register_handler(Arc::new(HandlerAdapter(Arc::downgrade(inner))));
        inner.link.start()?;

        let mut telemetry = inner.telemetry.lock().unwrap_or_else(PoisonError::into_inner);
        if telemetry.is_none() {
            let worker = TelemetryLoop::spawn(
                Arc::clone(&inner.state_manager),
                Arc::clone(&inner.link),
                inner.settings.telemetry_interval,
            )
            .map_err(LinkError::Io)?;
            *telemetry = Some(worker);
        }
        info!("Online ping finder manager started");
        Ok(())
    }

    /// Stop telemetry, the link and any coordinator
    pub fn shutdown(&self) {
        let worker = self
            .inner
            .telemetry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            worker.stop();
        }
        self.inner.link.stop();
        if let Some(module) = self.inner.lock_coordinator().take() {
            module.stop();
        }
        self.inner.lock_pending().clear();
        info!("Online ping finder manager stopped");
    }

    pub fn has_coordinator(&self) -> bool {
        self.inner.has_coordinator()
    }

    /// Number of actions waiting for an acknowledgment
    pub fn pending_count(&self) -> usize {
        self.inner.lock_pending().len()
    }

    pub fn ping_finder_state(&self) -> PingFinderState {
        self.inner.state_manager.get_ping_finder_state()
    }

    pub fn final_estimations(&self) -> Vec<FinalEstimate> {
        self.inner
            .lock_coordinator()
            .as_ref()
            .map_or_else(Vec::new, PingFinderModule::get_final_estimations)
    }
}

impl Drop for OnlinePingFinderManager {
    fn drop(&mut self) {
        let worker = self
            .inner
            .telemetry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            worker.stop();
        }
    }
}
