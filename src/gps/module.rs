//! GPS acquisition pipeline
//!
//! Reads raw bytes from a [`GpsTransport`], frames them into NMEA sentences,
//! aggregates each batch into one [`GpsFix`], gates it through the
//! [`DataValidator`] and commits accepted fixes to the shared
//! [`StateManager`]. GPS state transitions are driven from here.

use crate::core::{
    GpsEvent, GpsFix, GpsState, GPS_DATA_TIMEOUT, GPS_MAX_CONSECUTIVE_ERRORS,
    GPS_READ_CHUNK_SIZE, GPS_RETRY_INTERVAL,
};
use crate::hardware::GpsTransport;
use crate::processing::{parse_sentence, Projection, ProjectionError, Sentence};
use crate::state::StateManager;
use crate::validation::DataValidator;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Acquisition loop tunables
#[derive(Debug, Clone)]
pub struct GpsModuleSettings {
    /// Bytes requested from the transport per iteration
    pub read_size: usize,
    /// Consecutive failed reads before the module enters `Error`
    pub max_errors: u32,
    /// Silence after which `Running` is demoted to `Initializing`
    pub data_timeout: Duration,
    /// Backoff after a failed or empty read
    pub retry_interval: Duration,
}

impl Default for GpsModuleSettings {
    fn default() -> Self {
        Self {
            read_size: GPS_READ_CHUNK_SIZE,
            max_errors: GPS_MAX_CONSECUTIVE_ERRORS,
            data_timeout: GPS_DATA_TIMEOUT,
            retry_interval: GPS_RETRY_INTERVAL,
        }
    }
}

/// A chunk that could not be decoded as ASCII
#[derive(Debug, Error, PartialEq)]
#[error("non-ASCII byte 0x{byte:02X} at offset {offset}")]
pub struct DecodeError {
    pub byte: u8,
    pub offset: usize,
}

/// Decode one transport chunk
///
/// `0xFF` idle filler is dropped. Any other byte outside 7-bit ASCII fails
/// the whole chunk.
pub fn decode_chunk(data: &[u8]) -> Result<String, DecodeError> {
    let mut text = String::with_capacity(data.len());
    for (offset, &byte) in data.iter().enumerate() {
        match byte {
            0xFF => {}
            b if b.is_ascii() => text.push(char::from(b)),
            b => return Err(DecodeError { byte: b, offset }),
        }
    }
    Ok(text)
}

/// Stops a running acquisition loop from another thread
#[derive(Clone)]
pub struct GpsStopHandle {
    running: Arc<AtomicBool>,
    state_manager: Arc<StateManager>,
}

impl GpsStopHandle {
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.state_manager.apply_gps_event(GpsEvent::Stopped);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Acquisition loop running on its own thread
pub struct GpsModuleHandle {
    stop: GpsStopHandle,
    thread: JoinHandle<()>,
}

impl GpsModuleHandle {
    pub fn stop_handle(&self) -> GpsStopHandle {
        self.stop.clone()
    }

    /// Signal the loop, wait for it to exit and leave the GPS `Idle`
    ///
    /// The loop applies `Stopped` itself on exit; it is only applied here when
    /// the thread died without getting that far.
    pub fn stop(self) {
        self.stop.running.store(false, Ordering::SeqCst);
        if self.thread.join().is_err() {
            error!("GPS acquisition thread panicked");
            self.stop.state_manager.apply_gps_event(GpsEvent::Stopped);
        }
    }
}

pub struct GpsModule {
    transport: Box<dyn GpsTransport>,
    projection: Projection,
    state_manager: Arc<StateManager>,
    validator: DataValidator,
    settings: GpsModuleSettings,
    /// Text received after the last complete sentence
    buffer: String,
    error_count: u32,
    last_update: Instant,
    running: Arc<AtomicBool>,
}

impl GpsModule {
    /// Create the pipeline and move the GPS to `Idle`
    pub fn new(
        transport: Box<dyn GpsTransport>,
        epsg_code: u32,
        state_manager: Arc<StateManager>,
    ) -> Result<Self, ProjectionError> {
        let projection = Projection::from_epsg(epsg_code)?;
        state_manager.apply_gps_event(GpsEvent::Created);

        Ok(Self {
            transport,
            projection,
            state_manager,
            validator: DataValidator::new(),
            settings: GpsModuleSettings::default(),
            buffer: String::new(),
            error_count: 0,
            last_update: Instant::now(),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_settings(mut self, settings: GpsModuleSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_validator(mut self, validator: DataValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn stop_handle(&self) -> GpsStopHandle {
        GpsStopHandle {
            running: Arc::clone(&self.running),
            state_manager: Arc::clone(&self.state_manager),
        }
    }

    /// Unprocessed text waiting for its newline
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    /// Run the acquisition loop on the calling thread until stopped
    pub fn run(&mut self) {
        self.running.store(true, Ordering::SeqCst);
        self.run_loop();
    }

    pub fn stop(&self) {
        self.stop_handle().stop();
    }

    /// Move the loop onto a named background thread
    pub fn spawn(mut self) -> io::Result<GpsModuleHandle> {
        // set before the thread starts so an early stop is not overwritten
        self.running.store(true, Ordering::SeqCst);
        let stop = self.stop_handle();
        let thread = thread::Builder::new()
            .name("gps-acquisition".to_string())
            .spawn(move || self.run_loop())?;
        Ok(GpsModuleHandle { stop, thread })
    }

    fn run_loop(&mut self) {
        info!(transport = %self.transport.describe(), epsg_code = self.projection.epsg_code(), "GPS acquisition started");
        self.state_manager.apply_gps_event(GpsEvent::AcquisitionStarted);
        self.validator.reset();
        self.buffer.clear();
        self.error_count = 0;
        self.last_update = Instant::now();

        while self.running.load(Ordering::SeqCst) {
            match self.transport.read(self.settings.read_size) {
                Some(data) if data.is_empty() => {
                    self.error_count = 0;
                    self.check_data_timeout();
                    thread::sleep(self.settings.retry_interval);
                }
                Some(data) => {
                    self.error_count = 0;
                    if self.ingest(&data) == 0 {
                        self.check_data_timeout();
                    }
                }
                None => {
                    self.error_count += 1;
                    if self.error_count == self.settings.max_errors {
                        error!(errors = self.error_count, "Too many consecutive GPS read errors");
                        self.state_manager.apply_gps_event(GpsEvent::ErrorThresholdReached);
                    }
                    self.check_data_timeout();
                    thread::sleep(self.settings.retry_interval);
                }
            }
        }

        self.state_manager.apply_gps_event(GpsEvent::Stopped);
        info!("GPS acquisition stopped");
    }

    /// Decode a chunk, append it to the buffer and process complete sentences
    ///
    /// Returns the number of fixes committed to the state manager.
    pub fn ingest(&mut self, data: &[u8]) -> usize {
        match decode_chunk(data) {
            Ok(text) => {
                self.buffer.push_str(&text);
                self.process_buffer()
            }
            Err(error) => {
                warn!(%error, len = data.len(), "Dropping undecodable GPS chunk");
                0
            }
        }
    }

    fn process_buffer(&mut self) -> usize {
        let Some(last_newline) = self.buffer.rfind('\n') else {
            return 0;
        };
        let remainder = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, remainder);

        let mut fix = GpsFix::new();
        let mut updated = false;

        for line in complete.split('\n') {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_sentence(line) {
                Ok(Sentence::Gga(gga)) => {
                    set_if_some(&mut fix.altitude, gga.altitude);
                    set_if_some(&mut fix.satellite_count, gga.satellite_count);
                    set_if_some(&mut fix.hdop, gga.hdop);
                    set_if_some(&mut fix.fix_quality, gga.fix_quality);
                    updated = true;
                }
                Ok(Sentence::Rmc(rmc)) => {
                    set_if_some(&mut fix.latitude, rmc.latitude);
                    set_if_some(&mut fix.longitude, rmc.longitude);
                    set_if_some(&mut fix.heading, rmc.course);
                    updated = true;
                }
                Ok(Sentence::Other(kind)) => debug!(kind = %kind, "Ignoring NMEA sentence"),
                Err(error) => warn!(%error, sentence = line, "Skipping malformed NMEA sentence"),
            }
        }

        if updated {
            self.commit(fix)
        } else {
            0
        }
    }

    fn commit(&mut self, mut fix: GpsFix) -> usize {
        if let Err(reason) = self.validator.check(&fix) {
            warn!(category = reason.category(), %reason, "Rejected GPS data");
            return 0;
        }
        if let Err(error) = fix.apply_projection(&self.projection) {
            warn!(%error, "Rejected GPS data");
            return 0;
        }
        self.validator.accept(&fix);
        fix.is_valid = true;

        let has_position = fix.has_position();
        debug!(
            timestamp = fix.timestamp,
            latitude = ?fix.latitude,
            longitude = ?fix.longitude,
            altitude = ?fix.altitude,
            "Committing GPS fix"
        );
        self.state_manager.update_gps_data(fix);
        self.last_update = Instant::now();

        if has_position {
            self.state_manager.apply_gps_event(GpsEvent::FixAcquired);
        }
        1
    }

    fn check_data_timeout(&self) {
        if self.last_update.elapsed() <= self.settings.data_timeout {
            return;
        }
        if self.state_manager.get_gps_state() == GpsState::Running {
            warn!(
                timeout_s = self.settings.data_timeout.as_secs_f64(),
                "No GPS data within timeout, reacquiring"
            );
            self.state_manager.apply_gps_event(GpsEvent::SignalLost);
        }
    }
}

fn set_if_some<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::MockGpsTransport;
    use crate::processing::nmea::encode_sentence;

    const TEST_GGA: &str =
        "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n";

    fn rmc(lat_field: &str, ns: char, lon_field: &str, ew: char) -> String {
        encode_sentence(&format!(
            "GPRMC,123519,A,{},{},{},{},022.4,084.4,230394,003.1,W",
            lat_field, ns, lon_field, ew
        ))
    }

    fn gga(satellites: u32, altitude: f64) -> String {
        encode_sentence(&format!(
            "GPGGA,123519,3242.9420,N,11709.6660,W,1,{:02},0.9,{:.1},M,0.0,M,,",
            satellites, altitude
        ))
    }

    fn module(epsg_code: u32) -> (GpsModule, Arc<StateManager>) {
        let state = Arc::new(StateManager::new());
        let module = GpsModule::new(Box::new(MockGpsTransport::new()), epsg_code, Arc::clone(&state)).unwrap();
        (module, state)
    }

    fn fast_settings() -> GpsModuleSettings {
        GpsModuleSettings {
            read_size: 32,
            max_errors: 5,
            data_timeout: Duration::from_millis(200),
            retry_interval: Duration::from_millis(2),
        }
    }

    fn wait_for(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    #[test]
    fn test_new_sets_idle() {
        let (_module, state) = module(32611);
        assert_eq!(state.get_gps_state(), GpsState::Idle);
    }

    #[test]
    fn test_unsupported_epsg() {
        let state = Arc::new(StateManager::new());
        let result = GpsModule::new(Box::new(MockGpsTransport::new()), 9999, Arc::clone(&state));
        assert!(matches!(result, Err(ProjectionError::UnsupportedEpsg(9999))));
        assert_eq!(state.get_gps_state(), GpsState::Uncreated);
    }

    #[test]
    fn test_decode_chunk() {
        assert_eq!(decode_chunk(b"\xFF\xFF$GP\xFFGGA").unwrap(), "$GPGGA");
        assert_eq!(
            decode_chunk(b"$GP\xC3\xA9").unwrap_err(),
            DecodeError { byte: 0xC3, offset: 3 }
        );
    }

    #[test]
    fn test_gga_then_partial_rmc() {
        let (mut module, state) = module(32611);
        let mut data = TEST_GGA.to_string();
        data.push_str("$GPRMC,123519,A,4807.0");

        assert_eq!(module.ingest(data.as_bytes()), 1);
        assert_eq!(module.buffered(), "$GPRMC,123519,A,4807.0");
        assert_eq!(state.gps_history_len(), 1);

        let fix = state.get_current_gps_data();
        assert_eq!(fix.altitude, Some(545.4));
        assert_eq!(fix.satellite_count, Some(8));
        assert_eq!(fix.hdop, Some(0.9));
        assert_eq!(fix.fix_quality, Some(1));
        // GGA position is not used; only RMC sets coordinates
        assert_eq!(fix.latitude, None);
        assert_eq!(fix.easting(), None);
        assert!(fix.is_valid);
    }

    #[test]
    fn test_sentence_split_across_reads() {
        let (mut module, state) = module(32611);
        let sentence = rmc("3242.9420", 'N', "11709.6660", 'W');
        let (head, tail) = sentence.split_at(20);

        assert_eq!(module.ingest(head.as_bytes()), 0);
        assert_eq!(module.ingest(tail.as_bytes()), 1);
        assert_eq!(module.buffered(), "");

        let fix = state.get_current_gps_data();
        assert!((fix.latitude.unwrap() - 32.7157).abs() < 1e-6);
        assert!((fix.longitude.unwrap() + 117.1611).abs() < 1e-6);
        assert_eq!(fix.heading, Some(84.4));
        assert_eq!(fix.epsg_code(), Some(32611));
        let easting = fix.easting().unwrap();
        assert!(easting > 480_000.0 && easting < 490_000.0, "{}", easting);
    }

    #[test]
    fn test_position_fix_promotes_to_running() {
        let (mut module, state) = module(4326);
        state.apply_gps_event(GpsEvent::AcquisitionStarted);

        // altitude-only batch keeps the receiver initializing
        module.ingest(gga(8, 20.0).as_bytes());
        assert_eq!(state.get_gps_state(), GpsState::Initializing);

        module.ingest(rmc("3242.9420", 'N', "11709.6660", 'W').as_bytes());
        assert_eq!(state.get_gps_state(), GpsState::Running);
        let fix = state.get_current_gps_data();
        assert_eq!(fix.easting(), fix.longitude);
        assert_eq!(fix.northing(), fix.latitude);
    }

    #[test]
    fn test_batch_combines_sentences_and_skips_garbage() {
        let (mut module, state) = module(32611);
        let mut data = gga(8, 20.0);
        data.push_str("$GPRMC,garbage*00\r\n");
        data.push_str(&encode_sentence("GPGSV,3,1,11,03,03,111,00"));
        data.push_str(&rmc("3242.9420", 'N', "11709.6660", 'W'));

        assert_eq!(module.ingest(data.as_bytes()), 1);
        let fix = state.get_current_gps_data();
        assert_eq!(fix.altitude, Some(20.0));
        assert!(fix.has_position());
    }

    #[test]
    fn test_each_batch_starts_empty() {
        let (mut module, state) = module(32611);
        let mut first = gga(8, 20.0);
        first.push_str(&rmc("3242.9420", 'N', "11709.6660", 'W'));
        module.ingest(first.as_bytes());

        module.ingest(gga(7, 20.0).as_bytes());
        let fix = state.get_current_gps_data();
        assert_eq!(fix.satellite_count, Some(7));
        assert_eq!(fix.latitude, None);
        assert_eq!(state.gps_history_len(), 2);
    }

    #[test]
    fn test_rejected_batch_not_stored() {
        let (mut module, state) = module(32611);
        state.apply_gps_event(GpsEvent::AcquisitionStarted);

        let mut data = gga(2, 20.0);
        data.push_str(&rmc("3242.9420", 'N', "11709.6660", 'W'));
        assert_eq!(module.ingest(data.as_bytes()), 0);
        assert_eq!(state.gps_history_len(), 0);
        assert_eq!(state.get_gps_state(), GpsState::Initializing);
    }

    #[test]
    fn test_position_jump_rejected() {
        let (mut module, state) = module(32611);
        module.ingest(rmc("3242.9420", 'N', "11709.6660", 'W').as_bytes());
        // half a degree north
        assert_eq!(module.ingest(rmc("3312.9420", 'N', "11709.6660", 'W').as_bytes()), 0);
        assert_eq!(state.gps_history_len(), 1);
    }

    #[test]
    fn test_projection_failure_rejects_batch() {
        let (mut module, state) = module(32611);
        // UTM is undefined this far north
        assert_eq!(module.ingest(rmc("8830.0000", 'N', "11709.6660", 'W').as_bytes()), 0);
        assert_eq!(state.gps_history_len(), 0);

        // the rejected fix did not become the continuity baseline
        assert_eq!(module.ingest(rmc("3242.9420", 'N', "11709.6660", 'W').as_bytes()), 1);
    }

    #[test]
    fn test_undecodable_chunk_dropped() {
        let (mut module, state) = module(32611);
        let mut data = rmc("3242.9420", 'N', "11709.6660", 'W').into_bytes();
        data.insert(5, 0xC3);

        assert_eq!(module.ingest(&data), 0);
        assert_eq!(module.buffered(), "");
        assert_eq!(state.gps_history_len(), 0);
    }

    #[test]
    fn test_threaded_run_and_stop() {
        let state = Arc::new(StateManager::new());
        let mut transport = MockGpsTransport::new();
        transport.push_str(&gga(8, 20.0));
        transport.push_str(&rmc("3242.9420", 'N', "11709.6660", 'W'));
        let module = GpsModule::new(Box::new(transport), 32611, Arc::clone(&state))
            .unwrap()
            .with_settings(fast_settings());

        let handle = module.spawn().unwrap();
        assert!(wait_for(|| state.get_gps_state() == GpsState::Running, Duration::from_secs(2)));
        assert!(state.get_current_gps_data().has_position());

        handle.stop();
        assert_eq!(state.get_gps_state(), GpsState::Idle);
    }

    #[test]
    fn test_signal_loss_demotes_to_initializing() {
        let state = Arc::new(StateManager::new());
        let mut transport = MockGpsTransport::new();
        transport.push_str(&rmc("3242.9420", 'N', "11709.6660", 'W'));
        let module = GpsModule::new(Box::new(transport), 32611, Arc::clone(&state))
            .unwrap()
            .with_settings(fast_settings());

        let handle = module.spawn().unwrap();
        assert!(wait_for(|| state.get_gps_state() == GpsState::Running, Duration::from_secs(2)));
        assert!(wait_for(|| state.get_gps_state() == GpsState::Initializing, Duration::from_secs(2)));
        assert_eq!(state.gps_history_len(), 1);

        handle.stop();
        assert_eq!(state.get_gps_state(), GpsState::Idle);
    }

    #[test]
    fn test_error_threshold_is_sticky() {
        let state = Arc::new(StateManager::new());
        let mut transport = MockGpsTransport::new();
        transport.disconnect();
        let module = GpsModule::new(Box::new(transport), 32611, Arc::clone(&state))
            .unwrap()
            .with_settings(fast_settings());

        let handle = module.spawn().unwrap();
        assert!(wait_for(|| state.get_gps_state() == GpsState::Error, Duration::from_secs(2)));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(state.get_gps_state(), GpsState::Error);

        handle.stop();
        assert_eq!(state.get_gps_state(), GpsState::Idle);
    }

    struct PanickingTransport;

    impl GpsTransport for PanickingTransport {
        fn read(&mut self, _max_len: usize) -> Option<Vec<u8>> {
            panic!("receiver unplugged");
        }

        fn describe(&self) -> String {
            "panicking".to_string()
        }
    }

    #[test]
    fn test_stop_after_thread_panic_leaves_idle() {
        let state = Arc::new(StateManager::new());
        let module = GpsModule::new(Box::new(PanickingTransport), 32611, Arc::clone(&state))
            .unwrap()
            .with_settings(fast_settings());

        let handle = module.spawn().unwrap();
        assert!(wait_for(|| handle.thread.is_finished(), Duration::from_secs(2)));
        assert_eq!(state.get_gps_state(), GpsState::Initializing);

        handle.stop();
        assert_eq!(state.get_gps_state(), GpsState::Idle);
    }

    #[test]
    fn test_stop_before_thread_starts() {
        let state = Arc::new(StateManager::new());
        let module = GpsModule::new(Box::new(MockGpsTransport::new()), 32611, Arc::clone(&state))
            .unwrap()
            .with_settings(fast_settings());

        let handle = module.spawn().unwrap();
        handle.stop_handle().stop();
        handle.stop();
        assert_eq!(state.get_gps_state(), GpsState::Idle);
    }
}
