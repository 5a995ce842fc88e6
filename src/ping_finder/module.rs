//! Ping-finder lifecycle coordinator
//!
//! Owns the detection engine, drives the ping-finder state machine and
//! correlates every detected ping with the GPS fix closest to its detection
//! time.
//!
//! Control operations (`start`, `stop`, `reconfigure`) are serialized by a
//! control mutex. The detection callback never takes it: it only touches the
//! per-run context, which has its own lock.

use crate::api::records::{EstimationRecord, FinalEstimate, PingRecord};
use crate::api::sink::{RecordSink, SinkError, SinkFactory};
use crate::comms::{RadioLink, TelemetryMessage};
use crate::core::{format_timestamp, PingFinderEvent, PingFinderState, PING_FINDER_JOIN_TIMEOUT, PING_FINDER_POLL_INTERVAL};
use crate::ping_finder::{
    DetectionEngine, EngineError, EngineFactory, EngineSettings, EstimatorError, EstimatorFactory,
    LocationCallback, LocationEstimator, SdrType,
};
use crate::state::StateManager;
use crate::utils::config::{ConfigError, PingFinderConfig};
use crate::utils::logging::{log_estimation, log_ping};
use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum PingFinderError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to spawn monitoring thread: {0}")]
    Spawn(#[source] io::Error),
    #[error("ping finder is not configured")]
    NotConfigured,
}

/// Factories the coordinator builds its per-run collaborators from
#[derive(Clone)]
pub struct Collaborators {
    pub engines: Arc<dyn EngineFactory>,
    pub estimators: Arc<dyn EstimatorFactory>,
    pub sinks: Arc<dyn SinkFactory>,
}

/// Monitoring loop tunables
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub join_timeout: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: PING_FINDER_POLL_INTERVAL,
            join_timeout: PING_FINDER_JOIN_TIMEOUT,
        }
    }
}

/// Everything that changes on reconfigure
struct Run {
    run_num: u32,
    sink: Arc<dyn RecordSink>,
    estimator: Box<dyn LocationEstimator>,
}

/// State shared with the detection callback
struct PingContext {
    state_manager: Arc<StateManager>,
    link: Option<Arc<dyn RadioLink>>,
    run: Mutex<Option<Run>>,
}

impl PingContext {
    fn lock_run(&self) -> MutexGuard<'_, Option<Run>> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, message: TelemetryMessage) {
        if let Some(link) = &self.link {
            if let Err(error) = link.send_telemetry(message) {
                warn!(%error, "Failed to send telemetry");
            }
        }
    }

    fn on_ping_detected(&self, timestamp: f64, amplitude: f64, frequency: u32) {
        debug!(timestamp, amplitude, frequency, "Ping callback");

        let Some(fix) = self.state_manager.get_gps_data_closest_to(timestamp) else {
            error!(timestamp = %format_timestamp(timestamp), frequency, "No GPS data available for ping");
            return;
        };

        let mut guard = self.lock_run();
        let Some(run) = guard.as_mut() else {
            warn!(frequency, "Ping arrived with no active run");
            return;
        };

        let fix_time = format_timestamp(fix.timestamp);
        log_ping(run.run_num, &fix_time, frequency, amplitude, &fix);
        if let Err(error) = run.sink.record_ping(&PingRecord::new(run.run_num, &fix, frequency, amplitude)) {
            error!(%error, "Failed to persist ping");
        }
        self.send(TelemetryMessage::ping(&fix, frequency, amplitude));

        run.estimator.add_ping(timestamp, amplitude, frequency);
        if let Some(estimate) = run.estimator.do_estimate(frequency) {
            log_estimation(run.run_num, &fix_time, frequency, estimate, &fix);
            if let Err(error) = run
                .sink
                .record_estimation(&EstimationRecord::new(run.run_num, &fix, frequency, estimate))
            {
                error!(%error, "Failed to persist location estimate");
            }
            self.send(TelemetryMessage::location_estimate(&fix, frequency, estimate));
        }
    }
}

/// Answers "where was the vehicle at time T" from the GPS history
fn location_callback(state_manager: Arc<StateManager>) -> LocationCallback {
    Arc::new(move |timestamp: Option<f64>| -> Result<(f64, f64, f64), EstimatorError> {
        let timestamp = timestamp.unwrap_or_else(crate::core::unix_timestamp);
        let fix = state_manager
            .get_gps_data_closest_to(timestamp)
            .ok_or(EstimatorError::LocationUnavailable { timestamp })?;
        match (fix.easting(), fix.northing(), fix.altitude) {
            (Some(easting), Some(northing), Some(altitude)) => Ok((easting, northing, altitude)),
            _ => Err(EstimatorError::LocationUnavailable { timestamp }),
        }
    })
}

/// Cancellation flag that also fences the monitor's state writes
///
/// Once `cancel` returns the monitor can no longer touch the state machine,
/// even if it is detached and still running.
#[derive(Default)]
struct CancelToken(Mutex<bool>);

impl CancelToken {
    fn lock(&self) -> MutexGuard<'_, bool> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel(&self) {
        *self.lock() = true;
    }

    fn is_cancelled(&self) -> bool {
        *self.lock()
    }

    /// Apply `event` unless cancelled; the flag stays locked across the write
    fn apply(&self, state_manager: &StateManager, event: PingFinderEvent) -> bool {
        let cancelled = self.lock();
        if *cancelled {
            debug!(?event, "Monitor cancelled, dropping state event");
            return false;
        }
        state_manager.apply_ping_finder_event(event);
        true
    }
}

struct Monitor {
    token: Arc<CancelToken>,
    done: Receiver<()>,
    thread: JoinHandle<()>,
}

impl Monitor {
    fn spawn(
        engine: Arc<dyn DetectionEngine>,
        state_manager: Arc<StateManager>,
        poll_interval: Duration,
    ) -> io::Result<Self> {
        let token = Arc::new(CancelToken::default());
        let (done_tx, done) = mpsc::channel();
        let flag = Arc::clone(&token);

        let thread = thread::Builder::new().name("ping-finder-monitor".to_string()).spawn(move || {
            while !flag.is_cancelled() {
                if let Err(error) = engine.check_health() {
                    error!(%error, "Ping finder engine fault");
                    flag.apply(&state_manager, PingFinderEvent::EngineFailed);
                    break;
                }
                thread::sleep(poll_interval);
            }
            flag.apply(&state_manager, PingFinderEvent::MonitorExited);
            let _ = done_tx.send(());
        })?;

        Ok(Self { token, done, thread })
    }

    fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait up to `timeout` for the loop to finish, then detach it
    fn join(self, timeout: Duration) {
        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if self.thread.join().is_err() {
                    error!("Ping finder monitor panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Ping finder monitor did not exit, detaching");
            }
        }
    }
}

struct Control {
    /// `None` after a failed reconfigure
    engine: Option<Arc<dyn DetectionEngine>>,
    sdr_type: SdrType,
    monitor: Option<Monitor>,
}

pub struct PingFinderModule {
    control: Mutex<Control>,
    context: Arc<PingContext>,
    state_manager: Arc<StateManager>,
    collaborators: Collaborators,
    monitor_settings: MonitorSettings,
}

impl PingFinderModule {
    /// Configure an engine for `config` and move the ping finder to `Idle`
    pub fn new(
        config: &PingFinderConfig,
        sdr_type: SdrType,
        state_manager: Arc<StateManager>,
        collaborators: Collaborators,
        link: Option<Arc<dyn RadioLink>>,
    ) -> Result<Self, PingFinderError> {
        let context = Arc::new(PingContext {
            state_manager: Arc::clone(&state_manager),
            link,
            run: Mutex::new(None),
        });

        let (engine, run) = build(config, sdr_type, &context, &collaborators)?;
        *context.lock_run() = Some(run);

        state_manager.apply_ping_finder_event(PingFinderEvent::Configured);
        info!(run = config.run_num, sdr_type = %sdr_type, "Ping finder configured");

        Ok(Self {
            control: Mutex::new(Control {
                engine: Some(engine),
                sdr_type,
                monitor: None,
            }),
            context,
            state_manager,
            collaborators,
            monitor_settings: MonitorSettings::default(),
        })
    }

    pub fn with_monitor_settings(mut self, settings: MonitorSettings) -> Self {
        self.monitor_settings = settings;
        self
    }

    fn lock_control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> PingFinderState {
        self.state_manager.get_ping_finder_state()
    }

    pub fn sdr_type(&self) -> SdrType {
        self.lock_control().sdr_type
    }

    /// Start detection; only effective from `Idle` with a configured engine
    pub fn start(&self) {
        let mut control = self.lock_control();

        let state = self.state();
        let engine = match (&control.engine, state) {
            (Some(engine), PingFinderState::Idle) => Arc::clone(engine),
            _ => {
                debug!(%state, configured = control.engine.is_some(), "Ignoring start request");
                return;
            }
        };
        self.state_manager.apply_ping_finder_event(PingFinderEvent::StartRequested);

        if let Err(error) = engine.start() {
            error!(%error, "Failed to start ping finder");
            self.state_manager.apply_ping_finder_event(PingFinderEvent::EngineFailed);
            return;
        }

        match Monitor::spawn(
            Arc::clone(&engine),
            Arc::clone(&self.state_manager),
            self.monitor_settings.poll_interval,
        ) {
            Ok(monitor) => {
                control.monitor = Some(monitor);
                self.state_manager.apply_ping_finder_event(PingFinderEvent::EngineStarted);
                info!("Ping finder started");
            }
            Err(error) => {
                let error = PingFinderError::Spawn(error);
                error!(%error, "Failed to start ping finder");
                if let Err(error) = engine.stop() {
                    warn!(%error, "Engine stop failed");
                }
                self.state_manager.apply_ping_finder_event(PingFinderEvent::EngineFailed);
            }
        }
    }

    /// Stop detection; no-op when already `Idle` or unconfigured
    pub fn stop(&self) {
        let mut control = self.lock_control();
        self.stop_locked(&mut control);
    }

    fn stop_locked(&self, control: &mut Control) {
        let state = self.state();
        let Some(engine) = control.engine.clone() else {
            debug!(%state, "Ignoring stop request, no engine configured");
            return;
        };
        if state == PingFinderState::Idle {
            return;
        }

        let monitor = control.monitor.take();
        if let Some(monitor) = &monitor {
            monitor.cancel();
        }
        if let Err(error) = engine.stop() {
            warn!(%error, "Engine stop failed");
        }
        if let Some(monitor) = monitor {
            monitor.join(self.monitor_settings.join_timeout);
        }

        self.state_manager.apply_ping_finder_event(PingFinderEvent::Stopped);
        info!("Ping finder stopped");
    }

    /// Replace the engine and estimator with ones built for `config`
    ///
    /// The running engine is stopped first. On failure the ping finder stays
    /// `Uncreated`.
    pub fn reconfigure(&self, config: &PingFinderConfig, sdr_type: SdrType) -> Result<(), PingFinderError> {
        let mut control = self.lock_control();
        if self.state() != PingFinderState::Idle {
            self.stop_locked(&mut control);
        }
        self.state_manager.apply_ping_finder_event(PingFinderEvent::Released);
        self.context.lock_run().take();
        control.engine = None;

        let (engine, run) = build(config, sdr_type, &self.context, &self.collaborators)?;
        control.engine = Some(engine);
        control.sdr_type = sdr_type;
        *self.context.lock_run() = Some(run);

        self.state_manager.apply_ping_finder_event(PingFinderEvent::Configured);
        info!(run = config.run_num, sdr_type = %sdr_type, "Ping finder reconfigured");
        Ok(())
    }

    /// Best current estimate for every frequency seen in this run
    pub fn get_final_estimations(&self) -> Vec<FinalEstimate> {
        let mut guard = self.context.lock_run();
        let Some(run) = guard.as_mut() else {
            return Vec::new();
        };
        run.estimator
            .frequencies()
            .into_iter()
            .filter_map(|frequency| {
                run.estimator
                    .do_estimate(frequency)
                    .map(|(easting, northing)| FinalEstimate { frequency, easting, northing })
            })
            .collect()
    }

    /// Feed a detection directly, as the engine callback does
    pub fn on_ping_detected(&self, timestamp: f64, amplitude: f64, frequency: u32) {
        self.context.on_ping_detected(timestamp, amplitude, frequency);
    }
}

fn build(
    config: &PingFinderConfig,
    sdr_type: SdrType,
    context: &Arc<PingContext>,
    collaborators: &Collaborators,
) -> Result<(Arc<dyn DetectionEngine>, Run), PingFinderError> {
    config.validate()?;

    let mut engine = collaborators.engines.create(sdr_type)?;
    engine.configure(&EngineSettings::new(sdr_type, config))?;
    let callback_context = Arc::clone(context);
    engine.register_callback(Arc::new(move |timestamp: f64, amplitude: f64, frequency: u32| {
        callback_context.on_ping_detected(timestamp, amplitude, frequency)
    }));

    let sink = collaborators.sinks.create(&config.output_dir, config.run_num)?;
    let estimator = collaborators
        .estimators
        .create(location_callback(Arc::clone(&context.state_manager)));

    Ok((
        Arc::from(engine),
        Run {
            run_num: config.run_num,
            sink,
            estimator,
        },
    ))
}

impl Drop for PingFinderModule {
    fn drop(&mut self) {
        let control = self.control.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(monitor) = control.monitor.take() {
            monitor.cancel();
            if let Some(engine) = &control.engine {
                if let Err(error) = engine.stop() {
                    warn!(%error, "Engine stop failed");
                }
            }
            monitor.join(self.monitor_settings.join_timeout);
        }
    }
}
