//! Signal generator engine
//!
//! Stands in for an SDR: emits one synthetic ping per target frequency at a
//! fixed interval, timestamped with the wall clock.

use crate::core::unix_timestamp;
use crate::ping_finder::{DetectionEngine, EngineError, EngineSettings, PingCallback};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const BASE_AMPLITUDE: f64 = 20.0;
const AMPLITUDE_JITTER: f64 = 2.0;
/// Longest uninterrupted sleep, bounds how long `stop` waits
const SLEEP_SLICE: Duration = Duration::from_millis(10);

struct Worker {
    running: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

pub struct GeneratorEngine {
    interval: Duration,
    settings: Option<EngineSettings>,
    callback: Option<PingCallback>,
    worker: Mutex<Option<Worker>>,
}

impl GeneratorEngine {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            settings: None,
            callback: None,
            worker: Mutex::new(None),
        }
    }

    fn lock_worker(&self) -> std::sync::MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DetectionEngine for GeneratorEngine {
    fn configure(&mut self, settings: &EngineSettings) -> Result<(), EngineError> {
        if settings.target_frequencies.is_empty() {
            return Err(EngineError::Runtime("no target frequencies".to_string()));
        }
        self.settings = Some(settings.clone());
        Ok(())
    }

    fn register_callback(&mut self, callback: PingCallback) {
        self.callback = Some(callback);
    }

    fn start(&self) -> Result<(), EngineError> {
        let (Some(settings), Some(callback)) = (&self.settings, &self.callback) else {
            return Err(EngineError::NotConfigured);
        };

        let mut worker = self.lock_worker();
        if worker.is_some() {
            return Err(EngineError::AlreadyRunning);
        }

        let running = Arc::new(AtomicBool::new(true));
        let frequencies = settings.target_frequencies.clone();
        let callback = Arc::clone(callback);
        let interval = self.interval;
        let flag = Arc::clone(&running);

        let thread = thread::Builder::new()
            .name("ping-generator".to_string())
            .spawn(move || generate(flag, interval, frequencies, callback))?;

        info!(frequencies = ?settings.target_frequencies, interval_ms = interval.as_millis() as u64, "Signal generator started");
        *worker = Some(Worker { running, thread });
        Ok(())
    }

    fn stop(&self) -> Result<(), EngineError> {
        let Some(worker) = self.lock_worker().take() else {
            return Ok(());
        };
        worker.running.store(false, Ordering::SeqCst);
        worker
            .thread
            .join()
            .map_err(|_| EngineError::Runtime("generator thread panicked".to_string()))?;
        info!("Signal generator stopped");
        Ok(())
    }

    fn check_health(&self) -> Result<(), EngineError> {
        match &*self.lock_worker() {
            Some(worker) if worker.thread.is_finished() && worker.running.load(Ordering::SeqCst) => {
                Err(EngineError::Runtime("generator thread exited unexpectedly".to_string()))
            }
            _ => Ok(()),
        }
    }
}

impl Drop for GeneratorEngine {
    fn drop(&mut self) {
        if let Err(error) = self.stop() {
            warn!(%error, "Signal generator did not stop cleanly");
        }
    }
}

fn generate(running: Arc<AtomicBool>, interval: Duration, frequencies: Vec<u32>, callback: PingCallback) {
    let mut rng = rand::thread_rng();
    let mut next = Instant::now() + interval;

    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now < next {
            thread::sleep((next - now).min(SLEEP_SLICE));
            continue;
        }
        next += interval;

        for &frequency in &frequencies {
            let amplitude = BASE_AMPLITUDE + rng.gen_range(-AMPLITUDE_JITTER..AMPLITUDE_JITTER);
            debug!(frequency, amplitude, "Generated ping");
            callback(unix_timestamp(), amplitude, frequency);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ping_finder::SdrType;

    fn settings(frequencies: Vec<u32>) -> EngineSettings {
        EngineSettings {
            sdr_type: SdrType::Generator,
            gain: 56.0,
            sampling_rate: 2_500_000,
            center_frequency: 173_500_000,
            run_num: 1,
            enable_test_data: false,
            ping_width_ms: 25,
            ping_min_snr: 25,
            ping_max_len_mult: 1.5,
            ping_min_len_mult: 0.5,
            target_frequencies: frequencies,
        }
    }

    #[test]
    fn test_start_requires_configuration() {
        let engine = GeneratorEngine::new(Duration::from_millis(5));
        assert!(matches!(engine.start(), Err(EngineError::NotConfigured)));
    }

    #[test]
    fn test_emits_pings_for_each_frequency() {
        let pings = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&pings);

        let mut engine = GeneratorEngine::new(Duration::from_millis(5));
        engine.configure(&settings(vec![173_043_000, 173_500_000])).unwrap();
        engine.register_callback(Arc::new(move |timestamp, amplitude, frequency| {
            sink.lock().unwrap().push((timestamp, amplitude, frequency));
        }));

        engine.start().unwrap();
        assert!(matches!(engine.start(), Err(EngineError::AlreadyRunning)));
        thread::sleep(Duration::from_millis(40));
        assert!(engine.check_health().is_ok());
        engine.stop().unwrap();

        let pings = pings.lock().unwrap();
        assert!(pings.len() >= 2, "{}", pings.len());
        for &(timestamp, amplitude, frequency) in pings.iter() {
            assert!(timestamp > 0.0);
            assert!((amplitude - BASE_AMPLITUDE).abs() <= AMPLITUDE_JITTER);
            assert!(frequency == 173_043_000 || frequency == 173_500_000);
        }
    }

    #[test]
    fn test_empty_frequency_list_rejected() {
        let mut engine = GeneratorEngine::new(Duration::from_millis(5));
        assert!(engine.configure(&settings(vec![])).is_err());
    }

    #[test]
    fn test_stop_without_start() {
        let engine = GeneratorEngine::new(Duration::from_millis(5));
        assert!(engine.stop().is_ok());
    }
}
