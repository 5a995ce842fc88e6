//! Periodic status summary

use crate::core::HEARTBEAT_INTERVAL;
use crate::state::StateManager;
use crate::utils::logging::log_heartbeat;
use std::io;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::error;

/// Logs GPS state, ping-finder state and the current fix at a fixed period
pub struct Heartbeat;

impl Heartbeat {
    pub fn spawn(state_manager: Arc<StateManager>, interval: Duration) -> io::Result<HeartbeatHandle> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let thread = thread::Builder::new().name("heartbeat".to_string()).spawn(move || loop {
            log_heartbeat(
                state_manager.get_gps_state(),
                state_manager.get_ping_finder_state(),
                &state_manager.get_current_gps_data(),
            );
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        })?;
        Ok(HeartbeatHandle { stop_tx, thread })
    }

    pub fn spawn_default(state_manager: Arc<StateManager>) -> io::Result<HeartbeatHandle> {
        Self::spawn(state_manager, HEARTBEAT_INTERVAL)
    }
}

pub struct HeartbeatHandle {
    stop_tx: Sender<()>,
    thread: JoinHandle<()>,
}

impl HeartbeatHandle {
    /// Wake the loop and wait for it to exit
    pub fn stop(self) {
        let _ = self.stop_tx.send(());
        if self.thread.join().is_err() {
            error!("Heartbeat thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_stop_interrupts_long_interval() {
        let state = Arc::new(StateManager::new());
        let handle = Heartbeat::spawn(state, Duration::from_secs(60)).unwrap();

        let started = Instant::now();
        handle.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_runs_repeatedly() {
        let state = Arc::new(StateManager::new());
        let handle = Heartbeat::spawn(Arc::clone(&state), Duration::from_millis(2)).unwrap();
        thread::sleep(Duration::from_millis(20));
        handle.stop();
        // the loop only reads shared state
        assert_eq!(state.gps_history_len(), 0);
    }
}
