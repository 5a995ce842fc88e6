//! Thread-safe store of subsystem states and timestamp-ordered GPS history

use crate::core::{
    GpsEvent, GpsFix, GpsState, PingFinderEvent, PingFinderState, GPS_HISTORY_CAPACITY,
};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::info;

struct Inner {
    gps_state: GpsState,
    ping_finder_state: PingFinderState,
    /// Sorted ascending by timestamp
    history: VecDeque<GpsFix>,
    /// Most recently written fix, independent of its timestamp
    current: GpsFix,
    capacity: usize,
}

/// Shared state of the flight-data subsystem
///
/// One mutex guards everything; every operation holds it only for an
/// in-memory update. State change notifications are logged after the lock
/// is released.
pub struct StateManager {
    inner: Mutex<Inner>,
}

impl StateManager {
    pub fn new() -> Self {
        Self::with_capacity(GPS_HISTORY_CAPACITY)
    }

    /// Create a manager retaining at most `capacity` fixes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                gps_state: GpsState::Uncreated,
                ping_finder_state: PingFinderState::Uncreated,
                history: VecDeque::with_capacity(capacity.saturating_add(1)),
                current: GpsFix::new(),
                capacity: capacity.max(1),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the GPS state, returning whether it changed
    pub fn set_gps_state(&self, state: GpsState) -> bool {
        let previous = {
            let mut inner = self.lock();
            std::mem::replace(&mut inner.gps_state, state)
        };
        log_gps_change(previous, state)
    }

    pub fn get_gps_state(&self) -> GpsState {
        self.lock().gps_state
    }

    /// Apply `event` to the GPS state atomically and return the new state
    pub fn apply_gps_event(&self, event: GpsEvent) -> GpsState {
        let (previous, next) = {
            let mut inner = self.lock();
            let previous = inner.gps_state;
            inner.gps_state = previous.on(event);
            (previous, inner.gps_state)
        };
        log_gps_change(previous, next);
        next
    }

    /// Set the ping-finder state, returning whether it changed
    pub fn set_ping_finder_state(&self, state: PingFinderState) -> bool {
        let previous = {
            let mut inner = self.lock();
            std::mem::replace(&mut inner.ping_finder_state, state)
        };
        log_ping_finder_change(previous, state)
    }

    pub fn get_ping_finder_state(&self) -> PingFinderState {
        self.lock().ping_finder_state
    }

    /// Apply `event` to the ping-finder state atomically and return the new state
    pub fn apply_ping_finder_event(&self, event: PingFinderEvent) -> PingFinderState {
        let (previous, next) = {
            let mut inner = self.lock();
            let previous = inner.ping_finder_state;
            inner.ping_finder_state = previous.on(event);
            (previous, inner.ping_finder_state)
        };
        log_ping_finder_change(previous, next);
        next
    }

    /// Insert `fix` into history in timestamp order and make it current
    ///
    /// When the history overflows, the entry with the smallest timestamp is evicted.
    pub fn update_gps_data(&self, fix: GpsFix) {
        let mut inner = self.lock();
        let index = inner.history.partition_point(|f| f.timestamp <= fix.timestamp);
        inner.history.insert(index, fix.clone());
        if inner.history.len() > inner.capacity {
            inner.history.pop_front();
        }
        inner.current = fix;
    }

    pub fn get_current_gps_data(&self) -> GpsFix {
        self.lock().current.clone()
    }

    /// Historical fix whose timestamp is nearest to `timestamp`
    ///
    /// Ties go to the earlier entry. Returns `None` when no fix was ever stored.
    pub fn get_gps_data_closest_to(&self, timestamp: f64) -> Option<GpsFix> {
        let inner = self.lock();
        let history = &inner.history;
        let index = history.partition_point(|f| f.timestamp < timestamp);

        if index == 0 {
            return history.front().cloned();
        }
        if index == history.len() {
            return history.back().cloned();
        }

        let before = &history[index - 1];
        let after = &history[index];
        if (timestamp - before.timestamp).abs() <= (after.timestamp - timestamp).abs() {
            Some(before.clone())
        } else {
            Some(after.clone())
        }
    }

    /// Number of fixes currently retained
    pub fn gps_history_len(&self) -> usize {
        self.lock().history.len()
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

fn log_gps_change(previous: GpsState, next: GpsState) -> bool {
    if previous == next {
        return false;
    }
    info!(from = %previous, to = %next, "GPS state changed");
    true
}

fn log_ping_finder_change(previous: PingFinderState, next: PingFinderState) -> bool {
    if previous == next {
        return false;
    }
    info!(from = %previous, to = %next, "PingFinder state changed");
    true
}
