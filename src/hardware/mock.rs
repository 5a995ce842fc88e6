//! Mock GPS transport for testing and development

use crate::hardware::{CommError, GpsTransport};
use std::collections::VecDeque;
use tracing::warn;

/// Scripted byte source
///
/// Chunks are served in order, split when longer than the requested size.
/// An exhausted queue yields empty reads.
pub struct MockGpsTransport {
    name: String,
    chunks: VecDeque<Vec<u8>>,
    connected: bool,
    simulate_errors: bool,
    error_probability: f32,
    reads: usize,
}

impl MockGpsTransport {
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            chunks: VecDeque::new(),
            connected: true,
            simulate_errors: false,
            error_probability: 0.0,
            reads: 0,
        }
    }

    /// Queue raw bytes
    pub fn push_bytes(&mut self, data: impl Into<Vec<u8>>) {
        self.chunks.push_back(data.into());
    }

    /// Queue text, e.g. NMEA sentences
    pub fn push_str(&mut self, text: &str) {
        self.push_bytes(text.as_bytes().to_vec());
    }

    /// Enable error simulation with given probability (0.0 to 1.0)
    pub fn simulate_errors(&mut self, enable: bool, probability: f32) {
        self.simulate_errors = enable;
        self.error_probability = probability.clamp(0.0, 1.0);
    }

    /// Make every read fail until [`reconnect`](Self::reconnect)
    pub fn disconnect(&mut self) {
        self.connected = false;
    }

    pub fn reconnect(&mut self) {
        self.connected = true;
    }

    /// Number of `read` calls made so far
    pub fn read_count(&self) -> usize {
        self.reads
    }

    pub fn queued_chunk_count(&self) -> usize {
        self.chunks.len()
    }

    fn should_simulate_error(&self) -> bool {
        if !self.simulate_errors {
            return false;
        }

        use rand::Rng;
        let mut rng = rand::thread_rng();
        rng.gen::<f32>() < self.error_probability
    }
}

impl Default for MockGpsTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl GpsTransport for MockGpsTransport {
    fn read(&mut self, max_len: usize) -> Option<Vec<u8>> {
        self.reads += 1;

        if !self.connected {
            let error = CommError::ConnectionLost { device: self.name.clone() };
            warn!(%error, "Mock GPS read failed");
            return None;
        }
        if self.should_simulate_error() {
            let error = CommError::Injected { device: self.name.clone() };
            warn!(%error, "Mock GPS read failed");
            return None;
        }

        match self.chunks.pop_front() {
            Some(mut chunk) => {
                if chunk.len() > max_len {
                    let rest = chunk.split_off(max_len);
                    self.chunks.push_front(rest);
                }
                Some(chunk)
            }
            None => Some(Vec::new()),
        }
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}
