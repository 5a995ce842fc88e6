//! Communication error types for GPS transports

use std::io;
use thiserror::Error;

/// Errors raised while opening or talking to a GPS receiver
#[derive(Debug, Error)]
pub enum CommError {
    /// The device node could not be opened
    #[error("failed to open {device}: {source}")]
    Open {
        device: String,
        #[source]
        source: io::Error,
    },
    /// Read, write or control call failed on an open device
    #[error("I/O error on {device}: {source}")]
    Io {
        device: String,
        #[source]
        source: io::Error,
    },
    /// Connection to the receiver failed or was lost
    #[error("connection lost to {device}")]
    ConnectionLost { device: String },
    #[error("configuration error: invalid {parameter} = {value}")]
    Configuration { parameter: String, value: String },
    /// Fault injected by a test transport
    #[error("simulated fault on {device}")]
    Injected { device: String },
}

impl CommError {
    pub(crate) fn configuration(parameter: &str, value: impl ToString) -> Self {
        CommError::Configuration {
            parameter: parameter.to_string(),
            value: value.to_string(),
        }
    }

    /// Whether retrying the same operation may succeed
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CommError::Configuration { .. } | CommError::Open { .. })
    }
}

/// Result type for communication operations
pub type CommResult<T> = Result<T, CommError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverability() {
        assert!(!CommError::configuration("baud_rate", 0).is_recoverable());
        assert!(CommError::ConnectionLost { device: "mock".into() }.is_recoverable());
        let io_error = CommError::Io {
            device: "/dev/ttyS0".into(),
            source: io::Error::new(io::ErrorKind::TimedOut, "timeout"),
        };
        assert!(io_error.is_recoverable());
        assert_eq!(io_error.to_string(), "I/O error on /dev/ttyS0: timeout");
    }
}
