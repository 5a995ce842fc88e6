//! Serial/UART GPS receiver

use crate::hardware::{CommError, CommResult, GpsTransport};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read};
use std::time::Duration;
use tracing::{info, warn};

/// Baud rates accepted for GPS receivers
pub const SUPPORTED_BAUD_RATES: [u32; 7] = [4800, 9600, 19200, 38400, 57600, 115200, 230400];

/// Longest a read waits before reporting "no data yet"
const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// GPS receiver on a tty device, 8N1 with a one second read timeout
pub struct SerialGpsTransport {
    port_name: String,
    baud_rate: u32,
    port: Box<dyn SerialPort>,
}

impl SerialGpsTransport {
    pub fn open(port_name: &str, baud_rate: u32) -> CommResult<Self> {
        if !SUPPORTED_BAUD_RATES.contains(&baud_rate) {
            return Err(CommError::configuration("baud_rate", baud_rate));
        }

        let port = serialport::new(port_name, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|error| CommError::Open {
                device: port_name.to_string(),
                source: io::Error::from(error),
            })?;

        info!(port = port_name, baud_rate, "Opened serial GPS");
        Ok(Self {
            port_name: port_name.to_string(),
            baud_rate,
            port,
        })
    }
}

impl GpsTransport for SerialGpsTransport {
    fn read(&mut self, max_len: usize) -> Option<Vec<u8>> {
        let mut buf = vec![0u8; max_len];
        match self.port.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Some(buf)
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::Interrupted) => Some(Vec::new()),
            Err(source) => {
                let error = CommError::Io { device: self.port_name.clone(), source };
                warn!(%error, "Serial GPS read failed");
                None
            }
        }
    }

    fn describe(&self) -> String {
        format!("serial {} @ {}", self.port_name, self.baud_rate)
    }
}
