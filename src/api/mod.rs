//! Output side of the flight-data subsystem: run records, their sinks and
//! the periodic heartbeat

pub mod records;
pub mod sink;
pub mod heartbeat;

pub use records::{EstimationRecord, FinalEstimate, PingRecord, ESTIMATION_LOG_HEADER, PING_LOG_HEADER};
pub use sink::{CsvRecordSink, CsvSinkFactory, RecordSink, SinkError, SinkFactory, SinkResult};
pub use heartbeat::{Heartbeat, HeartbeatHandle};
