//! Durable run artifacts: ping and location-estimate logs

use crate::api::records::{EstimationRecord, PingRecord, ESTIMATION_LOG_HEADER, PING_LOG_HEADER};
use chrono::Utc;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info};

/// Suffixes tried when a run is restarted within the same second
const MAX_NAME_ATTEMPTS: u32 = 100;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write CSV row: {0}")]
    Csv(#[from] csv::Error),
}

pub type SinkResult<T> = Result<T, SinkError>;

/// Write capability for per-ping and per-estimate rows
pub trait RecordSink: Send + Sync {
    fn record_ping(&self, record: &PingRecord) -> SinkResult<()>;

    fn record_estimation(&self, record: &EstimationRecord) -> SinkResult<()>;
}

/// Opens the sink for a new run
pub trait SinkFactory: Send + Sync {
    fn create(&self, output_dir: &Path, run_num: u32) -> SinkResult<Arc<dyn RecordSink>>;
}

/// CSV files named after the run and its UTC start time
///
/// Each row reopens its file in append mode so a crash never loses more than
/// the row being written.
pub struct CsvRecordSink {
    ping_path: PathBuf,
    estimation_path: PathBuf,
    /// Serializes appends from concurrent callbacks
    write_lock: Mutex<()>,
}

impl CsvRecordSink {
    /// Create `output_dir` if needed and write both header rows
    pub fn create(output_dir: &Path, run_num: u32) -> SinkResult<Self> {
        fs::create_dir_all(output_dir).map_err(|source| SinkError::Io {
            path: output_dir.to_path_buf(),
            source,
        })?;

        let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let (ping_path, estimation_path) = create_log_pair(output_dir, &stamp, run_num)?;

        info!(
            ping_log = %ping_path.display(),
            estimation_log = %estimation_path.display(),
            "Created run logs"
        );
        Ok(Self {
            ping_path,
            estimation_path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn ping_path(&self) -> &Path {
        &self.ping_path
    }

    pub fn estimation_path(&self) -> &Path {
        &self.estimation_path
    }

    fn append<T: Serialize>(&self, path: &Path, row: &T) -> SinkResult<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let file = OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(|source| SinkError::Io { path: path.to_path_buf(), source })?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer.serialize(row)?;
        writer.flush().map_err(|source| SinkError::Io { path: path.to_path_buf(), source })?;
        Ok(())
    }
}

/// Claim a fresh pair of log files, never truncating an existing one
///
/// Names get `_1`, `_2`, ... appended when a pair for the same run and second
/// already exists.
fn create_log_pair(output_dir: &Path, stamp: &str, run_num: u32) -> SinkResult<(PathBuf, PathBuf)> {
    let mut attempt = 0;
    loop {
        let suffix = if attempt == 0 { String::new() } else { format!("_{}", attempt) };
        let ping_path = output_dir.join(format!("ping_log_{}_run{}{}.csv", stamp, run_num, suffix));
        let estimation_path =
            output_dir.join(format!("location_estimation_log_{}_run{}{}.csv", stamp, run_num, suffix));

        match create_new(&ping_path) {
            Ok(file) => match create_new(&estimation_path) {
                Ok(estimation_file) => {
                    write_header(file, &ping_path, &PING_LOG_HEADER)?;
                    write_header(estimation_file, &estimation_path, &ESTIMATION_LOG_HEADER)?;
                    return Ok((ping_path, estimation_path));
                }
                Err(SinkError::Io { source, .. })
                    if source.kind() == ErrorKind::AlreadyExists && attempt + 1 < MAX_NAME_ATTEMPTS =>
                {
                    drop(file);
                    let _ = fs::remove_file(&ping_path);
                }
                Err(error) => {
                    drop(file);
                    let _ = fs::remove_file(&ping_path);
                    return Err(error);
                }
            },
            Err(SinkError::Io { source, .. })
                if source.kind() == ErrorKind::AlreadyExists && attempt + 1 < MAX_NAME_ATTEMPTS => {}
            Err(error) => return Err(error),
        }
        debug!(run = run_num, attempt, "Run log name taken, trying next suffix");
        attempt += 1;
    }
}

fn create_new(path: &Path) -> SinkResult<File> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|source| SinkError::Io { path: path.to_path_buf(), source })
}

fn write_header(file: File, path: &Path, header: &[&str]) -> SinkResult<()> {
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(header)?;
    writer.flush().map_err(|source| SinkError::Io { path: path.to_path_buf(), source })?;
    Ok(())
}

impl RecordSink for CsvRecordSink {
    fn record_ping(&self, record: &PingRecord) -> SinkResult<()> {
        self.append(&self.ping_path, record)
    }

    fn record_estimation(&self, record: &EstimationRecord) -> SinkResult<()> {
        self.append(&self.estimation_path, record)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CsvSinkFactory;

impl SinkFactory for CsvSinkFactory {
    fn create(&self, output_dir: &Path, run_num: u32) -> SinkResult<Arc<dyn RecordSink>> {
        Ok(Arc::new(CsvRecordSink::create(output_dir, run_num)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ping(run: u32, easting: Option<f64>) -> PingRecord {
        PingRecord {
            run,
            timestamp: "2024-01-15T12:35:19+00:00".to_string(),
            frequency: 173_043_000,
            amplitude: 12.5,
            easting,
            northing: easting.map(|_| 3_620_000.0),
            altitude: Some(20.0),
            heading: None,
            epsg_code: Some(32611),
        }
    }

    #[test]
    fn test_creates_directory_and_headers() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("rtt_output");
        let sink = CsvRecordSink::create(&output, 7).unwrap();

        let name = sink.ping_path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("ping_log_") && name.ends_with("_run7.csv"), "{}", name);
        let name = sink.estimation_path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("location_estimation_log_") && name.ends_with("_run7.csv"), "{}", name);

        assert_eq!(
            fs::read_to_string(sink.ping_path()).unwrap(),
            "Run,Timestamp,Frequency,Amplitude,Easting,Northing,Altitude,Heading,EPSG Code\n"
        );
        assert_eq!(
            fs::read_to_string(sink.estimation_path()).unwrap(),
            "Run,Timestamp,Frequency,Easting,Northing,EPSG Code\n"
        );
    }

    #[test]
    fn test_rows_appended_with_empty_cells() {
        let dir = TempDir::new().unwrap();
        let sink = CsvRecordSink::create(dir.path(), 1).unwrap();

        sink.record_ping(&ping(1, Some(484_902.5))).unwrap();
        sink.record_ping(&ping(1, None)).unwrap();
        sink.record_estimation(&EstimationRecord {
            run: 1,
            timestamp: "2024-01-15T12:35:19+00:00".to_string(),
            frequency: 173_043_000,
            easting: 484_910.0,
            northing: 3_620_010.0,
            epsg_code: Some(32611),
        })
        .unwrap();

        let text = fs::read_to_string(sink.ping_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "1,2024-01-15T12:35:19+00:00,173043000,12.5,484902.5,3620000.0,20.0,,32611");
        assert_eq!(lines[2], "1,2024-01-15T12:35:19+00:00,173043000,12.5,,,20.0,,32611");

        let mut reader = csv::Reader::from_path(sink.ping_path()).unwrap();
        let rows: Vec<PingRecord> = reader.deserialize().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows, vec![ping(1, Some(484_902.5)), ping(1, None)]);

        let mut reader = csv::Reader::from_path(sink.estimation_path()).unwrap();
        let rows: Vec<EstimationRecord> = reader.deserialize().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].easting, 484_910.0);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let dir = TempDir::new().unwrap();
        let sink = CsvRecordSink::create(dir.path(), 2).unwrap();
        fs::remove_file(sink.ping_path()).unwrap();

        match sink.record_ping(&ping(2, None)) {
            Err(SinkError::Io { path, .. }) => assert_eq!(path, sink.ping_path()),
            other => panic!("expected Io error, got {:?}", other),
        }
    }

    #[test]
    fn test_same_second_restart_keeps_earlier_logs() {
        let dir = TempDir::new().unwrap();
        let first = CsvRecordSink::create(dir.path(), 3).unwrap();
        first.record_ping(&ping(3, None)).unwrap();

        // pretend the second sink starts within the same second
        let stamp = first
            .ping_path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .trim_start_matches("ping_log_")
            .trim_end_matches("_run3.csv")
            .to_string();
        let (ping_path, estimation_path) = create_log_pair(dir.path(), &stamp, 3).unwrap();

        assert_ne!(ping_path, first.ping_path());
        assert_ne!(estimation_path, first.estimation_path());
        assert!(ping_path.to_string_lossy().ends_with("_run3_1.csv"));
        assert!(estimation_path.to_string_lossy().ends_with("_run3_1.csv"));
        assert_eq!(fs::read_to_string(first.ping_path()).unwrap().lines().count(), 2);
        assert_eq!(fs::read_to_string(&ping_path).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_factory() {
        let dir = TempDir::new().unwrap();
        let sink = CsvSinkFactory.create(dir.path(), 4).unwrap();
        sink.record_ping(&ping(4, None)).unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }
}
