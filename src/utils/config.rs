use crate::hardware::GpsInterfaceConfig;
use crate::ping_finder::SdrType;
use crate::processing::Projection;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info};

/// Name of the ping finder config file, both in `./config` and on USB sticks
pub const PING_FINDER_CONFIG_FILE: &str = "ping_finder_config.json";

/// Directory created next to the config (or on the USB stick) for run logs
pub const OUTPUT_DIR_NAME: &str = "rtt_output";

pub const DEFAULT_HARDWARE_CONFIG_PATH: &str = "./config/hardware_config.json";
pub const DEFAULT_PING_FINDER_CONFIG_PATH: &str = "./config/ping_finder_config.json";

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file I/O error
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// JSON deserialization error
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    /// Missing required parameter
    #[error("missing required parameter: {parameter}")]
    MissingParameter { parameter: String },
    /// Invalid parameter value
    #[error("invalid parameter '{parameter}' = '{value}': {reason}")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: String,
    },
    /// No mounted USB device (or no config on one)
    #[error("{what} not found under {path}")]
    UsbNotFound { what: &'static str, path: PathBuf },
}

impl ConfigError {
    fn invalid(parameter: &str, value: impl ToString, reason: impl ToString) -> Self {
        ConfigError::InvalidParameter {
            parameter: parameter.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    fn missing(parameter: &str) -> Self {
        ConfigError::MissingParameter {
            parameter: parameter.to_string(),
        }
    }
}

/// Hardware configuration file as written on disk
#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct HardwareConfigFile {
    gps_interface: Option<String>,
    gps_i2c_bus: Option<u8>,
    gps_address: Option<String>,
    gps_serial_port: Option<String>,
    gps_serial_baudrate: Option<u32>,
    gps_simulation_speed: Option<f64>,
    epsg_code: Option<u32>,
    sdr_type: Option<String>,
    #[serde(default)]
    use_usb_storage: bool,
    #[serde(default)]
    check_usb_for_config: bool,
}

/// Validated hardware configuration
#[derive(Debug, Clone, PartialEq)]
pub struct HardwareConfig {
    pub gps_interface: GpsInterfaceConfig,
    /// Target projection for easting/northing
    pub epsg_code: u32,
    pub sdr_type: SdrType,
    /// Write run logs to the first USB device under `/media/$USER`
    pub use_usb_storage: bool,
    /// Look for the ping finder config on USB devices
    pub check_usb_for_config: bool,
}

impl HardwareConfig {
    /// Load configuration from JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&content)?;
        info!(path = %path.display(), interface = ?config.gps_interface, epsg_code = config.epsg_code, sdr_type = %config.sdr_type, "Loaded hardware configuration");
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let file: HardwareConfigFile = serde_json::from_str(content)?;
        Self::from_file_data(file)
    }

    fn from_file_data(file: HardwareConfigFile) -> Result<Self, ConfigError> {
        let interface = file.gps_interface.ok_or_else(|| ConfigError::missing("GPS_INTERFACE"))?;

        let gps_interface = match interface.to_ascii_uppercase().as_str() {
            "I2C" => {
                let bus = file.gps_i2c_bus.ok_or_else(|| ConfigError::missing("GPS_I2C_BUS"))?;
                let address = file.gps_address.ok_or_else(|| ConfigError::missing("GPS_ADDRESS"))?;
                GpsInterfaceConfig::I2c {
                    bus,
                    address: parse_hex_address(&address)?,
                }
            }
            "SERIAL" => GpsInterfaceConfig::Serial {
                port: file.gps_serial_port.ok_or_else(|| ConfigError::missing("GPS_SERIAL_PORT"))?,
                baud_rate: file
                    .gps_serial_baudrate
                    .ok_or_else(|| ConfigError::missing("GPS_SERIAL_BAUDRATE"))?,
            },
            "SIMULATED" => GpsInterfaceConfig::Simulated {
                speed: file.gps_simulation_speed.unwrap_or(1.0),
            },
            _ => return Err(ConfigError::invalid("GPS_INTERFACE", &interface, "expected I2C, SERIAL or SIMULATED")),
        };
        gps_interface
            .validate()
            .map_err(|e| ConfigError::invalid("GPS_INTERFACE", &interface, e))?;

        let epsg_code = file.epsg_code.ok_or_else(|| ConfigError::missing("EPSG_CODE"))?;
        Projection::from_epsg(epsg_code).map_err(|e| ConfigError::invalid("EPSG_CODE", epsg_code, e))?;

        let sdr_name = file.sdr_type.ok_or_else(|| ConfigError::missing("SDR_TYPE"))?;
        let sdr_type = sdr_name
            .parse::<SdrType>()
            .map_err(|e| ConfigError::invalid("SDR_TYPE", &sdr_name, e))?;

        Ok(Self {
            gps_interface,
            epsg_code,
            sdr_type,
            use_usb_storage: file.use_usb_storage,
            check_usb_for_config: file.check_usb_for_config,
        })
    }

    /// Output directory under this configuration's storage policy
    pub fn output_dir(&self) -> Result<PathBuf, ConfigError> {
        let cwd = env::current_dir().map_err(|source| ConfigError::Io {
            path: PathBuf::from("."),
            source,
        })?;
        resolve_output_dir(self.use_usb_storage, &usb_media_root(), &cwd)
    }

    /// Where to read the ping finder configuration from
    pub fn ping_finder_config_path(&self) -> Result<PathBuf, ConfigError> {
        if self.check_usb_for_config {
            find_ping_finder_config_on_usb(&usb_media_root())
        } else {
            Ok(PathBuf::from(DEFAULT_PING_FINDER_CONFIG_PATH))
        }
    }
}

/// Parse `"0x42"` / `"42"` as a hexadecimal I2C address
fn parse_hex_address(value: &str) -> Result<u8, ConfigError> {
    let digits = value
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    u8::from_str_radix(digits, 16).map_err(|e| ConfigError::invalid("GPS_ADDRESS", value, e))
}

/// Ping finder (detection engine) configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingFinderConfig {
    pub gain: f64,
    pub sampling_rate: u32,
    pub center_frequency: u32,
    pub run_num: u32,
    pub enable_test_data: bool,
    pub ping_width_ms: u32,
    pub ping_min_snr: u32,
    pub ping_max_len_mult: f64,
    pub ping_min_len_mult: f64,
    pub target_frequencies: Vec<u32>,
    /// Derived from where the config came from, never read from JSON
    #[serde(skip_deserializing, default)]
    pub output_dir: PathBuf,
}

impl PingFinderConfig {
    /// Load from JSON; run logs go to `rtt_output` next to the file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_json_str(&content)?;
        config.output_dir = path.parent().unwrap_or(Path::new(".")).join(OUTPUT_DIR_NAME);

        info!(path = %path.display(), run = config.run_num, frequencies = ?config.target_frequencies, "Loaded ping finder configuration");
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_frequencies.is_empty() {
            return Err(ConfigError::invalid("target_frequencies", "[]", "list cannot be empty"));
        }
        if self.sampling_rate == 0 {
            return Err(ConfigError::invalid("sampling_rate", 0, "must be positive"));
        }
        if !self.gain.is_finite() {
            return Err(ConfigError::invalid("gain", self.gain, "must be finite"));
        }
        if !(self.ping_min_len_mult.is_finite() && self.ping_max_len_mult.is_finite())
            || self.ping_min_len_mult > self.ping_max_len_mult
        {
            return Err(ConfigError::invalid(
                "ping_min_len_mult",
                self.ping_min_len_mult,
                format!("must not exceed ping_max_len_mult ({})", self.ping_max_len_mult),
            ));
        }
        Ok(())
    }
}

/// `/media/$USER`, where removable drives are mounted
pub fn usb_media_root() -> PathBuf {
    Path::new("/media").join(env::var("USER").unwrap_or_default())
}

/// Mounted devices under `media_root`, sorted by name
fn usb_devices(media_root: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let entries = fs::read_dir(media_root).map_err(|_| ConfigError::UsbNotFound {
        what: "USB media directory",
        path: media_root.to_path_buf(),
    })?;
    let mut devices: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    devices.sort();
    Ok(devices)
}

/// First `ping_finder_config.json` found on a mounted USB device
pub fn find_ping_finder_config_on_usb(media_root: &Path) -> Result<PathBuf, ConfigError> {
    for device in usb_devices(media_root)? {
        let candidate = device.join(PING_FINDER_CONFIG_FILE);
        if candidate.is_file() {
            info!(path = %candidate.display(), "Found ping finder configuration on USB storage");
            return Ok(candidate);
        }
    }
    error!(path = %media_root.display(), "No ping finder configuration on USB storage");
    Err(ConfigError::UsbNotFound {
        what: PING_FINDER_CONFIG_FILE,
        path: media_root.to_path_buf(),
    })
}

/// Output directory for run logs
///
/// With USB storage the logs go to the first mounted device, otherwise under
/// `cwd`.
pub fn resolve_output_dir(use_usb_storage: bool, media_root: &Path, cwd: &Path) -> Result<PathBuf, ConfigError> {
    if !use_usb_storage {
        return Ok(cwd.join(OUTPUT_DIR_NAME));
    }
    match usb_devices(media_root)?.into_iter().next() {
        Some(device) => Ok(device.join(OUTPUT_DIR_NAME)),
        None => Err(ConfigError::UsbNotFound {
            what: "USB storage device",
            path: media_root.to_path_buf(),
        }),
    }
}
