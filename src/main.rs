use anyhow::{bail, Context, Result};
use clap::Parser;
use rtt_drone_fds::api::{CsvSinkFactory, Heartbeat};
use rtt_drone_fds::core::GpsState;
use rtt_drone_fds::gps::GpsModule;
use rtt_drone_fds::ping_finder::{CentroidEstimatorFactory, Collaborators, DefaultEngineFactory, PingFinderModule};
use rtt_drone_fds::state::StateManager;
use rtt_drone_fds::utils::config::{HardwareConfig, PingFinderConfig, DEFAULT_HARDWARE_CONFIG_PATH};
use rtt_drone_fds::utils::logging::init_logging;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const GPS_WAIT_POLL: Duration = Duration::from_millis(100);

/// Flight-data subsystem: GPS acquisition and ping-finder coordination
#[derive(Parser, Debug)]
#[command(name = "rtt-fds", version, about)]
struct Args {
    /// Hardware configuration file
    #[arg(long, default_value = DEFAULT_HARDWARE_CONFIG_PATH)]
    hardware_config: PathBuf,

    /// Ping finder configuration file; overrides discovery
    #[arg(long)]
    ping_finder_config: Option<PathBuf>,

    /// Seconds to wait for a GPS fix before giving up
    #[arg(long, default_value_t = 300)]
    gps_timeout: u64,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level).context("failed to initialize logging")?;

    let hardware = HardwareConfig::load_from_file(&args.hardware_config)
        .with_context(|| format!("failed to load hardware config {}", args.hardware_config.display()))?;

    let state_manager = Arc::new(StateManager::new());

    let transport = hardware
        .gps_interface
        .open()
        .context("failed to open GPS interface")?;
    let gps = GpsModule::new(transport, hardware.epsg_code, Arc::clone(&state_manager))
        .context("failed to create GPS module")?
        .spawn()
        .context("failed to start GPS acquisition")?;

    if !wait_for_gps(&state_manager, Duration::from_secs(args.gps_timeout)) {
        gps.stop();
        bail!("GPS did not reach Running within {} s", args.gps_timeout);
    }
    info!("GPS ready");

    let config_path = match args.ping_finder_config {
        Some(path) => path,
        None => hardware
            .ping_finder_config_path()
            .context("failed to locate ping finder config")?,
    };
    let config = PingFinderConfig::load_from_file(&config_path)
        .with_context(|| format!("failed to load ping finder config {}", config_path.display()))?;

    let collaborators = Collaborators {
        engines: Arc::new(DefaultEngineFactory::default()),
        estimators: Arc::new(CentroidEstimatorFactory::default()),
        sinks: Arc::new(CsvSinkFactory),
    };
    let ping_finder = PingFinderModule::new(
        &config,
        hardware.sdr_type,
        Arc::clone(&state_manager),
        collaborators,
        None,
    )
    .context("failed to create ping finder")?;
    ping_finder.start();

    let heartbeat = Heartbeat::spawn_default(Arc::clone(&state_manager)).context("failed to start heartbeat")?;

    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })
    .context("failed to install Ctrl-C handler")?;

    info!(run = config.run_num, output_dir = %config.output_dir.display(), "Running, press Ctrl-C to stop");
    let _ = shutdown_rx.recv();
    info!("Shutting down");

    ping_finder.stop();
    let estimations = ping_finder.get_final_estimations();
    if estimations.is_empty() {
        warn!("No location estimates for this run");
    }
    for estimate in &estimations {
        info!(
            frequency = estimate.frequency,
            easting = estimate.easting,
            northing = estimate.northing,
            "Final estimate"
        );
    }

    gps.stop();
    heartbeat.stop();
    info!("Shutdown complete");
    Ok(())
}

/// Block until GPS reports `Running` or `timeout` elapses
fn wait_for_gps(state_manager: &StateManager, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        let state = state_manager.get_gps_state();
        if state == GpsState::Running {
            return true;
        }
        if Instant::now() >= deadline {
            warn!(%state, "Timed out waiting for GPS");
            return false;
        }
        thread::sleep(GPS_WAIT_POLL);
    }
}
