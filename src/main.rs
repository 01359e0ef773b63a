//! Optical centering replay tool: turns recorded detector output into measurements.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use optical_centering::app::{AppConfig, CalibrationMode, MeasurementApp};
use optical_centering::calibration::storage::FileStorage;
use optical_centering::config::{Config, EXAMPLE_CONFIG};
use optical_centering::eyewear::EyewearParams;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON-lines event file to replay (stdin when omitted)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Path to configuration file (YAML format)
    #[arg(short = 'C', long)]
    config: Option<PathBuf>,

    /// Directory holding the persisted calibration (overrides the config)
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// Physical width of the calibration reference in millimeters
    /// (an ID-1 card, 85.6 mm, when omitted)
    #[arg(long, requires = "reference_px")]
    reference_mm: Option<f64>,

    /// Measured width of the calibration reference in pixels
    #[arg(long)]
    reference_px: Option<f64>,

    /// Single-lens width in millimeters
    #[arg(long)]
    caliber: Option<String>,

    /// Nose-bridge width in millimeters
    #[arg(long)]
    bridge: Option<String>,

    /// Mounting type (full_rim, half_rim, rimless, drilled)
    #[arg(long)]
    mounting: Option<String>,

    /// Print an example configuration file and exit
    #[arg(long)]
    print_config: bool,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logger
    if args.debug {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("debug"));
    } else {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    }

    if args.print_config {
        print!("{EXAMPLE_CONFIG}");
        return Ok(());
    }

    info!("Optical Centering - measurement replay");

    // Load configuration if provided
    let config = if let Some(config_path) = &args.config {
        info!("Loading configuration from: {}", config_path.display());
        match Config::from_file(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                log::warn!("Failed to load config file: {}. Using defaults.", e);
                Config::default()
            }
        }
    } else {
        Config::default()
    };
    config.validate().context("Invalid configuration")?;

    let defaults = config.eyewear_params();
    let eyewear = EyewearParams::from_form(
        &args.caliber.unwrap_or_else(|| defaults.caliber.to_string()),
        &args.bridge.unwrap_or_else(|| defaults.bridge.to_string()),
        &args.mounting.unwrap_or_else(|| defaults.mounting_type.to_string()),
    );

    let calibration_mode = match (args.reference_mm, args.reference_px) {
        (Some(width_mm), Some(width_px)) => CalibrationMode::Reference { width_mm, width_px },
        (None, Some(width_px)) => CalibrationMode::id1_card(width_px),
        _ => CalibrationMode::Stored,
    };

    let storage_dir = args.storage_dir.unwrap_or_else(|| config.calibration.storage_dir.clone());
    let storage = FileStorage::new(&storage_dir)
        .with_context(|| format!("Cannot open calibration storage {}", storage_dir.display()))?;

    let app_config = AppConfig {
        settings: config.session_settings(),
        eyewear,
        calibration_mode,
    };

    // Create and run application
    let mut app = MeasurementApp::new(app_config, config.calibration_store(storage))?;
    let stdout = io::stdout().lock();
    let summary = match &args.input {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
            app.run(BufReader::new(file), stdout)?
        }
        None => app.run(io::stdin().lock(), stdout)?,
    };

    if summary.rejected_events > 0 {
        log::warn!("{} events were rejected", summary.rejected_events);
    }

    Ok(())
}
