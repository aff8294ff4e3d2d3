//! # joycal
//!
//! Command line front end: list joystick event devices, apply calibration to
//! them and keep calibration in a small per-model database.
//!
//! ```text
//! joycal devices
//! joycal calibrate /dev/input/event5
//! joycal write /dev/input/event5 0,0,255,0,15,1,0,255,0,15
//! joycal config /dev/input/event5
//! joycal list
//! ```

use std::fs;
use std::io::{self, Write};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use joycal::config::{Config, JoystickConfig};
use joycal::controller::channel::{scan_devices, EvdevChannel};
use joycal::controller::{AxisCalibration, Device, DeviceEvent, DeviceIdentity};
use joycal::store::CalibrationStore;
use joycal::values::{format_listing, format_values, parse_values};

/// Manage calibration of Linux joystick event devices
#[derive(Debug, Parser)]
#[command(name = "joycal", version, about)]
struct Cli {
    /// Enable debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Calibration database path
    #[arg(short, long, global = true, value_name = "FILE")]
    database: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List joystick event devices
    Devices,
    /// Print every stored calibration, one line per device
    List,
    /// Print the stored calibration of a device
    Read { device: PathBuf },
    /// Delete the stored calibration of a device
    Delete { device: PathBuf },
    /// Store calibration values for a device
    Write {
        device: PathBuf,
        /// axis,min,max,fuzz,flat[,...]
        #[arg(allow_hyphen_values = true)]
        values: String,
    },
    /// Apply the stored calibration to a device
    Config { device: PathBuf },
    /// Apply calibration values to a device without storing them
    Set {
        device: PathBuf,
        /// axis,min,max,fuzz,flat[,...]
        #[arg(allow_hyphen_values = true)]
        values: String,
    },
    /// Print the calibration currently configured in a device
    Get { device: PathBuf },
    /// Interactively calibrate every axis, then apply and store the result
    Calibrate { device: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout only carries values
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::load_or_default(Config::default_path())
            .context("Failed to load default config")?,
    };
    let database = cli.database.clone().unwrap_or_else(|| config.database_path());
    debug!("Database: {}", database.display());

    match cli.command {
        Command::Devices => list_devices(&config),
        Command::List => list_database(&database),
        Command::Read { device } => read_calibration(&device, &database),
        Command::Delete { device } => delete_calibration(&device, &database),
        Command::Write { device, values } => write_calibration(&device, &values, &database),
        Command::Config { device } => configure_device(&device, &config, &database),
        Command::Set { device, values } => set_calibration(&device, &values, &config),
        Command::Get { device } => get_calibration(&device),
        Command::Calibrate { device } => calibrate_device(&device, &config, &database),
    }
}

fn open_store(path: &Path) -> Result<CalibrationStore> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    CalibrationStore::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))
}

/// Opens a session; joydev is only attached when `joystick` is given.
fn open_device(path: &Path, joystick: Option<&JoystickConfig>) -> Result<Device<EvdevChannel>> {
    let disabled = JoystickConfig {
        enabled: false,
        ..JoystickConfig::default()
    };
    Device::open(path, joystick.unwrap_or(&disabled))
        .with_context(|| format!("Failed to open device {}", path.display()))
}

fn list_devices(config: &Config) -> Result<()> {
    let devices = scan_devices(&config.device.input_dir)
        .with_context(|| format!("Failed to scan {}", config.device.input_dir.display()))?;

    if devices.is_empty() {
        info!("No joystick devices found");
    }
    for device in devices {
        println!("{}: {} {}", device.path.display(), device.identity, device.name);
    }
    Ok(())
}

fn list_database(database: &Path) -> Result<()> {
    let store = open_store(database)?;

    let mut current: Option<(DeviceIdentity, Vec<AxisCalibration>)> = None;
    store.read(None, |device, entry| {
        match current.as_mut() {
            Some((identity, entries)) if *identity == *device => entries.push(*entry),
            _ => {
                if let Some((identity, entries)) = current.replace((*device, vec![*entry])) {
                    println!("{}", format_listing(&identity, &entries));
                }
            }
        }
        ControlFlow::Continue(())
    })?;

    if let Some((identity, entries)) = current {
        println!("{}", format_listing(&identity, &entries));
    }
    Ok(())
}

fn read_calibration(path: &Path, database: &Path) -> Result<()> {
    let device = open_device(path, None)?;
    let store = open_store(database)?;

    let entries: Vec<AxisCalibration> = store
        .read_device(device.identity())?
        .into_iter()
        .filter(|entry| device.axis_index().contains(entry.axis))
        .collect();
    println!("{}", format_values(&entries));
    Ok(())
}

fn delete_calibration(path: &Path, database: &Path) -> Result<()> {
    let device = open_device(path, None)?;
    let identity = device.identity();
    let removed = open_store(database)?.delete(identity)?;
    info!("Removed {} stored entries for {}", removed, identity);
    Ok(())
}

fn write_calibration(path: &Path, values: &str, database: &Path) -> Result<()> {
    let device = open_device(path, None)?;
    let entries = parse_values(values, device.axis_index()).context("Invalid values")?;
    open_store(database)?.write(device.identity(), &entries)?;
    Ok(())
}

fn configure_device(path: &Path, config: &Config, database: &Path) -> Result<()> {
    let mut device = open_device(path, Some(&config.joystick))?;
    let store = open_store(database)?;

    let mut entries = store.read_device(device.identity())?;
    entries.retain(|entry| {
        let known = device.axis_index().contains(entry.axis);
        if !known {
            warn!("Stored axis {} is not present on the device", entry.axis);
        }
        known
    });

    if entries.is_empty() {
        info!("No stored calibration for {}", device.identity());
        return Ok(());
    }
    device.configure(&entries).context("Failed to configure device")?;
    Ok(())
}

fn set_calibration(path: &Path, values: &str, config: &Config) -> Result<()> {
    let mut device = open_device(path, Some(&config.joystick))?;
    let entries = parse_values(values, device.axis_index()).context("Invalid values")?;
    device.configure(&entries).context("Failed to configure device")?;
    Ok(())
}

fn get_calibration(path: &Path) -> Result<()> {
    let device = open_device(path, None)?;
    println!("{}", format_values(&device.current_calibrations()));
    Ok(())
}

fn calibrate_device(path: &Path, config: &Config, database: &Path) -> Result<()> {
    let mut device = open_device(path, Some(&config.joystick))?;
    let store = open_store(database)?;
    let mut stdout = io::stdout();

    for index in 0..device.axes().len() {
        let name = device.axes()[index].name;
        println!("Move {} axis to its extremes and press a button to continue.", name);
        device.axes_mut()[index].reset_observed();

        'sweep: loop {
            let events = device.channel_mut().fetch_events()?;
            for event in &events {
                match device.process_event(event) {
                    Some(DeviceEvent::Axis { index: moved, .. }) if moved == index => {
                        let axis = &device.axes()[index];
                        print!(
                            "Axis {} Value:{:>7} Min:{:>7} Max:{:>7}\r",
                            axis.name, axis.value, axis.minimum, axis.maximum
                        );
                        stdout.flush()?;
                    }
                    Some(DeviceEvent::Button { pressed: true, .. }) => break 'sweep,
                    _ => {}
                }
            }
        }
        println!();
    }

    let mut entries = device.observed_calibrations();
    entries.retain(|entry| match entry.calibration.validate() {
        Ok(()) => true,
        Err(e) => {
            warn!("Skipping axis {}: {}", entry.axis, e);
            false
        }
    });

    println!("Saving calibration");
    device.configure(&entries).context("Failed to configure device")?;
    store.write(device.identity(), &entries)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_write_with_negative_values() {
        let cli = Cli::try_parse_from(["joycal", "write", "/dev/input/event3", "-1,-255,255,0,0"])
            .unwrap();
        match cli.command {
            Command::Write { device, values } => {
                assert_eq!(device, PathBuf::from("/dev/input/event3"));
                assert_eq!(values, "-1,-255,255,0,0");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_global_flags() {
        let cli = Cli::try_parse_from(["joycal", "list", "-v", "-d", "/tmp/cal.db"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.database, Some(PathBuf::from("/tmp/cal.db")));
        assert!(matches!(cli.command, Command::List));
    }

    #[test]
    fn test_missing_values_rejected() {
        assert!(Cli::try_parse_from(["joycal", "set", "/dev/input/event3"]).is_err());
    }
}
