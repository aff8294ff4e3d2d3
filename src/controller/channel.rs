//! # Device Channel Module
//!
//! Access to the primary (evdev) side of an input device.
//!
//! The [`DeviceChannel`] trait is the seam between the calibration logic and
//! the kernel. [`EvdevChannel`] implements it on top of `/dev/input/eventN`
//! nodes with the `evdev` crate plus the `EVIOCGABS` / `EVIOCSABS` ioctls,
//! which the crate does not wrap for writing.

use std::fmt;
use std::fs;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use evdev::{Device, InputEvent};
use tracing::{debug, info};

use super::calibration::Calibration;
use super::ioctl::{self, RawAbsInfo};
use crate::capability::{BitSet, CapabilityClass, ABS_CNT, KEY_CNT};
use crate::error::{JoycalError, Result};

/// Bus type, vendor and product of a device model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DeviceIdentity {
    pub bus: u16,
    pub vendor: u16,
    pub product: u16,
}

impl DeviceIdentity {
    #[must_use]
    pub const fn new(bus: u16, vendor: u16, product: u16) -> Self {
        Self {
            bus,
            vendor,
            product,
        }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}:{:04x}", self.bus, self.vendor, self.product)
    }
}

/// Kernel description of one absolute axis (`struct input_absinfo`).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AbsInfo {
    pub value: i32,
    pub minimum: i32,
    pub maximum: i32,
    pub fuzz: i32,
    pub flat: i32,
    pub resolution: i32,
}

impl AbsInfo {
    /// Calibration tuple currently configured for the axis.
    #[must_use]
    pub fn calibration(&self) -> Calibration {
        Calibration::new(self.minimum, self.maximum, self.fuzz, self.flat)
    }
}

impl From<RawAbsInfo> for AbsInfo {
    fn from(raw: RawAbsInfo) -> Self {
        Self {
            value: raw.value,
            minimum: raw.minimum,
            maximum: raw.maximum,
            fuzz: raw.fuzz,
            flat: raw.flat,
            resolution: raw.resolution,
        }
    }
}

/// Primary device channel.
///
/// One implementation talks to the kernel; tests use the generated
/// `MockDeviceChannel`.
#[cfg_attr(test, mockall::automock)]
pub trait DeviceChannel {
    /// Bus, vendor and product of the device.
    fn identity(&self) -> Result<DeviceIdentity>;

    /// Human readable device name.
    fn name(&self) -> String;

    /// Capability bitmap of one class, sized to the class' id domain.
    fn capabilities(&self, class: CapabilityClass) -> Result<BitSet>;

    /// Keys currently held down.
    fn key_state(&self) -> Result<BitSet>;

    /// Current value and calibration of axis `id`.
    fn abs_info(&self, id: u16) -> Result<AbsInfo>;

    /// Replaces min, max, fuzz and flat of axis `id`.
    fn set_abs_calibration(&mut self, id: u16, calibration: &Calibration) -> Result<()>;
}

/// Summary of one candidate joystick event node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSummary {
    pub path: PathBuf,
    pub name: String,
    pub identity: DeviceIdentity,
}

/// Number suffix of a device node name, e.g. `Some(12)` for `("event12", "event")`.
pub(crate) fn node_number(name: &str, prefix: &str) -> Option<u32> {
    let digits = name.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn axis_code(id: u16) -> Result<u8> {
    u8::try_from(id)
        .ok()
        .filter(|&code| usize::from(code) < ABS_CNT)
        .ok_or(JoycalError::UnknownAxis(id))
}

/// evdev implementation of [`DeviceChannel`].
pub struct EvdevChannel {
    device: Device,
    path: PathBuf,
}

impl EvdevChannel {
    /// Opens an event node such as `/dev/input/event5`.
    ///
    /// # Errors
    ///
    /// - `DeviceNotFound`: `path` does not exist
    /// - `Channel`: the node could not be opened (permissions, not evdev)
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(JoycalError::DeviceNotFound(path.display().to_string()));
        }

        let device = Device::open(path).map_err(|e| {
            JoycalError::Channel(format!("Failed to open {}: {}", path.display(), e))
        })?;
        info!(
            "Opened {} ({})",
            path.display(),
            device.name().unwrap_or("unnamed")
        );

        Ok(Self {
            device,
            path: path.to_path_buf(),
        })
    }

    /// Path of the event node.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Character device number of the event node.
    ///
    /// # Errors
    ///
    /// Returns `Channel` when the node is not a character device.
    pub fn rdev(&self) -> Result<u64> {
        let metadata = fs::metadata(&self.path)?;
        if !metadata.file_type().is_char_device() {
            return Err(JoycalError::Channel(format!(
                "{} is not a character device",
                self.path.display()
            )));
        }
        Ok(metadata.rdev())
    }

    /// Blocks until the device reports events and returns them.
    ///
    /// # Errors
    ///
    /// Returns `Channel` if reading fails (e.g. the device was unplugged).
    pub fn fetch_events(&mut self) -> Result<Vec<InputEvent>> {
        let events = self
            .device
            .fetch_events()
            .map_err(|e| JoycalError::Channel(format!("Failed to fetch events: {}", e)))?;
        Ok(events.collect())
    }

    fn read_abs(&self, id: u16) -> Result<RawAbsInfo> {
        let code = axis_code(id)?;
        let mut raw = RawAbsInfo::default();
        let fd = self.device.as_raw_fd();
        ioctl::ioctl_ptr(fd, ioctl::eviocgabs(code), std::ptr::addr_of_mut!(raw))
            .map_err(|e| JoycalError::Channel(format!("EVIOCGABS failed for axis {}: {}", id, e)))?;
        Ok(raw)
    }
}

impl DeviceChannel for EvdevChannel {
    fn identity(&self) -> Result<DeviceIdentity> {
        let id = self.device.input_id();
        Ok(DeviceIdentity::new(id.bus_type().0, id.vendor(), id.product()))
    }

    fn name(&self) -> String {
        self.device.name().unwrap_or("unnamed").to_string()
    }

    fn capabilities(&self, class: CapabilityClass) -> Result<BitSet> {
        let ids: Vec<usize> = match class {
            CapabilityClass::Axis => self
                .device
                .supported_absolute_axes()
                .map(|axes| axes.iter().map(|axis| usize::from(axis.0)).collect())
                .unwrap_or_default(),
            CapabilityClass::Button => self
                .device
                .supported_keys()
                .map(|keys| keys.iter().map(|key| usize::from(key.code())).collect())
                .unwrap_or_default(),
            CapabilityClass::Effect => self
                .device
                .supported_ff()
                .map(|effects| effects.iter().map(|effect| usize::from(effect.0)).collect())
                .unwrap_or_default(),
        };
        Ok(BitSet::from_ids(class.domain(), ids))
    }

    fn key_state(&self) -> Result<BitSet> {
        let state = self
            .device
            .get_key_state()
            .map_err(|e| JoycalError::Channel(format!("Failed to read key state: {}", e)))?;
        Ok(BitSet::from_ids(
            KEY_CNT,
            state.iter().map(|key| usize::from(key.code())),
        ))
    }

    fn abs_info(&self, id: u16) -> Result<AbsInfo> {
        self.read_abs(id).map(AbsInfo::from)
    }

    fn set_abs_calibration(&mut self, id: u16, calibration: &Calibration) -> Result<()> {
        let code = axis_code(id)?;
        // Keep value and resolution as the kernel has them
        let mut raw = self.read_abs(id)?;
        raw.minimum = calibration.min;
        raw.maximum = calibration.max;
        raw.fuzz = calibration.fuzz;
        raw.flat = calibration.flat;

        let fd = self.device.as_raw_fd();
        ioctl::ioctl_ptr(fd, ioctl::eviocsabs(code), std::ptr::addr_of_mut!(raw))
            .map_err(|e| JoycalError::Channel(format!("EVIOCSABS failed for axis {}: {}", id, e)))
    }
}

/// Lists event nodes under `input_dir` that expose at least one absolute axis.
///
/// Nodes are visited in numeric order (`event2` before `event10`). Nodes that
/// cannot be opened are skipped.
///
/// # Errors
///
/// Returns `DeviceNotFound` if `input_dir` does not exist and `Io` if it
/// cannot be read.
pub fn scan_devices(input_dir: &Path) -> Result<Vec<DeviceSummary>> {
    if !input_dir.exists() {
        return Err(JoycalError::DeviceNotFound(format!(
            "{} directory not found",
            input_dir.display()
        )));
    }

    let mut nodes: Vec<(u32, PathBuf)> = fs::read_dir(input_dir)?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .filter_map(|entry| {
            let number = node_number(&entry.file_name().to_string_lossy(), "event")?;
            Some((number, entry.path()))
        })
        .collect();
    nodes.sort_unstable();

    let mut found = Vec::new();
    for (_, path) in nodes {
        let device = match Device::open(&path) {
            Ok(device) => device,
            Err(e) => {
                debug!("Could not open {}: {}", path.display(), e);
                continue;
            }
        };

        let has_axes = device
            .supported_absolute_axes()
            .is_some_and(|axes| axes.iter().next().is_some());
        if !has_axes {
            continue;
        }

        let id = device.input_id();
        found.push(DeviceSummary {
            name: device.name().unwrap_or("unnamed").to_string(),
            identity: DeviceIdentity::new(id.bus_type().0, id.vendor(), id.product()),
            path,
        });
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_display() {
        let identity = DeviceIdentity::new(3, 0x45e, 0x28e);
        assert_eq!(identity.to_string(), "0003:045e:028e");

        let identity = DeviceIdentity::new(5, 0x8bad, 0xf00d);
        assert_eq!(identity.to_string(), "0005:8bad:f00d");
    }

    #[test]
    fn test_identity_ordering() {
        let a = DeviceIdentity::new(3, 0x45e, 0x28e);
        let b = DeviceIdentity::new(3, 0x45e, 0x28f);
        let c = DeviceIdentity::new(5, 0x001, 0x001);
        assert!(a < b && b < c);
    }

    #[test]
    fn test_abs_info_calibration() {
        let info = AbsInfo {
            value: 7,
            minimum: -32768,
            maximum: 32767,
            fuzz: 16,
            flat: 128,
            resolution: 0,
        };
        assert_eq!(info.calibration(), Calibration::new(-32768, 32767, 16, 128));
    }

    #[test]
    fn test_node_number() {
        assert_eq!(node_number("event0", "event"), Some(0));
        assert_eq!(node_number("event17", "event"), Some(17));
        assert_eq!(node_number("js3", "js"), Some(3));
        assert_eq!(node_number("event", "event"), None);
        assert_eq!(node_number("mouse0", "event"), None);
        assert_eq!(node_number("event1a", "event"), None);
    }

    #[test]
    fn test_axis_code_bounds() {
        assert_eq!(axis_code(0).unwrap(), 0);
        assert_eq!(axis_code(63).unwrap(), 63);
        assert!(matches!(axis_code(64), Err(JoycalError::UnknownAxis(64))));
        assert!(matches!(axis_code(300), Err(JoycalError::UnknownAxis(300))));
    }

    #[test]
    fn test_open_missing_node() {
        let result = EvdevChannel::open("/nonexistent/input/event99");
        assert!(matches!(result, Err(JoycalError::DeviceNotFound(_))));
    }

    #[test]
    fn test_scan_missing_directory() {
        let result = scan_devices(Path::new("/nonexistent/input"));
        assert!(matches!(result, Err(JoycalError::DeviceNotFound(_))));
    }

    #[test]
    fn test_scan_ignores_regular_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("event0"), b"not a device").unwrap();
        fs::write(dir.path().join("mouse0"), b"").unwrap();

        let found = scan_devices(dir.path()).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    #[ignore] // Requires a connected joystick and read access to /dev/input
    fn test_scan_real_devices() {
        let found = scan_devices(Path::new("/dev/input")).unwrap();
        for device in &found {
            println!("{} {} {}", device.path.display(), device.identity, device.name);
        }
    }
}
