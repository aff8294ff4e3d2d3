//! # Joystick Correction Module
//!
//! Keeps the legacy joydev interface (`/dev/input/jsN`) in step with the evdev
//! calibration.
//!
//! joydev rescales raw values itself using "broken line" correction
//! coefficients. For an axis with range `min..max` and center `c`:
//!
//! | Coefficient | Value |
//! |-------------|-------|
//! | `coef[0]` | center_min (`c`) |
//! | `coef[1]` | center_max (`c`) |
//! | `coef[2]` | `(32767 * 16384) / (center_min - min)` |
//! | `coef[3]` | `(32767 * 16384) / (max - center_max)` |
//!
//! with `c = min + (max - min) / 2`. The kernel only accepts the full
//! correction array at once, so [`JoystickCorrection`] stages per-axis updates
//! and pushes them with a single [`JoystickCorrection::activate`].

use std::fs::{self, File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::calibration::{Calibration, CalibrationError};
use super::channel::node_number;
use super::ioctl::{self, RawCorrection};
use crate::capability::ABS_CNT;
use crate::error::{JoycalError, Result};

/// joydev output full scale times the fixed-point factor.
const SCALE_NUMERATOR: i64 = 32767 * 16384;

/// `JS_CORR_NONE`
const JS_CORR_NONE: u16 = 0;
/// `JS_CORR_BROKEN`
const JS_CORR_BROKEN: u16 = 1;

/// Broken-line coefficients for one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrectionCoefficients {
    pub center_min: i32,
    pub center_max: i32,
    pub scale_low: i32,
    pub scale_high: i32,
}

impl CorrectionCoefficients {
    /// Derives coefficients from a calibration tuple.
    ///
    /// # Errors
    ///
    /// - `InvalidRange`: `max <= min`
    /// - `DegenerateCenter`: the range is too narrow for a center strictly
    ///   inside it (e.g. `max == min + 1`)
    ///
    /// # Examples
    ///
    /// ```
    /// use joycal::controller::calibration::Calibration;
    /// use joycal::controller::joystick::CorrectionCoefficients;
    ///
    /// let coef = CorrectionCoefficients::derive(&Calibration::new(0, 1000, 0, 0))?;
    /// assert_eq!(coef.center_min, 500);
    /// assert_eq!(coef.scale_low, 32767 * 16384 / 500);
    /// # Ok::<(), joycal::controller::calibration::CalibrationError>(())
    /// ```
    pub fn derive(calibration: &Calibration) -> std::result::Result<Self, CalibrationError> {
        let min = i64::from(calibration.min);
        let max = i64::from(calibration.max);
        if max <= min {
            return Err(CalibrationError::InvalidRange {
                min: calibration.min,
                max: calibration.max,
            });
        }

        let center = min + (max - min) / 2;
        let low = center - min;
        let high = max - center;
        if low <= 0 || high <= 0 {
            return Err(CalibrationError::DegenerateCenter {
                min: calibration.min,
                center: clamp_i32(center),
                max: calibration.max,
            });
        }

        Ok(Self {
            center_min: clamp_i32(center),
            center_max: clamp_i32(center),
            scale_low: clamp_i32(SCALE_NUMERATOR / low),
            scale_high: clamp_i32(SCALE_NUMERATOR / high),
        })
    }
}

// center lies within [min, max] and scales are at most SCALE_NUMERATOR
fn clamp_i32(value: i64) -> i32 {
    i32::try_from(value).unwrap_or(if value < 0 { i32::MIN } else { i32::MAX })
}

/// Correction type of one joydev axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorrectionKind {
    /// Raw values pass through unchanged.
    #[default]
    None,
    /// Broken-line correction.
    Broken,
    /// Type unknown to this crate, kept as reported.
    Other(u16),
}

impl CorrectionKind {
    fn from_raw(raw: u16) -> Self {
        match raw {
            JS_CORR_NONE => CorrectionKind::None,
            JS_CORR_BROKEN => CorrectionKind::Broken,
            other => CorrectionKind::Other(other),
        }
    }

    fn to_raw(self) -> u16 {
        match self {
            CorrectionKind::None => JS_CORR_NONE,
            CorrectionKind::Broken => JS_CORR_BROKEN,
            CorrectionKind::Other(raw) => raw,
        }
    }
}

/// Correction of one joydev axis (`struct js_corr`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxisCorrection {
    pub kind: CorrectionKind,
    pub precision: i16,
    pub coef: [i32; 8],
}

impl From<CorrectionCoefficients> for AxisCorrection {
    fn from(c: CorrectionCoefficients) -> Self {
        Self {
            kind: CorrectionKind::Broken,
            precision: 0,
            coef: [c.center_min, c.center_max, c.scale_low, c.scale_high, 0, 0, 0, 0],
        }
    }
}

impl From<RawCorrection> for AxisCorrection {
    fn from(raw: RawCorrection) -> Self {
        Self {
            kind: CorrectionKind::from_raw(raw.kind),
            precision: raw.prec,
            coef: raw.coef,
        }
    }
}

impl From<&AxisCorrection> for RawCorrection {
    fn from(corr: &AxisCorrection) -> Self {
        Self {
            coef: corr.coef,
            prec: corr.precision,
            kind: corr.kind.to_raw(),
        }
    }
}

/// Secondary (joydev) correction channel.
#[cfg_attr(test, mockall::automock)]
pub trait CorrectionChannel {
    /// Number of axes joydev exposes.
    fn axis_count(&self) -> Result<usize>;

    /// Axis id for each joydev index.
    fn axis_map(&self) -> Result<Vec<u16>>;

    /// Current correction of every joydev axis.
    fn corrections(&self) -> Result<Vec<AxisCorrection>>;

    /// Replaces the correction of every joydev axis.
    fn set_corrections(&mut self, corrections: &[AxisCorrection]) -> Result<()>;
}

/// joydev implementation of [`CorrectionChannel`].
pub struct JoydevChannel {
    file: File,
    path: PathBuf,
}

impl JoydevChannel {
    /// Opens a joydev node read-write.
    ///
    /// # Errors
    ///
    /// Returns `Channel` if the node cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| {
                JoycalError::Channel(format!("Failed to open {}: {}", path.display(), e))
            })?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Path of the joydev node.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn failed(&self, request: &str, e: std::io::Error) -> JoycalError {
        JoycalError::Channel(format!("{} failed on {}: {}", request, self.path.display(), e))
    }
}

impl CorrectionChannel for JoydevChannel {
    fn axis_count(&self) -> Result<usize> {
        let mut count: u8 = 0;
        ioctl::ioctl_ptr(self.file.as_raw_fd(), ioctl::JSIOCGAXES, std::ptr::addr_of_mut!(count))
            .map_err(|e| self.failed("JSIOCGAXES", e))?;
        Ok(usize::from(count))
    }

    fn axis_map(&self) -> Result<Vec<u16>> {
        let count = self.axis_count()?;
        let mut map = [0u8; ABS_CNT];
        ioctl::ioctl_ptr(self.file.as_raw_fd(), ioctl::JSIOCGAXMAP, std::ptr::addr_of_mut!(map))
            .map_err(|e| self.failed("JSIOCGAXMAP", e))?;
        Ok(map.iter().take(count).map(|&id| u16::from(id)).collect())
    }

    fn corrections(&self) -> Result<Vec<AxisCorrection>> {
        let count = self.axis_count()?;
        if count == 0 {
            return Ok(Vec::new());
        }

        // The kernel copies one js_corr per axis
        let mut raw = vec![RawCorrection::default(); count];
        ioctl::ioctl_ptr(self.file.as_raw_fd(), ioctl::JSIOCGCORR, raw.as_mut_ptr())
            .map_err(|e| self.failed("JSIOCGCORR", e))?;
        Ok(raw.into_iter().map(AxisCorrection::from).collect())
    }

    fn set_corrections(&mut self, corrections: &[AxisCorrection]) -> Result<()> {
        let count = self.axis_count()?;
        if corrections.len() < count {
            return Err(JoycalError::Channel(format!(
                "{} corrections given for {} joystick axes",
                corrections.len(),
                count
            )));
        }

        let mut raw: Vec<RawCorrection> = corrections.iter().map(RawCorrection::from).collect();
        ioctl::ioctl_ptr(self.file.as_raw_fd(), ioctl::JSIOCSCORR, raw.as_mut_ptr())
            .map_err(|e| self.failed("JSIOCSCORR", e))
    }
}

/// Staged joydev corrections for one device session.
pub struct JoystickCorrection {
    channel: Box<dyn CorrectionChannel>,
    by_id: Vec<Option<usize>>,
    corrections: Vec<AxisCorrection>,
}

impl JoystickCorrection {
    /// Reads the axis count, axis map and current corrections of `channel`.
    ///
    /// # Errors
    ///
    /// Returns `Channel` if any of the reads fail.
    pub fn new(channel: Box<dyn CorrectionChannel>) -> Result<Self> {
        let count = channel.axis_count()?;
        let map = channel.axis_map()?;

        let mut by_id = vec![None; ABS_CNT];
        for (index, &id) in map.iter().take(count).enumerate() {
            if let Some(slot) = by_id.get_mut(usize::from(id)) {
                *slot = Some(index);
            }
        }

        let mut corrections = if count > 0 {
            channel.corrections()?
        } else {
            Vec::new()
        };
        corrections.resize(count, AxisCorrection::default());

        debug!("Joystick exposes {} axes", count);
        Ok(Self {
            channel,
            by_id,
            corrections,
        })
    }

    /// Opens the joydev node at `path`.
    ///
    /// # Errors
    ///
    /// Returns `Channel` if the node cannot be opened or queried.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let channel = JoydevChannel::open(path)?;
        Self::new(Box::new(channel))
    }

    /// joydev index of axis `id`.
    #[must_use]
    pub fn lookup(&self, id: u16) -> Option<usize> {
        self.by_id.get(usize::from(id)).copied().flatten()
    }

    /// Number of joydev axes.
    #[must_use]
    pub fn axis_count(&self) -> usize {
        self.corrections.len()
    }

    /// Staged corrections in joydev index order.
    #[must_use]
    pub fn corrections(&self) -> &[AxisCorrection] {
        &self.corrections
    }

    /// Stages the correction derived from `calibration` for axis `axis_id`.
    ///
    /// Returns `Ok(false)` when joydev does not expose the axis.
    ///
    /// # Errors
    ///
    /// Returns the derivation error; nothing is staged in that case.
    pub fn set(
        &mut self,
        axis_id: u16,
        calibration: &Calibration,
    ) -> std::result::Result<bool, CalibrationError> {
        let Some(index) = self.lookup(axis_id) else {
            return Ok(false);
        };
        let Some(slot) = self.corrections.get_mut(index) else {
            return Ok(false);
        };

        let coefficients = CorrectionCoefficients::derive(calibration)?;
        *slot = AxisCorrection::from(coefficients);
        debug!(
            "Joystick axis {} (id {}) staged {:?}",
            index, axis_id, coefficients
        );
        Ok(true)
    }

    /// Pushes every staged correction to the kernel in one call.
    ///
    /// # Errors
    ///
    /// Returns `Channel` if the kernel rejects the update.
    pub fn activate(&mut self) -> Result<()> {
        if self.corrections.is_empty() {
            return Ok(());
        }
        self.channel.set_corrections(&self.corrections)?;
        info!("Joystick corrections updated for {} axes", self.corrections.len());
        Ok(())
    }
}

/// Finds the joydev node belonging to the event node with device number `rdev`.
///
/// Looks for exactly one `jsN` entry under
/// `<sysfs_char_dir>/<major>:<minor>/device/`. None when there is no such entry
/// or more than one.
#[must_use]
pub fn joydev_for_rdev(rdev: u64, sysfs_char_dir: &Path, input_dir: &Path) -> Option<PathBuf> {
    let device_dir = sysfs_char_dir
        .join(format!("{}:{}", libc::major(rdev), libc::minor(rdev)))
        .join("device");

    let names: Vec<String> = fs::read_dir(&device_dir)
        .ok()?
        .flatten()
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| node_number(name, "js").is_some())
        .collect();

    match names.as_slice() {
        [name] => Some(input_dir.join(name)),
        [] => None,
        _ => {
            debug!("Several joystick nodes under {}", device_dir.display());
            None
        }
    }
}
