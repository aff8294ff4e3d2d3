//! # Calibration Module
//!
//! Per-axis calibration ranges and the live state of each absolute axis.
//!
//! ## Calibration tuple
//!
//! A [`Calibration`] is the `(min, max, fuzz, flat)` tuple the kernel uses to
//! interpret raw axis values:
//!
//! - `min` / `max`: endpoints of the raw range
//! - `fuzz`: changes smaller than this may be filtered as noise
//! - `flat`: dead-band around center reported as center
//!
//! A tuple is valid when `max > min` and both `fuzz` and `flat` lie in
//! `0..=(max - min) / 2`. The range is computed in 64-bit arithmetic so
//! extreme `i32` endpoints cannot overflow.
//!
//! ## Usage
//!
//! ```
//! use joycal::controller::calibration::Calibration;
//!
//! let cal = Calibration::new(-255, 255, 10, 5);
//! assert!(cal.validate().is_ok());
//!
//! // flat larger than half the range
//! assert!(Calibration::new(0, 100, 0, 51).validate().is_err());
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::channel::{AbsInfo, DeviceChannel};
use crate::capability::names::axis_name;
use crate::capability::{AxisKind, CapabilityRecord};
use crate::error::Result;

/// Reasons a calibration tuple is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalibrationError {
    /// `max` is not strictly greater than `min`
    #[error("Minimum exceeds maximum (min {min}, max {max})")]
    InvalidRange { min: i32, max: i32 },

    /// Fuzz is negative or larger than half the range
    #[error("Fuzz value {fuzz} is out of range (0..={limit})")]
    FuzzOutOfRange { fuzz: i32, limit: i64 },

    /// Flat is negative or larger than half the range
    #[error("Flat value {flat} is out of range (0..={limit})")]
    FlatOutOfRange { flat: i32, limit: i64 },

    /// Range too narrow to place a center strictly inside it
    #[error("Center {center} is not strictly between {min} and {max}")]
    DegenerateCenter { min: i32, center: i32, max: i32 },
}

/// Range, noise filter and dead-band of one absolute axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Calibration {
    /// Lowest raw value.
    pub min: i32,
    /// Highest raw value.
    pub max: i32,
    /// Noise threshold.
    pub fuzz: i32,
    /// Dead-band around center.
    pub flat: i32,
}

impl Calibration {
    /// Creates a calibration tuple. The tuple is not validated.
    ///
    /// # Examples
    ///
    /// ```
    /// use joycal::controller::calibration::Calibration;
    ///
    /// let cal = Calibration::new(0, 1023, 4, 16);
    /// assert_eq!(cal.range(), 1023);
    /// ```
    #[must_use]
    pub const fn new(min: i32, max: i32, fuzz: i32, flat: i32) -> Self {
        Self {
            min,
            max,
            fuzz,
            flat,
        }
    }

    /// Width of the raw range, `max - min`, without overflow.
    #[must_use]
    pub fn range(&self) -> i64 {
        i64::from(self.max) - i64::from(self.min)
    }

    /// Checks the tuple invariants.
    ///
    /// # Errors
    ///
    /// - `InvalidRange`: `max <= min`
    /// - `FuzzOutOfRange`: `fuzz < 0` or `fuzz > (max - min) / 2`
    /// - `FlatOutOfRange`: `flat < 0` or `flat > (max - min) / 2`
    pub fn validate(&self) -> std::result::Result<(), CalibrationError> {
        let range = self.range();
        if range <= 0 {
            return Err(CalibrationError::InvalidRange {
                min: self.min,
                max: self.max,
            });
        }

        let limit = range / 2;
        if self.fuzz < 0 || i64::from(self.fuzz) > limit {
            return Err(CalibrationError::FuzzOutOfRange {
                fuzz: self.fuzz,
                limit,
            });
        }
        if self.flat < 0 || i64::from(self.flat) > limit {
            return Err(CalibrationError::FlatOutOfRange {
                flat: self.flat,
                limit,
            });
        }

        Ok(())
    }
}

impl fmt::Display for Calibration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.min, self.max, self.fuzz, self.flat)
    }
}

/// Calibration of one axis, identified by its kernel id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AxisCalibration {
    /// Kernel axis id (`ABS_*`).
    pub axis: u16,
    /// Calibration tuple for the axis.
    pub calibration: Calibration,
}

impl AxisCalibration {
    #[must_use]
    pub const fn new(axis: u16, calibration: Calibration) -> Self {
        Self { axis, calibration }
    }
}

impl fmt::Display for AxisCalibration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.axis, self.calibration)
    }
}

/// Live state of one absolute axis within a device session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisState {
    /// Kernel axis id.
    pub id: u16,
    /// Dense index within the session.
    pub index: usize,
    /// Short axis name, e.g. `"RX"`.
    pub name: &'static str,
    /// Last reported value.
    pub value: i32,
    /// Lowest value observed since the last reset.
    pub minimum: i32,
    /// Highest value observed since the last reset.
    pub maximum: i32,
    /// Calibration currently configured in the device.
    pub calibration: Calibration,
}

impl AxisState {
    /// Builds the state of a discovered axis from the kernel's axis info.
    #[must_use]
    pub fn new(record: CapabilityRecord<AxisKind>, info: &AbsInfo) -> Self {
        Self {
            id: record.id,
            index: record.index,
            name: axis_name(record.id),
            value: info.value,
            minimum: info.value,
            maximum: info.value,
            calibration: info.calibration(),
        }
    }

    /// Validates `calibration`, pushes it to the device and mirrors it locally.
    ///
    /// Nothing is sent and nothing changes when validation fails. The local
    /// copy is only updated after the channel accepted the new values.
    ///
    /// # Errors
    ///
    /// - `Calibration`: the tuple violates the range/fuzz/flat invariants
    /// - `Channel`: the device rejected the update
    pub fn apply<C>(&mut self, channel: &mut C, calibration: Calibration) -> Result<()>
    where
        C: DeviceChannel + ?Sized,
    {
        calibration.validate()?;
        channel.set_abs_calibration(self.id, &calibration)?;

        debug!(
            "Axis {} ({}) calibrated to {}",
            self.id, self.name, calibration
        );
        self.calibration = calibration;
        Ok(())
    }

    /// Records a new value, widening the observed range. Never narrows it.
    pub fn record_value(&mut self, value: i32) {
        self.value = value;
        self.minimum = self.minimum.min(value);
        self.maximum = self.maximum.max(value);
    }

    /// Collapses the observed range onto the current value.
    pub fn reset_observed(&mut self) {
        self.minimum = self.value;
        self.maximum = self.value;
    }

    /// Observed range with the configured fuzz and flat carried forward.
    #[must_use]
    pub fn observed_to_calibration(&self) -> Calibration {
        Calibration {
            min: self.minimum,
            max: self.maximum,
            ..self.calibration
        }
    }

    /// Currently configured calibration keyed by this axis' id.
    #[must_use]
    pub fn to_axis_calibration(&self) -> AxisCalibration {
        AxisCalibration::new(self.id, self.calibration)
    }
}
