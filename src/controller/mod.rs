//! # Controller Module
//!
//! Joystick device access and calibration.
//!
//! This module handles:
//! - Opening evdev event nodes and reading their capabilities
//! - Validating and applying per-axis calibration
//! - Mirroring calibration to the joydev correction coefficients
//! - Tracking live axis and button state from input events

pub mod calibration;
pub mod channel;
pub mod device;
mod ioctl;
pub mod joystick;

pub use calibration::{AxisCalibration, AxisState, Calibration, CalibrationError};
pub use channel::{AbsInfo, DeviceChannel, DeviceIdentity, EvdevChannel};
pub use device::{Device, DeviceEvent};
pub use joystick::JoystickCorrection;
