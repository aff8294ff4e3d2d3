//! # joycal Library
//!
//! Discover, calibrate and persist the calibration of Linux joysticks.
//!
//! This library provides capability discovery for evdev devices, validation
//! and application of per-axis calibration (mirrored to the legacy joydev
//! interface), and a small database of calibration tuples keyed by device
//! model and axis.

pub mod capability;
pub mod config;
pub mod controller;
pub mod error;
pub mod store;
pub mod values;
