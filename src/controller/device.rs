//! # Device Session Module
//!
//! One open input device: its capability indexes, the live state of its axes
//! and buttons, its force-feedback effects and, when available, the joydev
//! correction target that mirrors the evdev calibration.

use std::path::Path;

use evdev::{InputEvent, InputEventKind};
use tracing::{debug, info, warn};

use super::calibration::{AxisCalibration, AxisState};
use super::channel::{DeviceChannel, DeviceIdentity, EvdevChannel};
use super::joystick::{joydev_for_rdev, JoystickCorrection};
use crate::capability::names::{effect_class, effect_name, EffectClass};
use crate::capability::{AxisKind, ButtonKind, CapabilityClass, CapabilityIndex, EffectKind};
use crate::config::JoystickConfig;
use crate::error::{JoycalError, Result};

/// Pressed state of one key or button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonState {
    pub id: u16,
    pub index: usize,
    pub pressed: bool,
}

/// One supported force-feedback effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectInfo {
    pub id: u16,
    pub index: usize,
    pub name: &'static str,
    pub class: EffectClass,
}

/// State change produced by an input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Axis at dense `index` reported `value`.
    Axis { index: usize, value: i32 },
    /// Button at dense `index` changed state.
    Button { index: usize, pressed: bool },
}

/// An open device session.
pub struct Device<C> {
    channel: C,
    identity: DeviceIdentity,
    name: String,
    axis_index: CapabilityIndex<AxisKind>,
    axes: Vec<AxisState>,
    button_index: CapabilityIndex<ButtonKind>,
    buttons: Vec<ButtonState>,
    effect_index: CapabilityIndex<EffectKind>,
    effects: Vec<EffectInfo>,
    joystick: Option<JoystickCorrection>,
}

impl<C: DeviceChannel> Device<C> {
    /// Builds a session: discovers axes, buttons and effects and reads the
    /// current axis calibration and key state.
    ///
    /// # Errors
    ///
    /// - `NoAxes`: the device exposes no absolute axis
    /// - `Channel`: a query failed
    pub fn new(channel: C) -> Result<Self> {
        let identity = channel.identity()?;
        let name = channel.name();

        let axis_index: CapabilityIndex<AxisKind> =
            CapabilityIndex::from_bitmap(&channel.capabilities(CapabilityClass::Axis)?);
        if axis_index.is_empty() {
            return Err(JoycalError::NoAxes);
        }
        let axes = axis_index
            .iter()
            .map(|record| -> Result<AxisState> {
                Ok(AxisState::new(*record, &channel.abs_info(record.id)?))
            })
            .collect::<Result<Vec<_>>>()?;

        let button_index: CapabilityIndex<ButtonKind> =
            CapabilityIndex::from_bitmap(&channel.capabilities(CapabilityClass::Button)?);
        let pressed = channel.key_state()?;
        let buttons = button_index
            .iter()
            .map(|record| ButtonState {
                id: record.id,
                index: record.index,
                pressed: pressed.test(usize::from(record.id)),
            })
            .collect();

        let effect_index: CapabilityIndex<EffectKind> =
            CapabilityIndex::from_bitmap(&channel.capabilities(CapabilityClass::Effect)?);
        let effects = effect_index
            .iter()
            .map(|record| EffectInfo {
                id: record.id,
                index: record.index,
                name: effect_name(record.id),
                class: effect_class(record.id),
            })
            .collect();

        info!(
            "Device {} ({}): {} axes, {} buttons, {} effects",
            identity,
            name,
            axis_index.len(),
            button_index.len(),
            effect_index.len()
        );

        Ok(Self {
            channel,
            identity,
            name,
            axis_index,
            axes,
            button_index,
            buttons,
            effect_index,
            effects,
            joystick: None,
        })
    }

    /// Attaches the joydev correction target.
    #[must_use]
    pub fn with_joystick(mut self, joystick: JoystickCorrection) -> Self {
        self.joystick = Some(joystick);
        self
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn axis_index(&self) -> &CapabilityIndex<AxisKind> {
        &self.axis_index
    }

    pub fn axes(&self) -> &[AxisState] {
        &self.axes
    }

    pub fn axes_mut(&mut self) -> &mut [AxisState] {
        &mut self.axes
    }

    /// State of axis `id`, if the device has it.
    pub fn axis(&self, id: u16) -> Option<&AxisState> {
        self.axis_index.lookup(id).and_then(|index| self.axes.get(index))
    }

    pub fn button_index(&self) -> &CapabilityIndex<ButtonKind> {
        &self.button_index
    }

    pub fn buttons(&self) -> &[ButtonState] {
        &self.buttons
    }

    pub fn effect_index(&self) -> &CapabilityIndex<EffectKind> {
        &self.effect_index
    }

    pub fn effects(&self) -> &[EffectInfo] {
        &self.effects
    }

    /// Whether a joydev correction target is attached.
    pub fn has_joystick(&self) -> bool {
        self.joystick.is_some()
    }

    pub fn joystick(&self) -> Option<&JoystickCorrection> {
        self.joystick.as_ref()
    }

    /// Updates axis or button state from an input event.
    ///
    /// Returns `None` for events that do not touch a known axis or button.
    pub fn process_event(&mut self, event: &InputEvent) -> Option<DeviceEvent> {
        match event.kind() {
            InputEventKind::AbsAxis(axis) => {
                let index = self.axis_index.lookup(axis.0)?;
                let state = self.axes.get_mut(index)?;
                state.record_value(event.value());
                Some(DeviceEvent::Axis {
                    index,
                    value: event.value(),
                })
            }
            InputEventKind::Key(key) => {
                let index = self.button_index.lookup(key.code())?;
                let state = self.buttons.get_mut(index)?;
                state.pressed = event.value() != 0;
                Some(DeviceEvent::Button {
                    index,
                    pressed: state.pressed,
                })
            }
            _ => None,
        }
    }

    /// Calibration currently configured for every axis, in dense order.
    pub fn current_calibrations(&self) -> Vec<AxisCalibration> {
        self.axes.iter().map(AxisState::to_axis_calibration).collect()
    }

    /// Observed range of every axis with fuzz and flat carried forward.
    pub fn observed_calibrations(&self) -> Vec<AxisCalibration> {
        self.axes
            .iter()
            .map(|axis| AxisCalibration::new(axis.id, axis.observed_to_calibration()))
            .collect()
    }

    /// Collapses the observed range of every axis onto its current value.
    pub fn reset_observed(&mut self) {
        for axis in &mut self.axes {
            axis.reset_observed();
        }
    }

    /// Applies a batch of calibrations to the device.
    ///
    /// Every entry is checked before anything is sent, so an unknown axis or
    /// an invalid tuple leaves the device untouched. Each accepted entry goes
    /// to evdev and is staged for joydev; joydev is updated once at the end.
    /// If evdev rejects an entry the batch stops there, and joydev is still
    /// updated for the entries evdev already took.
    ///
    /// # Errors
    ///
    /// - `UnknownAxis`: an entry names an axis the device lacks
    /// - `Calibration`: an entry violates the tuple invariants
    /// - `Channel`: the device rejected an update
    pub fn configure(&mut self, entries: &[AxisCalibration]) -> Result<()> {
        let mut targets = Vec::with_capacity(entries.len());
        for entry in entries {
            let index = self
                .axis_index
                .lookup(entry.axis)
                .ok_or(JoycalError::UnknownAxis(entry.axis))?;
            entry.calibration.validate()?;
            targets.push((index, entry));
        }

        let mut applied = 0;
        let mut outcome = Ok(());
        for (index, entry) in targets {
            if let Some(axis) = self.axes.get_mut(index) {
                if let Err(e) = axis.apply(&mut self.channel, entry.calibration) {
                    outcome = Err(e);
                    break;
                }
            }
            applied += 1;

            if let Some(joystick) = &mut self.joystick {
                match joystick.set(entry.axis, &entry.calibration) {
                    Ok(true) => {}
                    Ok(false) => debug!("Axis {} has no joystick counterpart", entry.axis),
                    Err(e) => warn!("Joystick correction skipped for axis {}: {}", entry.axis, e),
                }
            }
        }

        // joydev follows whatever evdev accepted, even when the batch stopped early
        if let Some(joystick) = &mut self.joystick {
            if applied > 0 {
                if let Err(e) = joystick.activate() {
                    match outcome {
                        Ok(()) => outcome = Err(e),
                        Err(_) => warn!("Joystick update after failed batch: {}", e),
                    }
                }
            }
        }

        match &outcome {
            Ok(()) => info!("Applied {} calibration entries to {}", applied, self.identity),
            Err(e) => warn!(
                "Applied {} of {} calibration entries to {}: {}",
                applied,
                entries.len(),
                self.identity,
                e
            ),
        }
        outcome
    }

    /// Pushes the in-memory calibration of every axis to the device.
    ///
    /// # Errors
    ///
    /// Same as [`Device::configure`].
    pub fn calibrate(&mut self) -> Result<()> {
        let entries = self.current_calibrations();
        self.configure(&entries)
    }
}

impl Device<EvdevChannel> {
    /// Opens the event node at `path` and, when enabled, its joydev sibling.
    ///
    /// A joydev node that cannot be found or opened is logged and skipped.
    ///
    /// # Errors
    ///
    /// Fails like [`EvdevChannel::open`] and [`Device::new`].
    pub fn open(path: &Path, joystick: &JoystickConfig) -> Result<Self> {
        let device = Self::new(EvdevChannel::open(path)?)?;
        if !joystick.enabled {
            return Ok(device);
        }

        let js_path = match device.channel.rdev() {
            Ok(rdev) => joydev_for_rdev(rdev, &joystick.sysfs_char_dir, &joystick.input_dir),
            Err(e) => {
                debug!("No device number for {}: {}", path.display(), e);
                None
            }
        };
        let Some(js_path) = js_path else {
            debug!("No joystick node for {}", path.display());
            return Ok(device);
        };

        match JoystickCorrection::open(&js_path) {
            Ok(correction) => {
                info!("Using joystick node {}", js_path.display());
                Ok(device.with_joystick(correction))
            }
            Err(e) => {
                warn!("Joystick node {} unavailable: {}", js_path.display(), e);
                Ok(device)
            }
        }
    }
}
