//! # Capability Module
//!
//! Discovery of what a device exposes: absolute axes, keys/buttons and
//! force-feedback effects.
//!
//! This module handles:
//! - Packed capability bitmaps as reported by the kernel
//! - Dense indexing of discovered capabilities with O(1) id lookup
//! - Human readable names for axis and effect ids

pub mod bitset;
pub mod index;
pub mod names;

pub use bitset::BitSet;
pub use index::{CapabilityIndex, CapabilityRecord};

/// Number of absolute axis ids (`ABS_CNT`).
pub const ABS_CNT: usize = 0x40;

/// Number of key ids (`KEY_CNT`).
pub const KEY_CNT: usize = 0x300;

/// Number of force-feedback ids (`FF_CNT`).
pub const FF_CNT: usize = 0x80;

/// Capability classes a device channel can be queried for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityClass {
    /// Absolute axes (`EV_ABS`).
    Axis,
    /// Keys and buttons (`EV_KEY`).
    Button,
    /// Force-feedback effects (`EV_FF`).
    Effect,
}

impl CapabilityClass {
    /// Size of the id domain for this class.
    #[must_use]
    pub const fn domain(self) -> usize {
        match self {
            CapabilityClass::Axis => ABS_CNT,
            CapabilityClass::Button => KEY_CNT,
            CapabilityClass::Effect => FF_CNT,
        }
    }
}

/// Type-level marker tying an index to one capability class.
pub trait CapabilityKind {
    /// Class this marker stands for.
    const CLASS: CapabilityClass;
}

/// Marker for absolute axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AxisKind;

/// Marker for keys and buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ButtonKind;

/// Marker for force-feedback effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EffectKind;

impl CapabilityKind for AxisKind {
    const CLASS: CapabilityClass = CapabilityClass::Axis;
}

impl CapabilityKind for ButtonKind {
    const CLASS: CapabilityClass = CapabilityClass::Button;
}

impl CapabilityKind for EffectKind {
    const CLASS: CapabilityClass = CapabilityClass::Effect;
}
