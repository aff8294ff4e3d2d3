//! # Capability Names
//!
//! Static tables mapping kernel ids to the short names used in prompts and
//! logs, plus the classification of force-feedback ids.
//!
//! | Axis | Code | | Effect | Code |
//! |------|------|-|--------|------|
//! | X / Y / Z | 0x00-0x02 | | RUMBLE | 0x50 |
//! | RX / RY / RZ | 0x03-0x05 | | PERIODIC | 0x51 |
//! | THROTTLE .. BRAKE | 0x06-0x0a | | CONSTANT | 0x52 |
//! | HAT0X .. HAT3Y | 0x10-0x17 | | GAIN | 0x60 |
//! | PRESSURE .. TOOL_WIDTH | 0x18-0x1c | | AUTOCENTER | 0x61 |

/// Name reported for ids missing from the tables.
pub const UNKNOWN_NAME: &str = "UNKNOWN";

const AXIS_NAMES: &[(u16, &str)] = &[
    (0x00, "X"),
    (0x01, "Y"),
    (0x02, "Z"),
    (0x03, "RX"),
    (0x04, "RY"),
    (0x05, "RZ"),
    (0x06, "THROTTLE"),
    (0x07, "RUDDER"),
    (0x08, "WHEEL"),
    (0x09, "GAS"),
    (0x0a, "BRAKE"),
    (0x10, "HAT0X"),
    (0x11, "HAT0Y"),
    (0x12, "HAT1X"),
    (0x13, "HAT1Y"),
    (0x14, "HAT2X"),
    (0x15, "HAT2Y"),
    (0x16, "HAT3X"),
    (0x17, "HAT3Y"),
    (0x18, "PRESSURE"),
    (0x19, "DISTANCE"),
    (0x1a, "TILT_X"),
    (0x1b, "TILT_Y"),
    (0x1c, "TOOL_WIDTH"),
    (0x20, "VOLUME"),
    (0x28, "MISC"),
];

const EFFECT_NAMES: &[(u16, &str)] = &[
    (0x50, "RUMBLE"),
    (0x51, "PERIODIC"),
    (0x52, "CONSTANT"),
    (0x53, "SPRING"),
    (0x54, "FRICTION"),
    (0x55, "DAMPER"),
    (0x56, "INERTIA"),
    (0x57, "RAMP"),
    (0x58, "SQUARE"),
    (0x59, "TRIANGLE"),
    (0x5a, "SINE"),
    (0x5b, "SAW_UP"),
    (0x5c, "SAW_DOWN"),
    (0x5d, "CUSTOM"),
    (0x60, "GAIN"),
    (0x61, "AUTOCENTER"),
];

const FF_RUMBLE: u16 = 0x50;
const FF_PERIODIC: u16 = 0x51;
const FF_CONSTANT: u16 = 0x52;
const FF_GAIN: u16 = 0x60;
const FF_AUTOCENTER: u16 = 0x61;

/// How a force-feedback id would be driven. Playback itself is not modeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectClass {
    /// Device-wide property set by a single value (gain, autocenter).
    Property,
    /// Constant force effect.
    Constant,
    /// Two-motor rumble effect.
    Rumble,
    /// Periodic waveform effect.
    Periodic,
    /// Waveforms and conditions without a dedicated class.
    Unknown,
}

fn lookup(table: &[(u16, &'static str)], id: u16) -> &'static str {
    table
        .iter()
        .find(|(code, _)| *code == id)
        .map_or(UNKNOWN_NAME, |&(_, name)| name)
}

/// Short name of an absolute axis id, e.g. `"RX"` for `ABS_RX`.
#[must_use]
pub fn axis_name(id: u16) -> &'static str {
    lookup(AXIS_NAMES, id)
}

/// Short name of a force-feedback id, e.g. `"RUMBLE"` for `FF_RUMBLE`.
#[must_use]
pub fn effect_name(id: u16) -> &'static str {
    lookup(EFFECT_NAMES, id)
}

/// Classifies a force-feedback id.
#[must_use]
pub fn effect_class(id: u16) -> EffectClass {
    match id {
        FF_GAIN | FF_AUTOCENTER => EffectClass::Property,
        FF_CONSTANT => EffectClass::Constant,
        FF_RUMBLE => EffectClass::Rumble,
        FF_PERIODIC => EffectClass::Periodic,
        _ => EffectClass::Unknown,
    }
}
