//! # Calibration Values
//!
//! Text form of calibration tuples as used on the command line and in the
//! database listing: comma separated integers, five per axis, in the order
//! `axis,min,max,fuzz,flat`.
//!
//! ```
//! use joycal::capability::{AxisKind, BitSet, CapabilityIndex};
//! use joycal::values::{format_values, parse_values};
//!
//! let axes = CapabilityIndex::<AxisKind>::from_bitmap(&BitSet::from_ids(64, [0, 1, 2]));
//! let entries = parse_values("2,-255,255,10,5", &axes)?;
//!
//! assert_eq!(entries[0].axis, 2);
//! assert_eq!(entries[0].calibration.min, -255);
//! assert_eq!(format_values(&entries), "2,-255,255,10,5");
//! # Ok::<(), joycal::error::JoycalError>(())
//! ```

use crate::capability::{AxisKind, CapabilityIndex};
use crate::controller::calibration::{AxisCalibration, Calibration};
use crate::controller::channel::DeviceIdentity;
use crate::error::{JoycalError, Result};

/// Integers per axis tuple.
pub const VALUES_PER_AXIS: usize = 5;

fn invalid(message: impl Into<String>) -> JoycalError {
    JoycalError::InvalidValues(message.into())
}

/// Parses one field: decimal with optional sign, or hexadecimal with `0x`.
fn parse_number(field: &str) -> Result<i64> {
    let field = field.trim();
    let (negative, unsigned) = match field.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, field.strip_prefix('+').unwrap_or(field)),
    };
    let is_sign = |c: char| c == '-' || c == '+';

    let magnitude = match unsigned
        .strip_prefix("0x")
        .or_else(|| unsigned.strip_prefix("0X"))
    {
        Some(hex) if !hex.starts_with(is_sign) => i64::from_str_radix(hex, 16).ok(),
        None if !unsigned.starts_with(is_sign) => unsigned.parse::<i64>().ok(),
        _ => None,
    };

    magnitude
        .map(|value| if negative { -value } else { value })
        .ok_or_else(|| invalid(format!("Invalid number format: '{}'", field)))
}

fn to_i32(value: i64) -> Result<i32> {
    i32::try_from(value).map_err(|_| invalid(format!("Value {} is out of range", value)))
}

/// Parses calibration tuples for a device with the given axes.
///
/// # Errors
///
/// - `InvalidValues`: empty input, a non-numeric field, a value count that is
///   not a multiple of five, or more tuples than the device has axes
/// - `UnknownAxis`: a tuple names an axis the device lacks
/// - `Calibration`: a tuple violates the range/fuzz/flat invariants
pub fn parse_values(
    text: &str,
    axes: &CapabilityIndex<AxisKind>,
) -> Result<Vec<AxisCalibration>> {
    let text = text.trim();
    if text.is_empty() {
        return Err(invalid("No values given"));
    }

    let numbers = text
        .split(',')
        .map(parse_number)
        .collect::<Result<Vec<_>>>()?;

    if numbers.len() > axes.len() * VALUES_PER_AXIS {
        return Err(invalid(format!(
            "Too many values given: {} for {} axes",
            numbers.len(),
            axes.len()
        )));
    }
    if numbers.len() % VALUES_PER_AXIS != 0 {
        return Err(invalid(format!(
            "Values must come in groups of {}, got {}",
            VALUES_PER_AXIS,
            numbers.len()
        )));
    }

    numbers
        .chunks_exact(VALUES_PER_AXIS)
        .map(|chunk| {
            let axis = u16::try_from(chunk[0])
                .map_err(|_| invalid(format!("Invalid axis id {}", chunk[0])))?;
            if !axes.contains(axis) {
                return Err(JoycalError::UnknownAxis(axis));
            }

            let calibration = Calibration::new(
                to_i32(chunk[1])?,
                to_i32(chunk[2])?,
                to_i32(chunk[3])?,
                to_i32(chunk[4])?,
            );
            calibration.validate()?;
            Ok(AxisCalibration::new(axis, calibration))
        })
        .collect()
}

/// Formats tuples as `axis,min,max,fuzz,flat[,...]`.
#[must_use]
pub fn format_values(entries: &[AxisCalibration]) -> String {
    entries
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// One line of the database listing: `bbbb:vvvv:pppp = a,min,max,fuzz,flat,...`.
#[must_use]
pub fn format_listing(device: &DeviceIdentity, entries: &[AxisCalibration]) -> String {
    format!("{} = {}", device, format_values(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{BitSet, ABS_CNT};
    use crate::controller::calibration::CalibrationError;

    fn axes(ids: &[usize]) -> CapabilityIndex<AxisKind> {
        CapabilityIndex::from_bitmap(&BitSet::from_ids(ABS_CNT, ids.iter().copied()))
    }

    // ==================== Parse Tests ====================

    #[test]
    fn test_parse_single_tuple() {
        let entries = parse_values("2,-255,255,10,5", &axes(&[0, 1, 2])).unwrap();
        assert_eq!(
            entries,
            vec![AxisCalibration::new(2, Calibration::new(-255, 255, 10, 5))]
        );
    }

    #[test]
    fn test_parse_multiple_tuples_keeps_order() {
        let entries = parse_values("1,0,255,0,15, 0,0,1023,4,16", &axes(&[0, 1])).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].axis, 1);
        assert_eq!(entries[1].axis, 0);
        assert_eq!(entries[1].calibration, Calibration::new(0, 1023, 4, 16));
    }

    #[test]
    fn test_parse_hex_values() {
        let entries = parse_values("0x10,-0x1,0x1,0,0", &axes(&[0x10])).unwrap();
        assert_eq!(entries[0].axis, 0x10);
        assert_eq!(entries[0].calibration, Calibration::new(-1, 1, 0, 0));
    }

    #[test]
    fn test_parse_short_tuple_rejected() {
        let err = parse_values("2,255,2,15", &axes(&[0, 1, 2])).unwrap_err();
        assert!(matches!(err, JoycalError::InvalidValues(_)));
    }

    #[test]
    fn test_parse_empty_rejected() {
        assert!(matches!(
            parse_values("", &axes(&[0])),
            Err(JoycalError::InvalidValues(_))
        ));
        assert!(matches!(
            parse_values("   ", &axes(&[0])),
            Err(JoycalError::InvalidValues(_))
        ));
    }

    #[test]
    fn test_parse_non_numeric_rejected() {
        for text in ["0,abc,255,0,0", "0,,255,0,0", "0,1.5,255,0,0", "0,--1,255,0,0", "0,0x,5,0,0"] {
            assert!(
                matches!(parse_values(text, &axes(&[0])), Err(JoycalError::InvalidValues(_))),
                "{text}"
            );
        }
    }

    #[test]
    fn test_parse_too_many_tuples_rejected() {
        let err = parse_values("0,0,255,0,0,0,0,255,0,0", &axes(&[0])).unwrap_err();
        assert!(matches!(err, JoycalError::InvalidValues(_)));
    }

    #[test]
    fn test_parse_unknown_axis_rejected() {
        let err = parse_values("5,0,255,0,0", &axes(&[0, 1, 2])).unwrap_err();
        assert!(matches!(err, JoycalError::UnknownAxis(5)));
    }

    #[test]
    fn test_parse_negative_axis_rejected() {
        let err = parse_values("-1,0,255,0,0", &axes(&[0])).unwrap_err();
        assert!(matches!(err, JoycalError::InvalidValues(_)));
    }

    #[test]
    fn test_parse_invalid_calibration_rejected() {
        let err = parse_values("0,255,0,0,0", &axes(&[0])).unwrap_err();
        assert!(matches!(
            err,
            JoycalError::Calibration(CalibrationError::InvalidRange { min: 255, max: 0 })
        ));

        // flat one over half range
        let err = parse_values("0,0,100,0,51", &axes(&[0])).unwrap_err();
        assert!(matches!(
            err,
            JoycalError::Calibration(CalibrationError::FlatOutOfRange { .. })
        ));
    }

    #[test]
    fn test_parse_accepts_half_range_boundary() {
        assert!(parse_values("0,0,100,50,50", &axes(&[0])).is_ok());
    }

    #[test]
    fn test_parse_value_out_of_i32_range() {
        let err = parse_values("0,0,4294967296,0,0", &axes(&[0])).unwrap_err();
        assert!(matches!(err, JoycalError::InvalidValues(_)));
    }

    // ==================== Format Tests ====================

    #[test]
    fn test_format_values() {
        let entries = [
            AxisCalibration::new(0, Calibration::new(0, 255, 0, 15)),
            AxisCalibration::new(1, Calibration::new(-32768, 32767, 16, 128)),
        ];
        assert_eq!(format_values(&entries), "0,0,255,0,15,1,-32768,32767,16,128");
        assert_eq!(format_values(&[]), "");
    }

    #[test]
    fn test_format_listing() {
        let device = DeviceIdentity::new(3, 0x45e, 0x28e);
        let entries = [AxisCalibration::new(2, Calibration::new(-255, 255, 10, 5))];
        assert_eq!(format_listing(&device, &entries), "0003:045e:028e = 2,-255,255,10,5");
    }
}
