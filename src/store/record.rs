//! Row encoding for the calibration table.
//!
//! Keys are the big-endian bytes of `(bus, vendor, product, axis)`, so the
//! tree's byte order equals tuple order and a device's rows share a 6-byte
//! prefix. Values are the calibration tuple as JSON.

use crate::controller::calibration::Calibration;
use crate::controller::channel::DeviceIdentity;
use crate::error::{JoycalError, Result};

pub(crate) const PREFIX_LEN: usize = 6;
pub(crate) const KEY_LEN: usize = PREFIX_LEN + 2;

pub(crate) fn device_prefix(device: &DeviceIdentity) -> [u8; PREFIX_LEN] {
    let mut prefix = [0u8; PREFIX_LEN];
    prefix[0..2].copy_from_slice(&device.bus.to_be_bytes());
    prefix[2..4].copy_from_slice(&device.vendor.to_be_bytes());
    prefix[4..6].copy_from_slice(&device.product.to_be_bytes());
    prefix
}

pub(crate) fn encode_key(device: &DeviceIdentity, axis: u16) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    key[..PREFIX_LEN].copy_from_slice(&device_prefix(device));
    key[PREFIX_LEN..].copy_from_slice(&axis.to_be_bytes());
    key
}

pub(crate) fn decode_key(key: &[u8]) -> Result<(DeviceIdentity, u16)> {
    let key: &[u8; KEY_LEN] = key.try_into().map_err(|_| {
        JoycalError::Record(format!("key has {} bytes, expected {}", key.len(), KEY_LEN))
    })?;

    let field = |at: usize| u16::from_be_bytes([key[at], key[at + 1]]);
    Ok((DeviceIdentity::new(field(0), field(2), field(4)), field(6)))
}

pub(crate) fn encode_value(calibration: &Calibration) -> Result<Vec<u8>> {
    serde_json::to_vec(calibration).map_err(|e| JoycalError::Record(e.to_string()))
}

pub(crate) fn decode_value(value: &[u8]) -> Result<Calibration> {
    serde_json::from_slice(value).map_err(|e| JoycalError::Record(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let device = DeviceIdentity::new(3, 0x045e, 0x028e);
        assert_eq!(encode_key(&device, 2), [0, 3, 0x04, 0x5e, 0x02, 0x8e, 0, 2]);
        assert!(encode_key(&device, 0x3f).starts_with(&device_prefix(&device)));
    }

    #[test]
    fn test_key_order_follows_tuple_order() {
        let keys = [
            encode_key(&DeviceIdentity::new(3, 0x045e, 0x028e), 1),
            encode_key(&DeviceIdentity::new(3, 0x045e, 0x028e), 0x10),
            encode_key(&DeviceIdentity::new(3, 0x045e, 0x028f), 0),
            encode_key(&DeviceIdentity::new(3, 0x8000, 0x0001), 0),
            encode_key(&DeviceIdentity::new(5, 0x0001, 0x0001), 0),
        ];
        assert!(keys.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_decode_key() {
        let device = DeviceIdentity::new(5, 0xffff, 0x8000);
        assert_eq!(decode_key(&encode_key(&device, 0x28)).unwrap(), (device, 0x28));
        assert!(matches!(decode_key(&[0, 3, 0]), Err(JoycalError::Record(_))));
    }

    #[test]
    fn test_value_encoding() {
        let cal = Calibration::new(-255, 255, 10, 5);
        let bytes = encode_value(&cal).unwrap();
        assert_eq!(bytes, br#"{"min":-255,"max":255,"fuzz":10,"flat":5}"#);
        assert!(matches!(decode_value(b"{\"min\":1}"), Err(JoycalError::Record(_))));
    }
}
