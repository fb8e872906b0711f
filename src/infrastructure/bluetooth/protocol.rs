//! ESP32 Control Protocol
//!
//! This module contains the protocol definitions for talking to the ESP32
//! firmware: the custom service/characteristic pair and the JSON payloads
//! exchanged over it.
//!
//! ```text
//! outbound (write with response):  {"LED":"H","LEDBlinken":false}
//! inbound  (notification):         {"ledstatus":"...","potiArray":[...]}
//! ```
//!
//! Both payloads travel as raw UTF-8 text in a single characteristic value.

use crate::domain::models::{Esp32Data, LedData};
use btleplug::api::BDAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{trace, warn};
use uuid::Uuid;

/// Custom service exposed by the ESP32 firmware
pub const SERVICE_UUID: &str = "0000FFE0-0000-1000-8000-00805F9B34FB";

/// Characteristic used for both commands and telemetry notifications
pub const CHARACTERISTIC_UUID: &str = "0000FFE1-0000-1000-8000-00805F9B34FB";

/// How long a scan runs before stopping on its own
pub const SCAN_DURATION: Duration = Duration::from_secs(10);

/// Upper bound for a disconnect request
pub const DISCONNECT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Length of a colon-separated link-layer address, e.g. `24:6F:28:AA:BB:CC`
pub const ADDRESS_LEN: usize = 17;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("selection '{0}' is too short to contain a device address")]
    SelectionTooShort(String),
    #[error("invalid device address '{0}'")]
    InvalidAddress(String),
    #[error("invalid UUID '{0}'")]
    InvalidUuid(String),
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Encode the control payload as compact JSON
pub fn encode_led_data(led_data: &LedData) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(led_data)?)
}

/// Decode a telemetry notification.
///
/// Malformed payloads are logged and decoded as [`Esp32Data::default`].
pub fn decode_esp32_data(bytes: &[u8]) -> Esp32Data {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            warn!("Error decoding JSON: payload is not UTF-8: {}", e);
            return Esp32Data::default();
        }
    };
    trace!("msg in: {}", text);

    match serde_json::from_str::<Esp32Data>(text) {
        Ok(data) => data,
        Err(e) => {
            warn!("Error decoding JSON: {}", e);
            Esp32Data::default()
        }
    }
}

/// Extract the device address from the end of a selection string such as
/// `"ESP32: 24:6F:28:AA:BB:CC"`.
pub fn parse_address(selection: &str) -> Result<BDAddr, ProtocolError> {
    let start = selection
        .char_indices()
        .rev()
        .nth(ADDRESS_LEN - 1)
        .map(|(i, _)| i)
        .ok_or_else(|| ProtocolError::SelectionTooShort(selection.to_string()))?;

    let address = &selection[start..];
    BDAddr::from_str(address).map_err(|_| ProtocolError::InvalidAddress(address.to_string()))
}

/// Address shown for a discovered peripheral.
///
/// CoreBluetooth hides link-layer addresses and reports all zeros, so the
/// platform peripheral id is used there instead.
pub fn device_address(address: BDAddr, peripheral_id: &str) -> String {
    if address == BDAddr::default() {
        peripheral_id.to_string()
    } else {
        address.to_string()
    }
}

/// Address to connect to for a selection string.
///
/// Accepts a trailing link-layer address or, after the last `": "`, a
/// peripheral id in UUID form.
pub fn selection_address(selection: &str) -> Result<String, ProtocolError> {
    match parse_address(selection) {
        Ok(address) => Ok(address.to_string()),
        Err(e) => selection
            .rsplit_once(": ")
            .map(|(_, id)| id.trim())
            .filter(|id| Uuid::parse_str(id).is_ok())
            .map(str::to_string)
            .ok_or(e),
    }
}

/// Parse a UUID string from settings
pub fn parse_uuid(uuid_str: &str) -> Result<Uuid, ProtocolError> {
    Uuid::parse_str(uuid_str.trim()).map_err(|_| ProtocolError::InvalidUuid(uuid_str.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::LedLevel;

    #[test]
    fn test_encode_led_data() {
        let json = encode_led_data(&LedData {
            led: LedLevel::High,
            led_blinken: true,
        })
        .unwrap();
        assert_eq!(json, r#"{"LED":"H","LEDBlinken":true}"#);

        let json = encode_led_data(&LedData::default()).unwrap();
        assert_eq!(json, r#"{"LED":"L","LEDBlinken":false}"#);
    }

    #[test]
    fn test_decode_esp32_data() {
        let data = decode_esp32_data(br#"{"ledstatus":"LED aus","potiArray":[0,512,4095]}"#);
        assert_eq!(data.ledstatus, "LED aus");
        let readings: Vec<u64> = data.poti_array.iter().filter_map(|n| n.as_u64()).collect();
        assert_eq!(readings, vec![0, 512, 4095]);
    }

    #[test]
    fn test_decode_ignores_extra_keys() {
        let data = decode_esp32_data(br#"{"ledstatus":"x","potiArray":[],"uptime":12}"#);
        assert_eq!(data.ledstatus, "x");
        assert!(data.poti_array.is_empty());
    }

    #[test]
    fn test_decode_keeps_status_with_mixed_readings() {
        let data = decode_esp32_data(br#"{"ledstatus":"LED an","potiArray":[1,"2",null]}"#);
        assert_eq!(data.ledstatus, "LED an");
        assert_eq!(
            data.poti_array,
            vec![serde_json::json!(1), serde_json::json!("2"), serde_json::Value::Null]
        );
    }

    #[test]
    fn test_decode_malformed_falls_back_to_default() {
        assert_eq!(decode_esp32_data(b"not json"), Esp32Data::default());
        assert_eq!(decode_esp32_data(&[0xff, 0xfe]), Esp32Data::default());
        assert_eq!(
            decode_esp32_data(br#"{"potiArray":[1,2]}"#),
            Esp32Data::default()
        );
        assert_eq!(
            decode_esp32_data(br#"{"ledstatus":"on","potiArray":"1,2"}"#),
            Esp32Data::default()
        );
    }

    #[test]
    fn test_parse_address() {
        let addr = parse_address("ESP32: 24:6F:28:AA:BB:CC").unwrap();
        assert_eq!(addr.to_string(), "24:6F:28:AA:BB:CC");

        let addr = parse_address("24:6f:28:aa:bb:cc").unwrap();
        assert_eq!(addr.to_string(), "24:6F:28:AA:BB:CC");
    }

    #[test]
    fn test_parse_address_errors() {
        assert!(matches!(
            parse_address("ESP32"),
            Err(ProtocolError::SelectionTooShort(_))
        ));
        assert!(matches!(
            parse_address("Ünknown: not-an-address-at-all"),
            Err(ProtocolError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_device_address_falls_back_to_peripheral_id() {
        let id = "5f2c1b9e-8a43-4d8e-9b1a-0c6f3e2d7a10";
        assert_eq!(device_address(BDAddr::default(), id), id);

        let addr = BDAddr::from([0x24, 0x6f, 0x28, 0xaa, 0xbb, 0xcc]);
        assert_eq!(device_address(addr, id), "24:6F:28:AA:BB:CC");
    }

    #[test]
    fn test_selection_address() {
        assert_eq!(
            selection_address("ESP32: 24:6F:28:AA:BB:CC").unwrap(),
            "24:6F:28:AA:BB:CC"
        );
        assert_eq!(
            selection_address("ESP32: 5f2c1b9e-8a43-4d8e-9b1a-0c6f3e2d7a10").unwrap(),
            "5f2c1b9e-8a43-4d8e-9b1a-0c6f3e2d7a10"
        );
        assert!(selection_address("ESP32: not an address at all").is_err());
        assert!(selection_address("bogus").is_err());
    }

    #[test]
    fn test_parse_uuid() {
        let uuid = parse_uuid(CHARACTERISTIC_UUID).unwrap();
        assert_eq!(uuid, Uuid::from_u128(0x0000ffe1_0000_1000_8000_00805f9b34fb));
        assert!(parse_uuid("ffe1").is_err());
    }
}
