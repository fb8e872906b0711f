use serde::{Deserialize, Serialize};
use std::fmt;

/// A peripheral seen while scanning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub name: String,
    pub address: String,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.address)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanState {
    #[default]
    NotScanning,
    Scanning,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectState {
    #[default]
    NoDevice,
    DeviceSelected,
    Connected,
    NotConnected,
}

/// LED output level as understood by the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LedLevel {
    #[serde(rename = "H")]
    High,
    #[default]
    #[serde(rename = "L")]
    Low,
}

/// Outgoing control payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LedData {
    #[serde(rename = "LED")]
    pub led: LedLevel,
    #[serde(rename = "LEDBlinken")]
    pub led_blinken: bool,
}

/// Incoming telemetry payload
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Esp32Data {
    pub ledstatus: String,
    #[serde(rename = "potiArray")]
    pub poti_array: Vec<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub enum AppEvent {
    DeviceFound(Device),
    ScanState(ScanState),
    ConnectState(ConnectState),
    Telemetry(Esp32Data),
    LogMessage(StatusMessage),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BluetoothCommand {
    StartScan,
    StopScan,
    Connect(String),
    Disconnect,
    SendLedData(LedData),
    StartDataLoad,
    CancelDataLoad,
}

#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

impl StatusMessage {
    pub fn new(message: impl Into<String>, severity: MessageSeverity) -> Self {
        Self {
            message: message.into(),
            severity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_display() {
        let device = Device {
            name: "ESP32".to_string(),
            address: "24:6F:28:AA:BB:CC".to_string(),
        };
        assert_eq!(device.to_string(), "ESP32: 24:6F:28:AA:BB:CC");
    }

    #[test]
    fn test_defaults_are_benign() {
        let led = LedData::default();
        assert_eq!(led.led, LedLevel::Low);
        assert!(!led.led_blinken);

        let data = Esp32Data::default();
        assert!(data.ledstatus.is_empty());
        assert!(data.poti_array.is_empty());
        assert_eq!(ConnectState::default(), ConnectState::NoDevice);
        assert_eq!(ScanState::default(), ScanState::NotScanning);
    }

    #[test]
    fn test_poti_array_keeps_reading_text() {
        let data: Esp32Data =
            serde_json::from_str(r#"{"ledstatus":"on","potiArray":[12, 4095, 1.5]}"#).unwrap();
        let text: Vec<String> = data.poti_array.iter().map(|n| n.to_string()).collect();
        assert_eq!(text, vec!["12", "4095", "1.5"]);
    }
}
