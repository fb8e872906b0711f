//! Text rendering of the session state

use crate::domain::models::{LedLevel, MessageSeverity, ScanState, StatusMessage};
use crate::domain::session::Session;
use std::fmt::Write;

pub fn render_devices(session: &Session) -> String {
    if session.device_list().is_empty() {
        return "No devices found. Run 'scan' first.".to_string();
    }
    let mut out = String::new();
    for (i, device) in session.device_list().iter().enumerate() {
        let _ = writeln!(out, "[{}] {}", i, device);
    }
    out.trim_end().to_string()
}

pub fn render_status(session: &Session) -> String {
    let mut out = String::new();

    let header = if session.device_selected().is_empty() {
        "No selected device"
    } else {
        session.device_selected()
    };
    let _ = writeln!(out, "{}", header);
    let _ = writeln!(out, "  {}", session.connect_state_text());

    let scan = match session.scan_state() {
        ScanState::Scanning => "scanning",
        ScanState::NotScanning => "idle",
        ScanState::Failed => "failed",
    };
    let _ = writeln!(out, "  scan: {}", scan);

    let led = session.led_data();
    let _ = writeln!(
        out,
        "  LED switch: {}  Blink switch: {}",
        on_off(led.led == LedLevel::High),
        on_off(led.led_blinken)
    );

    if session.data_visible() {
        out.push_str(&render_telemetry(session));
    }
    out.trim_end().to_string()
}

pub fn render_telemetry(session: &Session) -> String {
    let data = session.esp32_data();
    let status = if data.ledstatus.is_empty() {
        "N/A"
    } else {
        data.ledstatus.as_str()
    };
    let readings = data
        .poti_array
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "  LED Status: {}\n  Potentiometer Array: [{}]\n",
        status, readings
    )
}

pub fn render_message(message: &StatusMessage) -> String {
    let tag = match message.severity {
        MessageSeverity::Info => "info",
        MessageSeverity::Success => "ok",
        MessageSeverity::Warning => "warn",
        MessageSeverity::Error => "error",
    };
    format!("[{}] {}", tag, message.message)
}

fn on_off(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{AppEvent, ConnectState, Device, Esp32Data};

    #[test]
    fn test_render_empty_session() {
        let session = Session::new();
        let status = render_status(&session);
        assert!(status.starts_with("No selected device"));
        assert!(status.contains("no selected device"));
        assert!(!status.contains("LED Status"));
        assert_eq!(
            render_devices(&session),
            "No devices found. Run 'scan' first."
        );
    }

    #[test]
    fn test_render_connected_with_telemetry() {
        let mut session = Session::new();
        let device = Device {
            name: "ESP32".to_string(),
            address: "24:6F:28:AA:BB:CC".to_string(),
        };
        session.apply(&AppEvent::DeviceFound(device.clone()));
        session.set_device_selected(device.to_string());
        session.apply(&AppEvent::ConnectState(ConnectState::Connected));
        session.set_led(true);
        session.start_data_load();
        session.apply(&AppEvent::Telemetry(Esp32Data {
            ledstatus: "LED an".to_string(),
            poti_array: vec![10.into(), 2048.into()],
        }));

        assert_eq!(render_devices(&session), "[0] ESP32: 24:6F:28:AA:BB:CC");

        let status = render_status(&session);
        assert!(status.starts_with("ESP32: 24:6F:28:AA:BB:CC"));
        assert!(status.contains("  connected"));
        assert!(status.contains("LED switch: on  Blink switch: off"));
        assert!(status.contains("LED Status: LED an"));
        assert!(status.contains("Potentiometer Array: [10,2048]"));
    }

    #[test]
    fn test_render_telemetry_defaults() {
        let mut session = Session::new();
        session.start_data_load();
        assert_eq!(
            render_telemetry(&session),
            "  LED Status: N/A\n  Potentiometer Array: []\n"
        );
    }
}
