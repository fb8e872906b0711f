//! Session state
//!
//! Holds everything the front end shows and turns user intents into
//! [`BluetoothCommand`]s for the BLE worker. No I/O happens here.

use crate::domain::models::{
    AppEvent, BluetoothCommand, ConnectState, Device, Esp32Data, LedData, LedLevel, ScanState,
};
use crate::infrastructure::bluetooth::protocol::{self, ProtocolError};
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct Session {
    device_list: Vec<Device>,
    device_selected: String,
    scan_state: ScanState,
    connect_state: ConnectState,
    led_data: LedData,
    esp32_data: Esp32Data,
    data_visible: bool,
    data_loading: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device_list(&self) -> &[Device] {
        &self.device_list
    }

    /// Add a discovered device unless its address is already listed
    pub fn add_device(&mut self, device: Device) {
        if !self.device_list.iter().any(|d| d.address == device.address) {
            debug!("Discovered {}", device);
            self.device_list.push(device);
        }
    }

    pub fn device_selected(&self) -> &str {
        &self.device_selected
    }

    pub fn set_device_selected(&mut self, selection: impl Into<String>) {
        self.device_selected = selection.into();
        self.connect_state = ConnectState::DeviceSelected;
        info!("Device selected: {}", self.device_selected);
    }

    /// Address (or platform peripheral id) at the end of the selection string
    pub fn selected_address(&self) -> Result<String, ProtocolError> {
        protocol::selection_address(&self.device_selected)
    }

    pub fn scan_state(&self) -> ScanState {
        self.scan_state
    }

    pub fn connect_state(&self) -> ConnectState {
        self.connect_state
    }

    pub fn led_data(&self) -> LedData {
        self.led_data
    }

    pub fn esp32_data(&self) -> &Esp32Data {
        &self.esp32_data
    }

    pub fn data_visible(&self) -> bool {
        self.data_visible
    }

    pub fn data_loading(&self) -> bool {
        self.data_loading
    }

    pub fn start_scan(&mut self) -> Option<BluetoothCommand> {
        if self.scan_state == ScanState::Scanning {
            debug!("Scan already in progress");
            return None;
        }
        self.scan_state = ScanState::Scanning;
        Some(BluetoothCommand::StartScan)
    }

    pub fn stop_scan(&mut self) -> BluetoothCommand {
        self.scan_state = ScanState::NotScanning;
        BluetoothCommand::StopScan
    }

    /// Build a connect request for the selected device.
    ///
    /// Returns `Ok(None)` when nothing has been selected yet.
    pub fn connect(&self) -> Result<Option<BluetoothCommand>, ProtocolError> {
        if self.connect_state == ConnectState::NoDevice {
            debug!("No device selected, returning early.");
            return Ok(None);
        }
        let address = self.selected_address()?;
        info!("Connect requested for {}", address);
        Ok(Some(BluetoothCommand::Connect(address)))
    }

    pub fn disconnect(&self) -> BluetoothCommand {
        BluetoothCommand::Disconnect
    }

    pub fn set_led(&mut self, on: bool) -> BluetoothCommand {
        self.led_data.led = if on { LedLevel::High } else { LedLevel::Low };
        BluetoothCommand::SendLedData(self.led_data)
    }

    pub fn set_blink(&mut self, on: bool) -> BluetoothCommand {
        self.led_data.led_blinken = on;
        BluetoothCommand::SendLedData(self.led_data)
    }

    pub fn start_data_load(&mut self) -> BluetoothCommand {
        self.data_visible = true;
        self.data_loading = true;
        BluetoothCommand::StartDataLoad
    }

    /// Telemetry stays visible with its last value after cancelling
    pub fn cancel_data_load(&mut self) -> BluetoothCommand {
        self.data_loading = false;
        BluetoothCommand::CancelDataLoad
    }

    /// Fold a worker event into the session
    pub fn apply(&mut self, event: &AppEvent) {
        match event {
            AppEvent::DeviceFound(device) => self.add_device(device.clone()),
            AppEvent::ScanState(state) => self.scan_state = *state,
            AppEvent::ConnectState(state) => self.connect_state = *state,
            AppEvent::Telemetry(data) => self.esp32_data = data.clone(),
            AppEvent::LogMessage(_) => {}
        }
    }

    pub fn connect_state_text(&self) -> &'static str {
        match self.connect_state {
            ConnectState::Connected => "connected",
            ConnectState::NotConnected => "not connected",
            ConnectState::NoDevice => "no selected device",
            ConnectState::DeviceSelected => "connecting",
        }
    }

    pub fn connect_enabled(&self) -> bool {
        matches!(
            self.connect_state,
            ConnectState::NotConnected | ConnectState::DeviceSelected
        )
    }

    pub fn disconnect_enabled(&self) -> bool {
        self.connect_state == ConnectState::Connected
    }
}
