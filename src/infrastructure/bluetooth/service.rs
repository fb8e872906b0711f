//! Bluetooth Service Module
//!
//! Main service that coordinates scanning, connection, and data handling
//! for the ESP32 peripheral.

use crate::domain::models::{
    AppEvent, ConnectState, LedData, MessageSeverity, ScanState, StatusMessage,
};
use crate::domain::settings::{Settings, SettingsService};
use crate::infrastructure::bluetooth::{
    connection::{BleConnection, ConnectionConfig, Esp32Link},
    protocol,
    scanner::BleScanner,
};
use anyhow::Result;
use btleplug::api::{Manager as _, Peripheral as _};
use btleplug::platform::{Adapter, Manager};
use futures::StreamExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Main Bluetooth service coordinating all BLE operations
pub struct BluetoothService {
    _manager: Option<Manager>,
    adapter: Option<Adapter>,
    scanner: Option<BleScanner>,
    link: Option<Esp32Link>,
    state_task: Option<JoinHandle<()>>,
    data_task: Option<JoinHandle<()>>,
    event_sender: mpsc::UnboundedSender<AppEvent>,
    settings: Arc<Mutex<SettingsService>>,
}

impl BluetoothService {
    /// Create a new Bluetooth service
    pub fn new(
        event_sender: mpsc::UnboundedSender<AppEvent>,
        settings: Arc<Mutex<SettingsService>>,
    ) -> Self {
        Self {
            _manager: None,
            adapter: None,
            scanner: None,
            link: None,
            state_task: None,
            data_task: None,
            event_sender,
            settings,
        }
    }

    /// Get the configured adapter, opening it on first use
    async fn adapter(&mut self) -> Result<Adapter> {
        if let Some(adapter) = &self.adapter {
            return Ok(adapter.clone());
        }

        let index = self.with_settings(|s| s.adapter_index)?;
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .nth(index)
            .ok_or_else(|| anyhow::anyhow!("Bluetooth adapter #{} not found", index))?;
        info!("Using Bluetooth adapter #{}", index);

        self._manager = Some(manager);
        self.adapter = Some(adapter.clone());
        Ok(adapter)
    }

    fn with_settings<T>(&self, f: impl FnOnce(&Settings) -> T) -> Result<T> {
        let settings = self
            .settings
            .lock()
            .map_err(|_| anyhow::anyhow!("Lock error"))?;
        Ok(f(settings.get()))
    }

    /// Start scanning for devices
    pub async fn start_scan(&mut self) -> Result<()> {
        if self.scanner.is_none() {
            if let Err(e) = self.create_scanner().await {
                let _ = self
                    .event_sender
                    .send(AppEvent::ScanState(ScanState::Failed));
                return Err(e);
            }
        }
        match self.scanner.as_mut() {
            Some(scanner) => scanner.start().await,
            None => Ok(()),
        }
    }

    async fn create_scanner(&mut self) -> Result<()> {
        let adapter = self.adapter().await?;
        let secs = self.with_settings(|s| s.scan_duration_secs)?;
        self.scanner = Some(BleScanner::new(
            adapter,
            self.event_sender.clone(),
            Duration::from_secs(secs),
        ));
        Ok(())
    }

    /// Stop scanning
    pub async fn stop_scan(&mut self) -> Result<()> {
        match self.scanner.as_mut() {
            Some(scanner) => scanner.stop().await,
            None => Ok(()),
        }
    }

    /// Connect to a device by address
    pub async fn connect(&mut self, address: &str) -> Result<()> {
        if self.link.is_some() {
            self.disconnect().await;
        }

        let adapter = self.adapter().await?;
        let config = self.with_settings(|s| ConnectionConfig {
            service_uuid: s.ble_service_uuid.clone(),
            characteristic_uuid: s.ble_characteristic_uuid.clone(),
        })?;

        let connection = BleConnection::new(adapter, self.event_sender.clone(), config);
        let peripheral = connection.find_peripheral(address).await?;

        // Start tracking before connecting so the connect event is not missed
        if let Some(task) = self.state_task.take() {
            task.abort();
        }
        self.state_task = Some(connection.watch_state(peripheral.id()).await?);

        let link = connection.connect(peripheral).await?;
        self.link = Some(link);

        let _ = self
            .event_sender
            .send(AppEvent::ConnectState(ConnectState::Connected));
        Ok(())
    }

    /// Disconnect from the current device, giving up after the configured timeout
    pub async fn disconnect(&mut self) {
        self.cancel_data_load();

        let Some(link) = self.link.take() else {
            return;
        };

        let timeout_ms = self
            .with_settings(|s| s.disconnect_timeout_ms)
            .unwrap_or(protocol::DISCONNECT_TIMEOUT.as_millis() as u64);

        match tokio::time::timeout(Duration::from_millis(timeout_ms), link.disconnect()).await {
            Ok(Ok(())) => info!("Disconnected from device"),
            Ok(Err(e)) => warn!("Disconnect failed: {}", e),
            Err(_) => warn!("Disconnect timed out after {} ms", timeout_ms),
        }

        if let Some(task) = self.state_task.take() {
            task.abort();
        }

        let _ = self.event_sender.send(AppEvent::LogMessage(StatusMessage::new(
            "Disconnected from device",
            MessageSeverity::Info,
        )));
        let _ = self
            .event_sender
            .send(AppEvent::ConnectState(ConnectState::NotConnected));
    }

    /// Send the LED control payload
    pub async fn send_led_data(&self, led_data: &LedData) -> Result<()> {
        let link = self.connected_link()?;
        let json = protocol::encode_led_data(led_data)?;
        link.send_message(&json).await
    }

    /// Start forwarding telemetry notifications as [`AppEvent::Telemetry`]
    pub async fn start_data_load(&mut self) -> Result<()> {
        self.cancel_data_load();

        let mut messages = self.connected_link()?.incoming_messages().await?;
        let sender = self.event_sender.clone();

        self.data_task = Some(tokio::spawn(async move {
            while let Some(msg) = messages.next().await {
                let data = protocol::decode_esp32_data(&msg);
                if sender.send(AppEvent::Telemetry(data)).is_err() {
                    break;
                }
            }
            info!("Telemetry stream ended");
        }));
        Ok(())
    }

    pub fn cancel_data_load(&mut self) {
        if let Some(task) = self.data_task.take() {
            task.abort();
            info!("Data load cancelled");
        }
    }

    /// Stop everything before the worker exits
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }
        self.disconnect().await;
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    fn connected_link(&self) -> Result<&Esp32Link> {
        self.link
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Not connected to a device"))
    }
}
