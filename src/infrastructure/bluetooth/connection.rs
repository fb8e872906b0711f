//! BLE Connection Module
//!
//! Handles device connection, GATT characteristic lookup, connection-state
//! tracking and messaging over the custom characteristic.

use crate::domain::models::{AppEvent, ConnectState, MessageSeverity, StatusMessage};
use crate::infrastructure::bluetooth::protocol;
use anyhow::{Context, Result};
use btleplug::api::{BDAddr, Central, CentralEvent, Characteristic, Peripheral as _, WriteType};
use btleplug::platform::{Adapter, Peripheral, PeripheralId};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::str::FromStr;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Configuration for connection behavior
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Service UUID to look for
    pub service_uuid: String,
    /// Characteristic used for commands and telemetry
    pub characteristic_uuid: String,
}

/// A connected ESP32 and its custom characteristic
pub struct Esp32Link {
    pub peripheral: Peripheral,
    pub characteristic: Characteristic,
}

impl Esp32Link {
    /// Write a text message to the characteristic, waiting for the response
    pub async fn send_message(&self, msg: &str) -> Result<()> {
        self.peripheral
            .write(&self.characteristic, msg.as_bytes(), WriteType::WithResponse)
            .await?;
        info!("sending {}", msg);
        Ok(())
    }

    /// Subscribe to the characteristic and stream raw notification payloads
    pub async fn incoming_messages(&self) -> Result<Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>> {
        let notifications = self.peripheral.notifications().await?;
        self.peripheral
            .subscribe(&self.characteristic)
            .await
            .context("Failed to subscribe to notifications")?;

        let uuid = self.characteristic.uuid;
        Ok(Box::pin(notifications.filter_map(move |n| async move {
            (n.uuid == uuid).then_some(n.value)
        })))
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

/// BLE Connection handler
pub struct BleConnection {
    adapter: Adapter,
    event_sender: mpsc::UnboundedSender<AppEvent>,
    config: ConnectionConfig,
}

impl BleConnection {
    /// Create a new connection handler
    pub fn new(
        adapter: Adapter,
        event_sender: mpsc::UnboundedSender<AppEvent>,
        config: ConnectionConfig,
    ) -> Self {
        Self {
            adapter,
            event_sender,
            config,
        }
    }

    /// Find a peripheral the adapter already knows by its address, or by its
    /// peripheral id where the platform hides addresses
    pub async fn find_peripheral(&self, address: &str) -> Result<Peripheral> {
        let bd_addr = BDAddr::from_str(address).ok();

        self.adapter
            .peripherals()
            .await?
            .into_iter()
            .find(|p| match bd_addr {
                Some(bd_addr) => p.address() == bd_addr,
                None => p.id().to_string() == address,
            })
            .ok_or_else(|| anyhow::anyhow!("Device {} not found, scan first", address))
    }

    /// Connect to a peripheral and locate the custom characteristic
    pub async fn connect(&self, peripheral: Peripheral) -> Result<Esp32Link> {
        info!("Connecting to Bluetooth device: {}", peripheral.address());
        self.send_log("Connecting to device...", MessageSeverity::Info);

        if !peripheral.is_connected().await.unwrap_or(false) {
            peripheral
                .connect()
                .await
                .context("Failed to connect to device")?;
        }

        peripheral
            .discover_services()
            .await
            .context("Failed to discover services")?;

        let characteristic = self.find_characteristic(&peripheral)?;
        info!("Found custom characteristic {}", characteristic.uuid);
        self.send_log("Connection established!", MessageSeverity::Success);

        Ok(Esp32Link {
            peripheral,
            characteristic,
        })
    }

    fn find_characteristic(&self, peripheral: &Peripheral) -> Result<Characteristic> {
        let service_uuid = protocol::parse_uuid(&self.config.service_uuid)?;
        let char_uuid = protocol::parse_uuid(&self.config.characteristic_uuid)?;

        let characteristics = peripheral.characteristics();
        debug!("Found {} characteristics", characteristics.len());

        characteristics
            .into_iter()
            .find(|c| c.service_uuid == service_uuid && c.uuid == char_uuid)
            .ok_or_else(|| anyhow::anyhow!("Characteristic {} not found", char_uuid))
    }

    /// Track connection state changes of one peripheral
    pub async fn watch_state(&self, id: PeripheralId) -> Result<JoinHandle<()>> {
        let mut events = self.adapter.events().await?;
        let sender = self.event_sender.clone();

        Ok(tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let state = match event {
                    CentralEvent::DeviceConnected(event_id) if event_id == id => {
                        ConnectState::Connected
                    }
                    CentralEvent::DeviceDisconnected(event_id) if event_id == id => {
                        ConnectState::NotConnected
                    }
                    _ => continue,
                };
                info!("Connection State: {:?}", state);
                if sender.send(AppEvent::ConnectState(state)).is_err() {
                    break;
                }
            }
        }))
    }

    /// Send a log message
    fn send_log(&self, message: &str, severity: MessageSeverity) {
        let _ = self
            .event_sender
            .send(AppEvent::LogMessage(StatusMessage::new(message, severity)));
    }
}
