//! BLE Scanner Module
//!
//! Handles Bluetooth LE device discovery. A scan runs for a bounded window
//! and reports every newly seen peripheral once.

use crate::domain::models::{AppEvent, Device, MessageSeverity, ScanState, StatusMessage};
use crate::infrastructure::bluetooth::protocol;
use anyhow::{Context, Result};
use btleplug::api::{Central, CentralEvent, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Peripheral};
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// BLE Scanner for discovering nearby peripherals
pub struct BleScanner {
    adapter: Adapter,
    event_sender: mpsc::UnboundedSender<AppEvent>,
    state: Arc<Mutex<ScanState>>,
    scan_task: Option<JoinHandle<()>>,
    scan_duration: Duration,
}

impl BleScanner {
    /// Create a new scanner
    pub fn new(
        adapter: Adapter,
        event_sender: mpsc::UnboundedSender<AppEvent>,
        scan_duration: Duration,
    ) -> Self {
        Self {
            adapter,
            event_sender,
            state: Arc::new(Mutex::new(ScanState::NotScanning)),
            scan_task: None,
            scan_duration,
        }
    }

    /// Start scanning for BLE devices.
    ///
    /// Does nothing while a scan is already in progress.
    pub async fn start(&mut self) -> Result<()> {
        info!("startScan");
        if self.is_scanning() {
            debug!("Scan already in progress");
            return Ok(());
        }
        set_state(&self.state, &self.event_sender, ScanState::Scanning);

        let events = match self.begin().await {
            Ok(events) => events,
            Err(e) => {
                set_state(&self.state, &self.event_sender, ScanState::Failed);
                return Err(e);
            }
        };

        let _ = self.event_sender.send(AppEvent::LogMessage(StatusMessage::new(
            "Scanning for devices...",
            MessageSeverity::Info,
        )));

        let adapter = self.adapter.clone();
        let sender = self.event_sender.clone();
        let state = self.state.clone();
        let scan_duration = self.scan_duration;

        self.scan_task = Some(tokio::spawn(async move {
            let mut events = events;
            let mut seen = HashSet::new();

            let collect = async {
                while let Some(event) = events.next().await {
                    let id = match event {
                        CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                        _ => continue,
                    };
                    let peripheral = match adapter.peripheral(&id).await {
                        Ok(p) => p,
                        Err(e) => {
                            debug!("Discovered peripheral vanished: {}", e);
                            continue;
                        }
                    };
                    match describe(&peripheral).await {
                        Ok(device) => {
                            if seen.insert(device.address.clone()) {
                                info!("{}", device);
                                let _ = sender.send(AppEvent::DeviceFound(device));
                            }
                        }
                        Err(e) => debug!("Could not read peripheral properties: {}", e),
                    }
                }
            };

            let final_state = match tokio::time::timeout(scan_duration, collect).await {
                Err(_) => ScanState::NotScanning,
                Ok(()) => {
                    warn!("Scanning failed: adapter event stream ended");
                    ScanState::Failed
                }
            };

            if let Err(e) = adapter.stop_scan().await {
                warn!("Failed to stop scan: {}", e);
            }
            set_state(&state, &sender, final_state);
        }));

        Ok(())
    }

    async fn begin(
        &self,
    ) -> Result<std::pin::Pin<Box<dyn futures::Stream<Item = CentralEvent> + Send>>> {
        let events = self
            .adapter
            .events()
            .await
            .context("Failed to subscribe to adapter events")?;
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .context("Failed to start scan")?;
        Ok(events)
    }

    /// Stop scanning
    pub async fn stop(&mut self) -> Result<()> {
        set_state(&self.state, &self.event_sender, ScanState::NotScanning);
        if let Some(task) = self.scan_task.take() {
            task.abort();
            self.adapter.stop_scan().await?;
            let _ = self.event_sender.send(AppEvent::LogMessage(StatusMessage::new(
                "Scan stopped.",
                MessageSeverity::Info,
            )));
        }
        info!("stopScan");
        Ok(())
    }

    /// Check if currently scanning
    pub fn is_scanning(&self) -> bool {
        self.state
            .lock()
            .map(|s| *s == ScanState::Scanning)
            .unwrap_or(false)
    }
}

impl Drop for BleScanner {
    fn drop(&mut self) {
        if let Some(task) = self.scan_task.take() {
            task.abort();
        }
    }
}

fn set_state(
    state: &Mutex<ScanState>,
    sender: &mpsc::UnboundedSender<AppEvent>,
    new_state: ScanState,
) {
    if let Ok(mut s) = state.lock() {
        *s = new_state;
    }
    let _ = sender.send(AppEvent::ScanState(new_state));
}

async fn describe(peripheral: &Peripheral) -> Result<Device> {
    let name = peripheral
        .properties()
        .await?
        .and_then(|p| p.local_name)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "Unknown".to_string());

    Ok(Device {
        name,
        address: protocol::device_address(peripheral.address(), &peripheral.id().to_string()),
    })
}
