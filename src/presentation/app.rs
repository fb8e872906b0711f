use crate::domain::models::{
    AppEvent, BluetoothCommand, ConnectState, MessageSeverity, ScanState, StatusMessage,
};
use crate::domain::session::Session;
use crate::domain::settings::SettingsService;
use crate::infrastructure::bluetooth::BluetoothService;
use crate::presentation::commands::{ConsoleCommand, USAGE};
use crate::presentation::view;
use std::io::Write;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub struct ControlApp {
    // Services
    settings: Arc<Mutex<SettingsService>>,

    // Bluetooth
    bluetooth_tx: mpsc::UnboundedSender<BluetoothCommand>,
    events_rx: mpsc::UnboundedReceiver<AppEvent>,
    worker: Option<JoinHandle<()>>,

    // State
    session: Session,
}

impl ControlApp {
    pub fn new(settings: Arc<Mutex<SettingsService>>) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (bt_cmd_tx, bt_cmd_rx) = mpsc::unbounded_channel();
        let worker = spawn_bluetooth_worker(event_tx, bt_cmd_rx, settings.clone());

        let mut app = Self::with_channels(settings, bt_cmd_tx, event_rx);
        app.worker = Some(worker);
        app
    }

    fn with_channels(
        settings: Arc<Mutex<SettingsService>>,
        bluetooth_tx: mpsc::UnboundedSender<BluetoothCommand>,
        events_rx: mpsc::UnboundedReceiver<AppEvent>,
    ) -> Self {
        let mut session = Session::new();
        let last_selected = settings
            .lock()
            .ok()
            .and_then(|s| s.get().last_selected_device.clone());
        if let Some(selection) = last_selected {
            session.set_device_selected(selection);
        }

        Self {
            settings,
            bluetooth_tx,
            events_rx,
            worker: None,
            session,
        }
    }

    /// Read console commands until `quit` or end of input
    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        println!("{}", USAGE);
        println!("{}", view::render_status(&self.session));
        prompt();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    if self.handle_line(&line).is_break() {
                        break;
                    }
                    prompt();
                }
                Some(event) = self.events_rx.recv() => self.handle_event(event),
            }
        }

        self.shutdown().await;
        Ok(())
    }

    fn handle_line(&mut self, line: &str) -> ControlFlow<()> {
        if line.trim().is_empty() {
            return ControlFlow::Continue(());
        }
        match line.parse::<ConsoleCommand>() {
            Ok(command) => self.handle_command(command),
            Err(e) => {
                println!("{}", e);
                ControlFlow::Continue(())
            }
        }
    }

    fn handle_command(&mut self, command: ConsoleCommand) -> ControlFlow<()> {
        match command {
            ConsoleCommand::Scan => match self.session.start_scan() {
                Some(cmd) => self.send(cmd),
                None => println!("Scan already in progress"),
            },
            ConsoleCommand::Stop => {
                let cmd = self.session.stop_scan();
                self.send(cmd);
            }
            ConsoleCommand::Devices => println!("{}", view::render_devices(&self.session)),
            ConsoleCommand::Select(index) => self.select(index),
            ConsoleCommand::Connect => {
                if self.session.connect_state() != ConnectState::NoDevice
                    && !self.session.connect_enabled()
                {
                    println!("Already connected");
                } else {
                    match self.session.connect() {
                        Ok(Some(cmd)) => self.send(cmd),
                        Ok(None) => println!("No device selected"),
                        Err(e) => println!("{}", e),
                    }
                }
            }
            ConsoleCommand::Disconnect => {
                if self.session.disconnect_enabled() {
                    let cmd = self.session.disconnect();
                    self.send(cmd);
                } else {
                    println!("Not connected");
                }
            }
            ConsoleCommand::Led(on) => {
                let cmd = self.session.set_led(on);
                self.send(cmd);
            }
            ConsoleCommand::Blink(on) => {
                let cmd = self.session.set_blink(on);
                self.send(cmd);
            }
            ConsoleCommand::Data(true) => {
                let cmd = self.session.start_data_load();
                self.send(cmd);
            }
            ConsoleCommand::Data(false) => {
                let cmd = self.session.cancel_data_load();
                self.send(cmd);
            }
            ConsoleCommand::Status => println!("{}", view::render_status(&self.session)),
            ConsoleCommand::Help => println!("{}", USAGE),
            ConsoleCommand::Quit => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    fn select(&mut self, index: usize) {
        let Some(device) = self.session.device_list().get(index) else {
            println!("No device with number {}", index);
            return;
        };
        let selection = device.to_string();
        self.session.set_device_selected(selection.clone());

        match self.settings.lock() {
            Ok(mut settings) => {
                if let Err(e) = settings.set_last_selected_device(&selection) {
                    warn!("Failed to save selected device: {}", e);
                }
            }
            Err(_) => warn!("Settings lock poisoned"),
        }
        println!("Selected {}", selection);
    }

    fn handle_event(&mut self, event: AppEvent) {
        if let Some(line) = self.apply_event(event) {
            print!("{}", line);
        }
    }

    /// Fold an event into the session and return what to print for it, if anything.
    ///
    /// State events only print when the state actually changes.
    fn apply_event(&mut self, event: AppEvent) -> Option<String> {
        let known_devices = self.session.device_list().len();
        let previous_scan = self.session.scan_state();
        let previous_connect = self.session.connect_state();
        self.session.apply(&event);

        match &event {
            AppEvent::DeviceFound(device) if self.session.device_list().len() > known_devices => {
                Some(format!("[{}] {}\n", known_devices, device))
            }
            AppEvent::ScanState(state) if *state != previous_scan => match state {
                ScanState::NotScanning => Some("Scan finished\n".to_string()),
                ScanState::Failed => Some("Scan failed\n".to_string()),
                ScanState::Scanning => None,
            },
            AppEvent::ConnectState(state) if *state != previous_connect => Some(format!(
                "Connection: {}\n",
                self.session.connect_state_text()
            )),
            AppEvent::Telemetry(_) if self.session.data_loading() => {
                Some(view::render_telemetry(&self.session))
            }
            AppEvent::LogMessage(message) => Some(format!("{}\n", view::render_message(message))),
            _ => None,
        }
    }

    fn send(&self, command: BluetoothCommand) {
        if self.bluetooth_tx.send(command).is_err() {
            error!("Bluetooth worker is not running");
        }
    }

    async fn shutdown(self) {
        let Self {
            bluetooth_tx,
            worker,
            ..
        } = self;
        // Closing the command channel ends the worker loop
        drop(bluetooth_tx);
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!("Bluetooth worker failed: {}", e);
            }
        }
        info!("Console closed");
    }
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

/// Run BLE commands on their own task so the console never blocks on the radio
pub fn spawn_bluetooth_worker(
    event_tx: mpsc::UnboundedSender<AppEvent>,
    mut bt_cmd_rx: mpsc::UnboundedReceiver<BluetoothCommand>,
    settings: Arc<Mutex<SettingsService>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let tx_clone = event_tx.clone();
        let mut bt_service = BluetoothService::new(event_tx, settings);

        let report = |message: String| {
            let _ = tx_clone.send(AppEvent::LogMessage(StatusMessage {
                message,
                severity: MessageSeverity::Error,
            }));
        };

        while let Some(cmd) = bt_cmd_rx.recv().await {
            match cmd {
                BluetoothCommand::StartScan => {
                    if let Err(e) = bt_service.start_scan().await {
                        error!("Scanning failed: {:#}", e);
                        report(format!("Scanning failed: {:#}", e));
                    }
                }
                BluetoothCommand::StopScan => {
                    if let Err(e) = bt_service.stop_scan().await {
                        error!("Failed to stop scan: {:#}", e);
                    }
                }
                BluetoothCommand::Connect(address) => {
                    if let Err(e) = bt_service.connect(&address).await {
                        error!("Connection failed: {:#}", e);
                        report(format!("Connection failed: {:#}", e));
                        let _ = tx_clone.send(AppEvent::ConnectState(ConnectState::NotConnected));
                    }
                }
                BluetoothCommand::Disconnect => bt_service.disconnect().await,
                BluetoothCommand::SendLedData(led_data) => {
                    if !bt_service.is_connected() {
                        warn!("Not connected, LED data {:?} dropped", led_data);
                        let _ = tx_clone.send(AppEvent::LogMessage(StatusMessage::new(
                            "Not connected, LED state not sent",
                            MessageSeverity::Warning,
                        )));
                    } else if let Err(e) = bt_service.send_led_data(&led_data).await {
                        error!("Error sending ledData: {:#}", e);
                        report(format!("Error sending LED data: {:#}", e));
                    }
                }
                BluetoothCommand::StartDataLoad => {
                    if let Err(e) = bt_service.start_data_load().await {
                        error!("Failed to start data load: {:#}", e);
                        report(format!("Failed to start data load: {:#}", e));
                    }
                }
                BluetoothCommand::CancelDataLoad => bt_service.cancel_data_load(),
            }
        }

        bt_service.shutdown().await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Device, LedData, LedLevel};
    use std::path::PathBuf;

    fn temp_settings(name: &str) -> (Arc<Mutex<SettingsService>>, PathBuf) {
        let path = std::env::temp_dir().join(format!(
            "simple_ble_control_app_{}_{}.json",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        (
            Arc::new(Mutex::new(SettingsService::from_path(path.clone()))),
            path,
        )
    }

    fn test_app(
        name: &str,
    ) -> (
        ControlApp,
        mpsc::UnboundedReceiver<BluetoothCommand>,
        mpsc::UnboundedSender<AppEvent>,
        PathBuf,
    ) {
        let (settings, path) = temp_settings(name);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            ControlApp::with_channels(settings, cmd_tx, event_rx),
            cmd_rx,
            event_tx,
            path,
        )
    }

    #[tokio::test]
    async fn test_scan_select_connect_flow() {
        let (mut app, mut cmd_rx, _event_tx, path) = test_app("flow");

        assert!(app.handle_line("scan").is_continue());
        assert_eq!(cmd_rx.try_recv(), Ok(BluetoothCommand::StartScan));

        // Second scan while the first is running sends nothing
        assert!(app.handle_line("scan").is_continue());
        assert!(cmd_rx.try_recv().is_err());

        app.handle_event(AppEvent::DeviceFound(Device {
            name: "ESP32".to_string(),
            address: "24:6F:28:AA:BB:CC".to_string(),
        }));
        app.handle_event(AppEvent::ScanState(ScanState::NotScanning));

        assert!(app.handle_line("connect").is_continue());
        assert!(cmd_rx.try_recv().is_err());

        assert!(app.handle_line("select 0").is_continue());
        assert_eq!(app.session.connect_state(), ConnectState::DeviceSelected);
        assert!(app.handle_line("connect").is_continue());
        assert_eq!(
            cmd_rx.try_recv(),
            Ok(BluetoothCommand::Connect("24:6F:28:AA:BB:CC".to_string()))
        );

        app.handle_event(AppEvent::ConnectState(ConnectState::Connected));
        assert!(app.handle_line("led on").is_continue());
        assert_eq!(
            cmd_rx.try_recv(),
            Ok(BluetoothCommand::SendLedData(LedData {
                led: LedLevel::High,
                led_blinken: false,
            }))
        );

        assert!(app.handle_line("disconnect").is_continue());
        assert_eq!(cmd_rx.try_recv(), Ok(BluetoothCommand::Disconnect));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_selection_is_remembered() {
        let (mut app, _cmd_rx, _event_tx, path) = test_app("remember");
        app.handle_event(AppEvent::DeviceFound(Device {
            name: "ESP32".to_string(),
            address: "24:6F:28:AA:BB:CC".to_string(),
        }));
        assert!(app.handle_line("select 0").is_continue());
        let settings = app.settings.clone();
        drop(app);

        let (cmd_tx, _cmd_rx) = mpsc::unbounded_channel();
        let (_event_tx, event_rx) = mpsc::unbounded_channel();
        let app = ControlApp::with_channels(settings, cmd_tx, event_rx);
        assert_eq!(app.session.device_selected(), "ESP32: 24:6F:28:AA:BB:CC");
        assert_eq!(app.session.connect_state(), ConnectState::DeviceSelected);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_disconnect_requires_connection_and_quit_breaks() {
        let (mut app, mut cmd_rx, _event_tx, path) = test_app("quit");
        assert!(app.handle_line("disconnect").is_continue());
        assert!(cmd_rx.try_recv().is_err());

        assert!(app.handle_line("data on").is_continue());
        assert_eq!(cmd_rx.try_recv(), Ok(BluetoothCommand::StartDataLoad));
        assert!(app.handle_line("data off").is_continue());
        assert_eq!(cmd_rx.try_recv(), Ok(BluetoothCommand::CancelDataLoad));

        assert!(app.handle_line("quit").is_break());
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_repeated_connect_state_prints_once() {
        let (mut app, _cmd_rx, _event_tx, path) = test_app("connect_once");
        assert!(app.handle_line("scan").is_continue());

        let line = app.apply_event(AppEvent::ConnectState(ConnectState::Connected));
        assert_eq!(line.as_deref(), Some("Connection: connected\n"));
        assert_eq!(
            app.apply_event(AppEvent::ConnectState(ConnectState::Connected)),
            None
        );

        let line = app.apply_event(AppEvent::ConnectState(ConnectState::NotConnected));
        assert_eq!(line.as_deref(), Some("Connection: not connected\n"));

        assert_eq!(
            app.apply_event(AppEvent::ScanState(ScanState::Scanning)),
            None
        );
        let line = app.apply_event(AppEvent::ScanState(ScanState::Failed));
        assert_eq!(line.as_deref(), Some("Scan failed\n"));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_scan_without_adapter_reports_failure() {
        let path = std::env::temp_dir().join(format!(
            "simple_ble_control_app_no_adapter_{}.json",
            std::process::id()
        ));
        std::fs::write(&path, r#"{"adapter_index": 99}"#).unwrap();
        let settings = Arc::new(Mutex::new(SettingsService::from_path(path.clone())));

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let worker = spawn_bluetooth_worker(event_tx, cmd_rx, settings);

        let mut session = Session::new();
        let cmd = session.start_scan().unwrap();
        cmd_tx.send(cmd).unwrap();
        drop(cmd_tx);

        let events = tokio::time::timeout(std::time::Duration::from_secs(30), async {
            let mut events = Vec::new();
            while let Some(event) = event_rx.recv().await {
                events.push(event);
            }
            events
        })
        .await
        .unwrap();
        worker.await.unwrap();

        for event in &events {
            session.apply(event);
        }
        assert_eq!(session.scan_state(), ScanState::Failed);
        assert!(events.iter().any(|e| matches!(
            e,
            AppEvent::LogMessage(m) if m.severity == MessageSeverity::Error
        )));
        assert_eq!(session.start_scan(), Some(BluetoothCommand::StartScan));

        let _ = std::fs::remove_file(&path);
    }
}
