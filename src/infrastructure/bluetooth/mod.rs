//! Bluetooth Module
//!
//! Provides BLE communication with the ESP32 peripheral.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    BluetoothService                      │
//! │  (Coordinator owned by the BLE worker task)              │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┼─────────────┐
//!         │             │             │
//!         ▼             ▼             ▼
//! ┌───────────┐  ┌────────────┐  ┌───────────┐
//! │  Scanner  │  │ Connection │  │ Protocol  │
//! │           │  │            │  │           │
//! │ - BLE     │  │ - GATT     │  │ - UUIDs   │
//! │ discovery │  │ - state    │  │ - JSON    │
//! │           │  │ - notify   │  │ - address │
//! └───────────┘  └────────────┘  └───────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - UUIDs, timing constants, JSON payload encoding and decoding
//! - [`scanner`] - BLE device discovery
//! - [`connection`] - Connection, characteristic lookup, state tracking, messaging
//! - [`service`] - Main service coordinator

pub mod connection;
pub mod protocol;
pub mod scanner;
pub mod service;

pub use service::BluetoothService;
