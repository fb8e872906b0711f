//! Console front end
//!
//! Reads commands from stdin, forwards BLE work to a background worker and
//! prints state changes as they arrive.

pub mod app;
pub mod commands;
pub mod view;
