//! Chasing-light PLC controller service
//!
//! Polls digital inputs, drives a cyclic output pattern at an
//! operator-selectable speed, mirrors I/O and sensor state into a shared
//! status snapshot for presentation layers, and accepts manual output
//! overrides while the pattern is stopped. All PLC traffic funnels through
//! the serialized transport in `chaser_modbus`.

pub mod config;
pub mod controller;
pub mod environment;
pub mod error;
pub mod inputs;
pub mod manual;
pub mod sequencer;
pub mod state;

pub use config::AppConfig;
pub use controller::Controller;
pub use error::{Result, ServiceError};
pub use state::{StatusObserver, StatusSnapshot};

/// Number of digital output (coil) and input (discrete) points on the rig
pub const POINT_COUNT: usize = 14;

/// Short address of the first coil / discrete input block
pub const IO_BASE_ADDRESS: u16 = 0;

/// Input-register short address of the temperature reading
pub const TEMPERATURE_REGISTER: u16 = 32;

/// Input-register short address of the humidity reading
pub const HUMIDITY_REGISTER: u16 = 33;
