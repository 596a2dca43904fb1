//! A local SMTP relay that hands every message it accepts to an HTTP email API.

pub mod config;
pub mod controller;

pub use controller::{Relais, SHUTDOWN_BROADCAST};
