//! Capture contract for the iris ecosystem.
//!
//! This crate defines the device-agnostic capture surface: the
//! [`CapturePort`] trait for opening, reading from, and releasing a
//! frame-producing device, the [`Measurement`] value each read produces,
//! and the [`CaptureError`] taxonomy shared by all backends.

pub mod error;
pub mod measurement;
pub mod port;

pub use error::CaptureError;
pub use measurement::Measurement;
pub use port::{CapturePort, Measurements};
