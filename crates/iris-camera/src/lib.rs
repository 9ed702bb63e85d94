//! USB camera backend for the iris ecosystem.
//!
//! Provides [`UsbCamera`], a `CapturePort` implementation backed by a
//! local V4L2 device, with device probing, best-effort format negotiation,
//! driver-owned frame pacing, and JPEG encoding at a configured quality.

pub mod config;
mod convert;
mod pace;
pub mod usb;

pub use config::CameraConfig;
pub use usb::UsbCamera;
