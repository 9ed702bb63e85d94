//! Background frame acquisition for the iris ecosystem.
//!
//! [`FrameGrabber`] owns one capture port at a time, pulls frames from it
//! on a dedicated background thread at the device's own pace, and
//! publishes the most recent payload for any number of concurrent readers.
//! An enable/disable switch couples the public on/off state to the
//! device's lifecycle: enabling opens the device and starts the loop,
//! disabling stops the loop and releases the device.

pub mod grabber;

pub use grabber::{DeviceFactory, FrameGrabber, GrabberStatus};
