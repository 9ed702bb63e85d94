use std::fmt;

/// Errors produced by capture ports.
///
/// Transient read misses are not errors: `read()` reports those as
/// `Ok(None)` and the caller retries.
#[derive(Debug)]
pub enum CaptureError {
    /// No usable device could be found or opened.
    DeviceUnavailable(String),
    /// The device opened but refused to yield frames on a verification read.
    DeviceNotReady(String),
    /// `read()` was called before a successful `open()`.
    NotOpen,
    /// `open()` was called a second time on the same port instance.
    AlreadyOpen,
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::DeviceUnavailable(msg) => write!(f, "device unavailable: {msg}"),
            CaptureError::DeviceNotReady(msg) => write!(f, "device not ready: {msg}"),
            CaptureError::NotOpen => write!(f, "port not open"),
            CaptureError::AlreadyOpen => write!(f, "port already opened"),
        }
    }
}

impl std::error::Error for CaptureError {}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::DeviceUnavailable(err.to_string())
    }
}
