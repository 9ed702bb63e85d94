use crate::{CaptureError, Measurement};

/// Contract for a device that produces a slow stream of encoded frames.
///
/// Implementations are state machines: `Unopened → Opened → Closed`, where
/// `Opened` is the only state from which `read` succeeds and `Closed` is
/// terminal. Reopening requires a fresh instance.
pub trait CapturePort {
    /// Acquire the device.
    ///
    /// # Errors
    ///
    /// Returns `CaptureError::DeviceUnavailable` when no device can be
    /// found or opened, `CaptureError::DeviceNotReady` when a device opens
    /// but fails its verification read, and `CaptureError::AlreadyOpen`
    /// when called more than once on the same instance.
    fn open(&mut self) -> Result<(), CaptureError>;

    /// Read one measurement.
    ///
    /// `Ok(None)` means no frame was available this call: a transient
    /// condition the caller is expected to retry, not an error.
    ///
    /// # Errors
    ///
    /// Returns `CaptureError::NotOpen` when the port is not in the opened
    /// state.
    fn read(&mut self) -> Result<Option<Measurement>, CaptureError>;

    /// Release the device. Idempotent; safe to call on a port that never
    /// opened successfully.
    fn close(&mut self);

    /// Identifier of the device actually in use, once opened.
    fn device(&self) -> Option<String>;

    /// Lazy, unbounded sequence of measurements.
    ///
    /// Repeatedly calls [`read`](Self::read); the sequence ends when a
    /// read yields nothing. An error is yielded once, then the sequence
    /// ends. Non-restartable: a finished iterator stays finished.
    fn measurements(&mut self) -> Measurements<'_, Self>
    where
        Self: Sized,
    {
        Measurements {
            port: self,
            done: false,
        }
    }
}

/// Iterator over a port's successive reads. See
/// [`CapturePort::measurements`].
pub struct Measurements<'a, P> {
    port: &'a mut P,
    done: bool,
}

impl<P: CapturePort> Iterator for Measurements<'_, P> {
    type Item = Result<Measurement, CaptureError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.port.read() {
            Ok(Some(m)) => Some(Ok(m)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
