use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use iris_capture::{CaptureError, CapturePort};

/// Creates a fresh, unopened capture port. Called once per `start()` so
/// every acquisition cycle runs against a new driver instance.
pub type DeviceFactory = Box<dyn Fn() -> Box<dyn CapturePort + Send> + Send + Sync>;

/// Nap between empty reads so the loop never busy-spins.
const EMPTY_READ_DELAY: Duration = Duration::from_millis(50);
/// Upper bound on waiting for the acquisition thread during `stop()`.
const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(2);
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Published state shared between the acquisition loop and readers.
struct Shared {
    enabled: bool,
    running: bool,
    device: Option<String>,
    latest: Option<(Bytes, HashMap<String, String>)>,
}

/// Loop lifecycle state. Its mutex also serializes `start()`/`stop()`.
struct Control {
    handle: Option<JoinHandle<()>>,
    /// Stop flag of the current loop generation. Each `start()` installs a
    /// fresh flag, so a loop that outlived a timed-out join can never
    /// publish into a newer generation's slot.
    stop: Arc<AtomicBool>,
}

/// Snapshot returned by [`FrameGrabber::status`].
#[derive(Debug, Clone)]
pub struct GrabberStatus {
    pub enabled: bool,
    pub running: bool,
    pub device: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Owns the background acquisition loop and the latest-frame slot.
///
/// All methods take `&self`; the grabber is meant to be shared as
/// `Arc<FrameGrabber>` across request handlers. `latest()` and `status()`
/// never block on hardware, only on the brief snapshot lock.
pub struct FrameGrabber {
    factory: DeviceFactory,
    shared: Arc<Mutex<Shared>>,
    control: Mutex<Control>,
}

impl FrameGrabber {
    /// `enabled` is the initial desired operating mode; no device is
    /// touched until [`start`](Self::start) or
    /// [`set_enabled`](Self::set_enabled).
    pub fn new(factory: DeviceFactory, enabled: bool) -> Self {
        Self {
            factory,
            shared: Arc::new(Mutex::new(Shared {
                enabled,
                running: false,
                device: None,
                latest: None,
            })),
            control: Mutex::new(Control {
                handle: None,
                stop: Arc::new(AtomicBool::new(true)),
            }),
        }
    }

    /// Open a fresh device and launch the acquisition loop.
    ///
    /// No-op when a loop is already running. Open failures propagate to
    /// the caller and leave `running` false.
    pub fn start(&self) -> Result<(), CaptureError> {
        let mut control = lock(&self.control);
        self.start_locked(&mut control)
    }

    /// Signal the loop to end, wait for it (bounded), and clear the
    /// published frame. Idempotent.
    pub fn stop(&self) {
        let mut control = lock(&self.control);
        self.stop_locked(&mut control);
    }

    /// Flip the desired operating mode, starting or stopping the loop to
    /// match. No-op when the value is unchanged. The only sanctioned way
    /// to change `enabled`.
    pub fn set_enabled(&self, enabled: bool) -> Result<(), CaptureError> {
        let mut control = lock(&self.control);
        {
            let mut shared = lock(&self.shared);
            if shared.enabled == enabled {
                return Ok(());
            }
            shared.enabled = enabled;
        }
        if enabled {
            self.start_locked(&mut control)
        } else {
            self.stop_locked(&mut control);
            Ok(())
        }
    }

    /// The most recently published payload and metadata, if any.
    pub fn latest(&self) -> Option<(Bytes, HashMap<String, String>)> {
        lock(&self.shared).latest.clone()
    }

    pub fn enabled(&self) -> bool {
        lock(&self.shared).enabled
    }

    pub fn running(&self) -> bool {
        lock(&self.shared).running
    }

    pub fn status(&self) -> GrabberStatus {
        let shared = lock(&self.shared);
        GrabberStatus {
            enabled: shared.enabled,
            running: shared.running,
            device: shared.device.clone(),
            metadata: shared
                .latest
                .as_ref()
                .map(|(_, metadata)| metadata.clone())
                .unwrap_or_default(),
        }
    }

    fn start_locked(&self, control: &mut Control) -> Result<(), CaptureError> {
        if let Some(handle) = &control.handle {
            if !handle.is_finished() {
                return Ok(());
            }
        }
        // Reap a loop that already exited on its own.
        if let Some(handle) = control.handle.take() {
            let _ = handle.join();
        }

        let mut port = (self.factory)();
        port.open()?;
        let device = port.device();

        let stop = Arc::new(AtomicBool::new(false));
        {
            let mut shared = lock(&self.shared);
            shared.running = true;
            shared.device = device;
            shared.latest = None;
        }

        let shared = Arc::clone(&self.shared);
        let stop_flag = Arc::clone(&stop);
        let handle = thread::spawn(move || acquisition_loop(port, shared, stop_flag));
        control.stop = stop;
        control.handle = Some(handle);
        log::info!("frame grabber started");
        Ok(())
    }

    fn stop_locked(&self, control: &mut Control) {
        control.stop.store(true, Ordering::Release);

        if let Some(handle) = control.handle.take() {
            let deadline = Instant::now() + STOP_JOIN_TIMEOUT;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(JOIN_POLL_INTERVAL);
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                log::warn!(
                    "acquisition loop did not stop within {STOP_JOIN_TIMEOUT:?}, detaching"
                );
            }
        }

        let mut shared = lock(&self.shared);
        shared.running = false;
        shared.device = None;
        shared.latest = None;
        log::info!("frame grabber stopped");
    }
}

impl Drop for FrameGrabber {
    fn drop(&mut self) {
        let mut control = lock(&self.control);
        control.stop.store(true, Ordering::Release);
        if let Some(handle) = control.handle.take() {
            let _ = handle.join();
        }
    }
}

/// The background loop: read, publish, repeat until told to stop.
///
/// The port is owned here and closed on the way out, so the device is
/// never read concurrently with its release. Read errors end the loop but
/// never escape the thread; they surface as `running == false`.
fn acquisition_loop(
    mut port: Box<dyn CapturePort + Send>,
    shared: Arc<Mutex<Shared>>,
    stop: Arc<AtomicBool>,
) {
    log::debug!("acquisition loop running");
    loop {
        if stop.load(Ordering::Acquire) {
            break;
        }
        match port.read() {
            Ok(Some(measurement)) => {
                let payload = Bytes::from(measurement.payload);
                let mut guard = lock(&shared);
                // A stopped generation must not publish: re-check under
                // the same lock `stop()` clears the slot with.
                if stop.load(Ordering::Acquire) {
                    break;
                }
                guard.latest = Some((payload, measurement.metadata));
            }
            Ok(None) => thread::sleep(EMPTY_READ_DELAY),
            Err(err) => {
                log::error!("acquisition loop terminated: {err}");
                break;
            }
        }
    }
    port.close();

    let mut guard = lock(&shared);
    if !stop.load(Ordering::Acquire) {
        // Unexpected exit; on a requested stop these fields belong to
        // `stop()`.
        guard.running = false;
        guard.device = None;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|err| err.into_inner())
}
