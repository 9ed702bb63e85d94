use std::thread;
use std::time::{Duration, Instant};

/// Enforces a minimum interval between successive captures.
///
/// The pacer blocks the calling thread, so the driver rate-limits itself
/// regardless of caller discipline.
pub(crate) struct FramePacer {
    interval: Duration,
    last: Option<Instant>,
}

impl FramePacer {
    pub(crate) fn new(fps: u32) -> Self {
        Self {
            interval: Duration::from_secs(1) / fps.max(1),
            last: None,
        }
    }

    /// Sleep until at least one interval has passed since the previous
    /// call, then mark the current instant. The first call never sleeps.
    pub(crate) fn pace(&mut self) {
        if let Some(last) = self.last {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                thread::sleep(self.interval - elapsed);
            }
        }
        self.last = Some(Instant::now());
    }
}
