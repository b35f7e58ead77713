//! Governor worker thread.
//!
//! Applies frequency changes out of the main loop's critical path: the
//! platform's frequency-set primitive may shell out or write sysfs and can
//! take tens of milliseconds, which the frame-driving thread cannot afford
//! to block on.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use super::Shared;

/// How often the worker wakes to check for a pending target change.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Platform hook that actually changes the running CPU frequency.
///
/// The platform layer (cpufreq, a vendor sysfs knob, whatever the device
/// exposes) is an external collaborator; this trait is the seam the
/// governor calls through.
pub trait FrequencySetter {
    /// Attempts to set the CPU frequency to `khz`. Returns whether it
    /// succeeded; on failure the governor retries on its next decision.
    fn set_freq_khz(&mut self, khz: u32) -> bool;
}

/// Handle to the spawned governor worker thread.
pub struct Worker {
    handle: Option<JoinHandle<()>>,
    stop: Arc<Mutex<bool>>,
}

impl Worker {
    pub(super) fn spawn(
        shared: Arc<Mutex<Shared>>,
        frequencies: Vec<u32>,
        mut setter: impl FrequencySetter + Send + 'static,
    ) -> Self {
        let stop = Arc::new(Mutex::new(false));
        let stop_flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("governor-worker".into())
            .spawn(move || {
                loop {
                    thread::sleep(POLL_INTERVAL);
                    if *stop_flag.lock() {
                        return;
                    }

                    let (current, target) = {
                        let guard = shared.lock();
                        (guard.current_index, guard.target_index)
                    };
                    if current == target {
                        continue;
                    }

                    let Some(&khz) = frequencies.get(target) else {
                        continue;
                    };
                    if setter.set_freq_khz(khz) {
                        shared.lock().current_index = target;
                    }
                }
            })
            .expect("failed to spawn governor worker thread");

        Self {
            handle: Some(handle),
            stop,
        }
    }

    /// Signals the worker thread to stop and waits for it to exit.
    pub fn join(mut self) {
        *self.stop.lock() = true;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        *self.stop.lock() = true;
    }
}
