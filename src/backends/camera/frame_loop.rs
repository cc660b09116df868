// SPDX-License-Identifier: GPL-3.0-only
//! Thread lifecycle management for frame loops
//!
//! Shared by the virtual camera's capture thread and the frame processing
//! worker so both start, stop and join the same way.

use super::BackendResult;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Action returned by the loop callback to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Continue running the loop
    Continue,
    /// Stop the loop gracefully
    Stop,
}

/// Controller for a loop running in its own named thread
///
/// # Example
///
/// ```ignore
/// let mut controller = LoopController::start("frame-worker", move || {
///     match exchange.take_blocking() {
///         Some(frame) => {
///             process(frame);
///             LoopAction::Continue
///         }
///         None => LoopAction::Stop,
///     }
/// })?;
///
/// exchange.shutdown();
/// controller.stop();
/// ```
pub struct LoopController {
    /// Thread handle for joining
    thread_handle: Option<JoinHandle<()>>,
    /// Signal to stop the loop
    stop_signal: Arc<AtomicBool>,
    /// Name for logging and the thread name
    name: String,
}

impl LoopController {
    /// Start a loop in a separate thread
    ///
    /// The closure is called repeatedly until it returns `LoopAction::Stop`
    /// or `stop()` is called. The stop signal is checked before every
    /// iteration, so a closure that blocks needs its own wake-up path.
    pub fn start<F>(name: &str, loop_fn: F) -> BackendResult<Self>
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        Self::spawn(name, None, loop_fn)
    }

    /// Start a loop that runs at most once per `interval`
    ///
    /// Sleeping between iterations is interrupted by `request_stop()`.
    pub fn start_paced<F>(name: &str, interval: Duration, loop_fn: F) -> BackendResult<Self>
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        Self::spawn(name, Some(interval), loop_fn)
    }

    fn spawn<F>(name: &str, interval: Option<Duration>, mut loop_fn: F) -> BackendResult<Self>
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_clone = Arc::clone(&stop_signal);
        let name_clone = name.to_string();

        info!(name = %name, ?interval, "Starting loop thread");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!(name = %name_clone, "Loop thread started");

                loop {
                    if stop_signal_clone.load(Ordering::SeqCst) {
                        debug!(name = %name_clone, "Stop signal received");
                        break;
                    }

                    let started = Instant::now();
                    match loop_fn() {
                        LoopAction::Continue => {}
                        LoopAction::Stop => {
                            debug!(name = %name_clone, "Loop requested stop");
                            break;
                        }
                    }

                    if let Some(interval) = interval {
                        let deadline = started + interval;
                        loop {
                            if stop_signal_clone.load(Ordering::SeqCst) {
                                break;
                            }
                            let now = Instant::now();
                            if now >= deadline {
                                break;
                            }
                            thread::park_timeout(deadline - now);
                        }
                    }
                }

                info!(name = %name_clone, "Loop thread exiting");
            })?;

        Ok(Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if the loop is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Get a clone of the stop signal for external use
    pub fn stop_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_signal)
    }

    /// Signal the loop to stop (non-blocking)
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
        if let Some(handle) = &self.thread_handle {
            handle.thread().unpark();
        }
    }

    /// Stop the loop and wait for the thread to finish
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the thread to finish without sending stop signal
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            debug!(name = %self.name, "Waiting for loop thread to finish");
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Loop thread panicked: {:?}", e);
            } else {
                debug!(name = %self.name, "Loop thread finished");
            }
        }
    }
}

impl Drop for LoopController {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "LoopController dropped, stopping loop");
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_basic_loop() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut controller = LoopController::start("test-loop", move || {
            let count = counter_clone.fetch_add(1, Ordering::SeqCst);
            if count >= 10 {
                LoopAction::Stop
            } else {
                LoopAction::Continue
            }
        })
        .unwrap();

        controller.join();

        assert_eq!(counter.load(Ordering::SeqCst), 11); // 0-10 inclusive
    }

    #[test]
    fn test_thread_is_named() {
        let name = Arc::new(std::sync::Mutex::new(None));
        let name_clone = Arc::clone(&name);

        let mut controller = LoopController::start("named-loop", move || {
            *name_clone.lock().unwrap() = thread::current().name().map(str::to_string);
            LoopAction::Stop
        })
        .unwrap();
        controller.join();

        assert_eq!(name.lock().unwrap().as_deref(), Some("named-loop"));
    }

    #[test]
    fn test_paced_loop_stops_promptly() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut controller =
            LoopController::start_paced("test-paced", Duration::from_secs(10), move || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                LoopAction::Continue
            })
            .unwrap();

        thread::sleep(Duration::from_millis(50));
        let started = Instant::now();
        controller.stop();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_is_running() {
        let controller = LoopController::start("test-running", || {
            thread::sleep(Duration::from_millis(20));
            LoopAction::Continue
        })
        .unwrap();

        assert!(controller.is_running());

        // Drop will stop it
        drop(controller);
    }
}
