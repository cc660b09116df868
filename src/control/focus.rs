// SPDX-License-Identifier: GPL-3.0-only

//! Auto-focus coordination
//!
//! Two strategies, chosen from the camera's focus mode:
//!
//! - **Continuous**: the camera refocuses on its own; the coordinator only
//!   cancels and reissues focus periodically so it does not get stuck.
//! - **Manual**: every focus cycle is requested explicitly, fast while
//!   focusing fails and slow once it succeeds.
//!
//! Fixed-focus cameras get no coordinator at all. Timers are deadlines that
//! the render thread polls; nothing here sleeps or spawns.

use crate::backends::camera::{CameraDevice, FocusCapability, FocusMode};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Set once any camera in this process delivered a focus-complete callback
///
/// Some drivers never report completion; until one does, manual focus
/// requests are honoured even while a cycle is supposedly in flight.
pub static FOCUS_COMPLETE_WORKING: AtomicBool = AtomicBool::new(false);

/// Focus timer intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusTimings {
    /// Continuous mode: cancel-and-reissue period
    pub continuous_reset_ms: u64,
    /// Manual mode: delay after start or a failed cycle
    pub manual_fast_ms: u64,
    /// Manual mode: delay after a successful cycle
    pub manual_slow_ms: u64,
}

impl Default for FocusTimings {
    fn default() -> Self {
        Self {
            continuous_reset_ms: 1000,
            manual_fast_ms: 500,
            manual_slow_ms: 3000,
        }
    }
}

impl FocusTimings {
    pub fn continuous_reset(&self) -> Duration {
        Duration::from_millis(self.continuous_reset_ms)
    }

    pub fn manual_fast(&self) -> Duration {
        Duration::from_millis(self.manual_fast_ms)
    }

    pub fn manual_slow(&self) -> Duration {
        Duration::from_millis(self.manual_slow_ms)
    }
}

/// Focus activity worth telling the host about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusNotice {
    Moving(bool),
    Complete(bool),
}

#[derive(Debug)]
pub enum FocusCoordinator {
    Continuous(ContinuousFocus),
    Manual(ManualFocus),
}

impl FocusCoordinator {
    /// Coordinator for `mode`, `None` for fixed focus
    pub fn for_mode(
        mode: FocusMode,
        timings: FocusTimings,
        completion_flag: &'static AtomicBool,
    ) -> Option<Self> {
        match mode.capability() {
            FocusCapability::Continuous => {
                Some(FocusCoordinator::Continuous(ContinuousFocus::new(timings)))
            }
            FocusCapability::Manual => Some(FocusCoordinator::Manual(ManualFocus::new(
                timings,
                completion_flag,
            ))),
            FocusCapability::Fixed => None,
        }
    }

    pub fn start(&mut self, camera: &mut dyn CameraDevice, now: Instant) {
        match self {
            FocusCoordinator::Continuous(focus) => focus.start(camera, now),
            FocusCoordinator::Manual(focus) => focus.start(camera, now),
        }
    }

    pub fn stop(&mut self, camera: &mut dyn CameraDevice) {
        match self {
            FocusCoordinator::Continuous(focus) => focus.stop(),
            FocusCoordinator::Manual(focus) => focus.stop(camera),
        }
    }

    pub fn is_started(&self) -> bool {
        match self {
            FocusCoordinator::Continuous(focus) => focus.deadline.is_some(),
            FocusCoordinator::Manual(focus) => focus.active,
        }
    }

    pub fn request_focus(&mut self, camera: &mut dyn CameraDevice, now: Instant) {
        match self {
            FocusCoordinator::Continuous(focus) => focus.request_focus(camera, now),
            FocusCoordinator::Manual(focus) => focus.request_focus(camera, now),
        }
    }

    /// Run timers that are due
    pub fn poll(&mut self, camera: &mut dyn CameraDevice, now: Instant) -> Option<FocusNotice> {
        match self {
            FocusCoordinator::Continuous(focus) => {
                focus.poll(camera, now);
                None
            }
            FocusCoordinator::Manual(focus) => focus.poll(camera, now),
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match self {
            FocusCoordinator::Continuous(focus) => focus.deadline,
            FocusCoordinator::Manual(focus) => focus.deadline,
        }
    }

    pub fn on_focus_moving(&mut self, moving: bool) -> FocusNotice {
        if let FocusCoordinator::Continuous(focus) = self {
            focus.camera_moving = moving;
        }
        FocusNotice::Moving(moving)
    }

    /// `None` for a completion that arrives after manual focus stopped
    pub fn on_focus_complete(&mut self, success: bool, now: Instant) -> Option<FocusNotice> {
        if let FocusCoordinator::Manual(focus) = self
            && !focus.on_complete(success, now)
        {
            return None;
        }
        Some(FocusNotice::Complete(success))
    }
}

/// Periodic reset for continuous focus modes
#[derive(Debug)]
pub struct ContinuousFocus {
    timings: FocusTimings,
    deadline: Option<Instant>,
    camera_moving: bool,
}

impl ContinuousFocus {
    fn new(timings: FocusTimings) -> Self {
        Self {
            timings,
            deadline: None,
            camera_moving: false,
        }
    }

    fn start(&mut self, camera: &mut dyn CameraDevice, now: Instant) {
        camera.cancel_auto_focus();
        self.deadline = Some(now + self.timings.continuous_reset());
    }

    fn stop(&mut self) {
        self.deadline = None;
    }

    fn request_focus(&mut self, camera: &mut dyn CameraDevice, now: Instant) {
        if self.camera_moving {
            debug!("Focus request ignored, camera is moving");
            return;
        }
        camera.cancel_auto_focus();
        self.deadline = Some(now + self.timings.continuous_reset());
    }

    fn poll(&mut self, camera: &mut dyn CameraDevice, now: Instant) {
        if self.deadline.is_some_and(|deadline| deadline <= now) {
            camera.cancel_auto_focus();
            self.deadline = Some(now + self.timings.continuous_reset());
        }
    }
}

/// Explicit focus cycles for auto / macro modes
#[derive(Debug)]
pub struct ManualFocus {
    timings: FocusTimings,
    completion_flag: &'static AtomicBool,
    deadline: Option<Instant>,
    in_flight: bool,
    active: bool,
}

impl ManualFocus {
    fn new(timings: FocusTimings, completion_flag: &'static AtomicBool) -> Self {
        Self {
            timings,
            completion_flag,
            deadline: None,
            in_flight: false,
            active: false,
        }
    }

    fn start(&mut self, camera: &mut dyn CameraDevice, now: Instant) {
        camera.cancel_auto_focus();
        self.active = true;
        self.in_flight = false;
        self.deadline = Some(now + self.timings.manual_fast());
    }

    fn stop(&mut self, camera: &mut dyn CameraDevice) {
        self.deadline = None;
        self.active = false;
        self.in_flight = false;
        camera.cancel_auto_focus();
    }

    fn request_focus(&mut self, camera: &mut dyn CameraDevice, now: Instant) {
        if !self.active {
            return;
        }
        let completion_works = self.completion_flag.load(Ordering::SeqCst);
        if self.in_flight && completion_works {
            debug!("Focus request ignored, cycle in flight");
            return;
        }
        camera.cancel_auto_focus();
        self.in_flight = false;
        self.deadline = Some(now);
    }

    fn poll(&mut self, camera: &mut dyn CameraDevice, now: Instant) -> Option<FocusNotice> {
        if !self.deadline.is_some_and(|deadline| deadline <= now) {
            return None;
        }
        self.deadline = None;
        match camera.auto_focus() {
            Ok(()) => {
                self.in_flight = true;
                Some(FocusNotice::Moving(true))
            }
            Err(e) => {
                warn!(error = %e, "Auto-focus request failed");
                self.in_flight = false;
                self.deadline = Some(now + self.timings.manual_fast());
                Some(FocusNotice::Moving(false))
            }
        }
    }

    fn on_complete(&mut self, success: bool, now: Instant) -> bool {
        if !self.active {
            debug!(success, "Late focus completion ignored");
            return false;
        }
        self.in_flight = false;
        if !self.completion_flag.swap(true, Ordering::SeqCst) {
            debug!("Focus completion callback observed working");
        }
        let delay = if success {
            self.timings.manual_slow()
        } else {
            self.timings.manual_fast()
        };
        self.deadline = Some(now + delay);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::CameraEventSink;
    use crate::backends::virtual_camera::{CameraCall, VirtualCamera, VirtualCameraConfig};

    fn flag() -> &'static AtomicBool {
        Box::leak(Box::new(AtomicBool::new(false)))
    }

    fn camera() -> VirtualCamera {
        let mut camera = VirtualCamera::new(VirtualCameraConfig {
            report_focus_complete: false,
            ..Default::default()
        });
        camera.open(CameraEventSink::new(|_| {})).unwrap();
        camera
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_capability_selection() {
        let timings = FocusTimings::default();
        assert!(matches!(
            FocusCoordinator::for_mode(FocusMode::ContinuousVideo, timings, flag()),
            Some(FocusCoordinator::Continuous(_))
        ));
        assert!(matches!(
            FocusCoordinator::for_mode(FocusMode::Macro, timings, flag()),
            Some(FocusCoordinator::Manual(_))
        ));
        assert!(FocusCoordinator::for_mode(FocusMode::Fixed, timings, flag()).is_none());
    }

    #[test]
    fn test_continuous_resets_every_period() {
        let mut camera = camera();
        let probe = camera.probe();
        let t0 = Instant::now();
        let mut focus =
            FocusCoordinator::for_mode(FocusMode::ContinuousPicture, FocusTimings::default(), flag())
                .unwrap();

        focus.start(&mut camera, t0);
        assert_eq!(focus.next_deadline(), Some(t0 + ms(1000)));

        focus.poll(&mut camera, t0 + ms(999));
        assert_eq!(probe.count(&CameraCall::CancelAutoFocus), 1);

        focus.poll(&mut camera, t0 + ms(1000));
        assert_eq!(probe.count(&CameraCall::CancelAutoFocus), 2);
        assert_eq!(focus.next_deadline(), Some(t0 + ms(2000)));
    }

    #[test]
    fn test_continuous_ignores_request_while_moving() {
        let mut camera = camera();
        let probe = camera.probe();
        let t0 = Instant::now();
        let mut focus =
            FocusCoordinator::for_mode(FocusMode::ContinuousPicture, FocusTimings::default(), flag())
                .unwrap();
        focus.start(&mut camera, t0);

        focus.on_focus_moving(true);
        focus.request_focus(&mut camera, t0 + ms(100));
        assert_eq!(probe.count(&CameraCall::CancelAutoFocus), 1);
        assert_eq!(focus.next_deadline(), Some(t0 + ms(1000)));

        focus.on_focus_moving(false);
        focus.request_focus(&mut camera, t0 + ms(200));
        assert_eq!(probe.count(&CameraCall::CancelAutoFocus), 2);
        assert_eq!(focus.next_deadline(), Some(t0 + ms(1200)));
    }

    #[test]
    fn test_manual_schedule_follows_outcome() {
        let mut camera = camera();
        let probe = camera.probe();
        let t0 = Instant::now();
        let mut focus =
            FocusCoordinator::for_mode(FocusMode::Auto, FocusTimings::default(), flag()).unwrap();

        focus.start(&mut camera, t0);
        assert_eq!(focus.next_deadline(), Some(t0 + ms(500)));

        let t1 = t0 + ms(500);
        assert_eq!(focus.poll(&mut camera, t1), Some(FocusNotice::Moving(true)));
        assert_eq!(probe.count(&CameraCall::AutoFocus), 1);
        assert_eq!(focus.next_deadline(), None);

        assert_eq!(
            focus.on_focus_complete(true, t1 + ms(100)),
            Some(FocusNotice::Complete(true))
        );
        assert_eq!(focus.next_deadline(), Some(t1 + ms(3100)));

        let t2 = t1 + ms(3100);
        focus.poll(&mut camera, t2);
        focus.on_focus_complete(false, t2);
        assert_eq!(focus.next_deadline(), Some(t2 + ms(500)));
    }

    #[test]
    fn test_manual_request_in_flight_depends_on_completion_flag() {
        let mut camera = camera();
        let probe = camera.probe();
        let completion = flag();
        let t0 = Instant::now();
        let mut focus =
            FocusCoordinator::for_mode(FocusMode::Auto, FocusTimings::default(), completion)
                .unwrap();
        focus.start(&mut camera, t0);
        focus.poll(&mut camera, t0 + ms(500));

        // Completion never seen: the request goes through despite the cycle in flight
        focus.request_focus(&mut camera, t0 + ms(600));
        assert_eq!(focus.next_deadline(), Some(t0 + ms(600)));
        focus.poll(&mut camera, t0 + ms(600));
        assert_eq!(probe.count(&CameraCall::AutoFocus), 2);

        focus.on_focus_complete(true, t0 + ms(700));
        assert!(completion.load(Ordering::SeqCst));

        focus.poll(&mut camera, t0 + ms(3700));
        assert_eq!(probe.count(&CameraCall::AutoFocus), 3);
        focus.request_focus(&mut camera, t0 + ms(3800));
        assert_eq!(focus.next_deadline(), None, "ignored while in flight");
    }

    #[test]
    fn test_manual_stop_cancels_and_ignores_late_completion() {
        let mut camera = camera();
        let t0 = Instant::now();
        let mut focus =
            FocusCoordinator::for_mode(FocusMode::Auto, FocusTimings::default(), flag()).unwrap();
        focus.start(&mut camera, t0);
        focus.poll(&mut camera, t0 + ms(500));

        focus.stop(&mut camera);
        assert!(!focus.is_started());
        assert_eq!(focus.on_focus_complete(true, t0 + ms(600)), None);
        assert_eq!(focus.next_deadline(), None);
    }
}
