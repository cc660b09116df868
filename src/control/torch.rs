// SPDX-License-Identifier: GPL-3.0-only

//! Torch state shared between the user, the recognizer and the camera
//!
//! The recognizer may ask for light in dark scenes; the user may toggle it.
//! While paused the light stays off and requests are only remembered.

use crate::backends::camera::{CameraDevice, set_flash_light};
use crate::recognition::Recognizer;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct TorchCoordinator {
    recognizer: Arc<dyn Recognizer>,
    paused: bool,
    desired_on: bool,
}

impl std::fmt::Debug for TorchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TorchCoordinator")
            .field("paused", &self.paused)
            .field("desired_on", &self.desired_on)
            .finish()
    }
}

impl TorchCoordinator {
    /// Starts paused with the light off
    pub fn new(recognizer: Arc<dyn Recognizer>) -> Self {
        Self {
            recognizer,
            paused: true,
            desired_on: false,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Last light state asked for by the recognizer or the user
    pub fn desired_on(&self) -> bool {
        self.desired_on
    }

    pub fn pause(&mut self, camera: &mut dyn CameraDevice) {
        self.paused = true;
        apply(camera, false);
    }

    /// Re-sync the recognizer with the desired state and apply it
    pub fn resume(&mut self, camera: &mut dyn CameraDevice) {
        self.paused = false;
        self.recognizer.set_torch_status(self.desired_on);
        apply(camera, self.desired_on);
    }

    /// Flip the light as the camera currently reports it
    pub fn toggle(&mut self, camera: &mut dyn CameraDevice) {
        if self.paused {
            debug!("Torch paused, toggle ignored");
            return;
        }
        let lit = match camera.parameters() {
            Ok(parameters) => parameters.flash_mode.is_lit(),
            Err(e) => {
                warn!(error = %e, "Cannot read flash state");
                return;
            }
        };
        self.desired_on = !lit;
        self.recognizer.set_torch_status(self.desired_on);
        apply(camera, self.desired_on);
    }

    /// Recognizer asked for light on or off
    pub fn on_recognizer_request(&mut self, camera: &mut dyn CameraDevice, on: bool) {
        self.desired_on = on;
        self.recognizer.set_torch_status(on);
        if self.paused {
            debug!(on, "Torch paused, request stored");
            return;
        }
        apply(camera, on);
    }

    /// Light off for good, used when the camera goes away
    pub fn destroy(&mut self, camera: &mut dyn CameraDevice) {
        self.pause(camera);
        self.desired_on = false;
    }
}

fn apply(camera: &mut dyn CameraDevice, on: bool) {
    if !camera.is_open() {
        return;
    }
    match set_flash_light(camera, on) {
        Ok(lit) => debug!(requested = on, lit, "Torch applied"),
        Err(e) => warn!(error = %e, on, "Failed to set torch"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::{CameraEventSink, FlashMode};
    use crate::backends::virtual_camera::{VirtualCamera, VirtualCameraConfig};
    use crate::recognition::ScriptedRecognizer;

    fn setup() -> (VirtualCamera, Arc<ScriptedRecognizer>, TorchCoordinator) {
        let mut camera = VirtualCamera::new(VirtualCameraConfig::default());
        camera.open(CameraEventSink::new(|_| {})).unwrap();
        let recognizer = Arc::new(ScriptedRecognizer::new([]));
        let torch = TorchCoordinator::new(recognizer.clone());
        (camera, recognizer, torch)
    }

    fn flash(camera: &VirtualCamera) -> FlashMode {
        camera.parameters().unwrap().flash_mode
    }

    #[test]
    fn test_request_while_paused_applied_on_resume() {
        let (mut camera, recognizer, mut torch) = setup();

        torch.on_recognizer_request(&mut camera, true);
        assert_eq!(flash(&camera), FlashMode::Off);

        torch.resume(&mut camera);
        assert_eq!(flash(&camera), FlashMode::Torch);
        assert!(recognizer.torch_status());

        torch.pause(&mut camera);
        assert_eq!(flash(&camera), FlashMode::Off);
        assert!(torch.desired_on());
    }

    #[test]
    fn test_recognizer_request_keeps_both_sides_in_sync() {
        let (mut camera, recognizer, mut torch) = setup();
        torch.resume(&mut camera);

        torch.on_recognizer_request(&mut camera, true);
        assert_eq!(flash(&camera), FlashMode::Torch);
        assert!(recognizer.torch_status());

        torch.on_recognizer_request(&mut camera, false);
        assert_eq!(flash(&camera), FlashMode::Off);
        assert!(!recognizer.torch_status());
    }

    #[test]
    fn test_toggle_flips_actual_state() {
        let (mut camera, recognizer, mut torch) = setup();
        torch.toggle(&mut camera);
        assert_eq!(flash(&camera), FlashMode::Off, "ignored while paused");

        torch.resume(&mut camera);
        torch.toggle(&mut camera);
        assert_eq!(flash(&camera), FlashMode::Torch);
        assert!(recognizer.torch_status());

        torch.toggle(&mut camera);
        assert_eq!(flash(&camera), FlashMode::Off);
        assert!(!recognizer.torch_status());
    }

    #[test]
    fn test_falls_back_to_flash_on_without_torch() {
        let mut camera = VirtualCamera::new(VirtualCameraConfig {
            flash_modes: vec![FlashMode::Off, FlashMode::On],
            ..Default::default()
        });
        camera.open(CameraEventSink::new(|_| {})).unwrap();
        let mut torch = TorchCoordinator::new(Arc::new(ScriptedRecognizer::new([])));
        torch.resume(&mut camera);
        torch.on_recognizer_request(&mut camera, true);
        assert_eq!(flash(&camera), FlashMode::On);
    }

    #[test]
    fn test_no_flash_is_harmless() {
        let mut camera = VirtualCamera::new(VirtualCameraConfig {
            flash_modes: vec![FlashMode::Off],
            ..Default::default()
        });
        let probe = camera.probe();
        camera.open(CameraEventSink::new(|_| {})).unwrap();
        let mut torch = TorchCoordinator::new(Arc::new(ScriptedRecognizer::new([])));
        torch.resume(&mut camera);
        torch.on_recognizer_request(&mut camera, true);
        assert_eq!(flash(&camera), FlashMode::Off);
        assert!(probe.flash_history().iter().all(|mode| *mode == FlashMode::Off));
    }
}
