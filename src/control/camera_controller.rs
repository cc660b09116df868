// SPDX-License-Identifier: GPL-3.0-only

//! Camera lifecycle on the render thread
//!
//! Owns the open [`CameraDevice`] and keeps three things in line with the
//! pause flags:
//!
//! | part            | active when                           |
//! |-----------------|---------------------------------------|
//! | focus timers    | open && resumed                       |
//! | torch           | open && resumed && processing         |
//! | frame worker    | open && resumed && processing         |
//!
//! Every state change calls the matching `sync_*` function, so pausing or
//! resuming twice is harmless.

use super::focus::{FOCUS_COMPLETE_WORKING, FocusCoordinator, FocusNotice, FocusTimings};
use super::torch::TorchCoordinator;
use crate::backends::Platform;
use crate::backends::camera::{
    BackendError, BufferPool, CameraDevice, CameraEvent, CameraEventSink, CameraInfo, CameraParameters,
    PreviewCallback, PreviewSize, configure_for_recognition,
};
use crate::backends::gpu::TextureId;
use crate::errors::{ScanError, ScanResult};
use crate::pipeline::{
    FrameExchange, ProcessFrameWorker, SharedDisplayConfiguration, WorkerEvent, WorkerOptions,
};
use crate::recognition::Recognizer;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Receiver of worker output, called on the worker thread
pub type WorkerEventSink = Arc<dyn Fn(WorkerEvent) + Send + Sync>;

/// Tunables of the controller
#[derive(Debug, Clone, Copy)]
pub struct ControllerOptions {
    /// Preview size to ask for when the recognizer supports it
    pub preview_size: PreviewSize,
    /// Buffers in the preview callback pool
    pub callback_buffers: usize,
    pub focus: FocusTimings,
    pub worker: WorkerOptions,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            preview_size: PreviewSize::new(1280, 720),
            callback_buffers: 3,
            focus: FocusTimings::default(),
            worker: WorkerOptions::default(),
        }
    }
}

/// What the camera turned out to be after opening
#[derive(Debug, Clone, PartialEq)]
pub struct OpenedCamera {
    pub parameters: CameraParameters,
    pub info: CameraInfo,
}

pub struct CameraController {
    recognizer: Arc<dyn Recognizer>,
    display: SharedDisplayConfiguration,
    worker_events: WorkerEventSink,
    options: ControllerOptions,
    completion_flag: &'static AtomicBool,

    camera: Option<Box<dyn CameraDevice>>,
    parameters: Option<CameraParameters>,
    focus: Option<FocusCoordinator>,
    torch: Option<TorchCoordinator>,
    worker: Option<ProcessFrameWorker>,

    resumed: bool,
    processing: bool,
}

impl CameraController {
    pub fn new(
        recognizer: Arc<dyn Recognizer>,
        display: SharedDisplayConfiguration,
        worker_events: WorkerEventSink,
        options: ControllerOptions,
    ) -> Self {
        Self {
            recognizer,
            display,
            worker_events,
            options,
            completion_flag: &FOCUS_COMPLETE_WORKING,
            camera: None,
            parameters: None,
            focus: None,
            torch: None,
            worker: None,
            resumed: true,
            processing: true,
        }
    }

    /// Use a private focus-complete flag instead of the process-wide one
    pub fn with_completion_flag(mut self, flag: &'static AtomicBool) -> Self {
        self.completion_flag = flag;
        self
    }

    pub fn is_open(&self) -> bool {
        self.camera.is_some()
    }

    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    /// Whether the frame worker thread currently exists
    pub fn worker_running(&self) -> bool {
        self.worker.as_ref().is_some_and(ProcessFrameWorker::is_running)
    }

    pub fn parameters(&self) -> Option<&CameraParameters> {
        self.parameters.as_ref()
    }

    pub fn focus(&self) -> Option<&FocusCoordinator> {
        self.focus.as_ref()
    }

    pub fn torch(&self) -> Option<&TorchCoordinator> {
        self.torch.as_ref()
    }

    /// Open the back camera and configure it for recognition
    ///
    /// Preview starts separately once a texture exists. On failure nothing
    /// stays open.
    pub fn open(
        &mut self,
        platform: &dyn Platform,
        events: CameraEventSink,
        now: Instant,
    ) -> ScanResult<OpenedCamera> {
        if self.camera.is_some() {
            warn!("Camera already open, releasing first");
            self.release();
        }

        let mut camera = platform.create_camera()?;
        camera.open(events)?;

        let opened = match configure_for_recognition(camera.as_mut(), self.options.preview_size) {
            Ok(parameters) => OpenedCamera {
                parameters,
                info: camera.info(),
            },
            Err(e) => {
                error!(error = %e, "Camera setup failed");
                camera.release();
                return Err(e);
            }
        };

        info!(
            preview = %opened.parameters.preview_size,
            sensor = %opened.info.sensor_orientation,
            focus_mode = %opened.parameters.focus_mode,
            "Camera opened"
        );

        self.focus = FocusCoordinator::for_mode(
            opened.parameters.focus_mode,
            self.options.focus,
            self.completion_flag,
        );
        self.torch = Some(TorchCoordinator::new(Arc::clone(&self.recognizer)));
        self.parameters = Some(opened.parameters.clone());
        self.camera = Some(camera);

        self.sync_focus(now);
        self.sync_torch();
        if let Err(e) = self.sync_process_thread(true) {
            self.release();
            return Err(e);
        }
        Ok(opened)
    }

    /// Stream the preview into `texture`
    pub fn start_preview(&mut self, texture: TextureId) -> ScanResult<()> {
        let camera = self.camera.as_mut().ok_or(BackendError::NotOpen)?;
        camera.start_preview(texture)?;
        debug!(?texture, "Camera preview started");
        Ok(())
    }

    /// Stop worker, focus and torch, then release the device
    pub fn release(&mut self) {
        self.stop_worker();
        let Some(mut camera) = self.camera.take() else {
            return;
        };
        if let Some(mut focus) = self.focus.take() {
            focus.stop(camera.as_mut());
        }
        if let Some(mut torch) = self.torch.take() {
            torch.destroy(camera.as_mut());
        }
        camera.set_preview_callback(None);
        camera.stop_preview();
        camera.release();
        self.parameters = None;
        info!("Camera released");
    }

    pub fn pause(&mut self, now: Instant) {
        if !self.resumed {
            return;
        }
        debug!("Camera paused");
        self.resumed = false;
        self.sync_all(now);
    }

    pub fn resume(&mut self, now: Instant) {
        if self.resumed {
            return;
        }
        debug!("Camera resumed");
        self.resumed = true;
        self.sync_all(now);
    }

    pub fn pause_processing(&mut self, now: Instant) {
        if !self.processing {
            return;
        }
        debug!("Frame processing paused");
        self.processing = false;
        self.sync_all(now);
    }

    pub fn resume_processing(&mut self, now: Instant) {
        if self.processing {
            return;
        }
        debug!("Frame processing resumed");
        self.processing = true;
        self.sync_all(now);
    }

    fn sync_all(&mut self, now: Instant) {
        self.sync_focus(now);
        self.sync_torch();
        if let Err(e) = self.sync_process_thread(false) {
            error!(error = %e, "Failed to restart frame worker");
        }
    }

    fn sync_focus(&mut self, now: Instant) {
        let should_run = self.resumed;
        let (Some(camera), Some(focus)) = (self.camera.as_mut(), self.focus.as_mut()) else {
            return;
        };
        if should_run && !focus.is_started() {
            focus.start(camera.as_mut(), now);
        } else if !should_run && focus.is_started() {
            focus.stop(camera.as_mut());
        }
    }

    fn sync_torch(&mut self) {
        let should_run = self.resumed && self.processing;
        let (Some(camera), Some(torch)) = (self.camera.as_mut(), self.torch.as_mut()) else {
            return;
        };
        if should_run && torch.is_paused() {
            torch.resume(camera.as_mut());
        } else if !should_run && !torch.is_paused() {
            torch.pause(camera.as_mut());
        }
    }

    fn sync_process_thread(&mut self, force: bool) -> ScanResult<()> {
        let should_run = self.resumed && self.processing && self.camera.is_some();
        if !should_run {
            if self.worker.is_some() {
                self.stop_worker();
            }
            return Ok(());
        }
        if self.worker.is_some() && !force {
            return Ok(());
        }
        self.stop_worker();
        self.start_worker()
    }

    fn start_worker(&mut self) -> ScanResult<()> {
        let (Some(camera), Some(parameters)) = (self.camera.as_mut(), self.parameters.as_ref())
        else {
            return Ok(());
        };

        let pool = BufferPool::new(self.options.callback_buffers, parameters.frame_len());
        let exchange = Arc::new(FrameExchange::new(pool.clone()));
        let sink = Arc::clone(&self.worker_events);
        let worker = ProcessFrameWorker::start(
            Arc::clone(&exchange),
            Arc::clone(&self.recognizer),
            Arc::clone(&self.display),
            self.options.worker,
            move |event| sink(event),
        )
        .map_err(ScanError::from)?;

        camera.set_preview_callback(Some(PreviewCallback {
            pool,
            on_frame: Box::new(move |frame| exchange.submit(frame)),
        }));
        debug!(
            buffers = self.options.callback_buffers,
            buffer_len = parameters.frame_len(),
            "Frame worker started"
        );
        self.worker = Some(worker);
        Ok(())
    }

    fn stop_worker(&mut self) {
        if let Some(camera) = self.camera.as_mut()
            && self.worker.is_some()
        {
            camera.set_preview_callback(None);
        }
        if let Some(worker) = self.worker.take() {
            worker.stop();
            debug!("Frame worker stopped");
        }
    }

    pub fn toggle_flash(&mut self) {
        if let (Some(camera), Some(torch)) = (self.camera.as_mut(), self.torch.as_mut()) {
            torch.toggle(camera.as_mut());
        }
    }

    pub fn on_torch_request(&mut self, on: bool) {
        if let (Some(camera), Some(torch)) = (self.camera.as_mut(), self.torch.as_mut()) {
            torch.on_recognizer_request(camera.as_mut(), on);
        }
    }

    pub fn request_focus(&mut self, now: Instant) {
        if !self.resumed {
            return;
        }
        if let (Some(camera), Some(focus)) = (self.camera.as_mut(), self.focus.as_mut()) {
            focus.request_focus(camera.as_mut(), now);
        }
    }

    /// Run due focus timers
    pub fn poll_timers(&mut self, now: Instant) -> Option<FocusNotice> {
        let (Some(camera), Some(focus)) = (self.camera.as_mut(), self.focus.as_mut()) else {
            return None;
        };
        focus.poll(camera.as_mut(), now)
    }

    /// Earliest time `poll_timers` has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        self.focus.as_ref().and_then(FocusCoordinator::next_deadline)
    }

    /// Handle a focus event raised by the device
    ///
    /// `FrameAvailable` is the render loop's business and yields nothing.
    pub fn on_camera_event(&mut self, event: CameraEvent, now: Instant) -> Option<FocusNotice> {
        let focus = self.focus.as_mut()?;
        match event {
            CameraEvent::FrameAvailable => None,
            CameraEvent::FocusMoving(moving) => Some(focus.on_focus_moving(moving)),
            CameraEvent::AutoFocusComplete(success) => focus.on_focus_complete(success, now),
        }
    }
}

impl Drop for CameraController {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::{FlashMode, FocusMode};
    use crate::backends::virtual_camera::{CameraCall, VirtualCameraConfig, VirtualPlatform};
    use crate::geometry::{DisplayConfiguration, Rotation, Size};
    use crate::recognition::ScriptedRecognizer;
    use std::sync::RwLock;
    use std::time::Duration;

    fn controller(recognizer: Arc<ScriptedRecognizer>) -> CameraController {
        let mut display = DisplayConfiguration::new();
        display.set_camera_parameters(Rotation::Deg90);
        CameraController::new(
            recognizer,
            Arc::new(RwLock::new(display)),
            Arc::new(|_| {}),
            ControllerOptions::default(),
        )
        .with_completion_flag(Box::leak(Box::new(AtomicBool::new(false))))
    }

    fn platform(config: VirtualCameraConfig) -> VirtualPlatform {
        VirtualPlatform::new(
            VirtualCameraConfig {
                frame_interval: Duration::from_millis(5),
                ..config
            },
            Size::new(720, 1280),
        )
    }

    fn open(controller: &mut CameraController, platform: &VirtualPlatform) -> OpenedCamera {
        let opened = controller
            .open(platform, CameraEventSink::new(|_| {}), Instant::now())
            .unwrap();
        controller.start_preview(TextureId(1)).unwrap();
        opened
    }

    #[test]
    fn test_open_configures_and_starts_everything() {
        let recognizer = Arc::new(ScriptedRecognizer::new([]));
        let mut controller = controller(recognizer);
        let platform = platform(VirtualCameraConfig::default());
        let opened = open(&mut controller, &platform);
        let probe = platform.camera_probe().unwrap();
        assert_eq!(opened.parameters.preview_size.width, 1280);
        assert_eq!(opened.parameters.focus_mode, FocusMode::ContinuousPicture);
        assert_eq!(opened.info.sensor_orientation, Rotation::Deg90);

        assert!(controller.worker_running());
        assert!(probe.has_preview_callback());
        assert!(controller.focus().is_some_and(FocusCoordinator::is_started));
        assert!(controller.torch().is_some_and(|torch| !torch.is_paused()));
        assert_eq!(probe.count(&CameraCall::StartPreview(TextureId(1))), 1);
    }

    #[test]
    fn test_pause_resume_is_idempotent() {
        let recognizer = Arc::new(ScriptedRecognizer::new([]));
        let mut controller = controller(recognizer);
        let platform = platform(VirtualCameraConfig::default());
        open(&mut controller, &platform);
        let probe = platform.camera_probe().unwrap();
        let now = Instant::now();

        controller.pause(now);
        controller.pause(now);
        assert!(!controller.worker_running());
        assert!(!probe.has_preview_callback());
        assert!(controller.focus().is_some_and(|focus| !focus.is_started()));

        controller.resume(now);
        controller.resume(now);
        assert!(controller.worker_running());
        assert!(probe.has_preview_callback());
        assert_eq!(probe.count(&CameraCall::SetPreviewCallback(true)), 2);
    }

    #[test]
    fn test_processing_pause_keeps_focus_running() {
        let recognizer = Arc::new(ScriptedRecognizer::new([]));
        let mut controller = controller(recognizer);
        let platform = platform(VirtualCameraConfig::default());
        open(&mut controller, &platform);
        let now = Instant::now();

        controller.pause_processing(now);
        assert!(!controller.worker_running());
        assert!(controller.focus().is_some_and(FocusCoordinator::is_started));
        assert!(controller.torch().is_some_and(TorchCoordinator::is_paused));

        controller.resume_processing(now);
        assert!(controller.worker_running());
    }

    #[test]
    fn test_torch_follows_pause() {
        let recognizer = Arc::new(ScriptedRecognizer::new([]));
        let mut controller = controller(recognizer);
        let platform = platform(VirtualCameraConfig::default());
        open(&mut controller, &platform);
        let probe = platform.camera_probe().unwrap();
        let now = Instant::now();

        controller.toggle_flash();
        controller.pause(now);
        controller.resume(now);
        assert_eq!(
            probe.flash_history(),
            vec![FlashMode::Off, FlashMode::Torch, FlashMode::Off, FlashMode::Torch]
        );
    }

    #[test]
    fn test_unsupported_camera_is_released() {
        let recognizer = Arc::new(ScriptedRecognizer::new([]));
        let mut controller = controller(recognizer);
        let platform = platform(VirtualCameraConfig {
            preview_sizes: vec![PreviewSize::new(640, 480)],
            ..Default::default()
        });
        let err = controller
            .open(&platform, CameraEventSink::new(|_| {}), Instant::now())
            .unwrap_err();
        assert!(matches!(err, ScanError::Unsupported(_)));
        assert!(!controller.is_open());
        let probe = platform.camera_probe().unwrap();
        assert_eq!(probe.count(&CameraCall::Release), 1);
    }

    #[test]
    fn test_release_order() {
        let recognizer = Arc::new(ScriptedRecognizer::new([]));
        let mut controller = controller(recognizer);
        let platform = platform(VirtualCameraConfig::default());
        open(&mut controller, &platform);
        let probe = platform.camera_probe().unwrap();

        controller.release();
        let calls = probe.calls();
        let tail: Vec<_> = calls
            .iter()
            .filter(|call| {
                matches!(
                    call,
                    CameraCall::SetPreviewCallback(false)
                        | CameraCall::StopPreview
                        | CameraCall::Release
                )
            })
            .collect();
        assert_eq!(
            tail.last().copied(),
            Some(&CameraCall::Release),
            "device released last"
        );
        assert!(!controller.is_open());
        assert!(!controller.worker_running());
    }
}
