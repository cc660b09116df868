// SPDX-License-Identifier: GPL-3.0-only

//! Scan session
//!
//! Owns one scan from the host's point of view: starts the render thread on
//! resume, tears it down on pause, forwards surface and orientation changes,
//! and turns render/recognizer events into overlay state and a
//! [`ScanOutcome`].
//!
//! Render and recognizer events arrive on their own threads; both are posted
//! into one inbox that the host drains with [`ScanSession::pump`], so every
//! piece of session state is touched from the host's thread only.

use crate::backends::Platform;
use crate::backends::camera::FocusMode;
use crate::backends::gpu::WindowHandle;
use crate::config::Config;
use crate::constants::camera::{RECOGNIZER_FRAME_HEIGHT, RECOGNIZER_FRAME_WIDTH};
use crate::control::{OpenedCamera, ShakeDetector};
use crate::errors::{ScanError, ScanResult};
use crate::geometry::{
    CardRectMapper, DisplayConfiguration, Rotation, camera_data_rotation, rotate_rect,
};
use crate::pipeline::{FpsReport, SharedDisplayConfiguration};
use crate::recognition::{
    DetectionState, RecognitionMode, RecognitionResult, Recognizer, RecognizerEvent,
    RecognizerEventSink,
};
use crate::render::{RenderEvent, RenderEventSink, RenderHandle, RenderThread};
use crate::request::{Card, CancelReason, ScanOutcome, ScanRequest};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// What the host hears from a session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    CameraOpened {
        focus_mode: FocusMode,
        data_rotation: Rotation,
    },
    /// New card edge detection state for the overlay
    DetectionChanged(DetectionState),
    FpsReport(FpsReport),
    FocusMoving {
        moving: bool,
        focus_mode: FocusMode,
    },
    FocusComplete {
        success: bool,
        focus_mode: FocusMode,
    },
    /// First result of a run; frame processing is paused and the preview
    /// frozen until [`ScanSession::reset_result`]
    FirstResult(RecognitionResult),
    /// Intermediate result, more will follow
    ResultUpdated(RecognitionResult),
    /// The scan is over
    Finished(ScanOutcome),
    Error(ScanError),
}

/// Everything the host needs to draw the overlay
#[derive(Debug, Clone)]
pub struct OverlayState {
    pub mapper: CardRectMapper,
    pub detection: DetectionState,
    pub result: RecognitionResult,
}

impl Default for OverlayState {
    fn default() -> Self {
        Self {
            mapper: CardRectMapper::new(),
            detection: DetectionState::NONE,
            result: RecognitionResult::empty(),
        }
    }
}

enum Inbound {
    Render(RenderEvent),
    Recognizer(RecognizerEvent),
}

pub struct ScanSession {
    platform: Arc<dyn Platform>,
    recognizer: Arc<dyn Recognizer>,
    config: Config,
    mode: RecognitionMode,
    display: SharedDisplayConfiguration,
    render: Option<RenderHandle>,
    inbox_tx: Sender<Inbound>,
    inbox: Receiver<Inbound>,
    overlay: OverlayState,
    surface: Option<WindowHandle>,
    shake: ShakeDetector,
    last_card_image: Option<Vec<u8>>,
    outcome: Option<ScanOutcome>,
}

impl ScanSession {
    pub fn new(
        platform: Arc<dyn Platform>,
        recognizer: Arc<dyn Recognizer>,
        request: ScanRequest,
        config: Config,
    ) -> Self {
        let (inbox_tx, inbox) = mpsc::channel();
        let shake = ShakeDetector::new(config.shake);
        Self {
            platform,
            recognizer,
            mode: request.to_mode(),
            config,
            display: Arc::new(RwLock::new(DisplayConfiguration::new())),
            render: None,
            inbox_tx,
            inbox,
            overlay: OverlayState::default(),
            surface: None,
            shake,
            last_card_image: None,
            outcome: None,
        }
    }

    pub fn is_resumed(&self) -> bool {
        self.render.is_some()
    }

    pub fn overlay(&self) -> &OverlayState {
        &self.overlay
    }

    /// Result of the scan once it is over
    pub fn outcome(&self) -> Option<&ScanOutcome> {
        self.outcome.as_ref()
    }

    pub fn display_configuration(&self) -> DisplayConfiguration {
        self.display
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Start the render thread, open the camera and arm the recognizer
    ///
    /// Opening happens asynchronously; failures arrive as
    /// [`SessionEvent::Error`] from [`pump`](Self::pump).
    pub fn on_resume(&mut self) -> ScanResult<()> {
        if self.render.is_some() {
            return Ok(());
        }
        info!(mode = self.mode.bits(), "Resuming scan session");

        let sensor = self
            .platform
            .back_camera_info()
            .map(|info| info.sensor_orientation)
            .unwrap_or(Rotation::Deg0);
        self.display
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .set_camera_parameters(sensor);

        let render_tx = self.inbox_tx.clone();
        let events: RenderEventSink = Arc::new(move |event| {
            let _ = render_tx.send(Inbound::Render(event));
        });
        let handle = RenderThread::spawn(
            Arc::clone(&self.platform),
            Arc::clone(&self.recognizer),
            Arc::clone(&self.display),
            self.config.controller_options(),
            events,
        )?;
        if !handle.wait_until_ready() {
            warn!("Render thread terminated before accepting commands");
        }
        if let Some(window) = self.surface {
            handle.send_surface_available(window, false);
        }

        let recognizer_tx = self.inbox_tx.clone();
        self.recognizer.set_mode(self.mode);
        self.recognizer
            .set_event_sink(Some(RecognizerEventSink::new(move |event| {
                let _ = recognizer_tx.send(Inbound::Recognizer(event));
            })));
        self.recognizer.reset_result();

        handle.send_orientation_changed(self.camera_data_rotation());
        handle.send_unfreeze();
        self.render = Some(handle);

        self.overlay.result = RecognitionResult::empty();
        self.overlay.detection = DetectionState::NONE;
        self.last_card_image = None;
        self.shake.reset();
        self.set_recognizer_idle(false);
        Ok(())
    }

    /// Stop recognition and block until camera and GPU are released
    pub fn on_pause(&mut self) {
        let Some(handle) = self.render.take() else {
            return;
        };
        info!("Pausing scan session");
        self.recognizer.set_idle(true);
        handle.send_pause_camera();
        self.recognizer.set_event_sink(None);
        handle.shutdown();
    }

    /// A window surface was created; `SurfaceChanged` follows
    pub fn surface_created(&mut self, window: WindowHandle) {
        self.surface = Some(window);
        if let Some(render) = &self.render {
            render.send_surface_available(window, true);
        }
    }

    pub fn surface_changed(&mut self, width: i32, height: i32) {
        if let Some(render) = &self.render {
            render.send_surface_changed(width, height);
        }
    }

    pub fn surface_destroyed(&mut self) {
        self.surface = None;
        if let Some(render) = &self.render {
            render.send_surface_destroyed();
        }
    }

    /// Overlay view resized
    pub fn set_view_size(&mut self, width: i32, height: i32) -> bool {
        self.overlay.mapper.set_view_size(width, height)
    }

    /// Display rotated, or first display information
    pub fn set_display_orientation(&mut self, rotation: Rotation, natural_landscape: bool) {
        let orientation = {
            let mut display = self
                .display
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            display.set_display_parameters(rotation, natural_landscape);
            display.native_display_rotation()
        };
        self.recognizer.set_work_area_orientation(orientation);
        if let Some(render) = &self.render {
            render.send_orientation_changed(self.camera_data_rotation());
        }
    }

    /// Rotation of the camera data relative to the current display
    pub fn camera_data_rotation(&self) -> Rotation {
        let display = self
            .display
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .display_rotation();
        camera_data_rotation(display, self.platform.back_camera_info().as_ref())
    }

    pub fn toggle_flash(&self) {
        if let Some(render) = &self.render {
            render.send_toggle_flash();
        }
    }

    pub fn request_focus(&self) {
        if let Some(render) = &self.render {
            render.send_request_focus();
        }
    }

    /// Feed an accelerometer sample; a shake asks for focus
    pub fn on_accelerometer(&mut self, values: [f32; 3], now: Instant) -> bool {
        let shaken = self.shake.update(values, now);
        if shaken {
            debug!("Shake detected, requesting focus");
            self.request_focus();
        }
        shaken
    }

    pub fn freeze_preview(&self) {
        if let Some(render) = &self.render {
            render.send_freeze();
        }
    }

    pub fn unfreeze_preview(&self) {
        if let Some(render) = &self.render {
            render.send_unfreeze();
        }
    }

    /// Throw the current result away and scan again
    pub fn reset_result(&mut self) {
        debug!("Resetting recognition result");
        self.recognizer.reset_result();
        self.overlay.result = RecognitionResult::empty();
        self.overlay.detection = DetectionState::NONE;
        self.last_card_image = None;
        if let Some(render) = &self.render {
            render.send_resume_process_frames();
            render.send_unfreeze();
        }
    }

    /// Resume recognition after the host paused it
    pub fn resume_scan(&self) {
        self.set_recognizer_idle(false);
    }

    pub fn pause_scan(&self) {
        self.set_recognizer_idle(true);
    }

    /// The user left without a card
    pub fn cancel(&mut self, reason: CancelReason) -> ScanOutcome {
        info!(reason = reason.code(), "Scan cancelled");
        let outcome = ScanOutcome::Cancelled { reason };
        self.outcome = Some(outcome.clone());
        outcome
    }

    /// Wait up to `timeout` for events and handle everything queued
    pub fn pump(&mut self, timeout: Duration) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        let first = match self.inbox.recv_timeout(timeout) {
            Ok(inbound) => inbound,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                return events;
            }
        };
        events.extend(self.handle(first));
        while let Ok(inbound) = self.inbox.try_recv() {
            events.extend(self.handle(inbound));
        }
        events
    }

    fn set_recognizer_idle(&self, idle: bool) {
        self.recognizer.set_idle(idle);
        if let Some(render) = &self.render {
            if idle {
                render.send_pause_camera();
            } else {
                render.send_resume_camera();
            }
        }
    }

    fn handle(&mut self, inbound: Inbound) -> Option<SessionEvent> {
        match inbound {
            Inbound::Render(event) => self.handle_render(event),
            Inbound::Recognizer(event) => self.handle_recognizer(event),
        }
    }

    fn handle_render(&mut self, event: RenderEvent) -> Option<SessionEvent> {
        match event {
            RenderEvent::CameraOpened(opened) => Some(self.on_camera_opened(&opened)),
            RenderEvent::OpenCameraError(e) | RenderEvent::RenderThreadError(e) => {
                error!(error = %e, "Scan session failed");
                // The thread is tearing itself down; joining waits for it
                if let Some(render) = self.render.take() {
                    self.recognizer.set_idle(true);
                    self.recognizer.set_event_sink(None);
                    render.shutdown();
                }
                if !e.is_recoverable() {
                    self.outcome = Some(ScanOutcome::Failed {
                        message: e.to_string(),
                    });
                }
                Some(SessionEvent::Error(e))
            }
            RenderEvent::FrameProcessed(state) => {
                self.overlay.detection = state;
                Some(SessionEvent::DetectionChanged(state))
            }
            RenderEvent::FpsReport(report) => Some(SessionEvent::FpsReport(report)),
            RenderEvent::FocusMoving { moving, focus_mode } => {
                Some(SessionEvent::FocusMoving { moving, focus_mode })
            }
            RenderEvent::FocusComplete {
                success,
                focus_mode,
            } => Some(SessionEvent::FocusComplete {
                success,
                focus_mode,
            }),
        }
    }

    fn on_camera_opened(&mut self, opened: &OpenedCamera) -> SessionEvent {
        let data_rotation = self.camera_data_rotation();
        let preview = opened.parameters.preview_size;
        let card_rect = rotate_rect(
            self.recognizer.card_frame_rect(),
            RECOGNIZER_FRAME_WIDTH,
            RECOGNIZER_FRAME_HEIGHT,
            Rotation::Deg90,
        );
        self.overlay.mapper.set_camera_parameters(
            preview.width as i32,
            preview.height as i32,
            data_rotation,
            card_rect,
        );
        info!(
            preview = %preview,
            rotation = %data_rotation,
            card_rect = %self.overlay.mapper.card_rect(),
            "Camera opened"
        );
        SessionEvent::CameraOpened {
            focus_mode: opened.parameters.focus_mode,
            data_rotation,
        }
    }

    fn handle_recognizer(&mut self, event: RecognizerEvent) -> Option<SessionEvent> {
        match event {
            RecognizerEvent::Result(result) => Some(self.on_result(result)),
            RecognizerEvent::CardImage(image) => {
                match image.to_jpeg(self.config.jpeg_quality) {
                    Ok(jpeg) => self.last_card_image = Some(jpeg),
                    Err(e) => warn!(error = %e, "Dropping card image"),
                }
                None
            }
            RecognizerEvent::TorchStatusChanged(on) => {
                if let Some(render) = &self.render {
                    render.send_torch_request(on);
                }
                None
            }
        }
    }

    fn on_result(&mut self, result: RecognitionResult) -> SessionEvent {
        self.overlay.result = result.clone();
        if result.is_first {
            debug!("First recognition result, freezing preview");
            self.overlay.detection = DetectionState::ALL;
            if let Some(render) = &self.render {
                render.send_pause_process_frames();
                render.send_freeze();
            }
        }

        if result.is_final {
            let card = Card::from_result(&result);
            info!(card = %card, "Card recognized");
            let outcome = ScanOutcome::Completed {
                card,
                image: self.last_card_image.take(),
            };
            self.outcome = Some(outcome.clone());
            return SessionEvent::Finished(outcome);
        }

        if result.is_first {
            SessionEvent::FirstResult(result)
        } else {
            SessionEvent::ResultUpdated(result)
        }
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        self.on_pause();
    }
}
