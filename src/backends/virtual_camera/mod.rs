// SPDX-License-Identifier: GPL-3.0-only

//! Virtual camera backend
//!
//! A [`CameraDevice`] that fabricates YV12 frames on its own capture thread
//! at a fixed rate. Used by the `simulate` command and by tests, which can
//! inspect what the render thread did to the device through a
//! [`VirtualCameraProbe`] and inject focus events.
//!
//! ```text
//! capture thread (paced)
//!        │
//!        ├─► pooled buffer ─► PreviewCallback::on_frame   (recognition copy)
//!        │
//!        └─► CameraEvent::FrameAvailable                  (texture updated)
//! ```

mod platform;

pub use platform::VirtualPlatform;

use crate::backends::camera::{
    BackendError, BackendResult, CameraDevice, CameraEvent, CameraEventSink, CameraFacing,
    CameraInfo, CameraParameters, FlashMode, FocusMode, Frame, LoopAction, LoopController,
    PixelFormat, PreviewCallback, PreviewSize, WhiteBalance,
};
use crate::backends::gpu::TextureId;
use crate::geometry::Rotation;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// What the virtual device claims to be and how it misbehaves
#[derive(Debug, Clone)]
pub struct VirtualCameraConfig {
    pub info: CameraInfo,
    pub preview_sizes: Vec<PreviewSize>,
    pub focus_modes: Vec<FocusMode>,
    pub flash_modes: Vec<FlashMode>,
    pub white_balance: Vec<WhiteBalance>,
    /// Time between generated frames
    pub frame_interval: Duration,
    /// Make `open` fail with this error
    pub open_error: Option<BackendError>,
    /// Make `start_preview` fail
    pub fail_start_preview: bool,
    /// Outcome reported for every auto-focus cycle
    pub focus_succeeds: bool,
    /// Deliver auto-focus completion at all
    pub report_focus_complete: bool,
}

impl Default for VirtualCameraConfig {
    fn default() -> Self {
        Self {
            info: CameraInfo {
                sensor_orientation: Rotation::Deg90,
                facing: CameraFacing::Back,
            },
            preview_sizes: vec![
                PreviewSize::new(1920, 1080),
                PreviewSize::new(1280, 720),
                PreviewSize::new(640, 480),
            ],
            focus_modes: vec![
                FocusMode::Auto,
                FocusMode::ContinuousPicture,
                FocusMode::Infinity,
            ],
            flash_modes: vec![FlashMode::Off, FlashMode::On, FlashMode::Torch],
            white_balance: vec![WhiteBalance::Auto, WhiteBalance::Daylight],
            frame_interval: Duration::from_millis(33),
            open_error: None,
            fail_start_preview: false,
            focus_succeeds: true,
            report_focus_complete: true,
        }
    }
}

impl VirtualCameraConfig {
    /// Parameters the device reports right after opening
    pub fn parameters(&self) -> CameraParameters {
        CameraParameters {
            preview_size: self
                .preview_sizes
                .first()
                .copied()
                .unwrap_or(PreviewSize::new(640, 480)),
            supported_preview_sizes: self.preview_sizes.clone(),
            pixel_format: PixelFormat::Yv12,
            focus_mode: self.focus_modes.first().copied().unwrap_or(FocusMode::Fixed),
            supported_focus_modes: self.focus_modes.clone(),
            flash_mode: FlashMode::Off,
            supported_flash_modes: self.flash_modes.clone(),
            white_balance: self
                .white_balance
                .first()
                .copied()
                .unwrap_or(WhiteBalance::Auto),
            supported_white_balance: self.white_balance.clone(),
        }
    }
}

/// A recorded device call
#[derive(Debug, Clone, PartialEq)]
pub enum CameraCall {
    Open,
    Release,
    SetParameters(CameraParameters),
    StartPreview(TextureId),
    StopPreview,
    /// `true` when a callback was installed, `false` when removed
    SetPreviewCallback(bool),
    AutoFocus,
    CancelAutoFocus,
}

#[derive(Default)]
struct Shared {
    calls: Vec<CameraCall>,
    events: Option<CameraEventSink>,
    callback: Option<PreviewCallback>,
}

/// Observation and event-injection handle for a [`VirtualCamera`]
#[derive(Clone)]
pub struct VirtualCameraProbe {
    shared: Arc<Mutex<Shared>>,
    frames_generated: Arc<AtomicU64>,
    frames_delivered: Arc<AtomicU64>,
    frames_without_buffer: Arc<AtomicU64>,
}

impl VirtualCameraProbe {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn calls(&self) -> Vec<CameraCall> {
        self.lock().calls.clone()
    }

    pub fn count(&self, call: &CameraCall) -> usize {
        self.lock().calls.iter().filter(|c| *c == call).count()
    }

    /// Flash modes applied through `set_parameters`, in order
    pub fn flash_history(&self) -> Vec<FlashMode> {
        let mut last = None;
        let mut history = Vec::new();
        for call in self.lock().calls.iter() {
            if let CameraCall::SetParameters(params) = call
                && last != Some(params.flash_mode)
            {
                last = Some(params.flash_mode);
                history.push(params.flash_mode);
            }
        }
        history
    }

    pub fn has_preview_callback(&self) -> bool {
        self.lock().callback.is_some()
    }

    pub fn frames_generated(&self) -> u64 {
        self.frames_generated.load(Ordering::SeqCst)
    }

    /// Frames copied into a pooled buffer and handed to the preview callback
    pub fn frames_delivered(&self) -> u64 {
        self.frames_delivered.load(Ordering::SeqCst)
    }

    /// Frames skipped because every pooled buffer was in flight
    pub fn frames_without_buffer(&self) -> u64 {
        self.frames_without_buffer.load(Ordering::SeqCst)
    }

    /// Deliver an event as if the hardware raised it
    pub fn emit(&self, event: CameraEvent) {
        let sink = self.lock().events.clone();
        match sink {
            Some(sink) => sink.emit(event),
            None => warn!(?event, "Virtual camera not open, event dropped"),
        }
    }
}

/// Synthetic camera device
pub struct VirtualCamera {
    config: VirtualCameraConfig,
    parameters: Option<CameraParameters>,
    capture: Option<LoopController>,
    probe: VirtualCameraProbe,
}

impl VirtualCamera {
    pub fn new(config: VirtualCameraConfig) -> Self {
        Self {
            config,
            parameters: None,
            capture: None,
            probe: VirtualCameraProbe {
                shared: Arc::new(Mutex::new(Shared::default())),
                frames_generated: Arc::new(AtomicU64::new(0)),
                frames_delivered: Arc::new(AtomicU64::new(0)),
                frames_without_buffer: Arc::new(AtomicU64::new(0)),
            },
        }
    }

    pub fn probe(&self) -> VirtualCameraProbe {
        self.probe.clone()
    }

    fn record(&self, call: CameraCall) {
        trace!(?call, "Virtual camera call");
        self.probe.lock().calls.push(call);
    }

    fn require_open(&self) -> BackendResult<&CameraParameters> {
        self.parameters.as_ref().ok_or(BackendError::NotOpen)
    }
}

/// Fill `buffer` with a flat YV12 image whose brightness follows `sequence`
fn paint_frame(buffer: &mut [u8], width: u32, height: u32, sequence: u64) {
    let luma_len = (width as usize * height as usize).min(buffer.len());
    let (luma, chroma) = buffer.split_at_mut(luma_len);
    luma.fill((sequence % 200) as u8 + 16);
    chroma.fill(128);
}

impl CameraDevice for VirtualCamera {
    fn open(&mut self, events: CameraEventSink) -> BackendResult<()> {
        self.record(CameraCall::Open);
        if let Some(err) = &self.config.open_error {
            warn!(error = %err, "Virtual camera refusing to open");
            return Err(err.clone());
        }
        self.probe.lock().events = Some(events);
        self.parameters = Some(self.config.parameters());
        info!(info = ?self.config.info, "Virtual camera opened");
        Ok(())
    }

    fn release(&mut self) {
        if self.parameters.is_none() {
            return;
        }
        self.stop_preview();
        {
            let mut shared = self.probe.lock();
            shared.callback = None;
            shared.events = None;
        }
        self.parameters = None;
        self.record(CameraCall::Release);
        info!("Virtual camera released");
    }

    fn is_open(&self) -> bool {
        self.parameters.is_some()
    }

    fn info(&self) -> CameraInfo {
        self.config.info
    }

    fn parameters(&self) -> BackendResult<CameraParameters> {
        self.require_open().cloned()
    }

    fn set_parameters(&mut self, parameters: &CameraParameters) -> BackendResult<()> {
        let current = self.require_open()?;
        if !current
            .supported_preview_sizes
            .contains(&parameters.preview_size)
        {
            return Err(BackendError::FormatNotSupported(format!(
                "preview size {}",
                parameters.preview_size
            )));
        }
        if !current
            .supported_flash_modes
            .contains(&parameters.flash_mode)
            && parameters.flash_mode != FlashMode::Off
        {
            return Err(BackendError::FormatNotSupported(format!(
                "flash mode {:?}",
                parameters.flash_mode
            )));
        }
        if !current
            .supported_focus_modes
            .contains(&parameters.focus_mode)
            && parameters.focus_mode != current.focus_mode
        {
            return Err(BackendError::FormatNotSupported(format!(
                "focus mode {}",
                parameters.focus_mode
            )));
        }
        if self.capture.is_some() && parameters.preview_size != current.preview_size {
            return Err(BackendError::Other(
                "cannot change preview size while streaming".into(),
            ));
        }

        self.record(CameraCall::SetParameters(parameters.clone()));
        self.parameters = Some(parameters.clone());
        Ok(())
    }

    fn start_preview(&mut self, texture: TextureId) -> BackendResult<()> {
        let size = self.require_open()?.preview_size;
        self.record(CameraCall::StartPreview(texture));
        if self.config.fail_start_preview {
            return Err(BackendError::Crashed("preview failed to start".into()));
        }
        if self.capture.is_some() {
            return Ok(());
        }

        let shared = Arc::clone(&self.probe.shared);
        let generated = Arc::clone(&self.probe.frames_generated);
        let delivered = Arc::clone(&self.probe.frames_delivered);
        let without_buffer = Arc::clone(&self.probe.frames_without_buffer);

        let capture = LoopController::start_paced(
            "virtual-camera",
            self.config.frame_interval,
            move || {
                let sequence = generated.fetch_add(1, Ordering::SeqCst);
                let mut shared = shared
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());

                if let Some(callback) = shared.callback.as_mut() {
                    match callback.pool.acquire() {
                        Some(mut data) => {
                            paint_frame(&mut data, size.width, size.height, sequence);
                            (callback.on_frame)(Frame {
                                width: size.width,
                                height: size.height,
                                data,
                                sequence,
                                captured_at: Instant::now(),
                            });
                            delivered.fetch_add(1, Ordering::SeqCst);
                        }
                        None => {
                            without_buffer.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                }

                let events = shared.events.clone();
                drop(shared);
                if let Some(events) = events {
                    events.emit(CameraEvent::FrameAvailable);
                }
                LoopAction::Continue
            },
        )?;

        debug!(preview = %size, ?texture, "Virtual camera preview started");
        self.capture = Some(capture);
        Ok(())
    }

    fn stop_preview(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
            self.record(CameraCall::StopPreview);
            debug!("Virtual camera preview stopped");
        }
    }

    fn set_preview_callback(&mut self, callback: Option<PreviewCallback>) {
        self.record(CameraCall::SetPreviewCallback(callback.is_some()));
        self.probe.lock().callback = callback;
    }

    fn auto_focus(&mut self) -> BackendResult<()> {
        self.require_open()?;
        self.record(CameraCall::AutoFocus);
        if self.config.report_focus_complete {
            let sink = self.probe.lock().events.clone();
            if let Some(sink) = sink {
                sink.emit(CameraEvent::AutoFocusComplete(self.config.focus_succeeds));
            }
        }
        Ok(())
    }

    fn cancel_auto_focus(&mut self) {
        if self.parameters.is_some() {
            self.record(CameraCall::CancelAutoFocus);
        }
    }
}

impl Drop for VirtualCamera {
    fn drop(&mut self) {
        self.release();
    }
}
