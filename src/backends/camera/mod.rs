// SPDX-License-Identifier: GPL-3.0-only

//! Camera device abstraction
//!
//! ```text
//! ┌─────────────────────┐
//! │  CameraController   │  ← focus / torch / worker sync
//! └──────────┬──────────┘
//!            │  (render thread only)
//!            ▼
//! ┌─────────────────────┐
//! │  CameraDevice trait │  ← common interface
//! └──────────┬──────────┘
//!            │
//!            ▼
//!   ┌─────────────────┐
//!   │ VirtualCamera   │  ← synthetic frames
//!   └─────────────────┘
//! ```
//!
//! The device delivers two kinds of output: preview frames into the stream
//! texture (signalled as [`CameraEvent::FrameAvailable`]) and, when a preview
//! callback is installed, copies of each frame in pooled YV12 buffers for
//! recognition.

pub mod configuration;
pub mod frame_loop;
pub mod types;

pub use configuration::{
    configure_for_recognition, find_best_preview_size, init_auto_focus, init_white_balance,
    set_flash_light,
};
pub use frame_loop::{LoopAction, LoopController};
pub use types::*;

use crate::backends::gpu::TextureId;
use std::sync::Arc;

/// Asynchronous notifications from the camera device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraEvent {
    /// A new image landed in the preview texture
    FrameAvailable,
    /// Continuous focus started (`true`) or stopped (`false`) moving
    FocusMoving(bool),
    /// A requested auto-focus cycle finished
    AutoFocusComplete(bool),
}

/// Where the camera sends its [`CameraEvent`]s
///
/// Events may be emitted from any thread.
#[derive(Clone)]
pub struct CameraEventSink {
    emit: Arc<dyn Fn(CameraEvent) + Send + Sync>,
}

impl CameraEventSink {
    pub fn new<F>(emit: F) -> Self
    where
        F: Fn(CameraEvent) + Send + Sync + 'static,
    {
        Self {
            emit: Arc::new(emit),
        }
    }

    pub fn emit(&self, event: CameraEvent) {
        (self.emit)(event);
    }
}

impl std::fmt::Debug for CameraEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraEventSink").finish_non_exhaustive()
    }
}

/// Per-frame copy delivery for recognition
///
/// The camera takes a buffer from `pool` for every frame; when the pool is
/// empty the frame is not copied. Ownership of the buffer passes to
/// `on_frame`, which must eventually recycle it into the same pool.
pub struct PreviewCallback {
    pub pool: BufferPool,
    pub on_frame: Box<dyn FnMut(Frame) + Send>,
}

impl std::fmt::Debug for PreviewCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewCallback")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

/// Camera device trait
///
/// Implementations are owned and driven by the render thread exclusively;
/// `Send` is needed only to move the device onto that thread.
pub trait CameraDevice: Send {
    /// Open the device and start delivering events to `events`
    ///
    /// # Returns
    /// * `Ok(())` - Device is open and parameters can be queried
    /// * `Err(BackendError)` - Device missing, busy or broken
    fn open(&mut self, events: CameraEventSink) -> BackendResult<()>;

    /// Stop everything and release the device
    ///
    /// Idempotent. Drops any installed preview callback.
    fn release(&mut self);

    fn is_open(&self) -> bool;

    /// Static information (sensor orientation, facing)
    fn info(&self) -> CameraInfo;

    /// Current parameters and capabilities
    fn parameters(&self) -> BackendResult<CameraParameters>;

    /// Apply parameters
    ///
    /// Values the device does not support are rejected with
    /// [`BackendError::FormatNotSupported`].
    fn set_parameters(&mut self, parameters: &CameraParameters) -> BackendResult<()>;

    /// Start streaming into the given texture
    fn start_preview(&mut self, texture: TextureId) -> BackendResult<()>;

    fn stop_preview(&mut self);

    /// Install or remove (`None`) the per-frame copy callback
    fn set_preview_callback(&mut self, callback: Option<PreviewCallback>);

    /// Start one auto-focus cycle
    ///
    /// Completion arrives later as [`CameraEvent::AutoFocusComplete`].
    fn auto_focus(&mut self) -> BackendResult<()>;

    /// Abort a running auto-focus cycle, no completion is delivered
    fn cancel_auto_focus(&mut self);
}
