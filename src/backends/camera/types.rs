// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for camera backends

use crate::geometry::Rotation;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::trace;

/// Preview frame pixel format
///
/// Only planar YV12 is supported: a full-resolution Y plane followed by
/// quarter-resolution V and U planes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Yv12,
}

impl PixelFormat {
    /// Byte length of one `width`x`height` frame
    pub fn frame_len(&self, width: u32, height: u32) -> usize {
        match self {
            PixelFormat::Yv12 => yv12_len(width, height),
        }
    }
}

/// Byte length of a YV12 frame (`w*h*3/2`)
pub fn yv12_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3 / 2
}

/// Preview resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PreviewSize {
    pub width: u32,
    pub height: u32,
}

impl PreviewSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for PreviewSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Focus mode as reported and accepted by the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FocusMode {
    ContinuousPicture,
    ContinuousVideo,
    Edof,
    Auto,
    Macro,
    Infinity,
    Fixed,
}

/// How the focus coordinator has to drive a given focus mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusCapability {
    /// Camera refocuses on its own, reset periodically
    Continuous,
    /// Every focus cycle has to be requested
    Manual,
    /// Nothing to drive
    Fixed,
}

impl FocusMode {
    pub fn capability(&self) -> FocusCapability {
        match self {
            FocusMode::ContinuousPicture | FocusMode::ContinuousVideo | FocusMode::Edof => {
                FocusCapability::Continuous
            }
            FocusMode::Auto | FocusMode::Macro => FocusCapability::Manual,
            FocusMode::Infinity | FocusMode::Fixed => FocusCapability::Fixed,
        }
    }
}

impl std::fmt::Display for FocusMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FocusMode::ContinuousPicture => "continuous-picture",
            FocusMode::ContinuousVideo => "continuous-video",
            FocusMode::Edof => "edof",
            FocusMode::Auto => "auto",
            FocusMode::Macro => "macro",
            FocusMode::Infinity => "infinity",
            FocusMode::Fixed => "fixed",
        };
        write!(f, "{}", name)
    }
}

/// Flash / torch mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FlashMode {
    #[default]
    Off,
    On,
    /// Continuous light
    Torch,
}

impl FlashMode {
    /// Whether the light is currently emitting
    pub fn is_lit(&self) -> bool {
        !matches!(self, FlashMode::Off)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WhiteBalance {
    #[default]
    Auto,
    Daylight,
    Fluorescent,
    Incandescent,
}

/// Mutable camera settings plus what the device supports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraParameters {
    pub preview_size: PreviewSize,
    pub supported_preview_sizes: Vec<PreviewSize>,
    pub pixel_format: PixelFormat,
    pub focus_mode: FocusMode,
    pub supported_focus_modes: Vec<FocusMode>,
    pub flash_mode: FlashMode,
    pub supported_flash_modes: Vec<FlashMode>,
    pub white_balance: WhiteBalance,
    pub supported_white_balance: Vec<WhiteBalance>,
}

impl CameraParameters {
    /// Byte length of one preview frame at the current settings
    pub fn frame_len(&self) -> usize {
        self.pixel_format
            .frame_len(self.preview_size.width, self.preview_size.height)
    }

    pub fn supports_flash(&self) -> bool {
        self.supported_flash_modes.iter().any(FlashMode::is_lit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraFacing {
    Back,
    Front,
}

/// Static description of a camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraInfo {
    /// Clockwise rotation that makes the image upright in natural orientation
    pub sensor_orientation: Rotation,
    pub facing: CameraFacing,
}

/// One preview frame
#[derive(Debug)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub sequence: u64,
    pub captured_at: Instant,
}

impl Frame {
    /// Give the underlying buffer back, for recycling
    pub fn into_buffer(self) -> Vec<u8> {
        self.data
    }
}

/// Fixed set of pre-allocated preview buffers
///
/// Cloning shares the same pool. Buffers handed back beyond the original
/// capacity are discarded, so the pool never grows.
#[derive(Debug, Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
struct PoolInner {
    buffer_len: usize,
    capacity: usize,
    free: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    /// Allocate `capacity` buffers of `buffer_len` bytes each
    pub fn new(capacity: usize, buffer_len: usize) -> Self {
        let free = (0..capacity).map(|_| vec![0u8; buffer_len]).collect();
        Self {
            inner: Arc::new(PoolInner {
                buffer_len,
                capacity,
                free: Mutex::new(free),
            }),
        }
    }

    /// Take a free buffer, `None` when all are in flight
    pub fn acquire(&self) -> Option<Vec<u8>> {
        let mut free = self
            .inner
            .free
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        free.pop()
    }

    /// Return a buffer to the pool
    pub fn recycle(&self, mut buffer: Vec<u8>) {
        let mut free = self
            .inner
            .free
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if free.len() >= self.inner.capacity {
            trace!("Buffer pool full, discarding buffer");
            return;
        }
        buffer.resize(self.inner.buffer_len, 0);
        free.push(buffer);
    }

    pub fn available(&self) -> usize {
        self.inner
            .free
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn buffer_len(&self) -> usize {
        self.inner.buffer_len
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for backend operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Backend is not available on this system
    NotAvailable(String),
    /// Failed to initialize backend
    InitializationFailed(String),
    /// Camera device not found
    DeviceNotFound(String),
    /// Format not supported
    FormatNotSupported(String),
    /// Operation needs an open camera
    NotOpen,
    /// Backend crashed or became unresponsive
    Crashed(String),
    /// General I/O error
    IoError(String),
    /// Other errors
    Other(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::NotAvailable(msg) => write!(f, "Backend not available: {}", msg),
            BackendError::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            BackendError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            BackendError::FormatNotSupported(msg) => write!(f, "Format not supported: {}", msg),
            BackendError::NotOpen => write!(f, "Camera is not open"),
            BackendError::Crashed(msg) => write!(f, "Backend crashed: {}", msg),
            BackendError::IoError(msg) => write!(f, "I/O error: {}", msg),
            BackendError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::IoError(err.to_string())
    }
}
