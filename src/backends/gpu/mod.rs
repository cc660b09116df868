// SPDX-License-Identifier: GPL-3.0-only

//! GPU display abstraction for the camera preview
//!
//! The render thread owns one [`GpuBackend`] for the lifetime of a session:
//! a context, a window surface, and a single external stream texture the
//! camera writes into. Drawing is one textured quad per frame.

pub mod headless;

pub use headless::{GpuCall, GpuProbe, HeadlessGpu};

use crate::geometry::Size;

/// Result type for GPU operations
pub type GpuResult<T> = Result<T, GpuError>;

/// Error types for GPU operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpuError {
    /// Context could not be created
    ContextCreation(String),
    /// Window surface could not be created or was lost
    Surface(String),
    /// Texture or program creation failed
    Resource(String),
    /// Draw or swap failed
    Draw(String),
    /// Operation needs a context / surface that does not exist
    NotInitialized(&'static str),
}

impl std::fmt::Display for GpuError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpuError::ContextCreation(msg) => write!(f, "GPU context creation failed: {}", msg),
            GpuError::Surface(msg) => write!(f, "GPU surface error: {}", msg),
            GpuError::Resource(msg) => write!(f, "GPU resource error: {}", msg),
            GpuError::Draw(msg) => write!(f, "GPU draw failed: {}", msg),
            GpuError::NotInitialized(what) => write!(f, "GPU {} not initialized", what),
        }
    }
}

impl std::error::Error for GpuError {}

/// Handle of an external (camera stream) texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

/// Opaque native window the surface is created for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub u64);

/// One textured quad
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCall {
    /// Column-major orthographic projection
    pub projection: [f32; 16],
    /// Column-major model matrix (translate * rotate * scale)
    pub model: [f32; 16],
    pub texture: TextureId,
}

/// GPU backend trait
///
/// Only ever called from the render thread.
pub trait GpuBackend: Send {
    fn create_context(&mut self) -> GpuResult<()>;

    /// Create the window surface and make it current
    ///
    /// # Returns
    /// * `Ok(Size)` - Surface dimensions in pixels
    fn create_window_surface(&mut self, window: WindowHandle) -> GpuResult<Size>;

    /// Create the stream texture and the program that samples it
    fn create_stream_texture(&mut self) -> GpuResult<TextureId>;

    /// Latch the newest camera image into the texture
    fn update_texture(&mut self, texture: TextureId) -> GpuResult<()>;

    fn set_viewport(&mut self, x: i32, y: i32, width: i32, height: i32);

    fn clear(&mut self);

    fn draw(&mut self, call: &DrawCall) -> GpuResult<()>;

    fn swap_buffers(&mut self) -> GpuResult<()>;

    /// Release the program and stream texture
    fn release_program(&mut self) -> GpuResult<()>;

    fn release_surface(&mut self) -> GpuResult<()>;

    fn release_context(&mut self) -> GpuResult<()>;
}
