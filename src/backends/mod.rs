// SPDX-License-Identifier: GPL-3.0-only

//! Hardware boundary for the scanner
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │           ScanSession / RenderThread         │
//! └────────────────────┬────────────────────────┘
//!                      │ Platform
//! ┌────────────────────┴────────────────────────┐
//! │  ┌─────────────┐    ┌──────────────────┐    │
//! │  │   Camera    │    │       GPU        │    │
//! │  │  (device)   │    │ (preview output) │    │
//! │  └─────────────┘    └──────────────────┘    │
//! │  ┌─────────────────────────────────────┐    │
//! │  │  Virtual camera + headless GPU      │    │
//! │  └─────────────────────────────────────┘    │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`camera`]: camera device trait, parameters, frame buffers
//! - [`gpu`]: GPU preview output trait
//! - [`virtual_camera`]: synthetic implementations of both

pub mod camera;
pub mod gpu;
pub mod virtual_camera;

use camera::{BackendResult, CameraDevice, CameraInfo, PreviewSize};
use gpu::{GpuBackend, GpuResult};

/// Factory for per-session hardware objects
///
/// A new camera and GPU backend are created every time a session resumes,
/// and moved onto the render thread.
pub trait Platform: Send + Sync {
    fn create_camera(&self) -> BackendResult<Box<dyn CameraDevice>>;

    fn create_gpu(&self) -> GpuResult<Box<dyn GpuBackend>>;

    /// Back-facing camera description, `None` when there is no camera
    fn back_camera_info(&self) -> Option<CameraInfo>;

    fn has_camera_permission(&self) -> bool;

    /// Whether the hardware is fast enough for live recognition
    fn is_device_new_enough(&self) -> bool {
        true
    }

    /// Preview sizes of the back camera, if already known without opening it
    fn cached_preview_sizes(&self) -> Option<Vec<PreviewSize>> {
        None
    }
}
