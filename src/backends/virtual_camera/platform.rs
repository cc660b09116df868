// SPDX-License-Identifier: GPL-3.0-only

use super::{VirtualCamera, VirtualCameraConfig, VirtualCameraProbe};
use crate::backends::Platform;
use crate::backends::camera::{BackendError, BackendResult, CameraDevice, CameraInfo, PreviewSize};
use crate::backends::gpu::{GpuBackend, GpuProbe, GpuResult, HeadlessGpu};
use crate::geometry::Size;
use std::sync::Mutex;
use tracing::debug;

/// Platform made of a [`VirtualCamera`] and a [`HeadlessGpu`]
///
/// Probes of the most recently created devices stay reachable after the
/// devices themselves moved onto the render thread.
pub struct VirtualPlatform {
    pub camera: VirtualCameraConfig,
    pub surface_size: Size,
    pub gpu_failures: Vec<&'static str>,
    pub camera_permission: bool,
    pub has_camera: bool,
    last_camera: Mutex<Option<VirtualCameraProbe>>,
    last_gpu: Mutex<Option<GpuProbe>>,
}

impl VirtualPlatform {
    pub fn new(camera: VirtualCameraConfig, surface_size: Size) -> Self {
        Self {
            camera,
            surface_size,
            gpu_failures: Vec::new(),
            camera_permission: true,
            has_camera: true,
            last_camera: Mutex::new(None),
            last_gpu: Mutex::new(None),
        }
    }

    pub fn camera_probe(&self) -> Option<VirtualCameraProbe> {
        self.last_camera
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn gpu_probe(&self) -> Option<GpuProbe> {
        self.last_gpu
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Default for VirtualPlatform {
    fn default() -> Self {
        Self::new(VirtualCameraConfig::default(), Size::new(720, 1280))
    }
}

impl Platform for VirtualPlatform {
    fn create_camera(&self) -> BackendResult<Box<dyn CameraDevice>> {
        if !self.has_camera {
            return Err(BackendError::DeviceNotFound("no back camera".into()));
        }
        let camera = VirtualCamera::new(self.camera.clone());
        *self
            .last_camera
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(camera.probe());
        debug!("Created virtual camera");
        Ok(Box::new(camera))
    }

    fn create_gpu(&self) -> GpuResult<Box<dyn GpuBackend>> {
        let gpu = self
            .gpu_failures
            .iter()
            .fold(HeadlessGpu::new(self.surface_size), |gpu, op| {
                gpu.failing_on(op)
            });
        *self
            .last_gpu
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(gpu.probe());
        debug!(surface = %self.surface_size, "Created headless GPU");
        Ok(Box::new(gpu))
    }

    fn back_camera_info(&self) -> Option<CameraInfo> {
        self.has_camera.then_some(self.camera.info)
    }

    fn has_camera_permission(&self) -> bool {
        self.camera_permission
    }

    fn cached_preview_sizes(&self) -> Option<Vec<PreviewSize>> {
        self.has_camera.then(|| self.camera.preview_sizes.clone())
    }
}
