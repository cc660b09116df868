// SPDX-License-Identifier: GPL-3.0-only

//! Headless GPU backend
//!
//! Draws nothing. Records every call so the CLI can report frame counts and
//! tests can check ordering (one draw per frame, teardown order).

use super::{DrawCall, GpuBackend, GpuError, GpuResult, TextureId, WindowHandle};
use crate::geometry::Size;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, trace};

/// A recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCall {
    CreateContext,
    CreateWindowSurface(WindowHandle),
    CreateStreamTexture(TextureId),
    UpdateTexture(TextureId),
    SetViewport(i32, i32, i32, i32),
    Clear,
    Draw(DrawCall),
    SwapBuffers,
    ReleaseProgram,
    ReleaseSurface,
    ReleaseContext,
}

impl GpuCall {
    fn kind(&self) -> &'static str {
        match self {
            GpuCall::CreateContext => "create_context",
            GpuCall::CreateWindowSurface(_) => "create_window_surface",
            GpuCall::CreateStreamTexture(_) => "create_stream_texture",
            GpuCall::UpdateTexture(_) => "update_texture",
            GpuCall::SetViewport(..) => "set_viewport",
            GpuCall::Clear => "clear",
            GpuCall::Draw(_) => "draw",
            GpuCall::SwapBuffers => "swap_buffers",
            GpuCall::ReleaseProgram => "release_program",
            GpuCall::ReleaseSurface => "release_surface",
            GpuCall::ReleaseContext => "release_context",
        }
    }
}

#[derive(Debug, Default)]
struct Recorder {
    calls: Vec<GpuCall>,
}

/// Read access to what a [`HeadlessGpu`] did, usable from any thread
#[derive(Debug, Clone)]
pub struct GpuProbe {
    recorder: Arc<Mutex<Recorder>>,
}

impl GpuProbe {
    fn lock(&self) -> MutexGuard<'_, Recorder> {
        self.recorder
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn calls(&self) -> Vec<GpuCall> {
        self.lock().calls.clone()
    }

    pub fn draw_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| matches!(call, GpuCall::Draw(_)))
            .count()
    }

    pub fn last_draw(&self) -> Option<DrawCall> {
        self.lock().calls.iter().rev().find_map(|call| match call {
            GpuCall::Draw(draw) => Some(*draw),
            _ => None,
        })
    }

    /// Release calls in the order they happened
    pub fn releases(&self) -> Vec<GpuCall> {
        self.lock()
            .calls
            .iter()
            .filter(|call| {
                matches!(
                    call,
                    GpuCall::ReleaseProgram | GpuCall::ReleaseSurface | GpuCall::ReleaseContext
                )
            })
            .cloned()
            .collect()
    }
}

/// GPU backend that renders into nothing
#[derive(Debug)]
pub struct HeadlessGpu {
    surface_size: Size,
    recorder: Arc<Mutex<Recorder>>,
    fail_on: HashSet<&'static str>,
    has_context: bool,
    has_surface: bool,
    next_texture: u32,
}

impl HeadlessGpu {
    pub fn new(surface_size: Size) -> Self {
        Self {
            surface_size,
            recorder: Arc::new(Mutex::new(Recorder::default())),
            fail_on: HashSet::new(),
            has_context: false,
            has_surface: false,
            next_texture: 1,
        }
    }

    /// Make the named operation (e.g. `"release_surface"`) fail
    pub fn failing_on(mut self, operation: &'static str) -> Self {
        self.fail_on.insert(operation);
        self
    }

    pub fn probe(&self) -> GpuProbe {
        GpuProbe {
            recorder: Arc::clone(&self.recorder),
        }
    }

    fn record(&mut self, call: GpuCall) -> GpuResult<()> {
        let kind = call.kind();
        trace!(call = kind, "Headless GPU call");
        self.recorder
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .calls
            .push(call);
        if self.fail_on.contains(kind) {
            debug!(call = kind, "Injected GPU failure");
            return Err(match kind {
                "create_context" => GpuError::ContextCreation("injected failure".into()),
                "create_window_surface" | "release_surface" => {
                    GpuError::Surface("injected failure".into())
                }
                "draw" | "swap_buffers" => GpuError::Draw("injected failure".into()),
                _ => GpuError::Resource("injected failure".into()),
            });
        }
        Ok(())
    }

    fn require_surface(&self) -> GpuResult<()> {
        if !self.has_context {
            return Err(GpuError::NotInitialized("context"));
        }
        if !self.has_surface {
            return Err(GpuError::NotInitialized("surface"));
        }
        Ok(())
    }
}

impl GpuBackend for HeadlessGpu {
    fn create_context(&mut self) -> GpuResult<()> {
        self.record(GpuCall::CreateContext)?;
        self.has_context = true;
        Ok(())
    }

    fn create_window_surface(&mut self, window: WindowHandle) -> GpuResult<Size> {
        if !self.has_context {
            return Err(GpuError::NotInitialized("context"));
        }
        self.record(GpuCall::CreateWindowSurface(window))?;
        self.has_surface = true;
        Ok(self.surface_size)
    }

    fn create_stream_texture(&mut self) -> GpuResult<TextureId> {
        self.require_surface()?;
        let texture = TextureId(self.next_texture);
        self.record(GpuCall::CreateStreamTexture(texture))?;
        self.next_texture += 1;
        Ok(texture)
    }

    fn update_texture(&mut self, texture: TextureId) -> GpuResult<()> {
        self.require_surface()?;
        self.record(GpuCall::UpdateTexture(texture))
    }

    fn set_viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        let _ = self.record(GpuCall::SetViewport(x, y, width, height));
    }

    fn clear(&mut self) {
        let _ = self.record(GpuCall::Clear);
    }

    fn draw(&mut self, call: &DrawCall) -> GpuResult<()> {
        self.require_surface()?;
        self.record(GpuCall::Draw(*call))
    }

    fn swap_buffers(&mut self) -> GpuResult<()> {
        self.require_surface()?;
        self.record(GpuCall::SwapBuffers)
    }

    fn release_program(&mut self) -> GpuResult<()> {
        self.record(GpuCall::ReleaseProgram)
    }

    fn release_surface(&mut self) -> GpuResult<()> {
        self.has_surface = false;
        self.record(GpuCall::ReleaseSurface)
    }

    fn release_context(&mut self) -> GpuResult<()> {
        self.has_context = false;
        self.record(GpuCall::ReleaseContext)
    }
}
