// SPDX-License-Identifier: GPL-3.0-only

//! Render/control thread
//!
//! One thread owns the GPU surface and the camera device for the lifetime of
//! a resumed session. Everything else talks to it through a FIFO of
//! [`RenderCommand`]s and hears back through [`RenderEvent`]s.
//!
//! ```text
//!  session ──RenderCommand──► ┌───────────────┐ ──RenderEvent──► session
//!  camera  ──CameraEvent────► │ render thread │
//!                             │  GpuBackend   │
//!                             │  Controller ──┼──► worker thread
//!                             └───────────────┘
//! ```
//!
//! Lifecycle: `Starting` → `Ready` (commands accepted) → `Running` (GPU
//! context and camera up) → `ShuttingDown` → `Terminated`. A failure while
//! starting is reported as [`RenderEvent::OpenCameraError`], a failure while
//! running as [`RenderEvent::RenderThreadError`]; either way the thread tears
//! down and exits, it never retries.

pub mod scene;

pub use scene::{PreviewScene, SpriteGeometry};

use crate::backends::Platform;
use crate::backends::camera::{CameraEvent, CameraEventSink, FocusMode};
use crate::backends::gpu::{GpuBackend, GpuResult, TextureId, WindowHandle};
use crate::control::{CameraController, ControllerOptions, FocusNotice, OpenedCamera};
use crate::errors::{ScanError, ScanResult};
use crate::geometry::{Rotation, Size, camera_data_rotation};
use crate::pipeline::{FpsReport, SharedDisplayConfiguration, WorkerEvent};
use crate::recognition::{DetectionState, Recognizer};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Messages into the render thread, processed strictly in order
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    /// A window surface exists; `new_surface` means a `SurfaceChanged`
    /// follows, otherwise the surface is set up right away
    SurfaceAvailable {
        window: WindowHandle,
        new_surface: bool,
    },
    SurfaceChanged {
        width: i32,
        height: i32,
    },
    SurfaceDestroyed,
    Shutdown,
    FrameAvailable,
    /// Rotation of the camera data relative to the display
    OrientationChanged(Rotation),
    Freeze,
    Unfreeze,
    ToggleFlash,
    RequestFocus,
    PauseCamera,
    ResumeCamera,
    PauseProcessFrames,
    ResumeProcessFrames,
    Redraw,
    FocusMoving(bool),
    FocusComplete(bool),
    /// Recognizer asked for the torch
    TorchRequest(bool),
}

impl From<CameraEvent> for RenderCommand {
    fn from(event: CameraEvent) -> Self {
        match event {
            CameraEvent::FrameAvailable => RenderCommand::FrameAvailable,
            CameraEvent::FocusMoving(moving) => RenderCommand::FocusMoving(moving),
            CameraEvent::AutoFocusComplete(success) => RenderCommand::FocusComplete(success),
        }
    }
}

/// Notifications out of the render thread
///
/// Worker events are delivered from the worker thread, everything else from
/// the render thread.
#[derive(Debug, Clone)]
pub enum RenderEvent {
    CameraOpened(OpenedCamera),
    OpenCameraError(ScanError),
    RenderThreadError(ScanError),
    FrameProcessed(DetectionState),
    FpsReport(FpsReport),
    FocusMoving { moving: bool, focus_mode: FocusMode },
    FocusComplete { success: bool, focus_mode: FocusMode },
}

impl From<WorkerEvent> for RenderEvent {
    fn from(event: WorkerEvent) -> Self {
        match event {
            WorkerEvent::FrameProcessed(state) => RenderEvent::FrameProcessed(state),
            WorkerEvent::FpsReport(report) => RenderEvent::FpsReport(report),
        }
    }
}

pub type RenderEventSink = Arc<dyn Fn(RenderEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Starting,
    Ready,
    Running,
    ShuttingDown,
    Terminated,
}

/// Binds an object to the thread that first claims it
#[derive(Debug, Default)]
pub struct ThreadAffinity {
    owner: Option<ThreadId>,
}

impl ThreadAffinity {
    pub fn claim(&mut self) {
        self.owner = Some(thread::current().id());
    }

    pub fn is_owner(&self) -> bool {
        self.owner.is_none_or(|owner| owner == thread::current().id())
    }

    #[track_caller]
    pub fn check(&self, operation: &str) {
        debug_assert!(
            self.is_owner(),
            "{} called off the owning thread {:?}",
            operation,
            self.owner
        );
    }
}

#[derive(Default)]
struct StateCell {
    state: Mutex<Option<RenderState>>,
    changed: Condvar,
}

impl StateCell {
    fn set(&self, state: RenderState) {
        let mut guard = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        trace!(?state, "Render thread state");
        *guard = Some(state);
        self.changed.notify_all();
    }

    fn get(&self) -> RenderState {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .unwrap_or(RenderState::Starting)
    }

    fn wait_while_starting(&self) -> RenderState {
        let mut guard = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        while matches!(*guard, None | Some(RenderState::Starting)) {
            guard = self
                .changed
                .wait(guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        guard.unwrap_or(RenderState::Starting)
    }
}

/// Session-side handle of a running render thread
pub struct RenderHandle {
    commands: Sender<RenderCommand>,
    state: Arc<StateCell>,
    thread: Option<JoinHandle<()>>,
}

impl RenderHandle {
    /// Queue a command; `false` when the thread is already gone
    pub fn send(&self, command: RenderCommand) -> bool {
        trace!(?command, "Queue render command");
        self.commands.send(command).is_ok()
    }

    pub fn send_surface_available(&self, window: WindowHandle, new_surface: bool) -> bool {
        self.send(RenderCommand::SurfaceAvailable {
            window,
            new_surface,
        })
    }

    pub fn send_surface_changed(&self, width: i32, height: i32) -> bool {
        self.send(RenderCommand::SurfaceChanged { width, height })
    }

    pub fn send_surface_destroyed(&self) -> bool {
        self.send(RenderCommand::SurfaceDestroyed)
    }

    pub fn send_orientation_changed(&self, rotation: Rotation) -> bool {
        self.send(RenderCommand::OrientationChanged(rotation))
    }

    pub fn send_freeze(&self) -> bool {
        self.send(RenderCommand::Freeze)
    }

    pub fn send_unfreeze(&self) -> bool {
        self.send(RenderCommand::Unfreeze)
    }

    pub fn send_toggle_flash(&self) -> bool {
        self.send(RenderCommand::ToggleFlash)
    }

    pub fn send_request_focus(&self) -> bool {
        self.send(RenderCommand::RequestFocus)
    }

    pub fn send_pause_camera(&self) -> bool {
        self.send(RenderCommand::PauseCamera)
    }

    pub fn send_resume_camera(&self) -> bool {
        self.send(RenderCommand::ResumeCamera)
    }

    pub fn send_pause_process_frames(&self) -> bool {
        self.send(RenderCommand::PauseProcessFrames)
    }

    pub fn send_resume_process_frames(&self) -> bool {
        self.send(RenderCommand::ResumeProcessFrames)
    }

    pub fn send_redraw(&self) -> bool {
        self.send(RenderCommand::Redraw)
    }

    pub fn send_torch_request(&self, on: bool) -> bool {
        self.send(RenderCommand::TorchRequest(on))
    }

    pub fn state(&self) -> RenderState {
        self.state.get()
    }

    /// Block until the thread accepts commands
    ///
    /// Returns `false` if it terminated before getting there.
    pub fn wait_until_ready(&self) -> bool {
        let state = self.state.wait_while_starting();
        state != RenderState::Terminated
    }

    /// Ask the thread to stop and wait until camera and GPU are released
    pub fn shutdown(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        let _ = self.commands.send(RenderCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Render thread panicked");
            }
            debug!("Render thread joined");
        }
    }
}

impl Drop for RenderHandle {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

/// Everything the render thread needs, moved onto it at spawn
pub struct RenderThread {
    platform: Arc<dyn Platform>,
    display: SharedDisplayConfiguration,
    events: RenderEventSink,
    commands_tx: Sender<RenderCommand>,
    commands: Receiver<RenderCommand>,
    state: Arc<StateCell>,
    affinity: ThreadAffinity,

    gpu: Option<Box<dyn GpuBackend>>,
    has_context: bool,
    has_surface: bool,
    texture: Option<TextureId>,
    scene: PreviewScene,
    controller: CameraController,
    frozen: bool,
    frames_drawn: u64,
}

enum Flow {
    Continue,
    Stop,
}

impl RenderThread {
    /// Spawn the thread and return its handle
    ///
    /// The thread starts in `Starting`; call
    /// [`RenderHandle::wait_until_ready`] before relying on it.
    pub fn spawn(
        platform: Arc<dyn Platform>,
        recognizer: Arc<dyn Recognizer>,
        display: SharedDisplayConfiguration,
        options: ControllerOptions,
        events: RenderEventSink,
    ) -> ScanResult<RenderHandle> {
        let (commands_tx, commands) = mpsc::channel();
        let state = Arc::new(StateCell::default());

        let worker_sink = Arc::clone(&events);
        let controller = CameraController::new(
            recognizer,
            Arc::clone(&display),
            Arc::new(move |event: WorkerEvent| worker_sink(event.into())),
            options,
        );

        let render = RenderThread {
            platform,
            display,
            events,
            commands_tx: commands_tx.clone(),
            commands,
            state: Arc::clone(&state),
            affinity: ThreadAffinity::default(),
            gpu: None,
            has_context: false,
            has_surface: false,
            texture: None,
            scene: PreviewScene::new(),
            controller,
            frozen: false,
            frames_drawn: 0,
        };

        let thread = thread::Builder::new()
            .name("render-camera".into())
            .spawn(move || render.run())
            .map_err(|e| ScanError::RenderThread(format!("failed to spawn: {}", e)))?;

        Ok(RenderHandle {
            commands: commands_tx,
            state,
            thread: Some(thread),
        })
    }

    fn run(mut self) {
        self.affinity.claim();
        info!("Render thread started");
        self.state.set(RenderState::Ready);

        if let Err(e) = self.start() {
            error!(error = %e, "Failed to start camera");
            self.teardown();
            (self.events)(RenderEvent::OpenCameraError(e));
            self.state.set(RenderState::Terminated);
            return;
        }
        self.state.set(RenderState::Running);

        if let Err(e) = self.run_loop() {
            error!(error = %e, "Render thread failed");
            (self.events)(RenderEvent::RenderThreadError(e));
        }

        self.state.set(RenderState::ShuttingDown);
        self.teardown();
        info!(frames_drawn = self.frames_drawn, "Render thread finished");
        self.state.set(RenderState::Terminated);
    }

    fn start(&mut self) -> ScanResult<()> {
        self.affinity.check("start");
        let mut gpu = self.platform.create_gpu()?;
        let created = gpu.create_context();
        self.gpu = Some(gpu);
        created?;
        self.has_context = true;

        let tx = self.commands_tx.clone();
        let camera_events = CameraEventSink::new(move |event| {
            let _ = tx.send(event.into());
        });
        let opened = self
            .controller
            .open(self.platform.as_ref(), camera_events, Instant::now())?;

        let display_rotation = self
            .display
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .display_rotation();
        let preview = opened.parameters.preview_size;
        self.scene
            .set_preview_size(Size::new(preview.width as i32, preview.height as i32));
        self.scene
            .set_rotation(camera_data_rotation(display_rotation, Some(&opened.info)));

        (self.events)(RenderEvent::CameraOpened(opened));
        Ok(())
    }

    fn run_loop(&mut self) -> ScanResult<()> {
        loop {
            let received = match self.controller.next_deadline() {
                Some(deadline) => {
                    let timeout = deadline.saturating_duration_since(Instant::now());
                    self.commands.recv_timeout(timeout)
                }
                None => self
                    .commands
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(command) => {
                    if let Flow::Stop = self.handle(command)? {
                        return Ok(());
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("Render command queue closed");
                    return Ok(());
                }
            }
            self.poll_timers();
        }
    }

    fn handle(&mut self, command: RenderCommand) -> ScanResult<Flow> {
        self.affinity.check("handle");
        let now = Instant::now();
        match command {
            RenderCommand::SurfaceAvailable {
                window,
                new_surface,
            } => self.surface_available(window, new_surface)?,
            RenderCommand::SurfaceChanged { width, height } => {
                self.surface_changed(Size::new(width, height))?
            }
            RenderCommand::SurfaceDestroyed => self.release_gl(),
            RenderCommand::Shutdown => {
                debug!("Shutdown requested");
                self.controller.release();
                return Ok(Flow::Stop);
            }
            RenderCommand::FrameAvailable => self.frame_available()?,
            RenderCommand::OrientationChanged(rotation) => {
                debug!(%rotation, "Camera data rotation changed");
                self.scene.set_rotation(rotation);
            }
            RenderCommand::Freeze => self.frozen = true,
            RenderCommand::Unfreeze => self.frozen = false,
            RenderCommand::ToggleFlash => self.controller.toggle_flash(),
            RenderCommand::RequestFocus => self.controller.request_focus(now),
            RenderCommand::PauseCamera => self.controller.pause(now),
            RenderCommand::ResumeCamera => self.controller.resume(now),
            RenderCommand::PauseProcessFrames => self.controller.pause_processing(now),
            RenderCommand::ResumeProcessFrames => self.controller.resume_processing(now),
            RenderCommand::Redraw => self.draw()?,
            RenderCommand::FocusMoving(moving) => {
                let notice = self
                    .controller
                    .on_camera_event(CameraEvent::FocusMoving(moving), now);
                self.notify_focus(notice);
            }
            RenderCommand::FocusComplete(success) => {
                let notice = self
                    .controller
                    .on_camera_event(CameraEvent::AutoFocusComplete(success), now);
                self.notify_focus(notice);
            }
            RenderCommand::TorchRequest(on) => self.controller.on_torch_request(on),
        }
        Ok(Flow::Continue)
    }

    fn poll_timers(&mut self) {
        let notice = self.controller.poll_timers(Instant::now());
        self.notify_focus(notice);
    }

    fn notify_focus(&self, notice: Option<FocusNotice>) {
        let (Some(notice), Some(parameters)) = (notice, self.controller.parameters()) else {
            return;
        };
        let focus_mode = parameters.focus_mode;
        (self.events)(match notice {
            FocusNotice::Moving(moving) => RenderEvent::FocusMoving { moving, focus_mode },
            FocusNotice::Complete(success) => RenderEvent::FocusComplete {
                success,
                focus_mode,
            },
        });
    }

    fn gpu(&mut self) -> ScanResult<&mut Box<dyn GpuBackend>> {
        self.gpu
            .as_mut()
            .ok_or_else(|| ScanError::RenderThread("GPU backend missing".into()))
    }

    fn surface_available(&mut self, window: WindowHandle, new_surface: bool) -> ScanResult<()> {
        self.affinity.check("surface_available");
        debug!(?window, new_surface, "Surface available");
        let gpu = self.gpu()?;
        let size = gpu.create_window_surface(window)?;
        self.has_surface = true;
        let texture = self.gpu()?.create_stream_texture()?;
        self.texture = Some(texture);

        if !new_surface {
            // No SurfaceChanged will follow for a surface from a previous run
            self.surface_changed(size)?;
        }
        Ok(())
    }

    fn surface_changed(&mut self, size: Size) -> ScanResult<()> {
        self.affinity.check("surface_changed");
        debug!(surface = %size, "Surface changed");
        self.scene.set_surface_size(size);
        self.gpu()?.set_viewport(0, 0, size.width, size.height);
        if let Some(texture) = self.texture {
            self.controller.start_preview(texture)?;
        }
        Ok(())
    }

    fn frame_available(&mut self) -> ScanResult<()> {
        let Some(texture) = self.texture else {
            trace!("Frame available without texture");
            return Ok(());
        };
        self.gpu()?.update_texture(texture)?;
        self.draw()
    }

    fn draw(&mut self) -> ScanResult<()> {
        self.affinity.check("draw");
        if self.frozen || !self.has_surface {
            return Ok(());
        }
        let Some(texture) = self.texture else {
            return Ok(());
        };
        let call = self.scene.draw_call(texture);
        let gpu = self.gpu()?;
        gpu.clear();
        gpu.draw(&call)?;
        gpu.swap_buffers()?;
        self.frames_drawn += 1;
        Ok(())
    }

    fn release_gl(&mut self) {
        self.affinity.check("release_gl");
        let Some(gpu) = self.gpu.as_mut() else {
            return;
        };
        if self.texture.take().is_some() {
            log_release("program", gpu.release_program());
        }
        if self.has_surface {
            self.has_surface = false;
            log_release("surface", gpu.release_surface());
        }
    }

    /// Camera, program, surface, context; every step is attempted
    fn teardown(&mut self) {
        self.affinity.check("teardown");
        self.controller.release();
        self.release_gl();
        if let Some(mut gpu) = self.gpu.take()
            && self.has_context
        {
            self.has_context = false;
            log_release("context", gpu.release_context());
        }
    }
}

fn log_release(what: &str, result: GpuResult<()>) {
    match result {
        Ok(()) => debug!(resource = what, "Released"),
        Err(e) => warn!(resource = what, error = %e, "Release failed"),
    }
}
