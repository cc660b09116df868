// SPDX-License-Identifier: GPL-3.0-only

//! Render thread command ordering and lifecycle

use cardscan::backends::gpu::{GpuCall, GpuError, WindowHandle};
use cardscan::backends::virtual_camera::{CameraCall, VirtualPlatform};
use cardscan::control::ControllerOptions;
use cardscan::errors::ScanError;
use cardscan::geometry::{DisplayConfiguration, Rotation};
use cardscan::recognition::ScriptedRecognizer;
use cardscan::render::{RenderEvent, RenderHandle, RenderState, RenderThread};
use std::sync::{Arc, Mutex, RwLock, mpsc};
use std::thread;
use std::time::{Duration, Instant};

fn spawn(platform: Arc<VirtualPlatform>) -> (RenderHandle, mpsc::Receiver<RenderEvent>) {
    let mut display = DisplayConfiguration::new();
    display.set_camera_parameters(Rotation::Deg90);
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let handle = RenderThread::spawn(
        platform,
        Arc::new(ScriptedRecognizer::new([])),
        Arc::new(RwLock::new(display)),
        ControllerOptions::default(),
        Arc::new(move |event| {
            let _ = tx.lock().unwrap().send(event);
        }),
    )
    .unwrap();
    (handle, rx)
}

fn wait_for<F: Fn() -> bool>(condition: F) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn test_pause_resume_pause_leaves_camera_paused() {
    let platform = Arc::new(VirtualPlatform::default());
    let (handle, events) = spawn(Arc::clone(&platform));
    assert!(handle.wait_until_ready());
    assert!(matches!(
        events.recv_timeout(Duration::from_secs(5)).unwrap(),
        RenderEvent::CameraOpened(_)
    ));
    let camera = platform.camera_probe().unwrap();
    assert!(camera.has_preview_callback());

    handle.send_pause_camera();
    handle.send_resume_camera();
    handle.send_pause_camera();

    // Installed at open and again on resume, removed by each pause
    wait_for(|| {
        camera.count(&CameraCall::SetPreviewCallback(true)) == 2
            && camera.count(&CameraCall::SetPreviewCallback(false)) == 2
    });
    assert!(!camera.has_preview_callback());
    assert_eq!(handle.state(), RenderState::Running);

    handle.shutdown();
    assert_eq!(camera.calls().last(), Some(&CameraCall::Release));
}

#[test]
fn test_surface_set_up_before_first_draw_and_released_once() {
    let platform = Arc::new(VirtualPlatform::default());
    let (handle, _events) = spawn(Arc::clone(&platform));
    handle.wait_until_ready();

    handle.send_surface_available(WindowHandle(3), true);
    handle.send_surface_changed(720, 1280);
    wait_for(|| platform.gpu_probe().is_some_and(|gpu| gpu.draw_count() >= 2));

    let gpu = platform.gpu_probe().unwrap();
    let calls = gpu.calls();
    let surface = calls
        .iter()
        .position(|c| matches!(c, GpuCall::CreateWindowSurface(_)))
        .unwrap();
    let viewport = calls
        .iter()
        .position(|c| *c == GpuCall::SetViewport(0, 0, 720, 1280))
        .unwrap();
    let first_draw = calls
        .iter()
        .position(|c| matches!(c, GpuCall::Draw(_)))
        .unwrap();
    assert!(surface < viewport && viewport < first_draw);

    handle.send_surface_destroyed();
    handle.shutdown();
    assert_eq!(
        gpu.releases(),
        vec![
            GpuCall::ReleaseProgram,
            GpuCall::ReleaseSurface,
            GpuCall::ReleaseContext
        ]
    );
}

#[test]
fn test_gpu_context_failure_reports_open_error() {
    let mut platform = VirtualPlatform::default();
    platform.gpu_failures = vec!["create_context"];
    let platform = Arc::new(platform);
    let (handle, events) = spawn(Arc::clone(&platform));
    handle.wait_until_ready();

    assert!(matches!(
        events.recv_timeout(Duration::from_secs(5)).unwrap(),
        RenderEvent::OpenCameraError(_)
    ));
    wait_for(|| handle.state() == RenderState::Terminated);
    // Camera is never created when the GPU context is missing
    assert!(platform.camera_probe().is_none());
    handle.shutdown();
}

#[test]
fn test_swap_failure_while_running_reports_once_and_tears_down() {
    let mut platform = VirtualPlatform::default();
    platform.gpu_failures = vec!["swap_buffers"];
    let platform = Arc::new(platform);
    let (handle, events) = spawn(Arc::clone(&platform));
    handle.wait_until_ready();
    assert!(matches!(
        events.recv_timeout(Duration::from_secs(5)).unwrap(),
        RenderEvent::CameraOpened(_)
    ));

    handle.send_surface_available(WindowHandle(5), true);
    handle.send_surface_changed(720, 1280);
    wait_for(|| handle.state() == RenderState::Terminated);

    let received: Vec<RenderEvent> = events.try_iter().collect();
    let errors: Vec<&ScanError> = received
        .iter()
        .filter_map(|event| match event {
            RenderEvent::RenderThreadError(e) => Some(e),
            _ => None,
        })
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], ScanError::Gpu(GpuError::Draw(_))));
    assert!(
        !received
            .iter()
            .any(|event| matches!(event, RenderEvent::OpenCameraError(_))),
        "no retry after a running failure"
    );

    let gpu = platform.gpu_probe().unwrap();
    assert_eq!(
        gpu.releases(),
        vec![
            GpuCall::ReleaseProgram,
            GpuCall::ReleaseSurface,
            GpuCall::ReleaseContext
        ]
    );
    let camera = platform.camera_probe().unwrap();
    assert_eq!(camera.calls().last(), Some(&CameraCall::Release));
    assert_eq!(camera.count(&CameraCall::Release), 1);
    handle.shutdown();
}
