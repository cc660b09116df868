// SPDX-License-Identifier: GPL-3.0-only

//! Frame pipeline under load: virtual camera → exchange → worker → recognizer

use cardscan::backends::camera::CameraEventSink;
use cardscan::backends::gpu::TextureId;
use cardscan::backends::virtual_camera::{VirtualCameraConfig, VirtualPlatform};
use cardscan::control::{CameraController, ControllerOptions};
use cardscan::geometry::{DisplayConfiguration, Rect, Rotation, Size, WorkAreaOrientation};
use cardscan::pipeline::WorkerEvent;
use cardscan::recognition::{
    DetectionState, RecognitionMode, Recognizer, RecognizerEventSink, ScriptStep,
    ScriptedRecognizer,
};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock, mpsc};
use std::thread;
use std::time::{Duration, Instant};

/// Recognizer that takes much longer per frame than the camera needs
struct SlowRecognizer {
    inner: ScriptedRecognizer,
    delay: Duration,
}

impl Recognizer for SlowRecognizer {
    fn process_frame(&self, width: u32, height: u32, rotation: Rotation, data: &[u8]) -> DetectionState {
        thread::sleep(self.delay);
        self.inner.process_frame(width, height, rotation, data)
    }

    fn reset_result(&self) {
        self.inner.reset_result();
    }

    fn set_mode(&self, mode: RecognitionMode) {
        self.inner.set_mode(mode);
    }

    fn set_idle(&self, idle: bool) {
        self.inner.set_idle(idle);
    }

    fn is_idle(&self) -> bool {
        self.inner.is_idle()
    }

    fn card_frame_rect(&self) -> Rect {
        self.inner.card_frame_rect()
    }

    fn set_torch_status(&self, on: bool) {
        self.inner.set_torch_status(on);
    }

    fn set_work_area_orientation(&self, orientation: WorkAreaOrientation) {
        self.inner.set_work_area_orientation(orientation);
    }

    fn set_event_sink(&self, sink: Option<RecognizerEventSink>) {
        self.inner.set_event_sink(sink);
    }
}

fn fast_platform() -> VirtualPlatform {
    VirtualPlatform::new(
        VirtualCameraConfig {
            frame_interval: Duration::from_millis(2),
            ..VirtualCameraConfig::default()
        },
        Size::new(720, 1280),
    )
}

fn portrait_display() -> Arc<RwLock<DisplayConfiguration>> {
    let mut display = DisplayConfiguration::new();
    display.set_camera_parameters(Rotation::Deg90);
    display.set_display_parameters(Rotation::Deg0, false);
    Arc::new(RwLock::new(display))
}

fn wait_for<F: Fn() -> bool>(condition: F) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn test_slow_recognizer_drops_frames_but_never_starves_camera() {
    let platform = fast_platform();
    let recognizer = Arc::new(SlowRecognizer {
        inner: ScriptedRecognizer::new([ScriptStep::Detect {
            state: DetectionState::ALL,
            frames: u32::MAX,
        }]),
        delay: Duration::from_millis(20),
    });
    recognizer.set_idle(false);

    let (tx, rx) = mpsc::channel();
    let mut controller = CameraController::new(
        recognizer.clone(),
        portrait_display(),
        Arc::new(move |event| {
            let _ = tx.send(event);
        }),
        ControllerOptions::default(),
    )
    .with_completion_flag(Box::leak(Box::new(AtomicBool::new(false))));

    controller
        .open(&platform, CameraEventSink::new(|_| {}), Instant::now())
        .unwrap();
    controller.start_preview(TextureId(1)).unwrap();
    let camera = platform.camera_probe().unwrap();

    wait_for(|| recognizer.inner.frames_processed() >= 10);
    controller.release();

    // Newest-wins: far fewer frames recognized than captured
    let processed = recognizer.inner.frames_processed() as u64;
    assert!(camera.frames_delivered() > processed);
    // One buffer at the worker and one pending leave one for the camera
    assert_eq!(camera.frames_without_buffer(), 0);
    assert!(
        recognizer
            .inner
            .processed_rotations()
            .iter()
            .all(|&rotation| rotation == Rotation::Deg90)
    );

    // Constant detection state is reported once
    let events: Vec<WorkerEvent> = rx.try_iter().collect();
    assert_eq!(events, vec![WorkerEvent::FrameProcessed(DetectionState::ALL)]);
}

#[test]
fn test_pausing_processing_stops_recognition() {
    let platform = fast_platform();
    let recognizer = Arc::new(ScriptedRecognizer::new([ScriptStep::Detect {
        state: DetectionState::TOP,
        frames: u32::MAX,
    }]));
    recognizer.set_idle(false);

    let mut controller = CameraController::new(
        recognizer.clone(),
        portrait_display(),
        Arc::new(|_| {}),
        ControllerOptions::default(),
    )
    .with_completion_flag(Box::leak(Box::new(AtomicBool::new(false))));
    controller
        .open(&platform, CameraEventSink::new(|_| {}), Instant::now())
        .unwrap();
    controller.start_preview(TextureId(1)).unwrap();
    wait_for(|| recognizer.frames_processed() >= 3);

    controller.pause_processing(Instant::now());
    assert!(!controller.worker_running());
    let frozen = recognizer.frames_processed();
    let camera = platform.camera_probe().unwrap();
    let delivered = camera.frames_delivered();
    wait_for(|| camera.frames_generated() > delivered + 10);
    assert_eq!(recognizer.frames_processed(), frozen);

    controller.resume_processing(Instant::now());
    wait_for(|| recognizer.frames_processed() > frozen);
    controller.release();
}
