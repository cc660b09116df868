// SPDX-License-Identifier: GPL-3.0-only

//! Frame processing worker
//!
//! Pulls the newest frame out of the [`FrameExchange`], works out how it has
//! to be rotated for the current display orientation, hands it to the
//! recognizer and returns the buffer to the pool. Detection state changes
//! are reported through a callback; unchanged states are not repeated.

use super::exchange::FrameExchange;
use super::fps::{FpsCounter, FpsReport};
use crate::backends::camera::{BackendResult, LoopAction, LoopController};
use crate::geometry::DisplayConfiguration;
use crate::recognition::{DetectionState, Recognizer};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::{debug, info, trace};

/// Display orientation shared between the session (writer) and the worker
pub type SharedDisplayConfiguration = Arc<RwLock<DisplayConfiguration>>;

/// Frames between FPS reports
pub const FPS_REPORT_INTERVAL: u64 = 20;

/// Window of the FPS counters
const FPS_WINDOW: u32 = 50;

/// Output of the worker
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// The detection state differs from the previously reported one
    FrameProcessed(DetectionState),
    FpsReport(FpsReport),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerOptions {
    /// Emit [`WorkerEvent::FpsReport`] every [`FPS_REPORT_INTERVAL`] frames
    pub report_fps: bool,
}

struct WorkerState {
    exchange: Arc<FrameExchange>,
    recognizer: Arc<dyn Recognizer>,
    display: SharedDisplayConfiguration,
    previous: DetectionState,
    fps: Option<(FpsCounter, FpsCounter, u64)>,
    processed: u64,
    skipped: u64,
}

impl WorkerState {
    fn process_next(&mut self, on_event: &mut dyn FnMut(WorkerEvent)) -> LoopAction {
        let Some(frame) = self.exchange.take_blocking() else {
            return LoopAction::Stop;
        };
        if self.exchange.is_shutdown() {
            self.exchange.recycle(frame);
            return LoopAction::Stop;
        }

        let rotation = self
            .display
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .preprocess_frame_rotation(frame.width, frame.height);

        let state = match rotation {
            Some(rotation) => {
                self.processed += 1;
                self.recognizer
                    .process_frame(frame.width, frame.height, rotation, &frame.data)
            }
            None => {
                self.skipped += 1;
                trace!(
                    sequence = frame.sequence,
                    width = frame.width,
                    height = frame.height,
                    "Frame does not match display orientation, skipped"
                );
                DetectionState::NONE
            }
        };
        self.exchange.recycle(frame);

        if state != self.previous {
            debug!(from = %self.previous, to = %state, "Detection state changed");
            self.previous = state;
            on_event(WorkerEvent::FrameProcessed(state));
        }

        if let Some(report) = self.tick_fps() {
            on_event(WorkerEvent::FpsReport(report));
        }
        LoopAction::Continue
    }

    fn tick_fps(&mut self) -> Option<FpsReport> {
        let (processed, dropped, seen_drops) = self.fps.as_mut()?;
        let now = Instant::now();
        processed.tick_at(now);

        let total_drops = self.exchange.dropped();
        for _ in *seen_drops..total_drops {
            dropped.tick_at(now);
        }
        *seen_drops = total_drops;
        dropped.update_at(now);

        if processed.frames() % FPS_REPORT_INTERVAL != 0 {
            return None;
        }
        Some(FpsReport {
            processed_fps: processed.last_fps(),
            dropped_fps: dropped.last_fps(),
            processed_frames: processed.frames(),
            dropped_frames: total_drops,
        })
    }
}

/// Handle of a running worker thread
///
/// Dropping the handle stops and joins the thread.
pub struct ProcessFrameWorker {
    exchange: Arc<FrameExchange>,
    controller: LoopController,
}

impl ProcessFrameWorker {
    /// Spawn the worker thread
    pub fn start<F>(
        exchange: Arc<FrameExchange>,
        recognizer: Arc<dyn Recognizer>,
        display: SharedDisplayConfiguration,
        options: WorkerOptions,
        mut on_event: F,
    ) -> BackendResult<Self>
    where
        F: FnMut(WorkerEvent) + Send + 'static,
    {
        let mut state = WorkerState {
            exchange: Arc::clone(&exchange),
            recognizer,
            display,
            previous: DetectionState::NONE,
            fps: options
                .report_fps
                .then(|| (FpsCounter::new(FPS_WINDOW), FpsCounter::new(FPS_WINDOW), 0)),
            processed: 0,
            skipped: 0,
        };

        let controller = LoopController::start("process-frame", move || {
            let action = state.process_next(&mut on_event);
            if action == LoopAction::Stop {
                info!(
                    processed = state.processed,
                    skipped = state.skipped,
                    dropped = state.exchange.dropped(),
                    "Frame worker finished"
                );
            }
            action
        })?;

        Ok(Self {
            exchange,
            controller,
        })
    }

    pub fn exchange(&self) -> &Arc<FrameExchange> {
        &self.exchange
    }

    pub fn is_running(&self) -> bool {
        self.controller.is_running()
    }

    /// Stop the thread and wait for it
    ///
    /// A frame being recognized is finished first; a pending one is
    /// recycled.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if !self.exchange.is_shutdown() {
            self.exchange.shutdown();
        }
        self.controller.stop();
    }
}

impl Drop for ProcessFrameWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::{BufferPool, Frame};
    use crate::geometry::Rotation;
    use crate::recognition::{ScriptStep, ScriptedRecognizer};
    use std::sync::mpsc;
    use std::time::Duration;

    fn portrait_phone() -> SharedDisplayConfiguration {
        let mut config = DisplayConfiguration::new();
        config.set_camera_parameters(Rotation::Deg90);
        config.set_display_parameters(Rotation::Deg0, false);
        Arc::new(RwLock::new(config))
    }

    fn frame(pool: &BufferPool, width: u32, height: u32, sequence: u64) -> Frame {
        Frame {
            width,
            height,
            data: pool.acquire().unwrap(),
            sequence,
            captured_at: Instant::now(),
        }
    }

    fn recognizer(states: &[DetectionState]) -> Arc<ScriptedRecognizer> {
        let recognizer = Arc::new(ScriptedRecognizer::new(
            states
                .iter()
                .map(|&state| ScriptStep::Detect { state, frames: 1 }),
        ));
        recognizer.set_idle(false);
        recognizer
    }

    #[test]
    fn test_reports_only_state_changes() {
        let pool = BufferPool::new(3, 6);
        let exchange = Arc::new(FrameExchange::new(pool.clone()));
        let scripted = recognizer(&[
            DetectionState::TOP,
            DetectionState::TOP,
            DetectionState::ALL,
        ]);
        let (tx, rx) = mpsc::channel();

        let worker = ProcessFrameWorker::start(
            Arc::clone(&exchange),
            scripted.clone(),
            portrait_phone(),
            WorkerOptions::default(),
            move |event| {
                let _ = tx.send(event);
            },
        )
        .unwrap();

        for sequence in 0..3 {
            exchange.submit(frame(&pool, 2, 1, sequence));
            // Wait until the worker picked it up so nothing is overwritten
            while pool.available() < 3 {
                std::thread::sleep(Duration::from_millis(1));
            }
            while scripted.frames_processed() < sequence as usize + 1 {
                std::thread::sleep(Duration::from_millis(1));
            }
        }

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            WorkerEvent::FrameProcessed(DetectionState::TOP)
        );
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            WorkerEvent::FrameProcessed(DetectionState::ALL)
        );
        worker.stop();
        assert!(rx.try_recv().is_err());
        assert_eq!(scripted.processed_rotations(), vec![Rotation::Deg90; 3]);
    }

    #[test]
    fn test_mismatched_frame_skipped_with_neutral_state() {
        let pool = BufferPool::new(2, 6);
        let exchange = Arc::new(FrameExchange::new(pool.clone()));
        let scripted = recognizer(&[DetectionState::LEFT]);
        let (tx, rx) = mpsc::channel();

        let worker = ProcessFrameWorker::start(
            Arc::clone(&exchange),
            scripted.clone(),
            portrait_phone(),
            WorkerOptions::default(),
            move |event| {
                let _ = tx.send(event);
            },
        )
        .unwrap();

        exchange.submit(frame(&pool, 2, 1, 0));
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            WorkerEvent::FrameProcessed(DetectionState::LEFT)
        );

        // Portrait-shaped frame while the display expects landscape data
        exchange.submit(frame(&pool, 1, 2, 1));
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            WorkerEvent::FrameProcessed(DetectionState::NONE)
        );
        worker.stop();

        assert_eq!(scripted.frames_processed(), 1);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_stop_joins_idle_worker() {
        let pool = BufferPool::new(2, 6);
        let exchange = Arc::new(FrameExchange::new(pool));
        let worker = ProcessFrameWorker::start(
            Arc::clone(&exchange),
            recognizer(&[]),
            portrait_phone(),
            WorkerOptions::default(),
            |_| {},
        )
        .unwrap();
        assert!(worker.is_running());
        worker.stop();
        assert!(exchange.is_shutdown());
    }
}
