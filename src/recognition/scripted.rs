// SPDX-License-Identifier: GPL-3.0-only

//! Deterministic recognizer driven by a script
//!
//! Stands in for the native recognizer in the `simulate` command and in
//! tests. Every processed frame consumes the script: a `Detect` step reports
//! a detection state for a number of frames, every other step fires as soon
//! as it is reached, so a run of result steps is emitted from a single
//! frame.

use super::{
    CardImage, DetectionState, RecognitionMode, RecognitionResult, Recognizer, RecognizerEvent,
    RecognizerEventSink,
};
use crate::geometry::{Rect, Rotation, WorkAreaOrientation};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, trace};

/// Where the recognizer expects the card on a 720x1280 portrait frame
pub const CARD_FRAME_RECT: Rect = Rect::new(30, 432, 30 + 660, 432 + 416);

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    /// Report `state` for the next `frames` frames
    Detect { state: DetectionState, frames: u32 },
    /// Ask for the torch on or off
    RequestTorch(bool),
    /// Deliver a recognition result
    Recognize(RecognitionResult),
    /// Deliver a card image (only in grab-image mode)
    GrabImage(CardImage),
}

struct Inner {
    script: VecDeque<ScriptStep>,
    current: Option<(DetectionState, u32)>,
    mode: RecognitionMode,
    torch_on: bool,
    orientation: Option<WorkAreaOrientation>,
    sink: Option<RecognizerEventSink>,
    rotations: Vec<Rotation>,
    resets: u32,
}

pub struct ScriptedRecognizer {
    inner: Mutex<Inner>,
    idle: AtomicBool,
}

impl ScriptedRecognizer {
    pub fn new(script: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                script: script.into_iter().collect(),
                current: None,
                mode: RecognitionMode::NUMBER,
                torch_on: false,
                orientation: None,
                sink: None,
                rotations: Vec::new(),
                resets: 0,
            }),
            idle: AtomicBool::new(true),
        }
    }

    /// A card found after a few frames of partial detection
    pub fn demo_card() -> Self {
        let partial = [
            DetectionState::TOP,
            DetectionState::TOP | DetectionState::LEFT,
            DetectionState::TOP | DetectionState::LEFT | DetectionState::RIGHT,
            DetectionState::ALL,
        ];
        let mut script: Vec<ScriptStep> = partial
            .into_iter()
            .map(|state| ScriptStep::Detect { state, frames: 5 })
            .collect();

        let result = RecognitionResult {
            number: Some("4111111111111111".into()),
            date: Some("1229".into()),
            name: Some("CARD HOLDER".into()),
            name_raw: Some("CARD HOLDER".into()),
            number_image_rect: Some(Rect::new(40, 230, 620, 290)),
            card_image: None,
            is_first: true,
            is_final: false,
        };
        script.push(ScriptStep::Recognize(result.clone()));
        script.push(ScriptStep::GrabImage(demo_card_image()));
        script.push(ScriptStep::Recognize(RecognitionResult {
            is_first: false,
            is_final: true,
            ..result
        }));
        Self::new(script)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Rotations of all frames processed so far
    pub fn processed_rotations(&self) -> Vec<Rotation> {
        self.lock().rotations.clone()
    }

    pub fn frames_processed(&self) -> usize {
        self.lock().rotations.len()
    }

    pub fn mode(&self) -> RecognitionMode {
        self.lock().mode
    }

    pub fn torch_status(&self) -> bool {
        self.lock().torch_on
    }

    pub fn work_area_orientation(&self) -> Option<WorkAreaOrientation> {
        self.lock().orientation
    }

    pub fn reset_count(&self) -> u32 {
        self.lock().resets
    }

    pub fn remaining_steps(&self) -> usize {
        self.lock().script.len()
    }

    /// Send an event as if recognition produced it
    pub fn emit(&self, event: RecognizerEvent) {
        let sink = self.lock().sink.clone();
        if let Some(sink) = sink {
            sink.emit(event);
        }
    }
}

/// Plain gradient standing in for a grabbed card picture
fn demo_card_image() -> CardImage {
    let (width, height) = (660u32, 416u32);
    let mut rgba = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            rgba.extend_from_slice(&[(x % 256) as u8, (y % 256) as u8, 160, 255]);
        }
    }
    CardImage {
        width,
        height,
        rgba,
    }
}

/// Drop fields the mode did not ask for
fn filter_result(mut result: RecognitionResult, mode: RecognitionMode) -> RecognitionResult {
    if !mode.contains(RecognitionMode::DATE) {
        result.date = None;
    }
    if !mode.contains(RecognitionMode::NAME) {
        result.name = None;
        result.name_raw = None;
    }
    if !mode.contains(RecognitionMode::GRAB_CARD_IMAGE) {
        result.card_image = None;
    }
    result
}

impl Recognizer for ScriptedRecognizer {
    fn process_frame(
        &self,
        width: u32,
        height: u32,
        rotation: Rotation,
        _data: &[u8],
    ) -> DetectionState {
        if self.is_idle() {
            return DetectionState::NONE;
        }

        let mut events = Vec::new();
        let (state, sink) = {
            let mut inner = self.lock();
            inner.rotations.push(rotation);
            trace!(width, height, %rotation, "Scripted frame");

            loop {
                if let Some((state, remaining)) = inner.current
                    && remaining > 0
                {
                    inner.current = Some((state, remaining - 1));
                    break (state, inner.sink.clone());
                }
                match inner.script.pop_front() {
                    Some(ScriptStep::Detect { state, frames }) => {
                        inner.current = Some((state, frames));
                    }
                    Some(ScriptStep::RequestTorch(on)) => {
                        inner.torch_on = on;
                        events.push(RecognizerEvent::TorchStatusChanged(on));
                    }
                    Some(ScriptStep::Recognize(result)) => {
                        events.push(RecognizerEvent::Result(filter_result(result, inner.mode)));
                    }
                    Some(ScriptStep::GrabImage(image)) => {
                        if inner.mode.contains(RecognitionMode::GRAB_CARD_IMAGE) {
                            events.push(RecognizerEvent::CardImage(image));
                        }
                    }
                    None => {
                        let state = inner
                            .current
                            .map(|(state, _)| state)
                            .unwrap_or(DetectionState::NONE);
                        break (state, inner.sink.clone());
                    }
                }
            }
        };

        if let Some(sink) = sink {
            for event in events {
                debug!(?event, "Scripted recognizer event");
                sink.emit(event);
            }
        }
        state
    }

    fn reset_result(&self) {
        let mut inner = self.lock();
        inner.resets += 1;
    }

    fn set_mode(&self, mode: RecognitionMode) {
        self.lock().mode = mode;
    }

    fn set_idle(&self, idle: bool) {
        self.idle.store(idle, Ordering::SeqCst);
    }

    fn is_idle(&self) -> bool {
        self.idle.load(Ordering::SeqCst)
    }

    fn card_frame_rect(&self) -> Rect {
        CARD_FRAME_RECT
    }

    fn set_torch_status(&self, on: bool) {
        self.lock().torch_on = on;
    }

    fn set_work_area_orientation(&self, orientation: WorkAreaOrientation) {
        self.lock().orientation = Some(orientation);
    }

    fn set_event_sink(&self, sink: Option<RecognizerEventSink>) {
        self.lock().sink = sink;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, mpsc};

    fn collecting(recognizer: &ScriptedRecognizer) -> mpsc::Receiver<RecognizerEvent> {
        let (tx, rx) = mpsc::channel();
        recognizer.set_event_sink(Some(RecognizerEventSink::new(move |event| {
            let _ = tx.send(event);
        })));
        rx
    }

    #[test]
    fn test_idle_ignores_frames() {
        let recognizer = ScriptedRecognizer::new([ScriptStep::Detect {
            state: DetectionState::ALL,
            frames: 1,
        }]);
        assert_eq!(
            recognizer.process_frame(4, 2, Rotation::Deg0, &[]),
            DetectionState::NONE
        );
        assert_eq!(recognizer.frames_processed(), 0);
    }

    #[test]
    fn test_script_progression() {
        let recognizer = ScriptedRecognizer::new([
            ScriptStep::Detect {
                state: DetectionState::TOP,
                frames: 2,
            },
            ScriptStep::RequestTorch(true),
            ScriptStep::Detect {
                state: DetectionState::ALL,
                frames: 1,
            },
        ]);
        let events = collecting(&recognizer);
        recognizer.set_idle(false);

        let states: Vec<_> = (0..4)
            .map(|_| recognizer.process_frame(4, 2, Rotation::Deg90, &[]))
            .collect();
        assert_eq!(
            states,
            vec![
                DetectionState::TOP,
                DetectionState::TOP,
                DetectionState::ALL,
                DetectionState::ALL
            ]
        );
        assert_eq!(
            events.try_recv(),
            Ok(RecognizerEvent::TorchStatusChanged(true))
        );
        assert!(recognizer.torch_status());
        assert_eq!(recognizer.processed_rotations(), vec![Rotation::Deg90; 4]);
    }

    #[test]
    fn test_result_steps_fire_together_and_respect_mode() {
        let recognizer = Arc::new(ScriptedRecognizer::demo_card());
        let events = collecting(&recognizer);
        recognizer.set_mode(RecognitionMode::NUMBER | RecognitionMode::DATE);
        recognizer.set_idle(false);

        for _ in 0..21 {
            recognizer.process_frame(1280, 720, Rotation::Deg90, &[]);
        }

        let received: Vec<_> = events.try_iter().collect();
        assert_eq!(received.len(), 2, "image skipped without grab mode");
        match &received[1] {
            RecognizerEvent::Result(result) => {
                assert!(result.is_final);
                assert_eq!(result.date.as_deref(), Some("1229"));
                assert!(result.name.is_none());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
