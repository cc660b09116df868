// SPDX-License-Identifier: GPL-3.0-only

//! Recognizer boundary
//!
//! The recognition algorithm itself is opaque. The pipeline hands it rotated
//! YV12 frames and gets back which card edges it currently sees; results,
//! card images and torch requests arrive asynchronously through a
//! [`RecognizerEventSink`].

pub mod scripted;

pub use scripted::{ScriptStep, ScriptedRecognizer};

use crate::errors::{ScanError, ScanResult};
use crate::geometry::{Rect, Rotation, WorkAreaOrientation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Card edges the recognizer currently sees
///
/// Replaced as a whole on every processed frame, never merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DetectionState(u8);

impl DetectionState {
    pub const NONE: DetectionState = DetectionState(0);
    pub const TOP: DetectionState = DetectionState(1);
    pub const BOTTOM: DetectionState = DetectionState(1 << 1);
    pub const LEFT: DetectionState = DetectionState(1 << 2);
    pub const RIGHT: DetectionState = DetectionState(1 << 3);
    pub const ALL: DetectionState = DetectionState(0b1111);

    /// Unknown bits are discarded
    pub const fn from_bits_truncate(bits: u8) -> Self {
        DetectionState(bits & Self::ALL.0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: DetectionState) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: DetectionState) -> Self {
        DetectionState(self.0 | other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of edges seen
    pub fn count(self) -> u32 {
        self.0.count_ones()
    }
}

impl std::ops::BitOr for DetectionState {
    type Output = DetectionState;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl std::fmt::Display for DetectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let edge = |flag: DetectionState, c: char| if self.contains(flag) { c } else { '-' };
        write!(
            f,
            "{}{}{}{}",
            edge(DetectionState::TOP, 'T'),
            edge(DetectionState::BOTTOM, 'B'),
            edge(DetectionState::LEFT, 'L'),
            edge(DetectionState::RIGHT, 'R')
        )
    }
}

/// What the recognizer should extract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecognitionMode(u8);

impl RecognitionMode {
    pub const NUMBER: RecognitionMode = RecognitionMode(1);
    pub const DATE: RecognitionMode = RecognitionMode(1 << 1);
    pub const NAME: RecognitionMode = RecognitionMode(1 << 2);
    pub const GRAB_CARD_IMAGE: RecognitionMode = RecognitionMode(1 << 3);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: RecognitionMode) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for RecognitionMode {
    type Output = RecognitionMode;

    fn bitor(self, rhs: Self) -> Self::Output {
        RecognitionMode(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for RecognitionMode {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// RGBA card image grabbed by the recognizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl CardImage {
    /// Compress to JPEG
    pub fn to_jpeg(&self, quality: u8) -> ScanResult<Vec<u8>> {
        let img = image::RgbaImage::from_raw(self.width, self.height, self.rgba.clone())
            .ok_or_else(|| {
                ScanError::Other(format!(
                    "card image buffer does not match {}x{}",
                    self.width, self.height
                ))
            })?;
        let rgb_img = image::DynamicImage::ImageRgba8(img).into_rgb8();

        let mut jpeg_data = Vec::new();
        let mut encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg_data, quality);
        encoder
            .encode_image(&rgb_img)
            .map_err(|e| ScanError::Other(format!("Failed to encode JPEG: {}", e)))?;

        info!(
            jpeg_size = jpeg_data.len(),
            original_size = self.rgba.len(),
            compression_ratio = format!(
                "{:.1}x",
                self.rgba.len() as f32 / jpeg_data.len().max(1) as f32
            ),
            "Encoded card image as JPEG"
        );
        Ok(jpeg_data)
    }
}

/// Recognition output, possibly partial
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecognitionResult {
    pub number: Option<String>,
    pub date: Option<String>,
    pub name: Option<String>,
    pub name_raw: Option<String>,
    pub number_image_rect: Option<Rect>,
    pub card_image: Option<CardImage>,
    /// First result of a recognition run
    pub is_first: bool,
    /// No further refinement will follow
    pub is_final: bool,
}

impl RecognitionResult {
    /// Placeholder before anything was recognized
    pub fn empty() -> Self {
        Self {
            is_first: true,
            ..Default::default()
        }
    }
}

/// Asynchronous recognizer output
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerEvent {
    Result(RecognitionResult),
    CardImage(CardImage),
    /// The recognizer wants the torch on or off
    TorchStatusChanged(bool),
}

/// Where the recognizer sends its [`RecognizerEvent`]s, from any thread
#[derive(Clone)]
pub struct RecognizerEventSink {
    emit: Arc<dyn Fn(RecognizerEvent) + Send + Sync>,
}

impl RecognizerEventSink {
    pub fn new<F>(emit: F) -> Self
    where
        F: Fn(RecognizerEvent) + Send + Sync + 'static,
    {
        Self {
            emit: Arc::new(emit),
        }
    }

    pub fn emit(&self, event: RecognizerEvent) {
        (self.emit)(event);
    }
}

impl std::fmt::Debug for RecognizerEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognizerEventSink").finish_non_exhaustive()
    }
}

/// The card recognizer
///
/// Shared between the worker (frames), the render thread (torch status) and
/// the session (mode, idle, results), so every method takes `&self`.
pub trait Recognizer: Send + Sync {
    /// Run recognition on one frame
    ///
    /// `rotation` turns the frame upright; the recognizer applies it itself.
    fn process_frame(&self, width: u32, height: u32, rotation: Rotation, data: &[u8])
    -> DetectionState;

    /// Forget the current (partial) result
    fn reset_result(&self);

    fn set_mode(&self, mode: RecognitionMode);

    /// An idle recognizer ignores frames
    fn set_idle(&self, idle: bool);

    fn is_idle(&self) -> bool;

    /// Where the recognizer expects the card on a portrait 720x1280 frame
    fn card_frame_rect(&self) -> Rect;

    /// Tell the recognizer the actual torch state
    fn set_torch_status(&self, on: bool);

    fn set_work_area_orientation(&self, orientation: WorkAreaOrientation);

    fn set_event_sink(&self, sink: Option<RecognizerEventSink>);

    /// Whether this recognizer can run on the current hardware
    fn is_device_supported(&self) -> bool {
        true
    }
}
