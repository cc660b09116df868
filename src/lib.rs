// SPDX-License-Identifier: GPL-3.0-only

//! cardscan - real-time payment card scanning pipeline
//!
//! This library provides the camera side of a card scanner: frame hand-off
//! from the camera to a recognition worker, a render thread that owns the
//! camera and the GPU preview, and the orientation geometry that keeps the
//! overlay aligned with the rotating camera image. The recognizer itself is
//! an external collaborator behind the [`Recognizer`] trait.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`session`]: one scan as seen by the host
//! - [`render`]: render/control thread and preview geometry
//! - [`control`]: camera controller, auto-focus, torch and shake detection
//! - [`pipeline`]: frame exchange and processing worker
//! - [`geometry`]: rotations, card rectangle mapping
//! - [`backends`]: camera and GPU traits plus virtual implementations
//! - [`recognition`]: recognizer trait and a scripted stand-in
//! - [`availability`]: can this device scan at all
//! - [`config`]: user configuration handling
//!
//! # Example
//!
//! ```ignore
//! let platform = Arc::new(VirtualPlatform::default());
//! let recognizer = Arc::new(ScriptedRecognizer::demo_card());
//! let mut session = ScanSession::new(platform, recognizer, ScanRequest::default(), Config::load());
//! session.on_resume()?;
//! loop {
//!     for event in session.pump(Duration::from_millis(50)) {
//!         if let SessionEvent::Finished(outcome) = event { /* ... */ }
//!     }
//! }
//! ```

pub mod availability;
pub mod backends;
pub mod config;
pub mod constants;
pub mod control;
pub mod errors;
pub mod geometry;
pub mod pipeline;
pub mod recognition;
pub mod render;
pub mod request;
pub mod session;

// Re-export commonly used types
pub use availability::AvailabilityReport;
pub use config::Config;
pub use errors::{ScanError, ScanResult};
pub use recognition::{DetectionState, RecognitionMode, RecognitionResult, Recognizer};
pub use request::{CancelReason, Card, ScanOutcome, ScanRequest};
pub use session::{OverlayState, ScanSession, SessionEvent};
