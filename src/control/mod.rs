// SPDX-License-Identifier: GPL-3.0-only

//! Camera-side coordination driven from the render thread
//!
//! - [`camera_controller`]: open/release and pause bookkeeping
//! - [`focus`]: auto-focus timers
//! - [`torch`]: light state
//! - [`shake`]: accelerometer shake detection, used by the session to ask
//!   for a refocus

pub mod camera_controller;
pub mod focus;
pub mod shake;
pub mod torch;

pub use camera_controller::{CameraController, ControllerOptions, OpenedCamera, WorkerEventSink};
pub use focus::{FOCUS_COMPLETE_WORKING, FocusCoordinator, FocusNotice, FocusTimings};
pub use shake::{ShakeConfig, ShakeDetector};
pub use torch::TorchCoordinator;
