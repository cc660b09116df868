// SPDX-License-Identifier: GPL-3.0-only

//! Capture-to-recognizer frame pipeline
//!
//! ```text
//! camera callback ──► FrameExchange (1 slot) ──► ProcessFrameWorker ──► Recognizer
//!        ▲                    │ overwritten              │
//!        └──── BufferPool ◄───┴──────────────────────────┘ recycled
//! ```

pub mod exchange;
pub mod fps;
pub mod worker;

pub use exchange::FrameExchange;
pub use fps::{FpsCounter, FpsReport};
pub use worker::{
    FPS_REPORT_INTERVAL, ProcessFrameWorker, SharedDisplayConfiguration, WorkerEvent,
    WorkerOptions,
};
