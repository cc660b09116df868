// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

/// Camera defaults
pub mod camera {
    pub const PREVIEW_WIDTH: u32 = 1280;
    pub const PREVIEW_HEIGHT: u32 = 720;

    /// Buffers handed to the camera for per-frame copies
    pub const CALLBACK_BUFFERS: usize = 3;

    /// One in flight at the worker, one pending in the exchange
    pub const MIN_CALLBACK_BUFFERS: usize = 2;

    /// Frame size the recognizer's card rectangle refers to (portrait)
    pub const RECOGNIZER_FRAME_WIDTH: i32 = 720;
    pub const RECOGNIZER_FRAME_HEIGHT: i32 = 1280;
}

/// Host result encoding
pub mod output {
    pub const JPEG_QUALITY: u8 = 80;
}

/// Virtual devices used by `simulate`
pub mod simulation {
    use std::time::Duration;

    /// Give up when the scripted card was not recognized by then
    pub const SESSION_TIMEOUT: Duration = Duration::from_secs(30);

    /// How long the host waits for session events per pump
    pub const PUMP_INTERVAL: Duration = Duration::from_millis(50);
}

/// Application information
pub mod app_info {
    pub const APP_NAME: &str = "cardscan";

    /// Version from git describe, falling back to the crate version
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}
