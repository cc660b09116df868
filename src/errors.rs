// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the scanner pipeline
//!
//! Errors fall into a few families that the owning session treats differently:
//!
//! - [`ScanError::Unsupported`]: the environment cannot run a scan at all.
//!   Reported once, never retried.
//! - [`ScanError::PermissionDenied`]: recoverable, the host should run its
//!   permission flow and try again.
//! - [`ScanError::Camera`] / [`ScanError::Gpu`] / [`ScanError::RenderThread`]:
//!   fatal for the current session. The render thread has already torn down
//!   when one of these reaches the host.
//!
//! Transient orientation mismatches are not errors; the worker skips the frame.

use crate::backends::camera::BackendError;
use crate::backends::gpu::GpuError;
use std::fmt;

/// Result type alias using ScanError
pub type ScanResult<T> = Result<T, ScanError>;

/// Which environment check made scanning impossible
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsupportedReason {
    /// Device is considered too old for a smooth camera experience
    DeviceTooOld,
    /// No camera hardware at all
    NoCamera,
    /// Camera present but offers no preview size the recognizer accepts
    CameraNotSupported,
    /// Recognizer library does not run on this CPU architecture
    RecognizerUnsupported,
}

/// Main scanner error type
#[derive(Debug, Clone, PartialEq)]
pub enum ScanError {
    /// Environment check failed
    Unsupported(UnsupportedReason),
    /// Camera permission missing
    PermissionDenied,
    /// Camera device failure
    Camera(BackendError),
    /// GPU/display failure
    Gpu(GpuError),
    /// Render thread died unexpectedly
    RenderThread(String),
    /// Generic error with message
    Other(String),
}

impl ScanError {
    /// Whether the host may retry after resolving the cause (permission flow)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ScanError::PermissionDenied)
    }
}

impl fmt::Display for UnsupportedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnsupportedReason::DeviceTooOld => write!(
                f,
                "Device is considered being too old for smooth camera experience"
            ),
            UnsupportedReason::NoCamera => write!(f, "No camera"),
            UnsupportedReason::CameraNotSupported => write!(f, "Camera not supported"),
            UnsupportedReason::RecognizerUnsupported => write!(f, "Unsupported architecture"),
        }
    }
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::Unsupported(reason) => write!(f, "Scanning unavailable: {}", reason),
            ScanError::PermissionDenied => write!(f, "No camera permission"),
            ScanError::Camera(e) => write!(f, "Camera error: {}", e),
            ScanError::Gpu(e) => write!(f, "GPU error: {}", e),
            ScanError::RenderThread(msg) => write!(f, "Render thread error: {}", msg),
            ScanError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ScanError {}

impl From<BackendError> for ScanError {
    fn from(err: BackendError) -> Self {
        ScanError::Camera(err)
    }
}

impl From<GpuError> for ScanError {
    fn from(err: GpuError) -> Self {
        ScanError::Gpu(err)
    }
}

impl From<UnsupportedReason> for ScanError {
    fn from(reason: UnsupportedReason) -> Self {
        ScanError::Unsupported(reason)
    }
}

impl From<String> for ScanError {
    fn from(msg: String) -> Self {
        ScanError::Other(msg)
    }
}

impl From<&str> for ScanError {
    fn from(msg: &str) -> Self {
        ScanError::Other(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_permission_is_recoverable() {
        assert!(ScanError::PermissionDenied.is_recoverable());
        assert!(!ScanError::Unsupported(UnsupportedReason::NoCamera).is_recoverable());
        assert!(!ScanError::RenderThread("boom".into()).is_recoverable());
    }

    #[test]
    fn test_display_mentions_reason() {
        let err: ScanError = UnsupportedReason::RecognizerUnsupported.into();
        assert!(err.to_string().contains("Unsupported architecture"));
    }
}
