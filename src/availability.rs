// SPDX-License-Identifier: GPL-3.0-only

//! Can this device scan cards at all?
//!
//! Cheap checks run without touching hardware; checks that would have to
//! open the camera or load the recognizer are left `NotChecked` unless the
//! blocking variant is used.

use crate::backends::Platform;
use crate::backends::camera::{CameraEventSink, find_best_preview_size};
use crate::errors::{ScanError, UnsupportedReason};
use crate::recognition::Recognizer;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    #[default]
    NotChecked,
    Passed,
    Failed,
}

impl CheckStatus {
    fn from_passed(passed: bool) -> Self {
        if passed {
            CheckStatus::Passed
        } else {
            CheckStatus::Failed
        }
    }

    fn label(&self) -> &'static str {
        match self {
            CheckStatus::NotChecked => "not checked",
            CheckStatus::Passed => "yes",
            CheckStatus::Failed => "no",
        }
    }
}

/// Outcome of the environment checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AvailabilityReport {
    /// All checks that could run did run
    pub blocking: bool,
    pub device_new_enough: CheckStatus,
    pub has_camera: CheckStatus,
    pub has_camera_permission: CheckStatus,
    pub camera_supported: CheckStatus,
    pub recognizer_supported: CheckStatus,
}

impl AvailabilityReport {
    fn statuses(&self) -> [CheckStatus; 5] {
        [
            self.device_new_enough,
            self.has_camera,
            self.has_camera_permission,
            self.camera_supported,
            self.recognizer_supported,
        ]
    }

    /// Every check ran and passed
    pub fn is_passed(&self) -> bool {
        self.statuses().iter().all(|s| *s == CheckStatus::Passed)
    }

    /// A blocking report fails unless everything passed; a non-blocking one
    /// only when some check actually failed
    pub fn is_failed(&self) -> bool {
        if self.blocking {
            !self.is_passed()
        } else {
            self.statuses().contains(&CheckStatus::Failed)
        }
    }

    pub fn is_additional_check_required(&self) -> bool {
        !self.is_failed() && !self.is_passed()
    }

    /// Permission is the only thing in the way
    pub fn is_failed_on_camera_permission(&self) -> bool {
        self.has_camera_permission == CheckStatus::Failed
            && self.device_new_enough != CheckStatus::Failed
            && self.has_camera != CheckStatus::Failed
            && self.camera_supported != CheckStatus::Failed
            && self.recognizer_supported != CheckStatus::Failed
    }

    /// Human readable reason, most fundamental problem first
    pub fn message(&self) -> String {
        if self.device_new_enough == CheckStatus::Failed {
            return "Device is considered being too old for smooth camera experience, so camera will not be used.".into();
        }
        if self.has_camera == CheckStatus::Failed {
            return "No camera".into();
        }
        if self.has_camera_permission == CheckStatus::Failed {
            return "No camera permission".into();
        }
        if self.camera_supported == CheckStatus::Failed {
            return "Camera not supported".into();
        }
        if self.recognizer_supported == CheckStatus::Failed {
            return "Unsupported architecture".into();
        }
        self.to_string()
    }

    /// The error to report, `None` when nothing failed
    pub fn to_error(&self) -> Option<ScanError> {
        let error = if self.device_new_enough == CheckStatus::Failed {
            UnsupportedReason::DeviceTooOld.into()
        } else if self.has_camera == CheckStatus::Failed {
            UnsupportedReason::NoCamera.into()
        } else if self.has_camera_permission == CheckStatus::Failed {
            ScanError::PermissionDenied
        } else if self.camera_supported == CheckStatus::Failed {
            UnsupportedReason::CameraNotSupported.into()
        } else if self.recognizer_supported == CheckStatus::Failed {
            UnsupportedReason::RecognizerUnsupported.into()
        } else {
            return None;
        };
        Some(error)
    }
}

impl fmt::Display for AvailabilityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Is new enough: {}, has camera: {}, has camera permission: {}, recognition library supported: {}, camera supported: {}",
            self.device_new_enough.label(),
            self.has_camera.label(),
            self.has_camera_permission.label(),
            self.recognizer_supported.label(),
            self.camera_supported.label()
        )
    }
}

/// Checks that need no hardware access
///
/// The recognizer is only asked when already loaded.
pub fn check(platform: &dyn Platform, recognizer: Option<&dyn Recognizer>) -> AvailabilityReport {
    let has_camera = platform.back_camera_info().is_some();
    let report = AvailabilityReport {
        blocking: false,
        device_new_enough: CheckStatus::from_passed(platform.is_device_new_enough()),
        has_camera: CheckStatus::from_passed(has_camera),
        has_camera_permission: CheckStatus::from_passed(platform.has_camera_permission()),
        camera_supported: platform
            .cached_preview_sizes()
            .map(|sizes| CheckStatus::from_passed(find_best_preview_size(&sizes).is_some()))
            .unwrap_or_default(),
        recognizer_supported: recognizer
            .map(|r| CheckStatus::from_passed(r.is_device_supported()))
            .unwrap_or_default(),
    };
    debug!(%report, "Availability check");
    report
}

/// [`check`], then whatever is still open, opening the camera if needed
pub fn check_blocking(platform: &dyn Platform, recognizer: &dyn Recognizer) -> AvailabilityReport {
    let mut report = check(platform, Some(recognizer));
    if !report.is_additional_check_required() {
        return report;
    }
    report.blocking = true;
    report.recognizer_supported = CheckStatus::from_passed(recognizer.is_device_supported());
    if report.recognizer_supported == CheckStatus::Failed {
        return report;
    }
    if report.camera_supported == CheckStatus::NotChecked {
        report.camera_supported = CheckStatus::from_passed(probe_camera(platform));
    }
    info!(%report, passed = report.is_passed(), "Blocking availability check");
    report
}

/// Open the camera once to read its preview sizes
fn probe_camera(platform: &dyn Platform) -> bool {
    let mut camera = match platform.create_camera() {
        Ok(camera) => camera,
        Err(e) => {
            warn!(error = %e, "Cannot create camera for support check");
            return false;
        }
    };
    if let Err(e) = camera.open(CameraEventSink::new(|_| {})) {
        warn!(error = %e, "Cannot open camera for support check");
        return false;
    }
    let supported = camera
        .parameters()
        .map(|parameters| find_best_preview_size(&parameters.supported_preview_sizes).is_some())
        .unwrap_or(false);
    camera.release();
    supported
}
