// SPDX-License-Identifier: GPL-3.0-only

//! Camera parameter selection for card recognition

use super::{
    BackendResult, CameraDevice, CameraParameters, FlashMode, FocusMode, PixelFormat, PreviewSize,
    WhiteBalance,
};
use crate::errors::{ScanError, ScanResult, UnsupportedReason};
use tracing::{debug, info, warn};

/// Preview sizes the recognizer accepts, best first
pub const RECOGNIZER_PREVIEW_SIZES: &[PreviewSize] = &[PreviewSize::new(1280, 720)];

/// Focus modes in order of preference
const FOCUS_PREFERENCE: &[FocusMode] = &[
    FocusMode::ContinuousPicture,
    FocusMode::Auto,
    FocusMode::Macro,
    FocusMode::Edof,
];

/// Pick the best recognizer-supported size the camera offers
pub fn find_best_preview_size(supported: &[PreviewSize]) -> Option<PreviewSize> {
    RECOGNIZER_PREVIEW_SIZES
        .iter()
        .copied()
        .find(|size| supported.contains(size))
}

/// Select a focus mode by preference
///
/// With `enable_continuous` off, continuous-picture is tried last instead of
/// first. Leaves the mode untouched when nothing preferred is supported.
pub fn init_auto_focus(parameters: &mut CameraParameters, enable_continuous: bool) {
    let mut preference = FOCUS_PREFERENCE.to_vec();
    if !enable_continuous {
        preference.retain(|mode| *mode != FocusMode::ContinuousPicture);
        preference.push(FocusMode::ContinuousPicture);
    }
    if let Some(mode) = preference
        .into_iter()
        .find(|mode| parameters.supported_focus_modes.contains(mode))
    {
        debug!(focus_mode = %mode, "Selected focus mode");
        parameters.focus_mode = mode;
    }
}

pub fn init_white_balance(parameters: &mut CameraParameters) {
    if parameters
        .supported_white_balance
        .contains(&WhiteBalance::Auto)
    {
        parameters.white_balance = WhiteBalance::Auto;
    }
}

/// Turn the light on or off
///
/// Prefers torch, falls back to flash-on. Returns whether the light is now
/// on; `false` for an enable request the camera cannot honour.
pub fn set_flash_light(camera: &mut dyn CameraDevice, enable: bool) -> BackendResult<bool> {
    let mut parameters = camera.parameters()?;
    let mode = if enable {
        if parameters.supported_flash_modes.contains(&FlashMode::Torch) {
            FlashMode::Torch
        } else if parameters.supported_flash_modes.contains(&FlashMode::On) {
            FlashMode::On
        } else {
            warn!("Camera has no torch or flash, ignoring light request");
            return Ok(false);
        }
    } else {
        FlashMode::Off
    };

    if parameters.flash_mode != mode {
        parameters.flash_mode = mode;
        camera.set_parameters(&parameters)?;
    }
    debug!(flash_mode = ?mode, "Flash mode applied");
    Ok(enable)
}

/// Configure a freshly opened camera for recognition
///
/// Preview size (`preferred` when both camera and recognizer accept it),
/// YV12 format, auto white balance and focus mode. Fails with
/// [`UnsupportedReason::CameraNotSupported`] when no recognizer size is
/// available.
pub fn configure_for_recognition(
    camera: &mut dyn CameraDevice,
    preferred: PreviewSize,
) -> ScanResult<CameraParameters> {
    let mut parameters = camera.parameters()?;
    let supported = &parameters.supported_preview_sizes;
    let preferred_usable =
        RECOGNIZER_PREVIEW_SIZES.contains(&preferred) && supported.contains(&preferred);
    if !preferred_usable {
        debug!(%preferred, "Preferred preview size unusable, picking best");
    }
    let best = preferred_usable
        .then_some(preferred)
        .or_else(|| find_best_preview_size(supported));
    let Some(size) = best else {
        warn!(
            supported = ?parameters.supported_preview_sizes,
            "No recognizer-compatible preview size"
        );
        return Err(ScanError::Unsupported(UnsupportedReason::CameraNotSupported));
    };

    parameters.preview_size = size;
    parameters.pixel_format = PixelFormat::Yv12;
    init_white_balance(&mut parameters);
    init_auto_focus(&mut parameters, true);
    camera.set_parameters(&parameters)?;

    info!(
        preview = %size,
        focus_mode = %parameters.focus_mode,
        "Camera configured for recognition"
    );
    Ok(parameters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::CameraEventSink;
    use crate::backends::virtual_camera::{VirtualCamera, VirtualCameraConfig};

    fn opened(config: VirtualCameraConfig) -> VirtualCamera {
        let mut camera = VirtualCamera::new(config);
        camera.open(CameraEventSink::new(|_| {})).unwrap();
        camera
    }

    fn params(focus: &[FocusMode]) -> CameraParameters {
        let mut parameters = VirtualCameraConfig::default().parameters();
        parameters.supported_focus_modes = focus.to_vec();
        parameters.focus_mode = FocusMode::Fixed;
        parameters
    }

    #[test]
    fn test_best_preview_size() {
        let sizes = [PreviewSize::new(640, 480), PreviewSize::new(1280, 720)];
        assert_eq!(
            find_best_preview_size(&sizes),
            Some(PreviewSize::new(1280, 720))
        );
        assert_eq!(find_best_preview_size(&sizes[..1]), None);
    }

    #[test]
    fn test_focus_preference() {
        let mut p = params(&[FocusMode::Macro, FocusMode::Auto, FocusMode::ContinuousPicture]);
        init_auto_focus(&mut p, true);
        assert_eq!(p.focus_mode, FocusMode::ContinuousPicture);

        init_auto_focus(&mut p, false);
        assert_eq!(p.focus_mode, FocusMode::Auto);

        let mut p = params(&[FocusMode::Infinity]);
        init_auto_focus(&mut p, true);
        assert_eq!(p.focus_mode, FocusMode::Fixed);
    }

    #[test]
    fn test_flash_falls_back_to_on() {
        let mut camera = opened(VirtualCameraConfig {
            flash_modes: vec![FlashMode::Off, FlashMode::On],
            ..Default::default()
        });
        assert!(set_flash_light(&mut camera, true).unwrap());
        assert_eq!(camera.parameters().unwrap().flash_mode, FlashMode::On);
        assert!(!set_flash_light(&mut camera, false).unwrap());
        assert_eq!(camera.parameters().unwrap().flash_mode, FlashMode::Off);
    }

    #[test]
    fn test_flash_unsupported() {
        let mut camera = opened(VirtualCameraConfig {
            flash_modes: vec![FlashMode::Off],
            ..Default::default()
        });
        assert!(!set_flash_light(&mut camera, true).unwrap());
    }

    #[test]
    fn test_configure_ignores_unusable_preference() {
        let mut camera = opened(VirtualCameraConfig::default());
        let parameters = configure_for_recognition(&mut camera, PreviewSize::new(1920, 1080)).unwrap();
        assert_eq!(parameters.preview_size, PreviewSize::new(1280, 720));
        assert_eq!(parameters.pixel_format, PixelFormat::Yv12);
        assert_eq!(camera.parameters().unwrap(), parameters);
    }

    #[test]
    fn test_configure_rejects_unsupported_camera() {
        let mut camera = opened(VirtualCameraConfig {
            preview_sizes: vec![PreviewSize::new(640, 480)],
            ..Default::default()
        });
        let err = configure_for_recognition(&mut camera, PreviewSize::new(1280, 720)).unwrap_err();
        assert!(matches!(
            err,
            ScanError::Unsupported(UnsupportedReason::CameraNotSupported)
        ));
    }
}
