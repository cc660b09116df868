// SPDX-License-Identifier: GPL-3.0-only

//! Display/sensor orientation bookkeeping
//!
//! The recognizer always wants a portrait-normalised frame. The camera sensor
//! is mounted at some angle relative to the device's natural orientation and
//! the display can be rotated on top of that, so every frame needs a rotation
//! derived from both.

use super::{Rect, Rotation};
use crate::backends::camera::{CameraFacing, CameraInfo};
use tracing::{debug, trace};

/// Rotation that takes camera output to the display's natural orientation.
///
/// `display` is the screen rotation from natural, `sensor` the clockwise angle
/// the camera image must be rotated to look upright in natural orientation.
/// Front cameras are mirrored, which flips the direction of the display term
/// and the sign of the result.
pub fn camera_rotation_to_natural(display: Rotation, sensor: Rotation, mirror: bool) -> Rotation {
    if mirror {
        sensor.plus(display).inverse()
    } else {
        sensor.minus(display)
    }
}

/// Rotation of the camera data relative to the current display.
///
/// Without camera information (no back camera) the data is assumed upright.
pub fn camera_data_rotation(display: Rotation, camera: Option<&CameraInfo>) -> Rotation {
    match camera {
        Some(info) => camera_rotation_to_natural(
            display,
            info.sensor_orientation,
            info.facing == CameraFacing::Front,
        ),
        None => Rotation::Deg0,
    }
}

/// Check that `rotation` turns a `width`x`height` frame into a portrait one.
///
/// Fails transiently while a configuration change is in flight (display
/// already rotated, camera still delivering old-shaped frames).
pub fn sanity_check_frame_rotation(width: u32, height: u32, rotation: Rotation) -> bool {
    let is_portrait_frame = height >= width;
    let orientation_changed = rotation.swaps_dimensions();
    is_portrait_frame != orientation_changed
}

/// Rotate `src` by `rotation` around the bounds of a `width`x`height` frame.
///
/// Quarter turns only, so this is an exact coordinate swap. The result lives
/// in the rotated frame (`height`x`width` for 90/270).
pub fn rotate_rect(src: Rect, width: i32, height: i32, rotation: Rotation) -> Rect {
    let from_left = src.left;
    let from_top = src.top;
    let from_right = width - src.right;
    let from_bottom = height - src.bottom;

    let dst = match rotation {
        Rotation::Deg0 => src,
        Rotation::Deg90 => Rect::new(
            from_top,
            from_right,
            from_top + src.height(),
            from_right + src.width(),
        ),
        Rotation::Deg180 => Rect::new(
            from_right,
            from_bottom,
            from_right + src.width(),
            from_bottom + src.height(),
        ),
        Rotation::Deg270 => Rect::new(
            from_bottom,
            from_left,
            from_bottom + src.height(),
            from_left + src.width(),
        ),
    };

    trace!(%src, %dst, %rotation, "rotate_rect");
    dst
}

/// Screen orientation as the recognizer understands it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkAreaOrientation {
    Portrait,
    PortraitUpsideDown,
    LandscapeRight,
    LandscapeLeft,
}

impl WorkAreaOrientation {
    pub fn is_landscape(&self) -> bool {
        matches!(
            self,
            WorkAreaOrientation::LandscapeRight | WorkAreaOrientation::LandscapeLeft
        )
    }
}

/// Natural-landscape devices (tablets) report rotation 0 while held in
/// landscape; shifting by this brings them onto the phone convention.
const LANDSCAPE_ORIENTATION_CORRECTION: Rotation = Rotation::Deg270;

/// Orientation state for one camera session
///
/// The preprocess rotation is cached and recomputed whenever any input
/// changes, so the per-frame lookup from the worker is a comparison and a
/// copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayConfiguration {
    display_rotation: Rotation,
    natural_orientation_is_landscape: bool,
    sensor_rotation: Rotation,
    preprocess_rotation: Rotation,
}

impl Default for DisplayConfiguration {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayConfiguration {
    pub fn new() -> Self {
        let mut config = Self {
            display_rotation: Rotation::Deg0,
            natural_orientation_is_landscape: false,
            sensor_rotation: Rotation::Deg0,
            preprocess_rotation: Rotation::Deg0,
        };
        config.refresh_preprocess_rotation();
        config
    }

    /// Update display rotation and natural orientation together
    pub fn set_display_parameters(
        &mut self,
        display_rotation: Rotation,
        natural_orientation_is_landscape: bool,
    ) {
        debug!(
            rotation = %display_rotation,
            natural_landscape = natural_orientation_is_landscape,
            "Display parameters changed"
        );
        self.display_rotation = display_rotation;
        self.natural_orientation_is_landscape = natural_orientation_is_landscape;
        self.refresh_preprocess_rotation();
    }

    pub fn set_display_rotation(&mut self, display_rotation: Rotation) {
        self.display_rotation = display_rotation;
        self.refresh_preprocess_rotation();
    }

    /// Update the camera sensor mounting angle
    pub fn set_camera_parameters(&mut self, sensor_rotation: Rotation) {
        debug!(sensor = %sensor_rotation, "Camera parameters changed");
        self.sensor_rotation = sensor_rotation;
        self.refresh_preprocess_rotation();
    }

    pub fn display_rotation(&self) -> Rotation {
        self.display_rotation
    }

    pub fn sensor_rotation(&self) -> Rotation {
        self.sensor_rotation
    }

    pub fn natural_orientation_is_landscape(&self) -> bool {
        self.natural_orientation_is_landscape
    }

    /// Current display orientation in recognizer terms
    pub fn native_display_rotation(&self) -> WorkAreaOrientation {
        let mut rotation = self.display_rotation;
        if self.natural_orientation_is_landscape {
            rotation = rotation.plus(LANDSCAPE_ORIENTATION_CORRECTION);
        }
        match rotation {
            Rotation::Deg0 => WorkAreaOrientation::Portrait,
            Rotation::Deg90 => WorkAreaOrientation::LandscapeRight,
            Rotation::Deg180 => WorkAreaOrientation::PortraitUpsideDown,
            Rotation::Deg270 => WorkAreaOrientation::LandscapeLeft,
        }
    }

    /// Cached rotation without the per-frame shape check
    pub fn preprocess_rotation(&self) -> Rotation {
        self.preprocess_rotation
    }

    /// Rotation to apply to a `width`x`height` frame before recognition.
    ///
    /// `None` means the frame does not fit the current orientation and should
    /// be skipped.
    pub fn preprocess_frame_rotation(&self, width: u32, height: u32) -> Option<Rotation> {
        if !sanity_check_frame_rotation(width, height, self.preprocess_rotation) {
            trace!(
                width,
                height,
                rotation = %self.preprocess_rotation,
                "Skipping frame due to orientation inconsistency"
            );
            return None;
        }
        Some(self.preprocess_rotation)
    }

    fn refresh_preprocess_rotation(&mut self) {
        let mut rotation =
            camera_rotation_to_natural(self.display_rotation, self.sensor_rotation, false);
        if self.native_display_rotation().is_landscape() {
            rotation = rotation.minus(Rotation::Deg90);
        }
        self.preprocess_rotation = rotation;
        trace!(rotation = %rotation, "Preprocess frame rotation refreshed");
    }
}
