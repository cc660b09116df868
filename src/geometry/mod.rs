// SPDX-License-Identifier: GPL-3.0-only

//! Orientation and overlay geometry
//!
//! Pure computation, no I/O. Everything here is shared by the processing
//! worker (which rotation to feed the recognizer), the render thread (how to
//! place the camera texture) and the overlay (where the card frame lands on
//! screen).
//!
//! Coordinates are integer pixels with the origin in the top-left corner,
//! `right`/`bottom` exclusive, the same convention the recognizer reports its
//! card frame in.

pub mod card_rect;
pub mod orientation;

pub use card_rect::{CardRectMapper, CenterCrop};
pub use orientation::{
    DisplayConfiguration, WorkAreaOrientation, camera_data_rotation, camera_rotation_to_natural,
    rotate_rect, sanity_check_frame_rotation,
};

use serde::{Deserialize, Serialize};

/// Clockwise rotation in quarter turns
///
/// The camera stack only ever deals in right angles, so the four canonical
/// values are the whole domain. Arithmetic wraps modulo 360.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// All rotations in ascending order
    pub const ALL: [Rotation; 4] = [
        Rotation::Deg0,
        Rotation::Deg90,
        Rotation::Deg180,
        Rotation::Deg270,
    ];

    /// Create a rotation from degrees, normalised to 0-360.
    ///
    /// Returns `None` for values that are not a multiple of 90.
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    fn from_quarters(quarters: i32) -> Self {
        match quarters.rem_euclid(4) {
            1 => Rotation::Deg90,
            2 => Rotation::Deg180,
            3 => Rotation::Deg270,
            _ => Rotation::Deg0,
        }
    }

    fn quarters(self) -> i32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 1,
            Rotation::Deg180 => 2,
            Rotation::Deg270 => 3,
        }
    }

    /// Rotation in degrees
    pub fn degrees(self) -> u32 {
        self.quarters() as u32 * 90
    }

    /// `self + other`, modulo 360
    pub fn plus(self, other: Rotation) -> Rotation {
        Self::from_quarters(self.quarters() + other.quarters())
    }

    /// `self - other`, modulo 360
    pub fn minus(self, other: Rotation) -> Rotation {
        Self::from_quarters(self.quarters() - other.quarters())
    }

    /// `360 - self`, modulo 360
    pub fn inverse(self) -> Rotation {
        Self::from_quarters(-self.quarters())
    }

    /// Check if rotation swaps width and height
    pub fn swaps_dimensions(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

impl std::fmt::Display for Rotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn is_portrait(&self) -> bool {
        self.height >= self.width
    }

    /// Dimensions after applying `rotation`
    pub fn rotated(&self, rotation: Rotation) -> Size {
        if rotation.swaps_dimensions() {
            Size::new(self.height, self.width)
        } else {
            *self
        }
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Axis-aligned integer rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {})-({}, {})",
            self.left, self.top, self.right, self.bottom
        )
    }
}

/// Floating point position in view coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PointF {
    pub x: f32,
    pub y: f32,
}

impl PointF {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_degrees_normalises() {
        assert_eq!(Rotation::from_degrees(-90), Some(Rotation::Deg270));
        assert_eq!(Rotation::from_degrees(450), Some(Rotation::Deg90));
        assert_eq!(Rotation::from_degrees(720), Some(Rotation::Deg0));
        assert_eq!(Rotation::from_degrees(45), None);
    }

    #[test]
    fn test_arithmetic_wraps() {
        assert_eq!(Rotation::Deg270.plus(Rotation::Deg180), Rotation::Deg90);
        assert_eq!(Rotation::Deg0.minus(Rotation::Deg90), Rotation::Deg270);
        assert_eq!(Rotation::Deg90.inverse(), Rotation::Deg270);
        assert_eq!(Rotation::Deg0.inverse(), Rotation::Deg0);
    }

    #[test]
    fn test_size_rotation() {
        let size = Size::new(1280, 720);
        assert_eq!(size.rotated(Rotation::Deg90), Size::new(720, 1280));
        assert_eq!(size.rotated(Rotation::Deg180), size);
        assert!(!size.is_portrait());
    }
}
