// SPDX-License-Identifier: GPL-3.0-only

//! Preview sprite geometry
//!
//! The camera texture is drawn as one quad that covers the whole surface
//! (center crop), rotated so the image appears upright. Geometry is kept
//! until the surface size, preview size or rotation changes.

use crate::backends::gpu::{DrawCall, TextureId};
use crate::geometry::{Rotation, Size};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SceneKey {
    surface: Size,
    preview: Size,
    rotation: Rotation,
}

/// Quad placement for the current surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpriteGeometry {
    /// Quad size in pixels before rotation
    pub scale: (f32, f32),
    /// Quad center in surface pixels
    pub position: (f32, f32),
    /// Counter-clockwise rotation applied to the quad
    pub rotation: Rotation,
    pub projection: [f32; 16],
    pub model: [f32; 16],
}

#[derive(Debug, Clone)]
pub struct PreviewScene {
    surface: Size,
    preview: Size,
    rotation: Rotation,
    cached: Option<(SceneKey, SpriteGeometry)>,
    recomputed: u32,
}

impl Default for PreviewScene {
    fn default() -> Self {
        Self::new()
    }
}

impl PreviewScene {
    pub fn new() -> Self {
        Self {
            surface: Size::new(0, 0),
            preview: Size::new(1280, 720),
            rotation: Rotation::Deg0,
            cached: None,
            recomputed: 0,
        }
    }

    pub fn set_surface_size(&mut self, surface: Size) {
        self.surface = surface;
    }

    pub fn set_preview_size(&mut self, preview: Size) {
        self.preview = preview;
    }

    /// Rotation of the camera data relative to the display
    pub fn set_rotation(&mut self, rotation: Rotation) {
        self.rotation = rotation;
    }

    pub fn surface_size(&self) -> Size {
        self.surface
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// How often the geometry had to be recomputed
    pub fn recompute_count(&self) -> u32 {
        self.recomputed
    }

    pub fn geometry(&mut self) -> SpriteGeometry {
        let key = SceneKey {
            surface: self.surface,
            preview: self.preview,
            rotation: self.rotation,
        };
        if let Some((cached_key, geometry)) = self.cached
            && cached_key == key
        {
            return geometry;
        }
        let geometry = compute_geometry(key);
        debug!(
            surface = %key.surface,
            preview = %key.preview,
            rotation = %key.rotation,
            scale = ?geometry.scale,
            "Preview geometry updated"
        );
        self.recomputed += 1;
        self.cached = Some((key, geometry));
        geometry
    }

    pub fn draw_call(&mut self, texture: TextureId) -> DrawCall {
        let geometry = self.geometry();
        DrawCall {
            projection: geometry.projection,
            model: geometry.model,
            texture,
        }
    }
}

fn compute_geometry(key: SceneKey) -> SpriteGeometry {
    let (surface_w, surface_h) = (key.surface.width, key.surface.height);
    // The quad is laid out in camera orientation and rotated afterwards
    let view = key.surface.rotated(key.rotation);
    let (preview_w, preview_h) = (key.preview.width, key.preview.height);

    let (width, height) = if preview_h <= 0 || preview_w <= 0 {
        (view.width as f32, view.height as f32)
    } else if preview_w as i64 * view.height as i64 > preview_h as i64 * view.width as i64 {
        // Scale to height
        (
            (preview_w as f32 * view.height as f32 / preview_h as f32 + 0.5).floor(),
            view.height as f32,
        )
    } else {
        // Scale to width
        (
            view.width as f32,
            (preview_h as f32 * view.width as f32 / preview_w as f32 + 0.5).floor(),
        )
    };

    let position = (surface_w as f32 / 2.0, surface_h as f32 / 2.0);
    let rotation = key.rotation.inverse();

    SpriteGeometry {
        scale: (width, height),
        position,
        rotation,
        projection: ortho(surface_w as f32, surface_h as f32),
        model: model_matrix((width, height), position, rotation),
    }
}

/// Orthographic projection with (0, 0) in the lower-left corner
pub fn ortho(width: f32, height: f32) -> [f32; 16] {
    let mut m = [0.0; 16];
    if width <= 0.0 || height <= 0.0 {
        m[0] = 1.0;
        m[5] = 1.0;
        m[10] = 1.0;
        m[15] = 1.0;
        return m;
    }
    m[0] = 2.0 / width;
    m[5] = 2.0 / height;
    m[10] = -1.0;
    m[12] = -1.0;
    m[13] = -1.0;
    m[15] = 1.0;
    m
}

/// Column-major translate * rotate(z) * scale
pub fn model_matrix(scale: (f32, f32), position: (f32, f32), rotation: Rotation) -> [f32; 16] {
    let (sin, cos) = match rotation {
        Rotation::Deg0 => (0.0, 1.0),
        Rotation::Deg90 => (1.0, 0.0),
        Rotation::Deg180 => (0.0, -1.0),
        Rotation::Deg270 => (-1.0, 0.0),
    };
    let (sx, sy) = scale;
    [
        sx * cos, sx * sin, 0.0, 0.0, //
        -sy * sin, sy * cos, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        position.0, position.1, 0.0, 1.0,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(m: &[f32; 16], x: f32, y: f32) -> (f32, f32) {
        (m[0] * x + m[4] * y + m[12], m[1] * x + m[5] * y + m[13])
    }

    #[test]
    fn test_portrait_phone_fills_surface() {
        let mut scene = PreviewScene::new();
        scene.set_surface_size(Size::new(720, 1280));
        scene.set_preview_size(Size::new(1280, 720));
        scene.set_rotation(Rotation::Deg90);

        let geometry = scene.geometry();
        assert_eq!(geometry.scale, (1280.0, 720.0));
        assert_eq!(geometry.position, (360.0, 640.0));
        assert_eq!(geometry.rotation, Rotation::Deg270);

        // Corner of the unit quad lands on a surface corner after rotation
        let (x, y) = apply(&geometry.model, 0.5, 0.5);
        assert_eq!((x.round(), y.round()), (720.0, 0.0));
    }

    #[test]
    fn test_center_crop_overflows_one_axis() {
        let mut scene = PreviewScene::new();
        scene.set_surface_size(Size::new(1000, 1000));
        scene.set_preview_size(Size::new(1280, 720));
        scene.set_rotation(Rotation::Deg0);

        let geometry = scene.geometry();
        assert_eq!(geometry.scale, (1778.0, 1000.0));
    }

    #[test]
    fn test_geometry_cached_per_key() {
        let mut scene = PreviewScene::new();
        scene.set_surface_size(Size::new(720, 1280));
        scene.geometry();
        scene.geometry();
        assert_eq!(scene.recompute_count(), 1);

        scene.set_rotation(Rotation::Deg90);
        scene.geometry();
        scene.set_rotation(Rotation::Deg90);
        scene.geometry();
        assert_eq!(scene.recompute_count(), 2);
    }

    #[test]
    fn test_ortho_maps_surface_to_clip_space() {
        let m = ortho(720.0, 1280.0);
        assert_eq!(apply(&m, 0.0, 0.0), (-1.0, -1.0));
        assert_eq!(apply(&m, 720.0, 1280.0), (1.0, 1.0));
    }
}
