// SPDX-License-Identifier: GPL-3.0-only

//! Card frame placement on the preview view
//!
//! The recognizer reports where it expects the card on a portrait 720x1280
//! frame. The preview is shown center-cropped and rotated, so the overlay
//! has to push that rectangle through the same transform.

use super::{PointF, Rect, Rotation, Size, rotate_rect};
use tracing::debug;

/// Preview size assumed before the camera reports its own
pub const DEFAULT_PREVIEW_SIZE: Size = Size::new(1280, 720);

/// Card rect on a 1280x720 camera frame for portrait views
pub const DEFAULT_CAMERA_RECT: Rect = Rect::new(432, 30, 432 + 416, 30 + 660);

/// Card rect on a 1280x720 camera frame for landscape views
pub const DEFAULT_CAMERA_RECT_LANDSCAPE: Rect = Rect::new(310, 152, 970, 568);

const DEFAULT_CAMERA_ROTATION: Rotation = Rotation::Deg90;

const CARD_NUMBER_POS: PointF = PointF { x: 60.0, y: 268.0 };
const CARD_DATE_POS: PointF = PointF { x: 289.0, y: 321.0 };
const CARD_HOLDER_POS: PointF = PointF { x: 33.0, y: 364.0 };

const CARD_NUMBER_FONT_SIZE: f32 = 40.0;
const CARD_DATE_FONT_SIZE: f32 = 27.0;
const CARD_HOLDER_FONT_SIZE: f32 = 27.0;

/// Uniform scale plus translation that fills a view with content, cropping
/// the overflowing axis symmetrically.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CenterCrop {
    pub scale: f32,
    pub translate_x: i32,
    pub translate_y: i32,
}

impl Default for CenterCrop {
    fn default() -> Self {
        Self {
            scale: 1.0,
            translate_x: 0,
            translate_y: 0,
        }
    }
}

impl CenterCrop {
    /// Fit `content` (already rotated) into `view`
    pub fn compute(view: Size, content: Size) -> Self {
        if content.width <= 0 || content.height <= 0 {
            return Self::default();
        }
        let content_w = content.width as f32;
        let content_h = content.height as f32;
        let view_w = view.width as f32;
        let view_h = view.height as f32;

        if content_w * view_h > content_h * view_w {
            let scale = view_h / content_h;
            Self {
                scale,
                translate_x: ((view_w - content_w * scale) / 2.0) as i32,
                translate_y: 0,
            }
        } else {
            let scale = view_w / content_w;
            Self {
                scale,
                translate_x: 0,
                translate_y: ((view_h - content_h * scale) / 2.0) as i32,
            }
        }
    }

    fn map_coord(&self, value: i32, translate: i32) -> i32 {
        (0.5 + self.scale * value as f32) as i32 + translate
    }

    /// Map a rect in content coordinates to view coordinates
    pub fn map_rect(&self, rect: Rect) -> Rect {
        Rect::new(
            self.map_coord(rect.left, self.translate_x),
            self.map_coord(rect.top, self.translate_y),
            self.map_coord(rect.right, self.translate_x),
            self.map_coord(rect.bottom, self.translate_y),
        )
    }
}

/// Maps the recognizer's card frame and its text anchors into view space
///
/// Recomputed only when the view size or camera parameters actually change;
/// both setters report whether anything moved so the overlay can skip a
/// redraw.
#[derive(Debug, Clone)]
pub struct CardRectMapper {
    view_size: Size,
    preview_size: Size,
    rotation: Rotation,
    camera_rect_raw: Rect,
    camera_rect_initialized: bool,
    transform: CenterCrop,
    card_rect: Rect,
    number_pos: PointF,
    date_pos: PointF,
    holder_pos: PointF,
}

impl Default for CardRectMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl CardRectMapper {
    pub fn new() -> Self {
        let mut mapper = Self {
            view_size: DEFAULT_PREVIEW_SIZE,
            preview_size: DEFAULT_PREVIEW_SIZE,
            rotation: DEFAULT_CAMERA_ROTATION,
            camera_rect_raw: DEFAULT_CAMERA_RECT,
            camera_rect_initialized: false,
            transform: CenterCrop::default(),
            card_rect: Rect::default(),
            number_pos: PointF::default(),
            date_pos: PointF::default(),
            holder_pos: PointF::default(),
        };
        mapper.refresh_camera_defaults();
        mapper.sync();
        mapper
    }

    /// Set the overlay view size.
    ///
    /// Zero dimensions and unchanged sizes are ignored. Returns `true` when
    /// the mapping was recomputed.
    pub fn set_view_size(&mut self, width: i32, height: i32) -> bool {
        if width == 0 || height == 0 {
            return false;
        }
        let size = Size::new(width, height);
        if size == self.view_size {
            return false;
        }
        self.view_size = size;
        if !self.camera_rect_initialized {
            self.refresh_camera_defaults();
        }
        self.sync();
        true
    }

    /// Set the real camera geometry once the camera has opened.
    ///
    /// `card_rect` is in unrotated camera frame coordinates. Returns `false`
    /// when nothing changed since the previous call.
    pub fn set_camera_parameters(
        &mut self,
        preview_width: i32,
        preview_height: i32,
        rotation: Rotation,
        card_rect: Rect,
    ) -> bool {
        let preview_size = Size::new(preview_width, preview_height);
        if self.camera_rect_initialized
            && preview_size == self.preview_size
            && rotation == self.rotation
            && card_rect == self.camera_rect_raw
        {
            return false;
        }
        self.preview_size = preview_size;
        self.rotation = rotation;
        self.camera_rect_raw = card_rect;
        self.camera_rect_initialized = true;
        self.sync();
        true
    }

    pub fn view_size(&self) -> Size {
        self.view_size
    }

    pub fn transform(&self) -> CenterCrop {
        self.transform
    }

    /// Card frame in view coordinates
    pub fn card_rect(&self) -> Rect {
        self.card_rect
    }

    pub fn card_number_pos(&self) -> PointF {
        self.number_pos
    }

    pub fn card_date_pos(&self) -> PointF {
        self.date_pos
    }

    pub fn card_holder_pos(&self) -> PointF {
        self.holder_pos
    }

    pub fn card_number_font_size(&self) -> f32 {
        CARD_NUMBER_FONT_SIZE * self.transform.scale
    }

    pub fn card_date_font_size(&self) -> f32 {
        CARD_DATE_FONT_SIZE * self.transform.scale
    }

    pub fn card_holder_font_size(&self) -> f32 {
        CARD_HOLDER_FONT_SIZE * self.transform.scale
    }

    /// Map a point in card space to view coordinates
    pub fn map_to_view(&self, src: PointF) -> PointF {
        PointF {
            x: self.transform.scale * src.x + self.card_rect.left as f32,
            y: self.transform.scale * src.y + self.card_rect.top as f32,
        }
    }

    fn refresh_camera_defaults(&mut self) {
        self.preview_size = DEFAULT_PREVIEW_SIZE;
        if self.view_size.height > self.view_size.width {
            self.rotation = DEFAULT_CAMERA_ROTATION;
            self.camera_rect_raw = DEFAULT_CAMERA_RECT;
        } else {
            self.rotation = Rotation::Deg0;
            self.camera_rect_raw = DEFAULT_CAMERA_RECT_LANDSCAPE;
        }
    }

    fn sync(&mut self) {
        let rotated_preview = self.preview_size.rotated(self.rotation);
        self.transform = CenterCrop::compute(self.view_size, rotated_preview);
        let camera_rect = rotate_rect(
            self.camera_rect_raw,
            self.preview_size.width,
            self.preview_size.height,
            self.rotation,
        );
        self.card_rect = self.transform.map_rect(camera_rect);
        self.number_pos = self.map_to_view(CARD_NUMBER_POS);
        self.date_pos = self.map_to_view(CARD_DATE_POS);
        self.holder_pos = self.map_to_view(CARD_HOLDER_POS);

        debug!(
            view = %self.view_size,
            preview = %self.preview_size,
            rotation = %self.rotation,
            scale = self.transform.scale,
            translate_x = self.transform.translate_x,
            translate_y = self.transform.translate_y,
            card_rect = %self.card_rect,
            "Card rect mapping refreshed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_crop_wide_content() {
        let crop = CenterCrop::compute(Size::new(720, 1280), Size::new(1280, 720));
        assert!((crop.scale - 1280.0 / 720.0).abs() < 1e-4);
        assert_eq!(crop.translate_y, 0);
        assert!(crop.translate_x < 0);
    }

    #[test]
    fn test_center_crop_exact_fit() {
        let crop = CenterCrop::compute(Size::new(720, 1280), Size::new(720, 1280));
        assert_eq!(crop, CenterCrop::default());
    }

    #[test]
    fn test_portrait_view_maps_to_recognizer_rect() {
        let mut mapper = CardRectMapper::new();
        assert!(mapper.set_view_size(720, 1280));
        assert!(mapper.set_camera_parameters(1280, 720, Rotation::Deg90, DEFAULT_CAMERA_RECT));
        assert_eq!(mapper.card_rect(), Rect::new(30, 432, 690, 848));
        assert_eq!(mapper.card_number_pos(), PointF { x: 90.0, y: 700.0 });
        assert_eq!(mapper.card_number_font_size(), 40.0);
    }

    #[test]
    fn test_landscape_view_crops_vertically() {
        let mut mapper = CardRectMapper::new();
        assert!(mapper.set_camera_parameters(1280, 720, Rotation::Deg90, DEFAULT_CAMERA_RECT));
        assert_eq!(mapper.view_size(), Size::new(1280, 720));
        assert_eq!(mapper.transform().translate_y, -777);
        assert_eq!(mapper.card_rect(), Rect::new(53, -9, 1227, 731));
    }

    #[test]
    fn test_camera_parameters_are_idempotent() {
        let mut mapper = CardRectMapper::new();
        assert!(mapper.set_camera_parameters(1280, 720, Rotation::Deg90, DEFAULT_CAMERA_RECT));
        let before = mapper.card_rect();
        assert!(!mapper.set_camera_parameters(1280, 720, Rotation::Deg90, DEFAULT_CAMERA_RECT));
        assert_eq!(mapper.card_rect(), before);
    }

    #[test]
    fn test_view_size_ignores_zero_and_unchanged() {
        let mut mapper = CardRectMapper::new();
        assert!(!mapper.set_view_size(0, 1280));
        assert!(!mapper.set_view_size(1280, 720));
        assert!(mapper.set_view_size(1280, 800));
        // Only one dimension changed, still a change
        assert!(mapper.set_view_size(1080, 800));
    }

    #[test]
    fn test_defaults_follow_view_orientation_until_camera_opens() {
        let mut mapper = CardRectMapper::new();
        assert_eq!(mapper.card_rect(), DEFAULT_CAMERA_RECT_LANDSCAPE);

        mapper.set_view_size(720, 1280);
        assert_eq!(mapper.card_rect(), Rect::new(30, 432, 690, 848));

        mapper.set_camera_parameters(1280, 720, Rotation::Deg0, DEFAULT_CAMERA_RECT_LANDSCAPE);
        mapper.set_view_size(1280, 720);
        assert_eq!(mapper.card_rect(), DEFAULT_CAMERA_RECT_LANDSCAPE);
    }
}
