// SPDX-License-Identifier: GPL-3.0-only

//! End-to-end orientation: display rotation to recognizer rotation and
//! overlay placement

use cardscan::backends::camera::{CameraFacing, CameraInfo};
use cardscan::geometry::{
    CardRectMapper, DisplayConfiguration, PointF, Rect, Rotation, WorkAreaOrientation,
    camera_data_rotation, rotate_rect,
};
use cardscan::recognition::scripted::CARD_FRAME_RECT;

const BACK_CAMERA: CameraInfo = CameraInfo {
    sensor_orientation: Rotation::Deg90,
    facing: CameraFacing::Back,
};

fn card_rect_in_camera_space() -> Rect {
    rotate_rect(CARD_FRAME_RECT, 720, 1280, Rotation::Deg90)
}

fn display(rotation: Rotation) -> DisplayConfiguration {
    let mut config = DisplayConfiguration::new();
    config.set_camera_parameters(BACK_CAMERA.sensor_orientation);
    config.set_display_parameters(rotation, false);
    config
}

#[test]
fn test_portrait_phone_end_to_end() {
    let config = display(Rotation::Deg0);
    let data_rotation = camera_data_rotation(Rotation::Deg0, Some(&BACK_CAMERA));
    assert_eq!(data_rotation, Rotation::Deg90);
    assert_eq!(config.preprocess_frame_rotation(1280, 720), Some(Rotation::Deg90));

    let mut mapper = CardRectMapper::new();
    mapper.set_view_size(720, 1280);
    mapper.set_camera_parameters(1280, 720, data_rotation, card_rect_in_camera_space());
    // The overlay frame lands exactly where the recognizer looks
    assert_eq!(mapper.card_rect(), CARD_FRAME_RECT);
}

#[test]
fn test_landscape_phone_end_to_end() {
    let config = display(Rotation::Deg90);
    assert_eq!(
        config.native_display_rotation(),
        WorkAreaOrientation::LandscapeRight
    );
    assert_eq!(config.preprocess_frame_rotation(1280, 720), Some(Rotation::Deg270));
    // Frame still shaped for the previous orientation
    assert_eq!(config.preprocess_frame_rotation(720, 1280), None);

    let data_rotation = camera_data_rotation(Rotation::Deg90, Some(&BACK_CAMERA));
    assert_eq!(data_rotation, Rotation::Deg0);

    let mut mapper = CardRectMapper::new();
    mapper.set_view_size(1280, 720);
    mapper.set_camera_parameters(1280, 720, data_rotation, card_rect_in_camera_space());
    assert_eq!(mapper.card_rect(), Rect::new(432, 30, 848, 690));
}

#[test]
fn test_larger_view_scales_frame_and_anchors() {
    let mut mapper = CardRectMapper::new();
    mapper.set_view_size(1080, 1920);
    mapper.set_camera_parameters(1280, 720, Rotation::Deg90, card_rect_in_camera_space());

    assert_eq!(mapper.card_rect(), Rect::new(45, 648, 1035, 1272));
    assert_eq!(mapper.card_number_pos(), PointF::new(135.0, 1050.0));
    assert_eq!(mapper.card_number_font_size(), 60.0);
    assert_eq!(mapper.card_date_font_size(), 40.5);
}

#[test]
fn test_every_display_rotation_has_consistent_frame_shape() {
    for rotation in Rotation::ALL {
        let config = display(rotation);
        let preprocess = config.preprocess_rotation();
        // Exactly one of the two frame shapes is accepted
        let landscape = config.preprocess_frame_rotation(1280, 720).is_some();
        let portrait = config.preprocess_frame_rotation(720, 1280).is_some();
        assert!(landscape != portrait, "display {} preprocess {}", rotation, preprocess);
    }
}
