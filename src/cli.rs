// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands on the virtual platform
//!
//! This module provides command-line functionality for:
//! - Running a full scan session against virtual hardware
//! - Printing overlay geometry for a view
//! - Running the availability check

use cardscan::availability;
use cardscan::backends::gpu::WindowHandle;
use cardscan::backends::virtual_camera::VirtualPlatform;
use cardscan::constants::{app_info, camera, simulation};
use cardscan::geometry::{CardRectMapper, Rotation, rotate_rect};
use cardscan::recognition::{Recognizer, ScriptedRecognizer};
use cardscan::recognition::scripted::CARD_FRAME_RECT;
use cardscan::{CancelReason, Config, ScanOutcome, ScanRequest, ScanSession, SessionEvent};
use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

pub struct SimulateOptions {
    pub rotation: i32,
    pub scan_expiration_date: bool,
    pub scan_card_holder: bool,
    pub image: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub config: Option<PathBuf>,
}

fn parse_rotation(degrees: i32) -> Result<Rotation, Box<dyn std::error::Error>> {
    Rotation::from_degrees(degrees)
        .ok_or_else(|| format!("Rotation must be a multiple of 90, got {}", degrees).into())
}

fn parse_size(size: &str) -> Result<(i32, i32), Box<dyn std::error::Error>> {
    let (width, height) = size
        .split_once('x')
        .ok_or_else(|| format!("Size must look like 1280x720, got '{}'", size))?;
    Ok((width.trim().parse()?, height.trim().parse()?))
}

/// Run a scripted scan session and print the outcome as JSON
pub fn simulate(options: SimulateOptions) -> Result<(), Box<dyn std::error::Error>> {
    let rotation = parse_rotation(options.rotation)?;
    let config = match &options.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let timeout = options.timeout.unwrap_or(simulation::SESSION_TIMEOUT);

    let platform = Arc::new(VirtualPlatform::default());
    let surface = platform.surface_size;
    let request = ScanRequest {
        scan_expiration_date: options.scan_expiration_date,
        scan_card_holder: options.scan_card_holder,
        grab_card_image: options.image.is_some(),
        ..ScanRequest::default()
    };
    let mut session = ScanSession::new(
        platform,
        Arc::new(ScriptedRecognizer::demo_card()),
        request,
        config,
    );

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::SeqCst);
        })?;
    }

    let view = if rotation.swaps_dimensions() {
        (surface.height, surface.width)
    } else {
        (surface.width, surface.height)
    };
    session.set_view_size(view.0, view.1);
    session.set_display_orientation(rotation, false);
    session.surface_created(WindowHandle(1));
    session.on_resume()?;
    session.surface_changed(view.0, view.1);
    eprintln!("Scanning (Ctrl+C to cancel)...");

    let started = Instant::now();
    let outcome = 'scan: loop {
        if interrupted.load(Ordering::SeqCst) {
            break session.cancel(CancelReason::BackPressed);
        }
        if started.elapsed() >= timeout {
            break ScanOutcome::Failed {
                message: format!("No card recognized within {}s", timeout.as_secs()),
            };
        }
        for event in session.pump(simulation::PUMP_INTERVAL) {
            match event {
                SessionEvent::CameraOpened {
                    focus_mode,
                    data_rotation,
                } => {
                    eprintln!(
                        "Camera opened: focus {:?}, data rotation {}, card frame {}",
                        focus_mode,
                        data_rotation,
                        session.overlay().mapper.card_rect()
                    );
                }
                SessionEvent::DetectionChanged(state) => eprintln!("Edges: {}", state),
                SessionEvent::FpsReport(report) => eprintln!(
                    "FPS: processed {:.1}, dropped {:.1}",
                    report.processed_fps, report.dropped_fps
                ),
                SessionEvent::FirstResult(result) => {
                    eprintln!("First result, number found: {}", result.number.is_some())
                }
                SessionEvent::Finished(outcome) => break 'scan outcome,
                SessionEvent::Error(e) => {
                    break 'scan ScanOutcome::Failed {
                        message: e.to_string(),
                    };
                }
                _ => {}
            }
        }
    };
    session.on_pause();

    // Keep raw bytes out of the printed JSON
    let outcome = match outcome {
        ScanOutcome::Completed { card, image } => {
            if let (Some(path), Some(jpeg)) = (&options.image, &image) {
                std::fs::write(path, jpeg)?;
                eprintln!("Card image saved: {} ({} bytes)", path.display(), jpeg.len());
            }
            eprintln!("Recognized {}", card);
            ScanOutcome::Completed { card, image: None }
        }
        other => other,
    };

    let report = serde_json::json!({
        "version": app_info::version(),
        "finished_at": Local::now().to_rfc3339(),
        "elapsed_ms": started.elapsed().as_millis() as u64,
        "outcome": outcome,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Print the mapped card frame and text anchors for a view
pub fn overlay(
    width: i32,
    height: i32,
    rotation: Option<i32>,
    preview: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut mapper = CardRectMapper::new();
    mapper.set_view_size(width, height);

    if let Some(degrees) = rotation {
        let rotation = parse_rotation(degrees)?;
        let (preview_width, preview_height) = parse_size(preview)?;
        let card_rect = rotate_rect(
            CARD_FRAME_RECT,
            camera::RECOGNIZER_FRAME_WIDTH,
            camera::RECOGNIZER_FRAME_HEIGHT,
            Rotation::Deg90,
        );
        mapper.set_camera_parameters(preview_width, preview_height, rotation, card_rect);
    }

    let transform = mapper.transform();
    println!("View:        {}", mapper.view_size());
    println!(
        "Transform:   scale {:.4}, offset ({}, {})",
        transform.scale, transform.translate_x, transform.translate_y
    );
    println!("Card frame:  {}", mapper.card_rect());
    let anchors = [
        ("Number", mapper.card_number_pos(), mapper.card_number_font_size()),
        ("Date", mapper.card_date_pos(), mapper.card_date_font_size()),
        ("Holder", mapper.card_holder_pos(), mapper.card_holder_font_size()),
    ];
    for (name, pos, font_size) in anchors {
        println!(
            "{:<12} ({:.1}, {:.1}) font {:.1}",
            format!("{}:", name),
            pos.x,
            pos.y,
            font_size
        );
    }
    Ok(())
}

/// Run the availability check against the virtual platform
pub fn check(
    no_camera: bool,
    no_permission: bool,
    blocking: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut platform = VirtualPlatform::default();
    platform.has_camera = !no_camera;
    platform.camera_permission = !no_permission;
    let recognizer = ScriptedRecognizer::new([]);

    let report = if blocking {
        availability::check_blocking(&platform, &recognizer)
    } else {
        availability::check(&platform, Some(&recognizer as &dyn Recognizer))
    };

    println!("Checked at {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
    println!("{}", report);
    if report.is_passed() {
        println!("Scanning is available.");
    } else if let Some(error) = report.to_error() {
        println!("Scanning unavailable: {}", error);
    } else {
        println!("{}", report.message());
    }
    Ok(())
}
