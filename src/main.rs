// SPDX-License-Identifier: GPL-3.0-only

use cardscan::constants::app_info;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "cardscan")]
#[command(about = "Payment card scanning pipeline on virtual camera hardware")]
#[command(version = app_info::version())]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a complete scan against the virtual camera and print the outcome
    Simulate {
        /// Display rotation in degrees (0, 90, 180, 270)
        #[arg(short, long, default_value = "0")]
        rotation: i32,

        /// Skip expiration date recognition
        #[arg(long)]
        no_date: bool,

        /// Skip card holder recognition
        #[arg(long)]
        no_holder: bool,

        /// Write the grabbed card image (JPEG) to this file
        #[arg(short, long)]
        image: Option<PathBuf>,

        /// Give up after this many seconds (default: 30)
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Configuration file (default: ~/.config/cardscan/config.json)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the card frame and text anchors mapped onto a view
    Overlay {
        /// View width in pixels
        #[arg(long, default_value = "720")]
        width: i32,

        /// View height in pixels
        #[arg(long, default_value = "1280")]
        height: i32,

        /// Camera data rotation in degrees; omit to show the defaults used
        /// before the camera opens
        #[arg(short, long)]
        rotation: Option<i32>,

        /// Camera preview size as WIDTHxHEIGHT
        #[arg(short, long, default_value = "1280x720")]
        preview: String,
    },

    /// Check whether scanning is possible on the virtual platform
    Check {
        /// Pretend there is no camera
        #[arg(long)]
        no_camera: bool,

        /// Pretend the camera permission was denied
        #[arg(long)]
        no_permission: bool,

        /// Also probe the camera by opening it
        #[arg(long)]
        blocking: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=cardscan::render=trace, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            rotation,
            no_date,
            no_holder,
            image,
            timeout,
            config,
        } => cli::simulate(cli::SimulateOptions {
            rotation,
            scan_expiration_date: !no_date,
            scan_card_holder: !no_holder,
            image,
            timeout: timeout.map(std::time::Duration::from_secs),
            config,
        }),
        Commands::Overlay {
            width,
            height,
            rotation,
            preview,
        } => cli::overlay(width, height, rotation, &preview),
        Commands::Check {
            no_camera,
            no_permission,
            blocking,
        } => cli::check(no_camera, no_permission, blocking),
    }
}
