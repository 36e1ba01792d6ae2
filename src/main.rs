// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use inspection_station::{CameraKind, Label, Resolution};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "inspection-station")]
#[command(about = "Machine-vision inspection station: live camera feed and dataset capture")]
#[command(version)]
struct Cli {
    /// Configuration file (default: ~/.config/inspection-station/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Dataset root, overriding the configured one
    #[arg(long, global = true)]
    storage: Option<PathBuf>,

    /// Use simulated cameras instead of /dev/video* devices
    #[arg(long, global = true)]
    simulate: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available cameras of both kinds
    List,

    /// Run the live feed and report frame rate
    Preview {
        /// Duration in seconds (Ctrl+C stops early)
        #[arg(short, long, default_value = "10")]
        seconds: u64,
    },

    /// Capture labeled samples from the live feed
    Capture {
        /// Sample label: ok or not_ok
        #[arg(short, long)]
        label: Label,

        /// Defect category for NOT_OK samples
        #[arg(short, long)]
        category: Option<String>,

        /// Number of samples to take
        #[arg(short = 'n', long, default_value = "1")]
        count: u32,
    },

    /// Show dataset statistics and the most recent samples
    Stats,

    /// Apply settings to the camera and save them
    Set {
        /// Camera kind: usb or depth
        #[arg(long)]
        kind: Option<CameraKind>,

        /// Device index within the kind
        #[arg(long)]
        device: Option<u32>,

        /// Resolution: 640x480, 1280x720 or 1920x1080
        #[arg(long)]
        resolution: Option<Resolution>,

        /// Frame rate: 15, 30 or 60
        #[arg(long)]
        fps: Option<u32>,

        /// Enable or disable autofocus
        #[arg(long)]
        autofocus: Option<bool>,

        /// Manual lens position (0-255)
        #[arg(long)]
        focus: Option<u8>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG controls the level, e.g. RUST_LOG=inspection_station=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let context = cli::Context::load(cli.config, cli.storage, cli.simulate)?;

    match cli.command {
        Commands::List => cli::list_cameras(&context),
        Commands::Preview { seconds } => cli::preview(&context, seconds),
        Commands::Capture {
            label,
            category,
            count,
        } => cli::capture(&context, label, category, count),
        Commands::Stats => cli::show_stats(&context),
        Commands::Set {
            kind,
            device,
            resolution,
            fps,
            autofocus,
            focus,
        } => {
            let changes = cli::collect_changes(kind, device, resolution, fps, autofocus, focus);
            cli::apply_settings(&context, &changes)
        }
    }
}
