// Copyright 2026 Scout Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;

use scout_engine::config::EngineConfig;
use scout_engine::engine::Engine;
use scout_engine::rest;
use scout_engine::session;

#[derive(Parser)]
#[command(
    name = "scout",
    about = "Scout: acquisition resilience engine for AI agents",
    version
)]
struct Cli {
    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP dispatch shell
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8000")]
        port: u16,
    },
    /// Check the environment for required binaries
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "scout_engine=debug,scout=debug"
    } else {
        "scout_engine=info,scout=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    match cli.command {
        Commands::Serve { port } => {
            let config = EngineConfig::from_env();
            if config.vision.is_none() {
                tracing::warn!("no vision credential configured; video insight will report skipped");
            }
            let engine = Arc::new(Engine::new(config)?);
            rest::serve(port, engine).await
        }
        Commands::Doctor => {
            doctor();
            Ok(())
        }
    }
}

fn doctor() {
    let config = EngineConfig::from_env();

    match session::find_chromium(config.chromium_path.as_ref()) {
        Some(path) => println!("✓ chromium: {}", path.display()),
        None => println!("✗ chromium: not found (set SCOUT_CHROMIUM_PATH)"),
    }

    for (binary, purpose) in [
        ("yt-dlp", "transcript fallback and video download"),
        ("ffmpeg", "frame extraction"),
        ("ffprobe", "video duration probing"),
    ] {
        match which::which(binary) {
            Ok(path) => println!("✓ {binary}: {}", path.display()),
            Err(_) => println!("✗ {binary}: not found ({purpose} will fail)"),
        }
    }

    match &config.vision {
        Some(v) => println!("✓ vision: {} via {}", v.model, v.endpoint),
        None => println!("– vision: no credential (video insight reports skipped)"),
    }
}
