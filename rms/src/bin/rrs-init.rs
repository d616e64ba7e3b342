// SPDX-FileCopyrightText: Copyright 2025 Hewlett Packard Enterprise Development LP
// SPDX-License-Identifier: MIT

//! One-shot initializer run before the daemons accept work.

use clap::Parser;
use tracing::{error, info};

/// Initializer command line arguments
#[derive(Parser, Debug)]
#[command(name = "rrs-init")]
#[command(about = "Rack Resiliency Service initializer")]
struct Args {
    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::logging::init_logging("rrs_init", &args.log_level);

    info!("Initializing the Rack Resiliency Service");
    if let Err(e) = rms::init::run().await {
        error!("Initialization failed: {}", e);
        std::process::exit(1);
    }
    info!("Initialization complete");
}
