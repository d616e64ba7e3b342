// SPDX-FileCopyrightText: Copyright 2025 Hewlett Packard Enterprise Development LP
// SPDX-License-Identifier: MIT

//! Rack Resiliency Monitoring Service daemon.
//!
//! Initializes logging, validates the environment, and runs the startup
//! sequence: resume detection, the notification intake server, the
//! subscription handshake, and the main control loop.

use clap::Parser;
use tracing::{error, info};

/// Monitoring daemon command line arguments
#[derive(Parser, Debug)]
#[command(name = "rms")]
#[command(about = "Rack Resiliency Monitoring Service")]
struct Args {
    /// HTTP server bind address
    #[arg(long, default_value = "0.0.0.0")]
    bind_address: String,

    /// HTTP server bind port
    #[arg(long, default_value = "8551")]
    bind_port: u16,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::logging::init_logging("rms", &args.log_level);

    info!("Starting the Rack Resiliency Monitoring Service");
    if let Err(e) = rms::manager::run(&args.bind_address, args.bind_port).await {
        error!("RMS terminated: {}", e);
        std::process::exit(1);
    }
}
