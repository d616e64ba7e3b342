// SPDX-FileCopyrightText: Copyright 2025 Hewlett Packard Enterprise Development LP
// SPDX-License-Identifier: MIT

//! Rack Resiliency Service read API daemon.

use clap::Parser;
use tracing::{error, info};

/// Read API daemon command line arguments
#[derive(Parser, Debug)]
#[command(name = "apiserver")]
#[command(about = "Rack Resiliency Service read API")]
struct Args {
    /// HTTP server bind address
    #[arg(long, default_value = "0.0.0.0")]
    bind_address: String,

    /// HTTP server bind port
    #[arg(long, default_value = "8080")]
    bind_port: u16,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::logging::init_logging("apiserver", &args.log_level);

    info!("Starting the Rack Resiliency Service read API");
    if let Err(e) = apiserver::manager::run(&args.bind_address, args.bind_port).await {
        error!("API server terminated: {}", e);
        std::process::exit(1);
    }
}
