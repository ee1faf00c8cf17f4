//! IMU Serial-to-HTTP Relay
//!
//! Reads newline-delimited JSON readings from a microcontroller over a
//! serial port, keeps the most recent line in memory, and serves it over
//! HTTP for browser-based dashboards.
//!
//! # Features
//!
//! - **Relay**: one thread reads the serial device, the latest complete line
//!   is served verbatim on `GET /data` with permissive CORS
//! - **Port discovery**: list serial ports and auto-detect USB-to-serial
//!   adapters by VID/PID
//! - **Configuration**: TOML config file with CLI overrides
//!
//! # Usage
//!
//! ```bash
//! # Run the relay with defaults (/dev/ttyUSB0, 115200 baud, port 5000)
//! imu-relay serve
//!
//! # Override device and HTTP port
//! imu-relay serve -d /dev/ttyACM0 --http-port 8080
//!
//! # Run from a config file, logging received lines
//! imu-relay serve -c relay.toml --log lines.log
//!
//! # List available serial ports
//! imu-relay ports list
//!
//! # Auto-detect the adapter
//! imu-relay ports detect
//! ```

mod config;
mod error;
mod serial;
mod server;
mod store;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use log::{info, warn};

use config::RelayConfig;
use serial::{IngestLoop, LineLog};
use store::LatestValue;

/// IMU Serial-to-HTTP Relay
///
/// Exposes the latest serial line from a sensor board over HTTP
#[derive(Parser)]
#[command(name = "imu-relay")]
#[command(version)]
#[command(about = "Serial-to-HTTP relay exposing the latest IMU reading")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay: read the serial device, serve the latest line over HTTP
    Serve {
        /// Serial device path (e.g., /dev/ttyUSB0)
        #[arg(short, long)]
        device: Option<String>,

        /// Baud rate
        #[arg(short, long)]
        baud: Option<u32>,

        /// HTTP bind address
        #[arg(long)]
        bind: Option<String>,

        /// HTTP listen port
        #[arg(long)]
        http_port: Option<u16>,

        /// Config file (TOML); CLI flags override file values
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Log received lines to file
        #[arg(short, long)]
        log: Option<PathBuf>,
    },

    /// Serial port operations
    #[command(subcommand)]
    Ports(PortCommands),
}

#[derive(Subcommand)]
enum PortCommands {
    /// List available serial ports
    List,

    /// Auto-detect USB-to-serial adapters
    Detect,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match cli.command {
        Commands::Serve {
            device,
            baud,
            bind,
            http_port,
            config,
            log,
        } => run_serve(device, baud, bind, http_port, config, log).await,
        Commands::Ports(cmd) => handle_ports(cmd),
    }
}

async fn run_serve(
    device: Option<String>,
    baud: Option<u32>,
    bind: Option<String>,
    http_port: Option<u16>,
    config: Option<PathBuf>,
    log: Option<PathBuf>,
) -> Result<()> {
    let mut cfg = match config {
        Some(ref path) => RelayConfig::from_file(path)?,
        None => RelayConfig::default(),
    };
    if let Some(device) = device {
        cfg.serial.device = device;
    }
    if let Some(baud) = baud {
        cfg.serial.baud = baud;
    }
    if let Some(bind) = bind {
        cfg.http.bind = bind;
    }
    if let Some(port) = http_port {
        cfg.http.port = port;
    }

    let line_log = match log {
        Some(ref path) => Some(LineLog::create(path)?),
        None => None,
    };

    let store = LatestValue::new();
    let running = Arc::new(AtomicBool::new(true));

    let ingest = IngestLoop::new(
        cfg.port_config(),
        store.clone(),
        Arc::clone(&running),
        line_log,
    );
    let ingest_thread = thread::Builder::new()
        .name("serial-ingest".to_string())
        .spawn(move || ingest.run())
        .context("Failed to spawn ingest thread")?;

    let shutdown = {
        let running = Arc::clone(&running);
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for ctrl-c: {e}");
                std::future::pending::<()>().await;
            }
            info!("shutdown requested");
            running.store(false, Ordering::SeqCst);
        }
    };

    let result = server::serve(&cfg.http, store, shutdown).await;

    running.store(false, Ordering::SeqCst);
    if ingest_thread.join().is_err() {
        warn!("ingest thread panicked");
    }

    result
}

fn handle_ports(cmd: PortCommands) -> Result<()> {
    match cmd {
        PortCommands::List => {
            serial::port::print_ports()?;
        }

        PortCommands::Detect => {
            println!("{} Detecting USB-to-serial adapters...", "[*]".cyan().bold());

            let ports = serial::port::detect_usb_ports()?;

            if ports.is_empty() {
                println!("{}", "No USB-to-serial adapters detected".yellow());
                println!("\n{}", "Troubleshooting:".white().bold());
                println!("  1. Connect the sensor board's USB cable");
                println!("  2. Check permissions: sudo usermod -aG dialout $USER");
                println!("  3. Check dmesg for connection events");
            } else {
                println!("\n{}", "Detected serial ports:".green().bold());
                for port in &ports {
                    println!("\n  {}", port.path.white().bold());
                    if let Some(chip) = port.adapter_chip() {
                        println!("    Adapter: {}", chip);
                    }
                    if let Some(ref prod) = port.product {
                        println!("    Product: {}", prod);
                    }
                    if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
                        println!("    VID:PID: {:04x}:{:04x}", vid, pid);
                    }
                }
                println!("\n{}", "To start relaying:".cyan());
                println!("  imu-relay serve -d {}", ports[0].path.white());
            }
        }
    }

    Ok(())
}
