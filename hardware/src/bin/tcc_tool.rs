//! Command-line tool for talking to the Telescope Control Computer.
//!
//! Subcommands:
//! - `connect`: Connect and report the assigned user id
//! - `status`: Query instrument, plate and axis states once
//! - `monitor`: Poll status at a fixed interval
//! - `offset`: Apply a guide offset in arcseconds

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hardware::tcc::{OffsetRequest, TccLink, TccState, TcpLineTransport};
use shared::config_storage::ConfigStorage;
use shared::{AcquisitionConfig, PlateCatalog, StaticPlateCatalog};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Telescope Control Computer tool
#[derive(Parser, Debug)]
#[command(name = "tcc_tool")]
#[command(about = "Query status and send guide offsets to the TCC")]
#[command(version)]
struct Args {
    /// TCC host (overrides the stored configuration)
    #[arg(long, global = true)]
    host: Option<String>,

    /// TCC port (overrides the stored configuration)
    #[arg(long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect and report the session user id
    Connect,

    /// Query status once and print it
    Status,

    /// Poll status repeatedly
    Monitor {
        /// Seconds between polls
        #[arg(short, long, default_value = "5")]
        interval: f64,
    },

    /// Send a guide offset
    Offset {
        /// RA offset in arcseconds
        #[arg(long, allow_hyphen_values = true)]
        ra: Option<f64>,

        /// Dec offset in arcseconds
        #[arg(long, allow_hyphen_values = true)]
        dec: Option<f64>,

        /// Rotation offset in arcseconds
        #[arg(long, allow_hyphen_values = true)]
        rot: Option<f64>,
    },
}

fn load_config() -> Result<(AcquisitionConfig, Arc<dyn PlateCatalog>)> {
    let storage = ConfigStorage::new().context("cannot locate config directory")?;
    let config = match storage.get_config() {
        Some(config) => config.context("cannot read stored configuration")?,
        None => AcquisitionConfig::default(),
    };
    let catalog = match storage.get_catalog(&config) {
        Some(catalog) => catalog.context("cannot read plate catalog")?,
        None => {
            warn!("No plate catalog found, plate ids will be unknown");
            StaticPlateCatalog::new()
        }
    };
    let catalog: Arc<dyn PlateCatalog> = Arc::new(catalog);
    Ok((config, catalog))
}

fn print_state(state: &TccState) {
    let axes = state
        .axis_states()
        .map(|axes| {
            axes.iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_else(|| "unknown".to_string());
    println!("User ID:        {:?}", state.my_user_id());
    println!("Instrument:     {:?}", state.instrument_num());
    println!("Plate:          {:?}", state.plate_id());
    println!("Axes:           {axes}");
    println!(
        "Sec. orient.:   {}",
        state.secondary_orientation().unwrap_or("unknown")
    );
    println!("Ok to offset:   {}", state.is_ok_to_offset());
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let (mut config, catalog) = load_config()?;
    if let Some(host) = args.host {
        config.tcc.host = host;
    }
    if let Some(port) = args.port {
        config.tcc.port = port;
    }

    let settings = config.tcc.clone();
    let transport = TcpLineTransport::new(settings.address(), settings.connect_timeout());
    let link = TccLink::new(transport, catalog, settings);

    let result = run(&link, args.command).await;
    link.disconnect().await;
    result
}

fn poll_interval(seconds: f64) -> Result<Duration> {
    match Duration::try_from_secs_f64(seconds) {
        Ok(period) if !period.is_zero() => Ok(period),
        _ => bail!("monitor interval must be a positive number of seconds, got {seconds}"),
    }
}

async fn run(link: &TccLink<TcpLineTransport>, command: Command) -> Result<()> {
    if let Command::Monitor { interval } = &command {
        poll_interval(*interval)?;
    }

    link.connect().await?;

    match command {
        Command::Connect => {
            let state = link.update_status().await.wait().await?;
            println!("Connected to {}", link.settings().address());
            println!("User ID:        {:?}", state.my_user_id());
        }
        Command::Status => {
            let state = link.update_status().await.wait().await?;
            print_state(&state);
        }
        Command::Monitor { interval } => {
            let mut ticker = tokio::time::interval(poll_interval(interval)?);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = tokio::signal::ctrl_c() => {
                        info!("Stopping monitor");
                        break;
                    }
                }
                match link.update_status().await.wait().await {
                    Ok(state) => print_state(&state),
                    Err(e) => warn!("Status poll failed: {}", e),
                }
                println!();
            }
        }
        Command::Offset { ra, dec, rot } => {
            let offset = OffsetRequest {
                ra_arcsec: ra,
                dec_arcsec: dec,
                rot_arcsec: rot,
            };
            // Readiness comes from a fresh status.
            link.update_status().await.wait().await?;
            link.offset(&offset).await?;
            info!("Offset applied");
        }
    }
    Ok(())
}
