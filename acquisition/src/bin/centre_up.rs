//! Centre the field on the acquisition cameras.
//!
//! Reads the star positions from saved DS9 region files (one per camera),
//! computes the translation and rotation offsets, and applies them through
//! the TCC.
//!
//! ```text
//! centre_up --on-regions on.reg --off-regions off.reg --dry-run
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use acquisition::{CentreUp, CentreUpOptions, FieldGeometry, RegionFiles};
use anyhow::{Context, Result};
use clap::Parser;
use hardware::tcc::{TccLink, TcpLineTransport};
use shared::config_storage::ConfigStorage;
use shared::{AcquisitionConfig, Camera, PlateCatalog, StaticPlateCatalog};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Centre the field using the acquisition cameras
#[derive(Parser, Debug)]
#[command(name = "centre_up")]
#[command(about = "Compute and apply translation/rotation offsets from acquisition camera regions")]
#[command(version)]
struct Args {
    /// Region file for the on-axis camera
    #[arg(long)]
    on_regions: PathBuf,

    /// Region file for the off-axis camera
    #[arg(long)]
    off_regions: Option<PathBuf>,

    /// Apply only the translation
    #[arg(long)]
    translation: bool,

    /// Compute and print offsets without sending them
    #[arg(long)]
    dry_run: bool,

    /// Configuration file (defaults to the stored configuration)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Plate catalog file (overrides the configuration)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// TCC host (overrides the configuration)
    #[arg(long)]
    host: Option<String>,
}

fn load_config(path: Option<&PathBuf>) -> Result<(AcquisitionConfig, ConfigStorage)> {
    let storage = ConfigStorage::new().context("cannot locate config directory")?;
    let config = match path {
        Some(path) => AcquisitionConfig::load_from_file(path)
            .with_context(|| format!("cannot read {}", path.display()))?,
        None => match storage.get_config() {
            Some(config) => config.context("cannot read stored configuration")?,
            None => {
                info!(
                    "No stored configuration in {}, using defaults",
                    storage.root_path().display()
                );
                AcquisitionConfig::default()
            }
        },
    };
    Ok((config, storage))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let (mut config, storage) = load_config(args.config.as_ref())?;
    if let Some(catalog) = args.catalog {
        config.catalog_path = Some(catalog);
    }
    if let Some(host) = args.host {
        config.tcc.host = host;
    }

    let catalog = match storage.get_catalog(&config) {
        Some(catalog) => catalog.context("cannot read plate catalog")?,
        None => {
            warn!("No plate catalog found, rotation cannot be computed");
            StaticPlateCatalog::new()
        }
    };
    let catalog: Arc<dyn PlateCatalog> = Arc::new(catalog);

    let mut regions = RegionFiles::new().with_frame(Camera::OnAxis.frame(), &args.on_regions);
    if let Some(off_regions) = &args.off_regions {
        regions = regions.with_frame(Camera::OffAxis.frame(), off_regions);
    }
    let options = CentreUpOptions {
        translation_only: args.translation || args.off_regions.is_none(),
        dry_run: args.dry_run,
    };

    let transport = TcpLineTransport::new(config.tcc.address(), config.tcc.connect_timeout());
    let link = Arc::new(TccLink::new(transport, catalog, config.tcc.clone()));
    let centre_up = CentreUp::new(
        Arc::clone(&link),
        Some(regions),
        FieldGeometry::from_config(&config),
    );

    let result = centre_up.run(options).await;
    link.disconnect().await;
    let outcome = result?;

    println!("Plate:     {:?}", outcome.plate_id);
    println!("RA:        {:.3} arcsec", outcome.offset.ra_arcsec.unwrap_or(0.0));
    println!("Dec:       {:.3} arcsec", outcome.offset.dec_arcsec.unwrap_or(0.0));
    match outcome.offset.rot_arcsec {
        Some(rot) => println!("Rotation:  {rot:.3} arcsec"),
        None => println!("Rotation:  not computed"),
    }
    println!(
        "Applied:   {}",
        if outcome.applied { "yes" } else { "no (dry run)" }
    );
    Ok(())
}
