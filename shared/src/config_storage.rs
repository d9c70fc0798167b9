//! Configuration storage for the acquisition system.
//!
//! All config is stored in ~/.acq_config/ by default.

use crate::catalog::{CatalogError, StaticPlateCatalog};
use crate::config::{AcquisitionConfig, ConfigError};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Configuration storage manager.
///
/// Manages loading and saving of the acquisition configuration and the plate
/// catalog snapshot from a centralized directory (defaults to ~/.acq_config/).
#[derive(Debug, Clone)]
pub struct ConfigStorage {
    /// Root directory for all configuration (e.g., ~/.acq_config)
    root_path: PathBuf,
}

impl ConfigStorage {
    /// Create a new config storage with default path (~/.acq_config)
    pub fn new() -> std::io::Result<Self> {
        let home = std::env::var("HOME")
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::NotFound, "HOME not set"))?;
        let root_path = PathBuf::from(home).join(".acq_config");
        Ok(Self { root_path })
    }

    /// Create a new config storage with custom root path
    pub fn with_path(root_path: PathBuf) -> Self {
        Self { root_path }
    }

    /// Get the root configuration path
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    fn config_path(&self) -> PathBuf {
        self.root_path.join("acquisition.json")
    }

    fn catalog_path(&self) -> PathBuf {
        self.root_path.join("plates.json")
    }

    /// Get the acquisition configuration.
    ///
    /// Returns None if no configuration has been saved.
    /// Returns Some(Err) if the file exists but cannot be loaded.
    pub fn get_config(&self) -> Option<Result<AcquisitionConfig, ConfigError>> {
        let path = self.config_path();

        if !path.exists() {
            return None;
        }

        Some(AcquisitionConfig::load_from_file(&path))
    }

    /// Save the acquisition configuration.
    ///
    /// Creates the config directory if it doesn't exist.
    /// Returns the path where the configuration was saved.
    pub fn save_config(&self, config: &AcquisitionConfig) -> Result<PathBuf, ConfigError> {
        std::fs::create_dir_all(&self.root_path)?;

        let path = self.config_path();
        config.save_to_file(&path)?;
        debug!("Saved configuration to {}", path.display());
        Ok(path)
    }

    /// Get the plate catalog.
    ///
    /// An explicit `catalog_path` in the configuration wins over the file in
    /// the storage root. Returns None if neither exists.
    pub fn get_catalog(
        &self,
        config: &AcquisitionConfig,
    ) -> Option<Result<StaticPlateCatalog, CatalogError>> {
        let path = config
            .catalog_path
            .clone()
            .unwrap_or_else(|| self.catalog_path());

        if !path.exists() {
            return None;
        }

        Some(StaticPlateCatalog::load_from_file(&path))
    }

    /// Save the plate catalog snapshot into the storage root.
    pub fn save_catalog(&self, catalog: &StaticPlateCatalog) -> Result<PathBuf, CatalogError> {
        std::fs::create_dir_all(&self.root_path)?;

        let path = self.catalog_path();
        catalog.save_to_file(&path)?;
        debug!("Saved plate catalog to {}", path.display());
        Ok(path)
    }
}

impl Default for ConfigStorage {
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| Self::with_path(PathBuf::from(".acq_config")))
    }
}
