//! Plate catalog lookups.
//!
//! The TCC reports the mounted cartridge as an instrument number. The catalog
//! resolves that to the plate currently plugged, and resolves a plate to the
//! focal-plane position of its off-axis acquisition hole.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from plate catalog lookups.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("no plate loaded on cartridge {0}")]
    UnknownInstrument(i32),

    #[error("no off-axis acquisition hole recorded for plate {0}")]
    UnknownPlate(i32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid catalog file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Focal-plane position in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FocalPosition {
    pub x_focal: f64,
    pub y_focal: f64,
}

impl FocalPosition {
    pub fn new(x_focal: f64, y_focal: f64) -> Self {
        Self { x_focal, y_focal }
    }
}

/// Lookup interface for plate data.
pub trait PlateCatalog: Send + Sync {
    /// Plate currently plugged on the given cartridge.
    fn plate_id(&self, instrument_num: i32) -> Result<i32, CatalogError>;

    /// Focal-plane position of the off-axis camera hole on a plate.
    fn off_axis_hole(&self, plate_id: i32) -> Result<FocalPosition, CatalogError>;
}

/// A catalog held in memory, typically loaded from a JSON snapshot of the
/// plate database.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticPlateCatalog {
    /// Cartridge (instrument number) to plate id
    #[serde(default)]
    pub cartridges: HashMap<i32, i32>,
    /// Plate id to off-axis hole position
    #[serde(default)]
    pub off_axis_holes: HashMap<i32, FocalPosition>,
}

impl StaticPlateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cartridge(mut self, instrument_num: i32, plate_id: i32) -> Self {
        self.cartridges.insert(instrument_num, plate_id);
        self
    }

    pub fn with_off_axis_hole(mut self, plate_id: i32, hole: FocalPosition) -> Self {
        self.off_axis_holes.insert(plate_id, hole);
        self
    }

    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), CatalogError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from JSON file
    pub fn load_from_file(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

impl PlateCatalog for StaticPlateCatalog {
    fn plate_id(&self, instrument_num: i32) -> Result<i32, CatalogError> {
        self.cartridges
            .get(&instrument_num)
            .copied()
            .ok_or(CatalogError::UnknownInstrument(instrument_num))
    }

    fn off_axis_hole(&self, plate_id: i32) -> Result<FocalPosition, CatalogError> {
        self.off_axis_holes
            .get(&plate_id)
            .copied()
            .ok_or(CatalogError::UnknownPlate(plate_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_catalog() -> StaticPlateCatalog {
        StaticPlateCatalog::new()
            .with_cartridge(5, 9459)
            .with_off_axis_hole(9459, FocalPosition::new(-113.019, 0.0))
    }

    #[test]
    fn test_lookup_known_values() {
        let catalog = sample_catalog();
        assert_eq!(catalog.plate_id(5).unwrap(), 9459);
        assert_eq!(
            catalog.off_axis_hole(9459).unwrap(),
            FocalPosition::new(-113.019, 0.0)
        );
    }

    #[test]
    fn test_lookup_unknown_values() {
        let catalog = sample_catalog();
        assert!(matches!(
            catalog.plate_id(7),
            Err(CatalogError::UnknownInstrument(7))
        ));
        assert!(matches!(
            catalog.off_axis_hole(1),
            Err(CatalogError::UnknownPlate(1))
        ));
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plates.json");

        sample_catalog().save_to_file(&path).unwrap();
        let loaded = StaticPlateCatalog::load_from_file(&path).unwrap();

        assert_eq!(loaded.plate_id(5).unwrap(), 9459);
    }

    #[test]
    fn test_load_garbage_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plates.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(
            StaticPlateCatalog::load_from_file(&path),
            Err(CatalogError::Parse(_))
        ));
    }
}
