//! Acquisition system configuration.
//!
//! All settings are loaded once, from JSON, and handed to the components that
//! need them at construction time.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::image_size::ImageSize;

/// Errors while loading or saving configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unknown camera orientation {0:?} (expected SE or NE)")]
    UnknownOrientation(String),

    #[error("{field} must be a positive number of seconds, got {value}")]
    InvalidTimeout { field: &'static str, value: f64 },
}

/// How an acquisition camera is mounted relative to the sky axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CameraOrientation {
    /// +x is +RA, +y is +Dec.
    #[serde(rename = "SE")]
    SouthEast,
    /// Rotated a quarter turn: +x is +Dec, +y is -RA.
    #[serde(rename = "NE")]
    NorthEast,
}

impl CameraOrientation {
    /// Map a detector-frame offset onto (RA, Dec) components.
    pub fn to_sky(&self, dx: f64, dy: f64) -> (f64, f64) {
        match self {
            CameraOrientation::SouthEast => (dx, dy),
            CameraOrientation::NorthEast => (-dy, dx),
        }
    }
}

impl FromStr for CameraOrientation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SE" => Ok(CameraOrientation::SouthEast),
            "NE" => Ok(CameraOrientation::NorthEast),
            _ => Err(ConfigError::UnknownOrientation(s.to_string())),
        }
    }
}

impl fmt::Display for CameraOrientation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CameraOrientation::SouthEast => write!(f, "SE"),
            CameraOrientation::NorthEast => write!(f, "NE"),
        }
    }
}

/// Connection settings for the Telescope Control Computer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TccSettings {
    pub host: String,
    pub port: u16,
    /// Command id used for every status poll and offset we send.
    pub admin_cmd_id: u32,
    pub status_timeout_secs: f64,
    pub connect_timeout_secs: f64,
}

impl TccSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Unvalidated values that are not a representable duration map to zero.
    pub fn status_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.status_timeout_secs).unwrap_or(Duration::ZERO)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.connect_timeout_secs).unwrap_or(Duration::ZERO)
    }

    /// Reject timeouts that are not finite and positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("status_timeout_secs", self.status_timeout_secs),
            ("connect_timeout_secs", self.connect_timeout_secs),
        ] {
            if value <= 0.0 || Duration::try_from_secs_f64(value).is_err() {
                return Err(ConfigError::InvalidTimeout { field, value });
            }
        }
        Ok(())
    }
}

impl Default for TccSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 2500,
            admin_cmd_id: 999,
            status_timeout_secs: 20.0,
            connect_timeout_secs: 5.0,
        }
    }
}

/// Acquisition camera geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub frame: ImageSize,
    /// Physical pixel pitch in microns
    pub pixel_size_um: f64,
    pub on_orientation: CameraOrientation,
    pub off_orientation: CameraOrientation,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            frame: ImageSize::from_width_height(1936, 1216),
            pixel_size_um: 5.86,
            on_orientation: CameraOrientation::SouthEast,
            off_orientation: CameraOrientation::SouthEast,
        }
    }
}

/// Telescope optics relevant to turning pixels into sky offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelescopeSettings {
    /// Sky scale at the acquisition camera detectors
    pub focal_scale_arcsec_per_mm: f64,
    /// Plate scale at the focal plane
    pub plate_scale_mm_per_deg: f64,
}

impl Default for TelescopeSettings {
    fn default() -> Self {
        Self {
            focal_scale_arcsec_per_mm: 10.9,
            plate_scale_mm_per_deg: 217.7358,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub tcc: TccSettings,
    pub cameras: CameraSettings,
    pub telescope: TelescopeSettings,
    /// JSON plate catalog snapshot
    pub catalog_path: Option<PathBuf>,
}

impl AcquisitionConfig {
    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from JSON file. Missing sections and fields take their defaults.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.tcc.validate()?;
        Ok(config)
    }
}
