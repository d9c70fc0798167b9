//! Shared components for the acquisition-camera centering system.
//!
//! Holds the plain value types passed between the TCC link and the
//! centre-up coordinator, the plate catalog seam, and the JSON-backed
//! configuration used by the binaries.

pub mod catalog;
pub mod centroid;
pub mod config;
pub mod config_storage;
pub mod image_size;

pub use catalog::{CatalogError, FocalPosition, PlateCatalog, StaticPlateCatalog};
pub use centroid::{Camera, Centroid, OnOff};
pub use config::{
    AcquisitionConfig, CameraOrientation, CameraSettings, ConfigError, TccSettings,
    TelescopeSettings,
};
pub use image_size::ImageSize;
