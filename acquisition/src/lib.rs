//! Acquisition-camera centering.
//!
//! Reads star centroids from the display's region annotations, converts them
//! into a sky translation and rotation, and applies the correction through
//! the TCC link once the telescope reports it is tracking.

pub mod centre_up;
pub mod display;
pub mod offsets;

pub use centre_up::{CentreUp, CentreUpError, CentreUpOptions, CentreUpOutcome};
pub use display::{parse_circle_region, DisplayError, RegionError, RegionFiles, RegionSource};
pub use offsets::{fit_field_correction, FieldCorrection, FieldGeometry};
