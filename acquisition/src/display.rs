//! Region annotations from the image display.
//!
//! The operator (or a detection pass) marks the star in each camera frame
//! with a single circle region. Regions arrive as DS9-format text:
//!
//! ```text
//! # Region file format: DS9 version 4.1
//! global color=green
//! image
//! circle(1752.42,454.107,12.5)
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use shared::Centroid;
use thiserror::Error;
use tracing::debug;

/// Errors interpreting a frame's regions.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegionError {
    #[error("no circle regions detected in frame {0}")]
    NoRegions(u32),

    #[error("multiple circle regions detected in frame {0}")]
    MultipleRegions(u32),

    #[error("cannot parse region in frame {frame}: {reason}")]
    Unparsable { frame: u32, reason: String },
}

/// Errors talking to the display.
#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("no region source configured for frame {0}")]
    UnknownFrame(u32),

    #[error("failed reading regions for frame {frame}: {source}")]
    Read {
        frame: u32,
        #[source]
        source: std::io::Error,
    },
}

/// Source of region annotations, one text blob per display frame.
#[async_trait]
pub trait RegionSource: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Regions of `frame` in DS9 format, image coordinates.
    async fn regions(&self, frame: u32) -> Result<String, DisplayError>;
}

/// Extract the single circle region of a frame as a centroid.
pub fn parse_circle_region(regions: &str, frame: u32) -> Result<Centroid, RegionError> {
    match regions.matches("circle").count() {
        0 => return Err(RegionError::NoRegions(frame)),
        1 => {}
        _ => return Err(RegionError::MultipleRegions(frame)),
    }

    let unparsable = |reason: &str| RegionError::Unparsable {
        frame,
        reason: reason.to_string(),
    };

    let start = regions
        .find("circle")
        .map(|i| i + "circle".len())
        .ok_or_else(|| unparsable("missing circle"))?;
    let body = regions[start..]
        .trim_start()
        .strip_prefix('(')
        .ok_or_else(|| unparsable("missing '('"))?;
    let body = &body[..body.find(')').ok_or_else(|| unparsable("missing ')'"))?];

    let values = body
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| unparsable(&e.to_string()))?;

    match values.as_slice() {
        [x, y] => Ok(Centroid::new(*x, *y)),
        [x, y, r, ..] => Ok(Centroid::with_radius(*x, *y, *r)),
        _ => Err(unparsable("expected at least x and y")),
    }
}

/// Region text read from saved `.reg` files, one per frame.
#[derive(Debug, Clone, Default)]
pub struct RegionFiles {
    files: HashMap<u32, PathBuf>,
}

impl RegionFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frame(mut self, frame: u32, path: impl Into<PathBuf>) -> Self {
        self.files.insert(frame, path.into());
        self
    }
}

#[async_trait]
impl RegionSource for RegionFiles {
    fn is_connected(&self) -> bool {
        !self.files.is_empty()
    }

    async fn regions(&self, frame: u32) -> Result<String, DisplayError> {
        let path = self
            .files
            .get(&frame)
            .ok_or(DisplayError::UnknownFrame(frame))?;
        debug!("Reading regions for frame {} from {}", frame, path.display());
        tokio::fs::read_to_string(path)
            .await
            .map_err(|source| DisplayError::Read { frame, source })
    }
}
