//! The centre-up sequence.
//!
//! 1. Read the on-axis centroid (and the off-axis one unless only a
//!    translation is wanted) from the display regions.
//! 2. Convert them into a translation and rotation offset.
//! 3. Refresh the TCC status, re-check that every axis is tracking, and send
//!    the offset.

use std::sync::{Arc, Mutex, PoisonError};

use hardware::tcc::{LineTransport, OffsetRequest, TccError, TccLink};
use shared::{Camera, CatalogError, Centroid, OnOff};
use thiserror::Error;
use tracing::{info, warn};

use crate::display::{parse_circle_region, RegionSource};
use crate::offsets::FieldGeometry;

#[derive(Error, Debug)]
pub enum CentreUpError {
    #[error("display is not connected")]
    DisplayNotConnected,

    #[error("missing data: {0}")]
    MissingData(String),

    #[error("catalog lookup failed: {0}")]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Tcc(#[from] TccError),

    #[error("not ok to offset: {0}")]
    NotReady(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CentreUpOptions {
    /// Skip the off-axis camera and apply no rotation.
    pub translation_only: bool,
    /// Compute and report, but do not send the offset.
    pub dry_run: bool,
}

/// What a centre-up run computed and whether it was sent.
#[derive(Debug, Clone, PartialEq)]
pub struct CentreUpOutcome {
    pub centroids: OnOff<Option<Centroid>>,
    pub plate_id: Option<i32>,
    pub offset: OffsetRequest,
    pub applied: bool,
}

/// Coordinates the display, the field geometry and the TCC link.
pub struct CentreUp<T: LineTransport, D: RegionSource> {
    link: Arc<TccLink<T>>,
    display: Option<D>,
    geometry: FieldGeometry,
    last_centroids: Mutex<OnOff<Option<Centroid>>>,
}

impl<T: LineTransport, D: RegionSource> CentreUp<T, D> {
    pub fn new(link: Arc<TccLink<T>>, display: Option<D>, geometry: FieldGeometry) -> Self {
        Self {
            link,
            display,
            geometry,
            last_centroids: Mutex::new(OnOff::default()),
        }
    }

    pub fn link(&self) -> &Arc<TccLink<T>> {
        &self.link
    }

    pub fn geometry(&self) -> &FieldGeometry {
        &self.geometry
    }

    /// Remember the latest detection for a camera, used when the display
    /// cannot be read.
    pub fn record_centroid(&self, camera: Camera, centroid: Centroid) {
        let mut cache = self
            .last_centroids
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *cache.get_mut(camera) = Some(centroid);
    }

    pub fn last_centroid(&self, camera: Camera) -> Option<Centroid> {
        *self
            .last_centroids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(camera)
    }

    pub async fn run(&self, options: CentreUpOptions) -> Result<CentreUpOutcome, CentreUpError> {
        let display = self
            .display
            .as_ref()
            .filter(|display| display.is_connected())
            .ok_or(CentreUpError::DisplayNotConnected)?;

        let on_axis = self.read_centroid(display, Camera::OnAxis).await?;
        let off_axis = if options.translation_only {
            None
        } else {
            Some(self.read_centroid(display, Camera::OffAxis).await?)
        };

        let translation = self.geometry.translation_offset(&on_axis);
        let mut offset = OffsetRequest::translation(translation.x, translation.y);

        // Rotation uses the plate reported by this status, not a cached one.
        let state = self.link.update_status().await.wait().await?;
        let plate_id = state.plate_id();

        if let Some(off_axis) = &off_axis {
            let plate_id = plate_id.ok_or_else(|| {
                CentreUpError::MissingData(format!(
                    "no plate known for instrument {:?}",
                    state.instrument_num()
                ))
            })?;
            let hole = self.link.catalog().off_axis_hole(plate_id)?;
            let rotation = self.geometry.rotation_offset(hole, off_axis, &translation);
            offset = offset.with_rotation(rotation);
        }

        info!(
            "Centre up: ra={:.3} dec={:.3} rot={} arcsec",
            translation.x,
            translation.y,
            offset
                .rot_arcsec
                .map_or_else(|| "none".to_string(), |rot| format!("{rot:.3}"))
        );

        let mut outcome = CentreUpOutcome {
            centroids: OnOff::new(Some(on_axis), off_axis),
            plate_id,
            offset,
            applied: false,
        };

        if options.dry_run {
            info!("Dry run, offset not sent");
            return Ok(outcome);
        }

        if !self.link.is_ok_to_offset() {
            return Err(CentreUpError::NotReady(self.link.state().not_ready_reason()));
        }
        self.link.offset(&outcome.offset).await?;
        outcome.applied = true;
        Ok(outcome)
    }

    async fn read_centroid(
        &self,
        display: &D,
        camera: Camera,
    ) -> Result<Centroid, CentreUpError> {
        let frame = camera.frame();
        match display.regions(frame).await {
            Ok(regions) => {
                let centroid = parse_circle_region(&regions, frame)
                    .map_err(|e| CentreUpError::MissingData(e.to_string()))?;
                self.record_centroid(camera, centroid);
                Ok(centroid)
            }
            Err(e) => match self.last_centroid(camera) {
                Some(centroid) => {
                    warn!(
                        "Cannot read {} regions ({}), using last centroid {}",
                        camera, e, centroid
                    );
                    Ok(centroid)
                }
                None => Err(CentreUpError::MissingData(format!(
                    "failed retrieving {camera} centroid: {e}"
                ))),
            },
        }
    }
}
