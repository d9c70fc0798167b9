//! Sky offsets from acquisition-camera centroids.
//!
//! Pixel displacements from the frame centre are scaled to arcseconds on the
//! sky and rotated into (RA, Dec) according to how each camera is mounted.
//! The on-axis camera gives the translation; the off-axis camera, whose
//! nominal position on the focal plane is known from the plate catalog, gives
//! the field rotation once that translation has been removed.

use acq_math::{
    DivergencePolicy, FitError, FitOptions, GeometricModel, ModelFit, TransRotScaleModel,
};
use hardware::tcc::OffsetRequest;
use nalgebra::Vector2;
use shared::{
    AcquisitionConfig, CameraOrientation, CameraSettings, Centroid, FocalPosition, ImageSize,
    TelescopeSettings,
};
use tracing::debug;

const ARCSEC_PER_DEG: f64 = 3600.0;

/// Fixed optical geometry of the two acquisition cameras.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldGeometry {
    frame: ImageSize,
    arcsec_per_pixel: f64,
    arcsec_per_mm: f64,
    on_orientation: CameraOrientation,
    off_orientation: CameraOrientation,
}

impl FieldGeometry {
    pub fn new(cameras: &CameraSettings, telescope: &TelescopeSettings) -> Self {
        Self {
            frame: cameras.frame,
            arcsec_per_pixel: cameras.pixel_size_um * 1.0e-3 * telescope.focal_scale_arcsec_per_mm,
            arcsec_per_mm: ARCSEC_PER_DEG / telescope.plate_scale_mm_per_deg,
            on_orientation: cameras.on_orientation,
            off_orientation: cameras.off_orientation,
        }
    }

    pub fn from_config(config: &AcquisitionConfig) -> Self {
        Self::new(&config.cameras, &config.telescope)
    }

    pub fn arcsec_per_pixel(&self) -> f64 {
        self.arcsec_per_pixel
    }

    /// Centroid displacement from the frame centre as (RA, Dec) arcsec.
    pub fn sky_offset(&self, centroid: &Centroid, orientation: CameraOrientation) -> Vector2<f64> {
        let (cx, cy) = self.frame.centre();
        let dx = (centroid.x - cx) * self.arcsec_per_pixel;
        let dy = (centroid.y - cy) * self.arcsec_per_pixel;
        let (ra, dec) = orientation.to_sky(dx, dy);
        Vector2::new(ra, dec)
    }

    /// Translation (RA, Dec) in arcsec that centres the on-axis star.
    pub fn translation_offset(&self, on_axis: &Centroid) -> Vector2<f64> {
        self.sky_offset(on_axis, self.on_orientation)
    }

    /// Rotation in arcsec about the field centre that brings the off-axis
    /// star onto its hole, after `translation` has been applied.
    ///
    /// Positive values rotate counter-clockwise in (RA, Dec).
    pub fn rotation_offset(
        &self,
        off_axis_hole: FocalPosition,
        off_axis: &Centroid,
        translation: &Vector2<f64>,
    ) -> f64 {
        let hole = Vector2::new(off_axis_hole.x_focal, off_axis_hole.y_focal) * self.arcsec_per_mm;
        let star = hole + self.sky_offset(off_axis, self.off_orientation);

        let shift = TransRotScaleModel::from_trans_rot_scale(-translation, 0.0, 1.0);
        let corrected = shift.apply(&star);

        // Signed angle between the two directions, free of atan2 wrap-around.
        let cross = hole.x * corrected.y - hole.y * corrected.x;
        let angle = cross.atan2(hole.dot(&corrected));
        debug!(
            "Off-axis hole {:.2?} arcsec, corrected star {:.2?} arcsec, rotation {:.3e} rad",
            hole, corrected, angle
        );
        angle.to_degrees() * ARCSEC_PER_DEG
    }
}

/// Correction fitted to several matched star positions.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCorrection {
    pub offset: OffsetRequest,
    /// Fitted plate-scale factor (1 = nominal)
    pub scale: f64,
    /// RMS residual of the fit in arcsec
    pub rms_arcsec: f64,
}

/// Fit a translation/rotation/scale to matched sky positions (arcsec) and
/// express it as a guide offset, using the same sign conventions as
/// [`FieldGeometry::translation_offset`] and [`FieldGeometry::rotation_offset`].
pub fn fit_field_correction(
    nominal: &[Vector2<f64>],
    measured: &[Vector2<f64>],
) -> Result<FieldCorrection, FitError> {
    let options = FitOptions {
        on_divergence: DivergencePolicy::Raise,
        ..Default::default()
    };
    let fit = ModelFit::new(&TransRotScaleModel::default(), measured, nominal, &options)?;
    let rms_arcsec = fit.rms_radial_error();
    let (translation, rotation_deg, scale) = fit.into_model().trans_rot_scale();

    Ok(FieldCorrection {
        offset: OffsetRequest::translation(translation.x, translation.y)
            .with_rotation(rotation_deg * ARCSEC_PER_DEG),
        scale,
        rms_arcsec,
    })
}
