//! Quadrupole distortion.
//!
//! ```text
//! out = in * [1 + c0 * 1e-3 * cos(2 * (inAng - c1))]
//! ```
//!
//! where `c0` is the quadrupole magnitude scaled by 1e3 (keeps the fitter
//! well conditioned) and `c1` is the quadrupole angle in radians. The model
//! only rescales radially, so points at the origin are left unchanged.
//!
//! # Limitations
//!
//! The inverse is an approximation: it keeps the magnitude and rotates the
//! angle by π/2, which turns the correction factor `1 + m` into `1 - m`.
//! The round trip is off by a factor of `1 - m²`, so it is only usable for
//! small magnitudes. It is exact at zero magnitude.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use nalgebra::Vector2;

use super::{check_arity, GeometricModel, ModelError};

/// Scale between the stored magnitude coefficient and the dimensionless magnitude.
const MAGNITUDE_SCALE: f64 = 1.0e-3;

#[derive(Debug, Clone, PartialEq)]
pub struct QuadrupoleModel {
    coeffs: [f64; 2],
}

impl QuadrupoleModel {
    /// Build from a dimensionless magnitude and an angle in degrees.
    pub fn from_magnitude_angle(magnitude: f64, angle_deg: f64) -> Self {
        Self::normalized(magnitude / MAGNITUDE_SCALE, angle_deg.to_radians())
    }

    /// Dimensionless magnitude and angle in degrees.
    pub fn magnitude_angle(&self) -> (f64, f64) {
        (
            self.coeffs[0] * MAGNITUDE_SCALE,
            self.coeffs[1].to_degrees(),
        )
    }

    fn normalized(mut magnitude: f64, mut angle: f64) -> Self {
        if magnitude < 0.0 {
            magnitude = -magnitude;
            angle += FRAC_PI_2;
        }
        Self {
            coeffs: [magnitude, wrap_angle(angle)],
        }
    }
}

/// Wrap an angle into [-π/2, π/2]; the model is unchanged by a half turn.
fn wrap_angle(angle: f64) -> f64 {
    let mut wrapped = angle.rem_euclid(TAU);
    if wrapped > PI {
        wrapped -= PI;
    }
    if wrapped > FRAC_PI_2 {
        wrapped -= PI;
    }
    wrapped
}

impl Default for QuadrupoleModel {
    /// No quadrupole.
    fn default() -> Self {
        Self { coeffs: [0.0, 0.0] }
    }
}

impl GeometricModel for QuadrupoleModel {
    const NUM_COEFFS: usize = 2;

    fn coeffs(&self) -> &[f64] {
        &self.coeffs
    }

    /// Makes the magnitude non-negative and wraps the angle.
    fn from_coeffs(coeffs: &[f64]) -> Result<Self, ModelError> {
        check_arity(Self::NUM_COEFFS, coeffs)?;
        Ok(Self::normalized(coeffs[0], coeffs[1]))
    }

    fn apply_with(coeffs: &[f64], pos: &Vector2<f64>) -> Vector2<f64> {
        if pos.norm_squared() <= 0.0 {
            return *pos;
        }
        let in_angle = pos.y.atan2(pos.x);
        let correction = 1.0 + coeffs[0] * MAGNITUDE_SCALE * (2.0 * (in_angle - coeffs[1])).cos();
        pos * correction
    }

    /// Approximate inverse, see the module docs.
    fn inverse_coeffs(&self) -> Vec<f64> {
        vec![self.coeffs[0], wrap_angle(self.coeffs[1] + FRAC_PI_2)]
    }
}
