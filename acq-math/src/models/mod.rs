//! Parametric 2D transform models.
//!
//! Models are immutable values. New coefficients always pass through
//! [`GeometricModel::from_coeffs`], which is where a model enforces its
//! normalization invariants.

mod quadrupole;
mod trans_rot_scale;

use nalgebra::Vector2;
use thiserror::Error;

pub use quadrupole::QuadrupoleModel;
pub use trans_rot_scale::TransRotScaleModel;

/// Errors constructing a model
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("expected {expected} coefficients, got {got}")]
    WrongArity { expected: usize, got: usize },
}

/// A function of 2D position controlled by a fixed number of coefficients.
pub trait GeometricModel: Clone + std::fmt::Debug + Sized {
    /// Number of coefficients the model is parameterized by.
    const NUM_COEFFS: usize;

    /// Current coefficients.
    fn coeffs(&self) -> &[f64];

    /// Build a model from raw coefficients, normalizing them if the model
    /// has a canonical form.
    fn from_coeffs(coeffs: &[f64]) -> Result<Self, ModelError>;

    /// Evaluate the transform for an arbitrary coefficient vector.
    ///
    /// `coeffs` must have `NUM_COEFFS` entries.
    fn apply_with(coeffs: &[f64], pos: &Vector2<f64>) -> Vector2<f64>;

    /// Coefficients of the inverse transform.
    fn inverse_coeffs(&self) -> Vec<f64>;

    fn apply(&self, pos: &Vector2<f64>) -> Vector2<f64> {
        Self::apply_with(self.coeffs(), pos)
    }

    fn apply_inverse(&self, pos: &Vector2<f64>) -> Vector2<f64> {
        Self::apply_with(&self.inverse_coeffs(), pos)
    }

    fn apply_all(&self, positions: &[Vector2<f64>]) -> Vec<Vector2<f64>> {
        positions.iter().map(|p| self.apply(p)).collect()
    }

    fn apply_inverse_all(&self, positions: &[Vector2<f64>]) -> Vec<Vector2<f64>> {
        let inverse = self.inverse_coeffs();
        positions
            .iter()
            .map(|p| Self::apply_with(&inverse, p))
            .collect()
    }
}

pub(crate) fn check_arity(expected: usize, coeffs: &[f64]) -> Result<(), ModelError> {
    if coeffs.len() != expected {
        return Err(ModelError::WrongArity {
            expected,
            got: coeffs.len(),
        });
    }
    Ok(())
}
