//! Geometric transform models for acquisition-camera centering.
//!
//! Each model is a small, fixed-arity coefficient vector with a forward
//! transform and a closed-form (exact or approximate) inverse. [`ModelFit`]
//! adjusts a model's coefficients to matched point sets by nonlinear least
//! squares.

pub mod fit;
pub mod models;

pub use fit::{array_rms, DivergencePolicy, FitError, FitOptions, ModelFit};
pub use models::{GeometricModel, ModelError, QuadrupoleModel, TransRotScaleModel};
