//! Nonlinear least-squares fitting of a [`GeometricModel`].
//!
//! Minimizes `Σ |measured - model.apply(nominal)|²` over both coordinates
//! using Levenberg-Marquardt with a forward-difference Jacobian.

use nalgebra::{DMatrix, DVector, Vector2};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{GeometricModel, ModelError};

/// Default budget of residual evaluations.
const DEFAULT_MAX_EVALUATIONS: usize = 5000;

/// Relative cost reduction / step size below which the fit has converged.
const DEFAULT_TOLERANCE: f64 = 1.0e-12;

const INITIAL_DAMPING: f64 = 1.0e-3;

/// Errors that can occur during model fitting
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    /// Measured and nominal position lists differ in length
    #[error("length mismatch: {measured} measured positions, {nominal} nominal positions")]
    LengthMismatch { measured: usize, nominal: usize },

    /// Not enough residuals to constrain every coefficient
    #[error("insufficient data: need at least {expected} coordinates, got {got}")]
    InsufficientData { expected: usize, got: usize },

    /// The least-squares iteration failed to converge
    #[error("fit failed to converge after {evaluations} evaluations")]
    Divergence { evaluations: usize },

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// What to do when the fit does not converge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DivergencePolicy {
    /// Return [`FitError::Divergence`].
    Raise,
    /// Keep going with every coefficient set to NaN.
    #[default]
    FillNan,
}

#[derive(Debug, Clone)]
pub struct FitOptions {
    pub max_evaluations: usize,
    pub tolerance: f64,
    pub on_divergence: DivergencePolicy,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_evaluations: DEFAULT_MAX_EVALUATIONS,
            tolerance: DEFAULT_TOLERANCE,
            on_divergence: DivergencePolicy::default(),
        }
    }
}

/// A model fitted to matched measured/nominal positions.
#[derive(Debug, Clone)]
pub struct ModelFit<M: GeometricModel> {
    model: M,
    measured: Vec<Vector2<f64>>,
    nominal: Vec<Vector2<f64>>,
    converged: bool,
    evaluations: usize,
}

impl<M: GeometricModel> ModelFit<M> {
    /// Fit `initial` so that `model.apply(nominal[i]) ≈ measured[i]`.
    ///
    /// The initial model's coefficients seed the iteration.
    ///
    /// # Errors
    /// * [`FitError::LengthMismatch`] / [`FitError::InsufficientData`] for bad input
    /// * [`FitError::Divergence`] if the fit fails and the policy is
    ///   [`DivergencePolicy::Raise`]
    pub fn new(
        initial: &M,
        measured: &[Vector2<f64>],
        nominal: &[Vector2<f64>],
        options: &FitOptions,
    ) -> Result<Self, FitError> {
        if measured.len() != nominal.len() {
            return Err(FitError::LengthMismatch {
                measured: measured.len(),
                nominal: nominal.len(),
            });
        }
        if 2 * measured.len() < M::NUM_COEFFS {
            return Err(FitError::InsufficientData {
                expected: M::NUM_COEFFS,
                got: 2 * measured.len(),
            });
        }

        let residuals = |coeffs: &[f64]| position_residuals::<M>(coeffs, measured, nominal);

        let (model, converged, evaluations) =
            match levenberg_marquardt(residuals, initial.coeffs(), options) {
                Ok(solution) => {
                    debug!(
                        "Fit converged after {} evaluations, cost {:.3e}",
                        solution.evaluations, solution.cost
                    );
                    let coeffs: Vec<f64> = solution.coeffs.iter().copied().collect();
                    (M::from_coeffs(&coeffs)?, true, solution.evaluations)
                }
                Err(FitError::Divergence { evaluations }) => match options.on_divergence {
                    DivergencePolicy::Raise => return Err(FitError::Divergence { evaluations }),
                    DivergencePolicy::FillNan => {
                        warn!("Fit did not converge after {evaluations} evaluations; coefficients set to NaN");
                        (M::from_coeffs(&vec![f64::NAN; M::NUM_COEFFS])?, false, evaluations)
                    }
                },
                Err(e) => return Err(e),
            };

        Ok(Self {
            model,
            measured: measured.to_vec(),
            nominal: nominal.to_vec(),
            converged,
            evaluations,
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    /// Nominal positions mapped through the fitted model.
    pub fn fit_positions(&self) -> Vec<Vector2<f64>> {
        self.model.apply_all(&self.nominal)
    }

    /// Residual position error: measured - fitted.
    pub fn position_errors(&self) -> Vec<Vector2<f64>> {
        self.measured
            .iter()
            .zip(self.fit_positions())
            .map(|(meas, fit)| meas - fit)
            .collect()
    }

    /// Residual radial errors: |measured - fitted|.
    pub fn radial_errors(&self) -> Vec<f64> {
        self.position_errors().iter().map(|e| e.norm()).collect()
    }

    pub fn rms_radial_error(&self) -> f64 {
        array_rms(&self.radial_errors())
    }
}

/// Root mean square of a slice; NaN when empty.
pub fn array_rms(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    (values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64).sqrt()
}

fn position_residuals<M: GeometricModel>(
    coeffs: &[f64],
    measured: &[Vector2<f64>],
    nominal: &[Vector2<f64>],
) -> DVector<f64> {
    let mut residuals = DVector::zeros(2 * measured.len());
    for (i, (meas, nom)) in measured.iter().zip(nominal).enumerate() {
        let err = meas - M::apply_with(coeffs, nom);
        residuals[2 * i] = err.x;
        residuals[2 * i + 1] = err.y;
    }
    residuals
}

struct Solution {
    coeffs: DVector<f64>,
    cost: f64,
    evaluations: usize,
}

/// Levenberg-Marquardt with Marquardt diagonal scaling.
fn levenberg_marquardt<F>(
    residual_fn: F,
    initial: &[f64],
    options: &FitOptions,
) -> Result<Solution, FitError>
where
    F: Fn(&[f64]) -> DVector<f64>,
{
    let tol = options.tolerance;
    let mut params = DVector::from_column_slice(initial);
    let mut residuals = residual_fn(params.as_slice());
    let mut cost = residuals.norm_squared();
    let mut evaluations = 1;
    let mut damping = INITIAL_DAMPING;

    if !cost.is_finite() {
        return Err(FitError::Divergence { evaluations });
    }

    loop {
        if cost == 0.0 {
            return Ok(Solution {
                coeffs: params,
                cost,
                evaluations,
            });
        }

        let jacobian = forward_difference_jacobian(&residual_fn, &params, &residuals);
        evaluations += params.len();

        let jtj = jacobian.transpose() * &jacobian;
        let gradient = jacobian.transpose() * &residuals;
        if gradient.amax() <= tol * cost.max(1.0) {
            return Ok(Solution {
                coeffs: params,
                cost,
                evaluations,
            });
        }
        let diag_floor = tol * jtj.diagonal().amax().max(f64::MIN_POSITIVE);

        loop {
            if evaluations >= options.max_evaluations {
                return Err(FitError::Divergence { evaluations });
            }

            let mut damped = jtj.clone();
            for i in 0..params.len() {
                damped[(i, i)] += damping * jtj[(i, i)].max(diag_floor);
            }
            let Some(step) = damped.cholesky().map(|ch| ch.solve(&(-&gradient))) else {
                damping *= 10.0;
                continue;
            };

            let candidate = &params + &step;
            let candidate_residuals = residual_fn(candidate.as_slice());
            evaluations += 1;
            let candidate_cost = candidate_residuals.norm_squared();
            let small_step = step.norm() <= tol * (params.norm() + tol);

            if candidate_cost.is_finite() && candidate_cost < cost {
                let reduction = (cost - candidate_cost) / cost;
                params = candidate;
                residuals = candidate_residuals;
                cost = candidate_cost;
                damping = (damping / 10.0).max(f64::EPSILON);

                if reduction <= tol || small_step {
                    return Ok(Solution {
                        coeffs: params,
                        cost,
                        evaluations,
                    });
                }
                break;
            }

            if small_step {
                // No downhill step left at any damping: at a minimum.
                return Ok(Solution {
                    coeffs: params,
                    cost,
                    evaluations,
                });
            }
            damping *= 10.0;
        }
    }
}

fn forward_difference_jacobian<F>(
    residual_fn: &F,
    params: &DVector<f64>,
    residuals: &DVector<f64>,
) -> DMatrix<f64>
where
    F: Fn(&[f64]) -> DVector<f64>,
{
    let mut jacobian = DMatrix::zeros(residuals.len(), params.len());
    let mut shifted = params.clone();

    for k in 0..params.len() {
        let h = f64::EPSILON.sqrt() * params[k].abs().max(1.0);
        shifted[k] = params[k] + h;
        let column = (residual_fn(shifted.as_slice()) - residuals) / h;
        jacobian.set_column(k, &column);
        shifted[k] = params[k];
    }

    jacobian
}
