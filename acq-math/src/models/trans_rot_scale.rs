//! Translation, rotation and scale.
//!
//! ```text
//! out x  =  c0  +  in x * ( c3  c2)
//!     y     c1        y   (-c2  c3)
//! ```
//!
//! so translation = (c0, c1), rotation = atan2(c2, c3) and
//! scale = sqrt(c2² + c3²).

use nalgebra::{Matrix2, Vector2};

use super::{check_arity, GeometricModel, ModelError};

#[derive(Debug, Clone, PartialEq)]
pub struct TransRotScaleModel {
    coeffs: [f64; 4],
}

impl TransRotScaleModel {
    /// Build from a translation, a rotation in degrees and a scale factor.
    pub fn from_trans_rot_scale(translation: Vector2<f64>, rotation_deg: f64, scale: f64) -> Self {
        let angle = rotation_deg.to_radians();
        Self {
            coeffs: [
                translation.x,
                translation.y,
                scale * angle.sin(),
                scale * angle.cos(),
            ],
        }
    }

    /// Translation, rotation in degrees, and scale factor.
    pub fn trans_rot_scale(&self) -> (Vector2<f64>, f64, f64) {
        let [tx, ty, c2, c3] = self.coeffs;
        (
            Vector2::new(tx, ty),
            c2.atan2(c3).to_degrees(),
            (c2 * c2 + c3 * c3).sqrt(),
        )
    }

    fn transposed_matrix(c2: f64, c3: f64) -> Matrix2<f64> {
        Matrix2::new(c3, c2, -c2, c3)
    }
}

impl Default for TransRotScaleModel {
    /// No translation, no rotation, unit scale.
    fn default() -> Self {
        Self {
            coeffs: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl GeometricModel for TransRotScaleModel {
    const NUM_COEFFS: usize = 4;

    fn coeffs(&self) -> &[f64] {
        &self.coeffs
    }

    fn from_coeffs(coeffs: &[f64]) -> Result<Self, ModelError> {
        check_arity(Self::NUM_COEFFS, coeffs)?;
        Ok(Self {
            coeffs: [coeffs[0], coeffs[1], coeffs[2], coeffs[3]],
        })
    }

    fn apply_with(coeffs: &[f64], pos: &Vector2<f64>) -> Vector2<f64> {
        // Row-vector form: out = t + pos * R^T
        let rot_t = Self::transposed_matrix(coeffs[2], coeffs[3]);
        Vector2::new(coeffs[0], coeffs[1]) + (pos.transpose() * rot_t).transpose()
    }

    /// Closed-form inverse. Undefined (NaN) when c2 = c3 = 0.
    fn inverse_coeffs(&self) -> Vec<f64> {
        let [tx, ty, c2, c3] = self.coeffs;
        let mag_sq = c2 * c2 + c3 * c3;
        let inv_c2 = -c2 / mag_sq;
        let inv_c3 = c3 / mag_sq;
        let neg_inv_trans =
            (Vector2::new(tx, ty).transpose() * Self::transposed_matrix(inv_c2, inv_c3)).transpose();
        vec![-neg_inv_trans.x, -neg_inv_trans.y, inv_c2, inv_c3]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    const SQRT2: f64 = std::f64::consts::SQRT_2;

    #[test]
    fn test_default_is_identity() {
        let model = TransRotScaleModel::default();
        let p = Vector2::new(3.5, -1.25);
        assert_relative_eq!(model.apply(&p), p, epsilon = 1e-12);
        assert_relative_eq!(model.apply_inverse(&p), p, epsilon = 1e-12);
    }

    #[test]
    fn test_apply_known_values() {
        let trans = Vector2::new(-0.5, 0.3);
        let scale = 1.2;
        let model = TransRotScaleModel::from_trans_rot_scale(trans, 45.0, scale);

        let cases = [
            (
                Vector2::new(1.0, 0.0),
                Vector2::new(1.0 / SQRT2, 1.0 / SQRT2) * scale + trans,
            ),
            (
                Vector2::new(0.0, 1.0),
                Vector2::new(-1.0 / SQRT2, 1.0 / SQRT2) * scale + trans,
            ),
            (
                Vector2::new(-2.0, -2.0),
                Vector2::new(0.0, -SQRT2) * 2.0 * scale + trans,
            ),
        ];

        for (input, expected) in cases {
            assert_relative_eq!(model.apply(&input), expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_trans_rot_scale_accessor() {
        let model = TransRotScaleModel::from_trans_rot_scale(Vector2::new(11.9, -35.4), -90.0, 1.1);
        let (trans, rot, scale) = model.trans_rot_scale();
        assert_relative_eq!(trans, Vector2::new(11.9, -35.4));
        assert_relative_eq!(rot, -90.0, epsilon = 1e-10);
        assert_relative_eq!(scale, 1.1, epsilon = 1e-12);
    }

    #[test]
    fn test_inverse_roundtrip_grid() {
        let points = [
            Vector2::new(0.0, 0.0),
            Vector2::new(0.0, 1.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(1.0, 1.0),
        ];

        for trans in [(0.0, 0.0), (-0.5, 0.3), (11.9, -35.4)] {
            for rot in [90.0, -180.0, -179.0, -45.0, 0.0, 45.0, 180.0] {
                // Negative scale is a half-turn in disguise and must still invert.
                for scale in [-0.1, 0.9, 0.99999, 1.0, 1.0001, 10.0] {
                    let model = TransRotScaleModel::from_trans_rot_scale(
                        Vector2::new(trans.0, trans.1),
                        rot,
                        scale,
                    );
                    let forward = model.apply_all(&points);
                    let back = model.apply_inverse_all(&forward);
                    for (p, q) in points.iter().zip(&back) {
                        assert_relative_eq!(*p, *q, epsilon = 1e-9);
                    }
                }
            }
        }
    }

    #[test]
    fn test_inverse_roundtrip_random_coeffs() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        for _ in 0..500 {
            let coeffs: Vec<f64> = (0..4).map(|_| rng.random_range(-50.0..50.0)).collect();
            if coeffs[2].powi(2) + coeffs[3].powi(2) < 1e-6 {
                continue;
            }
            let model = TransRotScaleModel::from_coeffs(&coeffs).unwrap();
            let p = Vector2::new(rng.random_range(-100.0..100.0), rng.random_range(-100.0..100.0));

            let back = model.apply_inverse(&model.apply(&p));
            assert_relative_eq!(back, p, epsilon = 1e-6, max_relative = 1e-9);
        }
    }

    #[test]
    fn test_wrong_arity() {
        assert_eq!(
            TransRotScaleModel::from_coeffs(&[1.0, 2.0]),
            Err(ModelError::WrongArity {
                expected: 4,
                got: 2
            })
        );
    }
}
