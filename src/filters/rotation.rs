//! Rotation averaging on the unit-quaternion manifold.
//!
//! [`RotationAverager`] is the closed-form chordal mean (Markley's
//! eigenvector method). [`RotationMedian`] refines that seed with a
//! Weiszfeld iteration toward the geometric median, which rejects
//! single-frame rotational glitches that would drag a mean.

use nalgebra::{Matrix4, SymmetricEigen, Vector3, Vector4};
use serde::{Deserialize, Serialize};

use crate::types::{canonical, Quat, UnitQuat, EPS_ANGLE};

/// Markley mean of a batch of quaternions.
pub struct RotationAverager;

impl RotationAverager {
    /// Eigenvector of `A = 1/M Σ q·qᵀ` with the largest eigenvalue.
    ///
    /// Samples are sign-flipped to `w ≥ 0` first. Returns `None` for an
    /// empty batch.
    pub fn average(samples: &[Quat]) -> Option<Quat> {
        if samples.is_empty() {
            return None;
        }

        let mut a = Matrix4::<f64>::zeros();
        for q in samples {
            let q = canonical(*q);
            let v = Vector4::new(q.w, q.i, q.j, q.k);
            a += v * v.transpose();
        }
        a /= samples.len() as f64;

        let eig = SymmetricEigen::new(a);
        let (best, _) = eig
            .eigenvalues
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |acc, (i, &value)| {
                if value > acc.1 {
                    (i, value)
                } else {
                    acc
                }
            });

        let v = eig.eigenvectors.column(best);
        Some(canonical(Quat::new(v[0], v[1], v[2], v[3]).normalize()))
    }
}

/// Outcome of one geometric-median solve.
#[derive(Clone, Copy, Debug)]
pub struct MedianSolution {
    pub rotation: Quat,
    pub iterations: usize,
    /// Norm of the last applied update [rad]
    pub last_update: f64,
}

/// Weiszfeld geometric median of rotations.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RotationMedian {
    /// Weighting exponent `p`: each increment is weighted by `1/θ^(2-p)`
    pub exponent: f64,
    /// Convergence threshold on the update angle [rad]
    pub max_angular_update: f64,
    pub max_iterations: usize,
}

impl Default for RotationMedian {
    fn default() -> Self {
        Self {
            exponent: 1.0,
            max_angular_update: 1e-4,
            max_iterations: 1000,
        }
    }
}

impl RotationMedian {
    pub fn new(exponent: f64, max_angular_update: f64, max_iterations: usize) -> Self {
        Self {
            exponent,
            max_angular_update,
            max_iterations,
        }
    }

    pub fn median(&self, samples: &[Quat]) -> Option<Quat> {
        self.solve(samples).map(|s| s.rotation)
    }

    /// Run the bounded Weiszfeld loop seeded by the Markley mean.
    ///
    /// Degenerate (zero-norm or non-finite) samples are ignored; `None` if
    /// nothing is left. The loop stops once the update is under the
    /// threshold and the distance still to go, projected from the ratio of
    /// the last two updates, is under half of it. It also stops when a
    /// majority of samples coincide with the estimate.
    pub fn solve(&self, samples: &[Quat]) -> Option<MedianSolution> {
        let units: Vec<UnitQuat> = samples
            .iter()
            .filter(|q| q.coords.iter().all(|c| c.is_finite()))
            .filter_map(|q| UnitQuat::try_new(*q, f64::EPSILON))
            .collect();
        let raw: Vec<Quat> = units.iter().map(|u| *u.quaternion()).collect();

        let seed = RotationAverager::average(&raw)?;
        let mut estimate = UnitQuat::new_normalize(seed);

        let threshold = self.max_angular_update.max(EPS_ANGLE);
        let mut theta = 10.0 * threshold;
        let mut prev_theta: Option<f64> = None;
        let mut iterations = 0;

        while iterations < self.max_iterations {
            let mut delta = Vector3::<f64>::zeros();
            let mut weight_sum = 0.0;
            let mut coincident = 0;

            for q in &units {
                // Shortest-arc offset of the sample from the estimate
                let offset = canonical((q * estimate.inverse()).into_inner());
                let vec_norm = offset.imag().norm();
                let angle = 2.0 * vec_norm.atan2(offset.w);
                if angle > EPS_ANGLE {
                    let axis_angle = offset.imag() * (angle / vec_norm);
                    let weight = 1.0 / angle.powf(2.0 - self.exponent);
                    delta += axis_angle * weight;
                    weight_sum += weight;
                } else {
                    coincident += 1;
                }
            }
            iterations += 1;

            if 2 * coincident > units.len() || weight_sum <= EPS_ANGLE {
                theta = 0.0;
                break;
            }

            delta /= weight_sum;
            theta = delta.norm();
            if theta <= EPS_ANGLE {
                break;
            }
            let step = UnitQuat::from_scaled_axis(delta);
            estimate = UnitQuat::new_unchecked(canonical((step * estimate).into_inner()));

            if let Some(prev) = prev_theta {
                let ratio = theta / prev;
                if theta <= threshold && ratio < 1.0 && theta * ratio / (1.0 - ratio) <= 0.5 * threshold {
                    break;
                }
            }
            prev_theta = Some(theta);
        }

        Some(MedianSolution {
            rotation: canonical(estimate.into_inner()),
            iterations,
            last_update: theta,
        })
    }
}
