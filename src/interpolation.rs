//! Interpolating B-spline over a normalized abscissa.
//!
//! The abscissa is rescaled to `[0, 1]` across the sample range and the
//! curve degree is `min(samples - 1, 3)`, so two samples give a straight
//! line and four or more give a cubic spline. Knots are placed by
//! averaging the sample parameters and the control points come from a
//! collocation solve. Evaluation outside `[0, 1]` extends the first or
//! last polynomial piece.

use nalgebra::{DMatrix, DVector};

const MAX_DEGREE: usize = 3;

#[derive(Clone, Debug)]
pub struct SplineInterpolator {
    x_min: f64,
    x_max: f64,
    degree: usize,
    knots: Vec<f64>,
    ctrls: Vec<f64>,
}

impl SplineInterpolator {
    /// Fit through `(xs[i], ys[i])`. Samples are sorted by abscissa.
    ///
    /// Returns `None` for fewer than two samples, mismatched lengths,
    /// a zero-width abscissa range or a singular collocation system.
    pub fn fit(xs: &[f64], ys: &[f64]) -> Option<Self> {
        let n = xs.len();
        if n < 2 || ys.len() != n {
            return None;
        }

        let mut samples: Vec<(f64, f64)> = xs.iter().copied().zip(ys.iter().copied()).collect();
        samples.sort_by(|a, b| a.0.total_cmp(&b.0));

        let x_min = samples[0].0;
        let x_max = samples[n - 1].0;
        if x_max <= x_min || x_max.is_nan() || x_min.is_nan() {
            return None;
        }

        let params: Vec<f64> = samples.iter().map(|(x, _)| (x - x_min) / (x_max - x_min)).collect();
        let degree = (n - 1).min(MAX_DEGREE);
        let knots = knot_averaging(&params, degree);

        let mut a = DMatrix::<f64>::zeros(n, n);
        a[(0, 0)] = 1.0;
        a[(n - 1, n - 1)] = 1.0;
        for (i, &u) in params.iter().enumerate().take(n - 1).skip(1) {
            let span = find_span(u, degree, &knots);
            let basis = basis_functions(u, span, degree, &knots);
            for (k, value) in basis.iter().take(degree + 1).enumerate() {
                a[(i, span - degree + k)] = *value;
            }
        }

        let rhs = DVector::from_iterator(n, samples.iter().map(|(_, y)| *y));
        let ctrls = a.lu().solve(&rhs)?;

        Some(Self {
            x_min,
            x_max,
            degree,
            knots,
            ctrls: ctrls.iter().copied().collect(),
        })
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Evaluate at `x` (same units as the fitted abscissa).
    pub fn eval(&self, x: f64) -> f64 {
        let u = (x - self.x_min) / (self.x_max - self.x_min);
        let span = find_span(u, self.degree, &self.knots);
        let basis = basis_functions(u, span, self.degree, &self.knots);
        basis
            .iter()
            .take(self.degree + 1)
            .enumerate()
            .map(|(k, n)| n * self.ctrls[span - self.degree + k])
            .sum()
    }
}

/// Clamped knot vector: `degree + 1` zeros, averaged interior knots,
/// `degree + 1` ones.
fn knot_averaging(params: &[f64], degree: usize) -> Vec<f64> {
    let n = params.len();
    let mut knots = vec![0.0; n + degree + 1];
    for j in 1..n.saturating_sub(degree) {
        knots[j + degree] = params[j..j + degree].iter().sum::<f64>() / degree as f64;
    }
    let len = knots.len();
    for k in knots.iter_mut().skip(len - degree - 1) {
        *k = 1.0;
    }
    knots
}

/// Index of the knot span containing `u`, clamped to the first/last span.
fn find_span(u: f64, degree: usize, knots: &[f64]) -> usize {
    if u <= knots[0] {
        return degree;
    }
    let lo = degree.saturating_sub(1);
    let hi = knots.len() - degree - 1;
    let upper = (lo..hi).find(|&i| knots[i] > u).unwrap_or(hi);
    upper.saturating_sub(1).max(degree)
}

/// Non-zero basis functions `N[span-degree ..= span]` at `u` (Cox-de Boor).
fn basis_functions(u: f64, span: usize, degree: usize, knots: &[f64]) -> [f64; MAX_DEGREE + 1] {
    let mut left = [0.0; MAX_DEGREE + 1];
    let mut right = [0.0; MAX_DEGREE + 1];
    let mut n = [0.0; MAX_DEGREE + 1];
    n[0] = 1.0;

    for j in 1..=degree {
        left[j] = u - knots[span + 1 - j];
        right[j] = knots[span + j] - u;
        let mut saved = 0.0;
        for r in 0..j {
            let tmp = n[r] / (right[r + 1] + left[j - r]);
            n[r] = saved + right[r + 1] * tmp;
            saved = left[j - r] * tmp;
        }
        n[j] = saved;
    }
    n
}
