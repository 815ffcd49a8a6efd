//! Least-squares solvers for the damped Gauss-Newton step.
//!
//! Each inversion iteration solves
//!
//! ```text
//! minimize ‖J δ + r‖² + λ ‖D δ‖²
//! ```
//!
//! which is the same as the ordinary least-squares problem on the stacked system
//! `[J; sqrt(λ) D] δ = [-r; 0]`. Solving the stacked system by SVD avoids forming
//! `JᵀJ` (squaring the condition number) and tolerates rank-deficient Jacobians,
//! e.g. a parameter with no influence on the spectrum.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Levenberg–Marquardt step for residuals `r` with Jacobian `j = ∂r/∂x`.
///
/// `scale` holds the diagonal of `D`; its length must equal `j.ncols()`.
pub fn solve_damped(j: &DMatrix<f64>, r: &DVector<f64>, lambda: f64, scale: &[f64]) -> Option<DVector<f64>> {
    let (n, m) = j.shape();
    let root = lambda.sqrt();

    let mut a = DMatrix::zeros(n + m, m);
    a.rows_mut(0, n).copy_from(j);
    for (k, d) in scale.iter().enumerate().take(m) {
        a[(n + k, k)] = root * d;
    }

    let mut b = DVector::zeros(n + m);
    b.rows_mut(0, n).copy_from(&(-r));

    solve_least_squares(&a, &b)
}

/// Marquardt scaling: `D_k = sqrt(max(‖J_k‖², floor))`.
pub fn column_scale(j: &DMatrix<f64>) -> Vec<f64> {
    j.column_iter()
        .map(|c| c.norm_squared().max(1e-12).sqrt())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn damping_shrinks_the_step() {
        // r(x) = J x - y at x = 0, so r = -y and the undamped step is the LS solution.
        let j = DMatrix::from_row_slice(3, 1, &[1.0, 2.0, 3.0]);
        let r = DVector::from_row_slice(&[-1.0, -2.0, -3.0]);
        let scale = column_scale(&j);

        let free = solve_damped(&j, &r, 0.0, &scale).unwrap();
        assert!((free[0] - 1.0).abs() < 1e-10);

        let damped = solve_damped(&j, &r, 1.0, &scale).unwrap();
        assert!(damped[0] > 0.0 && damped[0] < free[0]);
        // With D = ‖J‖ and λ = 1 the step is exactly halved.
        assert!((damped[0] - 0.5).abs() < 1e-10);
    }

    #[test]
    fn zero_column_gets_zero_step() {
        let j = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 1.0, 0.0]);
        let r = DVector::from_row_slice(&[-2.0, -2.0]);
        let step = solve_damped(&j, &r, 1e-3, &column_scale(&j)).unwrap();
        assert!(step[1].abs() < 1e-6);
        assert!(step[0] > 1.9);
    }
}
