//! Line-profile shapes and grid derivatives.
//!
//! Profiles are peak-normalized (value 1 at line center):
//!
//! - Gaussian `exp(-u^2)`
//! - Lorentzian `1 / (1 + u^2)`
//! - pseudo-Voigt `(1 - a) * gauss(u) + a * lorentz(u)` with mixing `a ∈ [0, 1]`
//!
//! where `u = (λ - λc) / width`.

/// Speed of light (km/s).
pub const C_LIGHT: f64 = 299_792.458;

pub fn gaussian(u: f64) -> f64 {
    (-u * u).exp()
}

pub fn lorentzian(u: f64) -> f64 {
    1.0 / (1.0 + u * u)
}

pub fn pseudo_voigt(u: f64, a: f64) -> f64 {
    (1.0 - a) * gaussian(u) + a * lorentzian(u)
}

/// Line center shifted by a line-of-sight velocity (km/s, positive = redshift).
pub fn doppler_shift(center: f64, velocity: f64) -> f64 {
    center * (1.0 + velocity / C_LIGHT)
}

/// First derivative of samples `y(x)` on a strictly increasing grid.
///
/// Central differences inside, one-sided at the ends. A single-sample grid has
/// zero derivative.
pub fn gradient(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len().min(y.len());
    if n < 2 {
        return vec![0.0; n];
    }
    let mut out = Vec::with_capacity(n);
    out.push((y[1] - y[0]) / (x[1] - x[0]));
    for i in 1..n - 1 {
        out.push((y[i + 1] - y[i - 1]) / (x[i + 1] - x[i - 1]));
    }
    out.push((y[n - 1] - y[n - 2]) / (x[n - 1] - x[n - 2]));
    out
}
