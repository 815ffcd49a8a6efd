//! Synthetic observation noise.
//!
//! Noise is reproducible per pixel: the generator seed is derived from the run
//! seed and the pixel index, so a pixel gets the same noise no matter which
//! worker synthesized it or in which order.

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::StokesProfile;

pub fn noise_seed(seed: u64, pixel: usize) -> u64 {
    let mut hasher = DefaultHasher::new();
    "noise".hash(&mut hasher);
    seed.hash(&mut hasher);
    pixel.hash(&mut hasher);
    hasher.finish()
}

/// Add white Gaussian noise of standard deviation `sigma` to every sample.
///
/// Regions are visited in name order. Non-positive `sigma` leaves the spectra
/// untouched.
pub fn add_noise(spectra: &mut BTreeMap<String, StokesProfile>, sigma: f64, seed: u64, pixel: usize) {
    let Ok(normal) = Normal::new(0.0, sigma) else {
        return;
    };
    if sigma <= 0.0 {
        return;
    }
    let mut rng = StdRng::seed_from_u64(noise_seed(seed, pixel));
    for profile in spectra.values_mut() {
        for component in profile.components_mut() {
            for x in component.iter_mut() {
                *x += normal.sample(&mut rng);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectra() -> BTreeMap<String, StokesProfile> {
        let mut map = BTreeMap::new();
        map.insert("He".to_string(), StokesProfile::uniform(200, [1.0, 0.0, 0.0, 0.0]));
        map
    }

    #[test]
    fn noise_is_reproducible_per_pixel() {
        let mut a = spectra();
        let mut b = spectra();
        let mut c = spectra();
        add_noise(&mut a, 1e-3, 7, 3);
        add_noise(&mut b, 1e-3, 7, 3);
        add_noise(&mut c, 1e-3, 7, 4);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn noise_has_requested_scale() {
        let mut s = spectra();
        add_noise(&mut s, 1e-2, 1, 0);
        let q = &s["He"].q;
        let rms = (q.iter().map(|x| x * x).sum::<f64>() / q.len() as f64).sqrt();
        assert!(rms > 5e-3 && rms < 2e-2, "rms={rms}");
    }

    #[test]
    fn zero_sigma_is_a_no_op() {
        let mut s = spectra();
        add_noise(&mut s, 0.0, 1, 0);
        assert_eq!(s, spectra());
    }
}
