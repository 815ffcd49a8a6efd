//! The synthesis oracle contract.

use crate::domain::StokesProfile;
use crate::error::SynthesisError;
use crate::model::{AtmosphereRef, SpectralLine};

/// Everything about the observation an oracle may depend on, apart from the
/// atmosphere's own parameters.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisContext<'a> {
    pub region: &'a str,
    pub wavelengths: &'a [f64],
    /// Stokes vector entering the atmosphere from below.
    pub incoming: &'a StokesProfile,
    pub line: SpectralLine,
    /// Cosine of the heliocentric angle, in `(0, 1]`.
    pub mu: f64,
}

/// Produces the emergent Stokes vector of one atmosphere.
///
/// Implementations must be deterministic and side-effect free: the inversion
/// engine calls them concurrently and relies on identical inputs giving
/// identical outputs. The returned profile must have one sample per wavelength.
pub trait SynthesisOracle: Send + Sync {
    fn synthesize(
        &self,
        atmosphere: &AtmosphereRef<'_>,
        context: &SynthesisContext<'_>,
    ) -> Result<StokesProfile, SynthesisError>;
}

impl<T: SynthesisOracle + ?Sized> SynthesisOracle for &T {
    fn synthesize(
        &self,
        atmosphere: &AtmosphereRef<'_>,
        context: &SynthesisContext<'_>,
    ) -> Result<StokesProfile, SynthesisError> {
        (**self).synthesize(atmosphere, context)
    }
}
