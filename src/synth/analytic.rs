//! Analytic weak-field slab oracle.
//!
//! Each atmosphere is a constant-property slab on top of the incoming light:
//!
//! ```text
//! I = I_in · exp(-κ/μ) + S · (1 - exp(-κ/μ))
//! ```
//!
//! Polarization follows the weak-field approximation applied to the emergent
//! intensity:
//!
//! ```text
//! V = -C λ0² g Bz ∂I/∂λ
//! Q = -¼ C² λ0⁴ g² (Bx² - By²) ∂²I/∂λ²
//! U = -¼ C² λ0⁴ g² (2 Bx By)  ∂²I/∂λ²
//! ```
//!
//! with `C = 4.6686e-13 Å⁻¹ G⁻¹`. Incoming polarization is attenuated by the slab.
//! Finally the filling factor mixes the slab output with the incoming light:
//! `out = ff · slab + (1 - ff) · in`.
//!
//! Chromospheric slabs use `S = beta · DILUTION · I_in`, photospheric slabs a
//! constant `S = source`.
//!
//! Parametric atmospheres are multiplicative systematics (telluric lines,
//! straylight dips): `out = in · (1 - depth · φ)`.

use crate::domain::{AtmosphereKind, StokesProfile};
use crate::error::SynthesisError;
use crate::math::{C_LIGHT, doppler_shift, gradient, pseudo_voigt};
use crate::model::AtmosphereRef;
use crate::synth::oracle::{SynthesisContext, SynthesisOracle};

/// Zeeman splitting constant `e / (4π m c²)` in Å⁻¹ G⁻¹.
pub const ZEEMAN_C: f64 = 4.6686e-13;

/// Chromospheric source function relative to the incoming intensity, before `beta`.
pub const DILUTION: f64 = 0.5;

#[derive(Debug, Clone, Copy, Default)]
pub struct AnalyticOracle;

impl SynthesisOracle for AnalyticOracle {
    fn synthesize(
        &self,
        atmosphere: &AtmosphereRef<'_>,
        context: &SynthesisContext<'_>,
    ) -> Result<StokesProfile, SynthesisError> {
        let p = Params::new(atmosphere);
        if let Some(i) = atmosphere.values.iter().position(|v| !v.is_finite()) {
            let name = atmosphere.atmosphere.parameters.get(i).map(|p| p.name.as_str()).unwrap_or("?");
            return Err(p.non_physical(name, atmosphere.values[i]));
        }
        if !(context.mu > 0.0 && context.mu <= 1.0) {
            return Err(p.non_physical("mu", context.mu));
        }

        let slab = match atmosphere.kind() {
            AtmosphereKind::Photosphere => photosphere(&p, context)?,
            AtmosphereKind::Chromosphere => chromosphere(&p, context)?,
            AtmosphereKind::Parametric => parametric(&p, context)?,
        };

        let ff = p.get("ff");
        if !(0.0..=1.0).contains(&ff) {
            return Err(p.non_physical("ff", ff));
        }
        let mut out = slab;
        for (dst, src) in out.components_mut().into_iter().zip(context.incoming.components()) {
            for (d, s) in dst.iter_mut().zip(src) {
                *d = ff * *d + (1.0 - ff) * s;
            }
        }

        if !out.is_finite() {
            return Err(SynthesisError::NumericalDivergence {
                atmosphere: p.name.to_string(),
                detail: "non-finite emergent spectrum".to_string(),
                values: p.values.to_vec(),
            });
        }
        Ok(out)
    }
}

/// Name-based parameter access with error tagging.
struct Params<'a> {
    name: &'a str,
    atmosphere: &'a AtmosphereRef<'a>,
    values: &'a [f64],
}

impl<'a> Params<'a> {
    fn new(atmosphere: &'a AtmosphereRef<'a>) -> Self {
        Self {
            name: atmosphere.name(),
            atmosphere,
            values: atmosphere.values,
        }
    }

    /// Missing parameters read as zero; the layout is fixed per kind.
    fn get(&self, name: &str) -> f64 {
        self.atmosphere.get(name).unwrap_or(0.0)
    }

    fn non_physical(&self, parameter: &str, value: f64) -> SynthesisError {
        SynthesisError::NonPhysical {
            atmosphere: self.name.to_string(),
            parameter: parameter.to_string(),
            value,
            values: self.values.to_vec(),
        }
    }

    fn positive(&self, name: &str) -> Result<f64, SynthesisError> {
        let v = self.get(name);
        if v > 0.0 { Ok(v) } else { Err(self.non_physical(name, v)) }
    }

    fn non_negative(&self, name: &str) -> Result<f64, SynthesisError> {
        let v = self.get(name);
        if v >= 0.0 { Ok(v) } else { Err(self.non_physical(name, v)) }
    }

    fn fraction(&self, name: &str) -> Result<f64, SynthesisError> {
        let v = self.get(name);
        if (0.0..=1.0).contains(&v) { Ok(v) } else { Err(self.non_physical(name, v)) }
    }
}

fn photosphere(p: &Params<'_>, ctx: &SynthesisContext<'_>) -> Result<StokesProfile, SynthesisError> {
    let eta0 = p.non_negative("eta0")?;
    let width = p.positive("width")?;
    let source = p.non_negative("source")?;
    let center = doppler_shift(ctx.line.center, p.get("v"));

    let opacity: Vec<f64> = ctx
        .wavelengths
        .iter()
        .map(|&l| eta0 * pseudo_voigt((l - center) / width, 0.0))
        .collect();
    let source = vec![source; ctx.wavelengths.len()];
    Ok(slab(p, ctx, &opacity, &source))
}

fn chromosphere(p: &Params<'_>, ctx: &SynthesisContext<'_>) -> Result<StokesProfile, SynthesisError> {
    let tau = p.non_negative("tau")?;
    let deltav = p.positive("deltav")?;
    let beta = p.non_negative("beta")?;
    let a = p.fraction("a")?;
    let center = doppler_shift(ctx.line.center, p.get("v"));
    let doppler_width = ctx.line.center * deltav / C_LIGHT;

    let opacity: Vec<f64> = ctx
        .wavelengths
        .iter()
        .map(|&l| tau * pseudo_voigt((l - center) / doppler_width, a))
        .collect();
    let source: Vec<f64> = ctx.incoming.i.iter().map(|i| beta * DILUTION * i).collect();
    Ok(slab(p, ctx, &opacity, &source))
}

fn parametric(p: &Params<'_>, ctx: &SynthesisContext<'_>) -> Result<StokesProfile, SynthesisError> {
    let sigma = p.positive("sigma")?;
    let a = p.fraction("a")?;
    let depth = p.get("depth");
    let center = p.get("lambda0");

    let factor: Vec<f64> = ctx
        .wavelengths
        .iter()
        .map(|&l| 1.0 - depth * pseudo_voigt((l - center) / sigma, a))
        .collect();

    let mut out = ctx.incoming.clone();
    for component in out.components_mut() {
        for (x, f) in component.iter_mut().zip(&factor) {
            *x *= f;
        }
    }
    Ok(out)
}

/// Constant-property slab with weak-field polarization.
fn slab(p: &Params<'_>, ctx: &SynthesisContext<'_>, opacity: &[f64], source: &[f64]) -> StokesProfile {
    let incoming = ctx.incoming;
    let attenuation: Vec<f64> = opacity.iter().map(|k| (-k / ctx.mu).exp()).collect();

    let i: Vec<f64> = incoming
        .i
        .iter()
        .zip(&attenuation)
        .zip(source)
        .map(|((i_in, att), s)| i_in * att + s * (1.0 - att))
        .collect();

    let di = gradient(ctx.wavelengths, &i);
    let d2i = gradient(ctx.wavelengths, &di);

    let (bx, by, bz) = (p.get("Bx"), p.get("By"), p.get("Bz"));
    let lambda0 = ctx.line.center;
    let g = ctx.line.lande;
    let cv = -ZEEMAN_C * lambda0 * lambda0 * g * bz;
    let cl = -0.25 * (ZEEMAN_C * lambda0 * lambda0 * g).powi(2);
    let cq = cl * (bx * bx - by * by);
    let cu = cl * 2.0 * bx * by;

    let n = i.len();
    let mut q = Vec::with_capacity(n);
    let mut u = Vec::with_capacity(n);
    let mut v = Vec::with_capacity(n);
    for k in 0..n {
        let att = attenuation[k];
        q.push(incoming.q[k] * att + cq * d2i[k]);
        u.push(incoming.u[k] * att + cu * d2i[k]);
        v.push(incoming.v[k] * att + cv * di[k]);
    }

    StokesProfile { i, q, u, v }
}
