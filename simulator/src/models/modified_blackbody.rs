//! Modified blackbody emission (thermal dust)

use rayon::prelude::*;
use shared::healpix::Nside;
use shared::CoordSystem;
use uom::si::f64::Frequency;

use super::template::SpectralParameter;
use super::{Model, ModelError};
use crate::sky_map::SkyMap;
use crate::units::{validate_frequency, BrightnessUnit, SI};

/// Ratio of Planck functions B_ν(T) / B_ν_ref(T)
pub fn blackbody_ratio(hz: f64, hz_ref: f64, temperature_k: f64) -> f64 {
    let h_over_kt = SI::PLANCK_CONSTANT / (SI::BOLTZMANN_CONSTANT * temperature_k);
    (hz / hz_ref).powi(3) * (hz_ref * h_over_kt).exp_m1() / (hz * h_over_kt).exp_m1()
}

/// Emission scaling as `A_ref · (ν/ν_ref)^(β−2) · B_ν(T) / B_ν_ref(T)`
///
/// The `β − 2` exponent accounts for amplitudes in Rayleigh-Jeans units.
#[derive(Debug, Clone)]
pub struct ModifiedBlackBody {
    name: String,
    nside: Nside,
    i_ref: Vec<f64>,
    q_ref: Vec<f64>,
    u_ref: Vec<f64>,
    freq_ref_i: Frequency,
    freq_ref_p: Frequency,
    index: SpectralParameter,
    temperature: SpectralParameter,
}

impl ModifiedBlackBody {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        nside: Nside,
        i_ref: Vec<f64>,
        q_ref: Vec<f64>,
        u_ref: Vec<f64>,
        freq_ref_i: Frequency,
        freq_ref_p: Frequency,
        index: SpectralParameter,
        temperature: SpectralParameter,
    ) -> Result<Self, ModelError> {
        for values in [&i_ref, &q_ref, &u_ref] {
            nside.check_len(values.len())?;
        }
        for param in [&index, &temperature] {
            if let SpectralParameter::Map(values) = param {
                nside.check_len(values.len())?;
            }
        }
        if let SpectralParameter::Constant(t) = temperature {
            if !(t.is_finite() && t > 0.0) {
                return Err(ModelError::InvalidParameter(format!(
                    "dust temperature must be positive, got {t} K"
                )));
            }
        }
        validate_frequency(freq_ref_i)?;
        validate_frequency(freq_ref_p)?;
        Ok(Self {
            name: name.to_string(),
            nside,
            i_ref,
            q_ref,
            u_ref,
            freq_ref_i,
            freq_ref_p,
            index,
            temperature,
        })
    }

    fn scale(&self, amplitude: &[f64], hz: f64, hz_ref: f64) -> Vec<f64> {
        amplitude
            .par_iter()
            .enumerate()
            .map(|(pix, &a)| {
                let beta = self.index.at(pix);
                let t = self.temperature.at(pix);
                a * (hz / hz_ref).powf(beta - 2.0) * blackbody_ratio(hz, hz_ref, t)
            })
            .collect()
    }
}

impl Model for ModifiedBlackBody {
    fn name(&self) -> &str {
        &self.name
    }

    fn nside(&self) -> Nside {
        self.nside
    }

    fn get_emission(&self, freq: Frequency) -> Result<SkyMap, ModelError> {
        let hz = validate_frequency(freq)?;
        let hz_ref_i = validate_frequency(self.freq_ref_i)?;
        let hz_ref_p = validate_frequency(self.freq_ref_p)?;

        let i = self.scale(&self.i_ref, hz, hz_ref_i);
        let q = self.scale(&self.q_ref, hz, hz_ref_p);
        let u = self.scale(&self.u_ref, hz, hz_ref_p);

        Ok(SkyMap::from_stokes(
            self.nside,
            &i,
            &q,
            &u,
            BrightnessUnit::MicroKRj,
            CoordSystem::Galactic,
        )?)
    }
}
