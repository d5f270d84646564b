//! Power-law emission (synchrotron, free-free)

use rayon::prelude::*;
use shared::healpix::Nside;
use shared::CoordSystem;
use uom::si::f64::Frequency;

use super::template::SpectralParameter;
use super::{Model, ModelError};
use crate::sky_map::SkyMap;
use crate::units::{validate_frequency, BrightnessUnit, FrequencyExt};

/// Emission scaling as `A_ref · (ν / ν_ref)^β` per pixel
///
/// Intensity and polarization may use different reference frequencies.
/// Components without polarization templates emit zero Q and U.
#[derive(Debug, Clone)]
pub struct PowerLaw {
    name: String,
    nside: Nside,
    i_ref: Vec<f64>,
    pol_ref: Option<(Vec<f64>, Vec<f64>)>,
    freq_ref_i: Frequency,
    freq_ref_p: Frequency,
    index: SpectralParameter,
}

impl PowerLaw {
    /// Templates must be in `uK_RJ` at their reference frequency and
    /// already gridded at `nside`.
    pub fn new(
        name: &str,
        nside: Nside,
        i_ref: Vec<f64>,
        pol_ref: Option<(Vec<f64>, Vec<f64>)>,
        freq_ref_i: Frequency,
        freq_ref_p: Frequency,
        index: SpectralParameter,
    ) -> Result<Self, ModelError> {
        nside.check_len(i_ref.len())?;
        if let Some((q, u)) = &pol_ref {
            nside.check_len(q.len())?;
            nside.check_len(u.len())?;
        }
        if let SpectralParameter::Map(values) = &index {
            nside.check_len(values.len())?;
        }
        validate_frequency(freq_ref_i)?;
        validate_frequency(freq_ref_p)?;
        Ok(Self {
            name: name.to_string(),
            nside,
            i_ref,
            pol_ref,
            freq_ref_i,
            freq_ref_p,
            index,
        })
    }

    fn scale(&self, amplitude: &[f64], ratio: f64) -> Vec<f64> {
        amplitude
            .par_iter()
            .enumerate()
            .map(|(pix, &a)| a * ratio.powf(self.index.at(pix)))
            .collect()
    }
}

impl Model for PowerLaw {
    fn name(&self) -> &str {
        &self.name
    }

    fn nside(&self) -> Nside {
        self.nside
    }

    fn get_emission(&self, freq: Frequency) -> Result<SkyMap, ModelError> {
        validate_frequency(freq)?;
        let ghz = freq.as_ghz();

        let i = self.scale(&self.i_ref, ghz / self.freq_ref_i.as_ghz());
        let (q, u) = match &self.pol_ref {
            Some((q_ref, u_ref)) => {
                let ratio = ghz / self.freq_ref_p.as_ghz();
                (self.scale(q_ref, ratio), self.scale(u_ref, ratio))
            }
            None => {
                let zeros = vec![0.0; self.nside.npix()];
                (zeros.clone(), zeros)
            }
        };

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sky_map::Stokes;
    use approx::assert_relative_eq;

    fn nside() -> Nside {
        Nside::new(2).unwrap()
    }

    fn uniform(value: f64) -> Vec<f64> {
        vec![value; nside().npix()]
    }

    #[test]
    fn test_reference_frequency_returns_template() {
        let model = PowerLaw::new(
            "sync",
            nside(),
            uniform(10.0),
            Some((uniform(2.0), uniform(-1.0))),
            Frequency::from_ghz(23.0),
            Frequency::from_ghz(23.0),
            SpectralParameter::Constant(-3.0),
        )
        .unwrap();
        let map = model.get_emission(Frequency::from_ghz(23.0)).unwrap();
        assert_eq!(map.unit(), BrightnessUnit::MicroKRj);
        assert_eq!(map.coord(), CoordSystem::Galactic);
        assert_relative_eq!(map.stokes(Stokes::I)[7], 10.0, epsilon = 1e-12);
        assert_relative_eq!(map.stokes(Stokes::U)[7], -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_scaling_with_constant_index() {
        let model = PowerLaw::new(
            "sync",
            nside(),
            uniform(10.0),
            Some((uniform(2.0), uniform(2.0))),
            Frequency::from_ghz(20.0),
            Frequency::from_ghz(10.0),
            SpectralParameter::Constant(-3.0),
        )
        .unwrap();
        let map = model.get_emission(Frequency::from_ghz(40.0)).unwrap();
        assert_relative_eq!(map.stokes(Stokes::I)[0], 10.0 / 8.0, epsilon = 1e-12);
        assert_relative_eq!(map.stokes(Stokes::Q)[0], 2.0 / 64.0, epsilon = 1e-12);
    }

    #[test]
    fn test_per_pixel_index() {
        let npix = nside().npix();
        let index: Vec<f64> = (0..npix).map(|p| if p % 2 == 0 { -2.0 } else { -3.0 }).collect();
        let model = PowerLaw::new(
            "sync",
            nside(),
            uniform(1.0),
            None,
            Frequency::from_ghz(10.0),
            Frequency::from_ghz(10.0),
            SpectralParameter::Map(index),
        )
        .unwrap();
        let map = model.get_emission(Frequency::from_ghz(20.0)).unwrap();
        assert_relative_eq!(map.stokes(Stokes::I)[0], 0.25, epsilon = 1e-12);
        assert_relative_eq!(map.stokes(Stokes::I)[1], 0.125, epsilon = 1e-12);
        assert!(map.stokes(Stokes::Q).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_rejects_bad_inputs() {
        let short = vec![1.0; 10];
        assert!(matches!(
            PowerLaw::new(
                "bad",
                nside(),
                short,
                None,
                Frequency::from_ghz(23.0),
                Frequency::from_ghz(23.0),
                SpectralParameter::Constant(-3.0),
            ),
            Err(ModelError::Healpix(_))
        ));

        let model = PowerLaw::new(
            "ok",
            nside(),
            uniform(1.0),
            None,
            Frequency::from_ghz(23.0),
            Frequency::from_ghz(23.0),
            SpectralParameter::Constant(-3.0),
        )
        .unwrap();
        assert!(matches!(
            model.get_emission(Frequency::from_ghz(0.0)),
            Err(ModelError::Unit(_))
        ));
    }
}
