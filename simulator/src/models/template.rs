//! Template maps and spectral parameters
//!
//! A template is a full-sky map read from a FITS file in the data store and
//! re-gridded to the resolution of the model that uses it. Spectral
//! parameters (indices, temperatures) are either a single constant or such a
//! template.

use shared::healpix::{ud_grade, Nside};
use uom::si::f64::Frequency;

use super::ModelError;
use crate::data::TemplateStore;
use crate::io::fits::read_healpix_map;
use crate::units::{conversion_factor, BrightnessUnit};

/// Where a model parameter comes from
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateSource {
    Constant(f64),
    /// Relative template name resolved through the [`TemplateStore`]
    File(String),
}

impl TemplateSource {
    pub fn file(name: &str) -> Self {
        TemplateSource::File(name.to_string())
    }

    /// Load the parameter at `nside`
    pub fn resolve(
        &self,
        store: &TemplateStore,
        nside: Nside,
    ) -> Result<SpectralParameter, ModelError> {
        match self {
            TemplateSource::Constant(value) => Ok(SpectralParameter::Constant(*value)),
            TemplateSource::File(name) => {
                let (values, _) = load_template(store, name, nside)?;
                Ok(SpectralParameter::Map(values))
            }
        }
    }
}

/// A resolved spectral parameter
#[derive(Debug, Clone, PartialEq)]
pub enum SpectralParameter {
    Constant(f64),
    Map(Vec<f64>),
}

impl SpectralParameter {
    #[inline]
    pub fn at(&self, pix: usize) -> f64 {
        match self {
            SpectralParameter::Constant(value) => *value,
            SpectralParameter::Map(values) => values[pix],
        }
    }
}

/// Read the first column of a template, re-gridded to `nside`
///
/// Returns the values together with the unit label recorded in the file,
/// if it names a known brightness unit.
pub fn load_template(
    store: &TemplateStore,
    name: &str,
    nside: Nside,
) -> Result<(Vec<f64>, Option<BrightnessUnit>), ModelError> {
    let path = store.resolve(name)?;
    let file = read_healpix_map(&path)?;
    let unit = file.unit();
    let native = file.nside;
    let column = file
        .columns
        .into_iter()
        .next()
        .ok_or_else(|| ModelError::EmptyTemplate(name.to_string()))?;

    let values = if native == nside {
        column.values
    } else {
        log::debug!("Template {name}: nside {native} -> {nside}");
        ud_grade(&column.values, native, nside)?
    };
    Ok((values, unit))
}

/// Load an amplitude template and express it in `uK_RJ` at `freq_ref`
///
/// Files without a recognized unit label are taken to be in `uK_RJ`.
pub fn load_amplitude(
    store: &TemplateStore,
    name: &str,
    nside: Nside,
    freq_ref: Frequency,
) -> Result<Vec<f64>, ModelError> {
    let (mut values, unit) = load_template(store, name, nside)?;
    if let Some(unit) = unit {
        let factor = conversion_factor(unit, BrightnessUnit::MicroKRj, freq_ref)?;
        if factor != 1.0 {
            log::debug!("Template {name}: scaling {unit} to uK_RJ by {factor:.6e}");
            values.iter_mut().for_each(|v| *v *= factor);
        }
    }
    Ok(values)
}
