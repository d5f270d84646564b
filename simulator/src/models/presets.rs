//! Named component presets
//!
//! Presets follow the widely used PySM naming: `s` synchrotron, `d` thermal
//! dust, `f` free-free. All templates are published in `uK_RJ` on the
//! galactic frame.

use once_cell::sync::Lazy;
use shared::healpix::Nside;
use uom::si::f64::Frequency;

use super::template::{load_amplitude, TemplateSource};
use super::{Model, ModelError, ModifiedBlackBody, PowerLaw};
use crate::data::TemplateStore;
use crate::units::FrequencyExt;

/// Parameters of one emission component, before templates are loaded
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentParams {
    PowerLaw {
        map_i: String,
        /// Q and U templates; `None` for unpolarized components
        map_qu: Option<(String, String)>,
        freq_ref_i_ghz: f64,
        freq_ref_p_ghz: f64,
        index: TemplateSource,
    },
    ModifiedBlackBody {
        map_i: String,
        map_q: String,
        map_u: String,
        freq_ref_i_ghz: f64,
        freq_ref_p_ghz: f64,
        index: TemplateSource,
        temperature: TemplateSource,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Preset {
    pub name: &'static str,
    pub description: &'static str,
    pub params: ComponentParams,
}

fn synchrotron(index: TemplateSource) -> ComponentParams {
    ComponentParams::PowerLaw {
        map_i: "pysm_2/synch_t_new.fits".to_string(),
        map_qu: Some((
            "pysm_2/synch_q_new.fits".to_string(),
            "pysm_2/synch_u_new.fits".to_string(),
        )),
        freq_ref_i_ghz: 23.0,
        freq_ref_p_ghz: 23.0,
        index,
    }
}

fn thermal_dust(index: TemplateSource, temperature: TemplateSource) -> ComponentParams {
    ComponentParams::ModifiedBlackBody {
        map_i: "pysm_2/dust_t_new.fits".to_string(),
        map_q: "pysm_2/dust_q_new.fits".to_string(),
        map_u: "pysm_2/dust_u_new.fits".to_string(),
        freq_ref_i_ghz: 545.0,
        freq_ref_p_ghz: 353.0,
        index,
        temperature,
    }
}

static PRESETS: Lazy<Vec<Preset>> = Lazy::new(|| {
    vec![
        Preset {
            name: "s0",
            description: "Synchrotron, power law with uniform index -3",
            params: synchrotron(TemplateSource::Constant(-3.0)),
        },
        Preset {
            name: "s1",
            description: "Synchrotron, power law with spatially varying index",
            params: synchrotron(TemplateSource::file("pysm_2/synch_beta.fits")),
        },
        Preset {
            name: "d0",
            description: "Thermal dust, modified blackbody with beta 1.54 and T 20 K",
            params: thermal_dust(TemplateSource::Constant(1.54), TemplateSource::Constant(20.0)),
        },
        Preset {
            name: "d1",
            description: "Thermal dust, modified blackbody with spatially varying beta and T",
            params: thermal_dust(
                TemplateSource::file("pysm_2/dust_beta.fits"),
                TemplateSource::file("pysm_2/dust_temp.fits"),
            ),
        },
        Preset {
            name: "f1",
            description: "Free-free, unpolarized power law with index -2.14",
            params: ComponentParams::PowerLaw {
                map_i: "pysm_2/ff_t_new.fits".to_string(),
                map_qu: None,
                freq_ref_i_ghz: 30.0,
                freq_ref_p_ghz: 30.0,
                index: TemplateSource::Constant(-2.14),
            },
        },
    ]
});

/// Look up a preset by name (case-insensitive)
pub fn preset(name: &str) -> Result<&'static Preset, ModelError> {
    let wanted = name.trim().to_ascii_lowercase();
    PRESETS
        .iter()
        .find(|p| p.name == wanted)
        .ok_or_else(|| ModelError::UnknownPreset {
            name: name.to_string(),
            known: preset_names().join(", "),
        })
}

pub fn preset_names() -> Vec<&'static str> {
    PRESETS.iter().map(|p| p.name).collect()
}

impl Preset {
    /// Every template file this preset reads
    pub fn templates(&self) -> Vec<&str> {
        let mut names = Vec::new();
        match &self.params {
            ComponentParams::PowerLaw {
                map_i,
                map_qu,
                index,
                ..
            } => {
                names.push(map_i.as_str());
                if let Some((q, u)) = map_qu {
                    names.push(q.as_str());
                    names.push(u.as_str());
                }
                if let TemplateSource::File(f) = index {
                    names.push(f.as_str());
                }
            }
            ComponentParams::ModifiedBlackBody {
                map_i,
                map_q,
                map_u,
                index,
                temperature,
                ..
            } => {
                names.extend([map_i.as_str(), map_q.as_str(), map_u.as_str()]);
                for source in [index, temperature] {
                    if let TemplateSource::File(f) = source {
                        names.push(f.as_str());
                    }
                }
            }
        }
        names
    }

    /// Load the templates at `nside` and build the component
    pub fn build(&self, nside: Nside, store: &TemplateStore) -> Result<Box<dyn Model>, ModelError> {
        log::debug!("Building preset {} at nside {nside}", self.name);
        match &self.params {
            ComponentParams::PowerLaw {
                map_i,
                map_qu,
                freq_ref_i_ghz,
                freq_ref_p_ghz,
                index,
            } => {
                let freq_ref_i = Frequency::from_ghz(*freq_ref_i_ghz);
                let freq_ref_p = Frequency::from_ghz(*freq_ref_p_ghz);
                let i_ref = load_amplitude(store, map_i, nside, freq_ref_i)?;
                let pol_ref = match map_qu {
                    Some((q, u)) => Some((
                        load_amplitude(store, q, nside, freq_ref_p)?,
                        load_amplitude(store, u, nside, freq_ref_p)?,
                    )),
                    None => None,
                };
                let index = index.resolve(store, nside)?;
                Ok(Box::new(PowerLaw::new(
                    self.name, nside, i_ref, pol_ref, freq_ref_i, freq_ref_p, index,
                )?))
            }
            ComponentParams::ModifiedBlackBody {
                map_i,
                map_q,
                map_u,
                freq_ref_i_ghz,
                freq_ref_p_ghz,
                index,
                temperature,
            } => {
                let freq_ref_i = Frequency::from_ghz(*freq_ref_i_ghz);
                let freq_ref_p = Frequency::from_ghz(*freq_ref_p_ghz);
                Ok(Box::new(ModifiedBlackBody::new(
                    self.name,
                    nside,
                    load_amplitude(store, map_i, nside, freq_ref_i)?,
                    load_amplitude(store, map_q, nside, freq_ref_p)?,
                    load_amplitude(store, map_u, nside, freq_ref_p)?,
                    freq_ref_i,
                    freq_ref_p,
                    index.resolve(store, nside)?,
                    temperature.resolve(store, nside)?,
                )?))
            }
        }
    }
}
