//! Sky model: a fixed set of emission components at one resolution

use shared::healpix::Nside;
use shared::CoordSystem;
use uom::si::f64::Frequency;

use crate::data::TemplateStore;
use crate::models::{preset, Model, ModelError};
use crate::sky_map::SkyMap;
use crate::units::{BrightnessUnit, FrequencyExt};

/// Immutable collection of emission components
pub struct Sky {
    nside: Nside,
    components: Vec<Box<dyn Model>>,
}

impl Sky {
    pub fn new(nside: Nside, components: Vec<Box<dyn Model>>) -> Result<Self, ModelError> {
        if components.is_empty() {
            return Err(ModelError::NoComponents);
        }
        if let Some(other) = components.iter().find(|c| c.nside() != nside) {
            return Err(ModelError::InvalidParameter(format!(
                "component {} has nside {}, sky has nside {nside}",
                other.name(),
                other.nside()
            )));
        }
        Ok(Self { nside, components })
    }

    /// Build one component per preset name
    pub fn from_presets<S: AsRef<str>>(
        nside: Nside,
        presets: &[S],
        store: &TemplateStore,
    ) -> Result<Self, ModelError> {
        let components = presets
            .iter()
            .map(|name| preset(name.as_ref())?.build(nside, store))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(nside, components)
    }

    pub fn nside(&self) -> Nside {
        self.nside
    }

    pub fn component_names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.name()).collect()
    }

    /// Total emission at `freq` in `uK_RJ`, galactic frame
    pub fn get_emission(&self, freq: Frequency) -> Result<SkyMap, ModelError> {
        let mut total = SkyMap::zeros(self.nside, BrightnessUnit::MicroKRj, CoordSystem::Galactic);
        for component in &self.components {
            log::debug!(
                "Evaluating {} at {:.3} GHz",
                component.name(),
                freq.as_ghz()
            );
            total.add_assign(&component.get_emission(freq)?)?;
        }
        Ok(total)
    }
}

impl std::fmt::Debug for Sky {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sky")
            .field("nside", &self.nside)
            .field("components", &self.component_names())
            .finish()
    }
}
