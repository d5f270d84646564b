//! Sky emission models
//!
//! Every component produces a full-sky I/Q/U map in `uK_RJ` on the galactic
//! frame, evaluated at a single frequency. Components are normally built
//! from a named preset (see [`presets`]) and combined into a [`crate::sky::Sky`].

pub mod modified_blackbody;
pub mod power_law;
pub mod presets;
pub mod template;

use shared::healpix::{HealpixError, Nside};
use thiserror::Error;
use uom::si::f64::Frequency;

use crate::data::DataError;
use crate::io::fits::FitsError;
use crate::sky_map::{SkyMap, SkyMapError};
use crate::units::UnitError;

pub use modified_blackbody::ModifiedBlackBody;
pub use power_law::PowerLaw;
pub use presets::{preset, preset_names, ComponentParams, Preset};
pub use template::{SpectralParameter, TemplateSource};

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Unknown preset '{name}', available presets: {known}")]
    UnknownPreset { name: String, known: String },

    #[error("Sky has no emission components")]
    NoComponents,

    #[error("Template '{0}' contains no columns")]
    EmptyTemplate(String),

    #[error("Invalid model parameter: {0}")]
    InvalidParameter(String),

    #[error("Template data error: {0}")]
    Data(#[from] DataError),

    #[error("Template file error: {0}")]
    Fits(#[from] FitsError),

    #[error("HEALPix error: {0}")]
    Healpix(#[from] HealpixError),

    #[error("Unit error: {0}")]
    Unit(#[from] UnitError),

    #[error("Sky map error: {0}")]
    SkyMap(#[from] SkyMapError),
}

/// A single emission component
pub trait Model: Send + Sync {
    fn name(&self) -> &str;

    fn nside(&self) -> Nside;

    /// Emission at `freq` in `uK_RJ`, galactic frame
    fn get_emission(&self, freq: Frequency) -> Result<SkyMap, ModelError>;
}
