//! End-to-end map generation
//!
//! One run builds the sky model, evaluates it at a single frequency,
//! converts the map unit, rotates it into the output frame and writes the
//! HEALPix FITS file. Any failure aborts the run and is returned unchanged.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use shared::healpix::{HealpixError, Nside};
use shared::{CoordSystem, Rotator};
use thiserror::Error;
use uom::si::f64::Frequency;

use crate::data::{DataError, TemplateStore};
use crate::io::fits::{write_healpix_map, FitsError, PixelDtype, WriteOptions};
use crate::models::ModelError;
use crate::preview::{write_previews, PreviewError, DEFAULT_WIDTH};
use crate::sky::Sky;
use crate::sky_map::{SkyMapError, Stokes};
use crate::transform::{apply_coord_transform, TransformError};
use crate::units::{BrightnessUnit, FrequencyExt};

/// Directory the default output file is written to
pub const DEFAULT_OUTPUT_DIR: &str = "../input_maps";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration file: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Healpix(#[from] HealpixError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    SkyMap(#[from] SkyMapError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Fits(#[from] FitsError),

    #[error(transparent)]
    Preview(#[from] PreviewError),
}

/// Parameters of one map generation run
///
/// Every field has a default, so a configuration file only needs the
/// fields it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    pub nside: u32,
    pub presets: Vec<String>,
    pub frequency_ghz: f64,
    pub output_unit: BrightnessUnit,
    /// Frame the emission templates are defined in
    pub input_frame: CoordSystem,
    pub output_frame: CoordSystem,
    /// Defaults to `../input_maps/map_<freq>GHz.fits`
    pub output: Option<PathBuf>,
    pub overwrite: bool,
    pub dtype: PixelDtype,
    pub data_dir: Option<PathBuf>,
    pub offline: bool,
    pub preview: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            nside: 512,
            presets: vec!["s1".to_string()],
            frequency_ghz: 40.0,
            output_unit: BrightnessUnit::MicroKCmb,
            input_frame: CoordSystem::Galactic,
            output_frame: CoordSystem::Equatorial,
            output: None,
            overwrite: true,
            dtype: PixelDtype::F64,
            data_dir: None,
            offline: false,
            preview: false,
        }
    }
}

impl SimulationConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn frequency(&self) -> Frequency {
        Frequency::from_ghz(self.frequency_ghz)
    }

    /// Output path, derived from the frequency when not set explicitly
    pub fn output_path(&self) -> PathBuf {
        match &self.output {
            Some(path) => path.clone(),
            None => Path::new(DEFAULT_OUTPUT_DIR).join(format!("map_{}GHz.fits", self.frequency_ghz)),
        }
    }

    pub fn validate(&self) -> Result<Nside, PipelineError> {
        let nside = Nside::new(self.nside)?;
        if self.presets.is_empty() {
            return Err(PipelineError::Config("at least one preset is required".to_string()));
        }
        if !(self.frequency_ghz.is_finite() && self.frequency_ghz > 0.0) {
            return Err(PipelineError::Config(format!(
                "frequency must be positive, got {} GHz",
                self.frequency_ghz
            )));
        }
        Ok(nside)
    }
}

/// What a successful run produced
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub output: PathBuf,
    pub nside: Nside,
    pub values_written: usize,
    pub unit: BrightnessUnit,
    pub coord: CoordSystem,
    pub previews: Vec<PathBuf>,
}

/// Run with a template store built from the configuration
pub fn run(config: &SimulationConfig) -> Result<RunSummary, PipelineError> {
    let store = TemplateStore::new(config.data_dir.clone(), config.offline)?;
    run_with_store(config, &store)
}

pub fn run_with_store(
    config: &SimulationConfig,
    store: &TemplateStore,
) -> Result<RunSummary, PipelineError> {
    let nside = config.validate()?;
    let freq = config.frequency();
    let output = config.output_path();

    log::info!(
        "Building sky model: nside {nside}, presets [{}]",
        config.presets.join(", ")
    );
    let sky = Sky::from_presets(nside, &config.presets, store)?;

    log::info!("Computing emission at {} GHz", config.frequency_ghz);
    let mut map = sky.get_emission(freq)?;
    drop(sky);
    if config.input_frame != map.coord() {
        log::warn!(
            "Templates declared in frame {}, relabeling map",
            config.input_frame
        );
        map.set_coord(config.input_frame);
    }

    log::info!("Converting units {} -> {}", map.unit(), config.output_unit);
    map.convert_units(config.output_unit, freq)?;

    log::info!("Rotating {} -> {}", config.input_frame, config.output_frame);
    let rotator = Rotator::new(config.input_frame, config.output_frame);
    let map = apply_coord_transform(&map, &rotator)?;

    if let Some(stats) = map.row_stats(Stokes::I) {
        log::debug!(
            "I: min {:.4e}, max {:.4e}, mean {:.4e} {}",
            stats.min,
            stats.max,
            stats.mean,
            map.unit()
        );
    }

    log::info!("Writing {}", output.display());
    let options = WriteOptions::new(config.output_frame)
        .overwrite(config.overwrite)
        .dtype(config.dtype);
    write_healpix_map(&output, &map, &options)?;

    let previews = if config.preview {
        write_previews(&map, &output, DEFAULT_WIDTH)?
    } else {
        Vec::new()
    };

    Ok(RunSummary {
        output,
        nside,
        values_written: map.len_values(),
        unit: map.unit(),
        coord: config.output_frame,
        previews,
    })
}
