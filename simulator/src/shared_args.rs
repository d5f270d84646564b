use crate::io::fits::PixelDtype;
use crate::pipeline::{PipelineError, SimulationConfig};
use crate::units::{BrightnessUnit, FrequencyExt};
use clap::Parser;
use shared::CoordSystem;
use std::path::PathBuf;
use uom::si::f64::Frequency;

/// Parse frequency string with units (e.g., "40GHz", "40 GHz", "408MHz", "4e10Hz")
///
/// Bare numbers are taken as GHz.
pub fn parse_frequency(s: &str) -> Result<Frequency, String> {
    let lower = s.trim().to_ascii_lowercase();

    let (num_str, scale_to_hz) = if let Some(num) = lower.strip_suffix("ghz") {
        (num, 1e9)
    } else if let Some(num) = lower.strip_suffix("mhz") {
        (num, 1e6)
    } else if let Some(num) = lower.strip_suffix("khz") {
        (num, 1e3)
    } else if let Some(num) = lower.strip_suffix("hz") {
        (num, 1.0)
    } else {
        (lower.as_str(), 1e9)
    };

    let value: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid numeric value: {}", num_str.trim()))?;

    if !value.is_finite() || value <= 0.0 {
        return Err("Frequency must be positive".to_string());
    }

    Ok(Frequency::from_hz(value * scale_to_hz))
}

/// Wrapper for Frequency that parses units and has a nice Display
#[derive(Debug, Clone, Copy)]
pub struct FrequencyArg(pub Frequency);

impl std::str::FromStr for FrequencyArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_frequency(s).map(FrequencyArg)
    }
}

impl std::fmt::Display for FrequencyArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hz = self.0.as_hz();
        if hz >= 1e9 {
            write!(f, "{}GHz", hz / 1e9)
        } else {
            write!(f, "{}MHz", hz / 1e6)
        }
    }
}

/// Sky map generation arguments
///
/// Every option is optional: unset options keep the value from the
/// configuration file, or the built-in default when no file is given.
#[derive(Parser, Debug, Clone, Default)]
pub struct SkyArgs {
    /// JSON configuration file applied before the command line options
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// HEALPix resolution parameter, a power of two [default: 512]
    #[arg(long)]
    pub nside: Option<u32>,

    /// Emission component presets, repeatable or comma separated [default: s1]
    #[arg(long = "preset", value_delimiter = ',')]
    pub presets: Vec<String>,

    /// Observing frequency (e.g., "40GHz", "408MHz"; bare numbers are GHz) [default: 40GHz]
    #[arg(long)]
    pub frequency: Option<FrequencyArg>,

    /// Output map unit (K_RJ, uK_RJ, K_CMB, uK_CMB, Jy/sr, MJy/sr, ...) [default: uK_CMB]
    #[arg(long)]
    pub unit: Option<BrightnessUnit>,

    /// Frame of the emission templates (G, E, C) [default: G]
    #[arg(long)]
    pub input_frame: Option<CoordSystem>,

    /// Frame of the written map (G, E, C) [default: C]
    #[arg(long)]
    pub output_frame: Option<CoordSystem>,

    /// Output FITS file [default: ../input_maps/map_<freq>GHz.fits]
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Fail instead of replacing an existing output file
    #[arg(long)]
    pub no_overwrite: bool,

    /// Column precision, f32 or f64 [default: f64]
    #[arg(long)]
    pub dtype: Option<PixelDtype>,

    /// Local directory searched for templates before the download cache
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Never download templates
    #[arg(long)]
    pub offline: bool,

    /// Also write Mollweide PNG previews next to the output file
    #[arg(long)]
    pub preview: bool,
}

impl SkyArgs {
    /// Override `config` with every option given on the command line
    pub fn apply_to(&self, config: &mut SimulationConfig) {
        if let Some(nside) = self.nside {
            config.nside = nside;
        }
        if !self.presets.is_empty() {
            config.presets = self
                .presets
                .iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
        }
        if let Some(freq) = self.frequency {
            config.frequency_ghz = freq.0.as_ghz();
        }
        if let Some(unit) = self.unit {
            config.output_unit = unit;
        }
        if let Some(frame) = self.input_frame {
            config.input_frame = frame;
        }
        if let Some(frame) = self.output_frame {
            config.output_frame = frame;
        }
        if let Some(output) = &self.output {
            config.output = Some(output.clone());
        }
        if self.no_overwrite {
            config.overwrite = false;
        }
        if let Some(dtype) = self.dtype {
            config.dtype = dtype;
        }
        if let Some(dir) = &self.data_dir {
            config.data_dir = Some(dir.clone());
        }
        if self.offline {
            config.offline = true;
        }
        if self.preview {
            config.preview = true;
        }
    }

    /// Defaults, then the configuration file, then command line options
    pub fn resolve(&self) -> Result<SimulationConfig, PipelineError> {
        let mut config = match &self.config {
            Some(path) => SimulationConfig::from_json_file(path)?,
            None => SimulationConfig::default(),
        };
        self.apply_to(&mut config);
        Ok(config)
    }
}
