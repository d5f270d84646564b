//! Microwave sky emission simulation
//!
//! This crate generates synthetic full-sky maps of polarized foreground
//! emission: named component presets are evaluated at one frequency,
//! converted between brightness units, rotated between celestial frames
//! and written as HEALPix FITS tables.

pub mod data;
pub mod io;
pub mod models;
pub mod pipeline;
pub mod preview;
pub mod shared_args;
pub mod sky;
pub mod sky_map;
pub mod transform;
pub mod units;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports for easier access
pub use io::fits::{read_healpix_map, write_healpix_map, WriteOptions};
pub use pipeline::{run, RunSummary, SimulationConfig};
pub use sky::Sky;
pub use sky_map::{SkyMap, Stokes};
pub use transform::apply_coord_transform;
pub use units::{conversion_factor, BrightnessUnit};
