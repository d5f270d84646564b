//! Synthetic template files for offline tests

use std::path::Path;

use fitsio::tables::{ColumnDataType, ColumnDescription};
use fitsio::FitsFile;
use shared::healpix::Nside;
use shared::CoordSystem;

use crate::io::fits::{write_healpix_map, WriteOptions};
use crate::models::preset;
use crate::sky_map::SkyMap;
use crate::units::BrightnessUnit;

/// Uniform value written for a template, chosen from its file name
pub fn synthetic_value(name: &str) -> f64 {
    if name.contains("synch_beta") {
        -3.0
    } else if name.contains("dust_beta") {
        1.5
    } else if name.contains("temp") {
        20.0
    } else if name.contains("_q_") {
        4.0
    } else if name.contains("_u_") {
        3.0
    } else {
        100.0
    }
}

/// Write uniform templates for every file the given presets read
pub fn write_preset_templates(dir: &Path, presets: &[&str], nside: Nside) {
    for name in presets {
        for template in preset(name).unwrap().templates() {
            let value = synthetic_value(template);
            let values = vec![value; nside.npix()];
            let zeros = vec![0.0; nside.npix()];
            let map = SkyMap::from_stokes(
                nside,
                &values,
                &zeros,
                &zeros,
                BrightnessUnit::MicroKRj,
                CoordSystem::Galactic,
            )
            .unwrap();
            write_healpix_map(
                dir.join(template),
                &map,
                &WriteOptions::new(CoordSystem::Galactic),
            )
            .unwrap();
        }
    }
}

/// Write a single-column RING template with 1024 pixels per table row
///
/// This is the layout `healpy.write_map` produces by default
/// (`TFORM1 = '1024E'`), used by most published templates.
pub fn write_vector_template(path: &Path, nside: Nside, values: &[f32], unit: &str) {
    assert_eq!(values.len(), nside.npix());
    let mut fptr = FitsFile::create(path).overwrite().open().unwrap();
    let column = ColumnDescription::new("TEMPERATURE")
        .with_type(ColumnDataType::Float)
        .that_repeats(1024)
        .create()
        .unwrap();
    let hdu = fptr.create_table("xtension".to_string(), &[column]).unwrap();
    hdu.write_col(&mut fptr, "TEMPERATURE", values).unwrap();
    hdu.write_key(&mut fptr, "PIXTYPE", "HEALPIX").unwrap();
    hdu.write_key(&mut fptr, "ORDERING", "RING").unwrap();
    hdu.write_key(&mut fptr, "COORDSYS", "G").unwrap();
    hdu.write_key(&mut fptr, "NSIDE", nside.get() as i64).unwrap();
    hdu.write_key(&mut fptr, "TUNIT1", unit).unwrap();
}
