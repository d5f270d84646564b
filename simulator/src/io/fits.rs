//! HEALPix maps stored as FITS binary tables
//!
//! Maps are written the way standard HEALPix tools expect them: an empty
//! primary HDU followed by one binary-table extension with one column per
//! Stokes parameter and one row per pixel, plus the `PIXTYPE`, `ORDERING`,
//! `COORDSYS` and `NSIDE` header keywords. No timestamps are written, so
//! writing the same map twice produces identical files.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use fitsio::hdu::HduInfo;
use fitsio::tables::{ColumnDataType, ColumnDescription};
use fitsio::FitsFile;
use serde::{Deserialize, Serialize};
use shared::healpix::{npix2nside, reorder_nest_to_ring, HealpixError, Nside};
use shared::CoordSystem;
use thiserror::Error;

use crate::sky_map::{SkyMap, SkyMapError, Stokes};
use crate::units::BrightnessUnit;

/// Name of the table extension holding the map
pub const EXTENSION_NAME: &str = "xtension";

/// Errors that can occur during HEALPix FITS operations
#[derive(Error, Debug)]
pub enum FitsError {
    #[error("FITS I/O error: {0}")]
    FitsIo(#[from] fitsio::errors::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Output file {0} already exists and overwriting is disabled")]
    AlreadyExists(PathBuf),

    #[error("No binary table extension found in {0}")]
    MissingTable(PathBuf),

    #[error("Invalid header keyword {key}: {reason}")]
    Header { key: String, reason: String },

    #[error("Expected 1 or 3 map columns, found {0}")]
    NotAStokesMap(usize),

    #[error("HEALPix error: {0}")]
    Healpix(#[from] HealpixError),

    #[error("Sky map error: {0}")]
    SkyMap(#[from] SkyMapError),
}

/// Floating point precision of the written columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelDtype {
    F32,
    #[default]
    F64,
}

impl PixelDtype {
    fn column_type(&self) -> ColumnDataType {
        match self {
            PixelDtype::F32 => ColumnDataType::Float,
            PixelDtype::F64 => ColumnDataType::Double,
        }
    }
}

impl fmt::Display for PixelDtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelDtype::F32 => write!(f, "f32"),
            PixelDtype::F64 => write!(f, "f64"),
        }
    }
}

impl FromStr for PixelDtype {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "f32" | "float32" | "e" => Ok(PixelDtype::F32),
            "f64" | "float64" | "d" => Ok(PixelDtype::F64),
            other => Err(format!("Unknown pixel dtype '{other}', expected f32 or f64")),
        }
    }
}

/// Pixel ordering scheme declared in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ordering {
    Ring,
    Nested,
}

impl Ordering {
    fn parse(value: &str) -> Result<Self, FitsError> {
        match value.trim().to_ascii_uppercase().as_str() {
            "RING" => Ok(Ordering::Ring),
            "NESTED" | "NEST" => Ok(Ordering::Nested),
            other => Err(FitsError::Header {
                key: "ORDERING".to_string(),
                reason: format!("unknown ordering '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Frame written to `COORDSYS`
    pub coord: CoordSystem,
    pub overwrite: bool,
    pub dtype: PixelDtype,
}

impl WriteOptions {
    pub fn new(coord: CoordSystem) -> Self {
        Self {
            coord,
            overwrite: true,
            dtype: PixelDtype::F64,
        }
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn dtype(mut self, dtype: PixelDtype) -> Self {
        self.dtype = dtype;
        self
    }
}

/// Write a sky map as a HEALPix binary table
///
/// `COORDSYS` comes from `options.coord`, not from the map's own frame tag.
/// Parent directories are created as needed.
pub fn write_healpix_map<P: AsRef<Path>>(
    path: P,
    map: &SkyMap,
    options: &WriteOptions,
) -> Result<(), FitsError> {
    let path = path.as_ref();

    if path.exists() && !options.overwrite {
        return Err(FitsError::AlreadyExists(path.to_path_buf()));
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut builder = FitsFile::create(path);
    if options.overwrite {
        builder = builder.overwrite();
    }
    let mut fptr = builder.open()?;

    let columns = Stokes::ALL
        .iter()
        .map(|s| {
            ColumnDescription::new(s.column_name())
                .with_type(options.dtype.column_type())
                .create()
        })
        .collect::<Result<Vec<_>, _>>()?;
    let hdu = fptr.create_table(EXTENSION_NAME.to_string(), &columns)?;

    for stokes in Stokes::ALL {
        let values = map.stokes(stokes);
        match options.dtype {
            PixelDtype::F64 => {
                let data: Vec<f64> = values.to_vec();
                hdu.write_col(&mut fptr, stokes.column_name(), &data)?;
            }
            PixelDtype::F32 => {
                let data: Vec<f32> = values.iter().map(|&v| v as f32).collect();
                hdu.write_col(&mut fptr, stokes.column_name(), &data)?;
            }
        }
    }

    let npix = map.npix() as i64;
    hdu.write_key(&mut fptr, "PIXTYPE", "HEALPIX")?;
    hdu.write_key(&mut fptr, "ORDERING", "RING")?;
    hdu.write_key(&mut fptr, "COORDSYS", options.coord.code())?;
    hdu.write_key(&mut fptr, "NSIDE", map.nside().get() as i64)?;
    hdu.write_key(&mut fptr, "FIRSTPIX", 0i64)?;
    hdu.write_key(&mut fptr, "LASTPIX", npix - 1)?;
    hdu.write_key(&mut fptr, "INDXSCHM", "IMPLICIT")?;
    hdu.write_key(&mut fptr, "OBJECT", "FULLSKY")?;
    hdu.write_key(&mut fptr, "POLCCONV", "COSMO")?;
    for (idx, _) in Stokes::ALL.iter().enumerate() {
        let key = format!("TUNIT{}", idx + 1);
        hdu.write_key(&mut fptr, &key, map.unit().label())?;
    }

    log::debug!(
        "Wrote {} pixels x {} columns ({}) to {}",
        npix,
        Stokes::ALL.len(),
        options.dtype,
        path.display()
    );
    Ok(())
}

/// One column of a HEALPix table
#[derive(Debug, Clone, PartialEq)]
pub struct HealpixColumn {
    pub name: String,
    /// Raw `TUNITn` value, if present
    pub unit: Option<String>,
    pub values: Vec<f64>,
}

/// Contents of a HEALPix FITS file, always in RING order
#[derive(Debug, Clone, PartialEq)]
pub struct HealpixFile {
    pub nside: Nside,
    /// Ordering declared in the file before conversion to RING
    pub ordering: Ordering,
    pub coord: Option<CoordSystem>,
    pub columns: Vec<HealpixColumn>,
}

impl HealpixFile {
    pub fn column(&self, idx: usize) -> Option<&HealpixColumn> {
        self.columns.get(idx)
    }

    /// Brightness unit of the first column, if its label is recognized
    pub fn unit(&self) -> Option<BrightnessUnit> {
        self.columns
            .first()
            .and_then(|c| c.unit.as_deref())
            .and_then(|u| u.parse().ok())
    }

    /// Interpret the columns as Stokes I, Q, U
    ///
    /// A single column is taken as intensity with zero polarization.
    /// Missing unit and frame metadata fall back to the given defaults.
    pub fn into_sky_map(
        self,
        default_unit: BrightnessUnit,
        default_coord: CoordSystem,
    ) -> Result<SkyMap, FitsError> {
        let unit = self.unit().unwrap_or(default_unit);
        let coord = self.coord.unwrap_or(default_coord);
        let nside = self.nside;
        let zeros = vec![0.0; nside.npix()];
        let map = match self.columns.as_slice() {
            [i] => SkyMap::from_stokes(nside, &i.values, &zeros, &zeros, unit, coord)?,
            [i, q, u, ..] => SkyMap::from_stokes(nside, &i.values, &q.values, &u.values, unit, coord)?,
            other => return Err(FitsError::NotAStokesMap(other.len())),
        };
        Ok(map)
    }
}

/// Read the first table extension of a HEALPix FITS file
///
/// NESTED maps are reordered to RING. When `NSIDE` is missing it is
/// derived from the row count.
pub fn read_healpix_map<P: AsRef<Path>>(path: P) -> Result<HealpixFile, FitsError> {
    let path = path.as_ref();
    let mut fptr = FitsFile::open(path)?;
    let hdu = fptr
        .hdu(1)
        .map_err(|_| FitsError::MissingTable(path.to_path_buf()))?;

    // Vector columns (`TFORM='1024E'`) hold `repeat` consecutive pixels per row
    let (names, num_values) = match &hdu.info {
        HduInfo::TableInfo {
            column_descriptions,
            num_rows,
        } => (
            column_descriptions
                .iter()
                .map(|d| d.name.clone())
                .collect::<Vec<_>>(),
            num_rows * column_descriptions.first().map_or(1, |d| d.data_type.repeat),
        ),
        _ => return Err(FitsError::MissingTable(path.to_path_buf())),
    };

    let nside = match hdu.read_key::<i64>(&mut fptr, "NSIDE") {
        Ok(value) => {
            let value = u32::try_from(value).map_err(|_| FitsError::Header {
                key: "NSIDE".to_string(),
                reason: format!("{value} is not a valid nside"),
            })?;
            Nside::new(value)?
        }
        Err(_) => npix2nside(num_values)?,
    };

    let ordering = match hdu.read_key::<String>(&mut fptr, "ORDERING") {
        Ok(value) => Ordering::parse(&value)?,
        Err(_) => Ordering::Ring,
    };

    let coord = match hdu.read_key::<String>(&mut fptr, "COORDSYS") {
        Ok(value) => Some(value.parse::<CoordSystem>().map_err(|e| FitsError::Header {
            key: "COORDSYS".to_string(),
            reason: e.to_string(),
        })?),
        Err(_) => None,
    };

    let mut columns = Vec::with_capacity(names.len());
    for (idx, name) in names.into_iter().enumerate() {
        let mut values: Vec<f64> = hdu.read_col(&mut fptr, &name)?;
        nside.check_len(values.len())?;
        if ordering == Ordering::Nested {
            values = reorder_nest_to_ring(&values)?;
        }
        let unit = hdu
            .read_key::<String>(&mut fptr, &format!("TUNIT{}", idx + 1))
            .ok()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        columns.push(HealpixColumn { name, unit, values });
    }

    log::debug!(
        "Read {} columns at nside {} ({:?}) from {}",
        columns.len(),
        nside,
        ordering,
        path.display()
    );

    Ok(HealpixFile {
        nside,
        ordering,
        coord,
        columns,
    })
}
