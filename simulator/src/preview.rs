//! Mollweide preview images of sky maps
//!
//! Full-sky maps are rendered in the Mollweide equal-area projection with
//! longitude zero at the center, increasing to the left (astronomical
//! convention). Pixels outside the ellipse are white, undefined map values
//! are gray.

use std::path::{Path, PathBuf};

use image::{ImageBuffer, Rgb, RgbImage};
use rayon::prelude::*;
use shared::healpix::{ang2pix, HealpixError, Nside};
use std::f64::consts::{PI, SQRT_2, TAU};
use thiserror::Error;

use crate::sky_map::{SkyMap, Stokes};

pub const DEFAULT_WIDTH: u32 = 800;

/// Color limits of the intensity preview
pub const INTENSITY_LIMITS: (f64, f64) = (0.0, 100.0);

/// Color limits of the polarized intensity preview
pub const POLARIZATION_LIMITS: (f64, f64) = (0.0, 10.0);

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const UNDEFINED: Rgb<u8> = Rgb([128, 128, 128]);

/// Viridis sampled at five evenly spaced points
const COLORMAP: [[f64; 3]; 5] = [
    [68.0, 1.0, 84.0],
    [59.0, 82.0, 139.0],
    [33.0, 145.0, 140.0],
    [94.0, 201.0, 98.0],
    [253.0, 231.0, 37.0],
];

#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("HEALPix error: {0}")]
    Healpix(#[from] HealpixError),

    #[error("Preview width must be at least 2 pixels, got {0}")]
    InvalidWidth(u32),

    #[error("Invalid color limits: min {min} must be below max {max}")]
    InvalidLimits { min: f64, max: f64 },
}

/// Map a value in [0, 1] onto the colormap
fn colorize(t: f64) -> Rgb<u8> {
    let t = t.clamp(0.0, 1.0) * (COLORMAP.len() - 1) as f64;
    let lo = (t.floor() as usize).min(COLORMAP.len() - 2);
    let frac = t - lo as f64;
    let mut rgb = [0u8; 3];
    for (c, out) in rgb.iter_mut().enumerate() {
        let v = COLORMAP[lo][c] + frac * (COLORMAP[lo + 1][c] - COLORMAP[lo][c]);
        *out = v.round() as u8;
    }
    Rgb(rgb)
}

/// Inverse Mollweide projection of plane coordinates
///
/// `x` spans [-2√2, 2√2] and `y` spans [-√2, √2]. Returns HEALPix
/// (colatitude, longitude) or `None` outside the ellipse.
pub fn mollweide_inverse(x: f64, y: f64) -> Option<(f64, f64)> {
    if x * x / 8.0 + y * y / 2.0 > 1.0 {
        return None;
    }
    let aux = (y / SQRT_2).clamp(-1.0, 1.0).asin();
    let cos_aux = aux.cos();
    if cos_aux <= 0.0 {
        return None;
    }
    let lat = ((2.0 * aux + (2.0 * aux).sin()) / PI).clamp(-1.0, 1.0).asin();
    let lon = -PI * x / (2.0 * SQRT_2 * cos_aux);
    if lon.abs() > PI {
        return None;
    }
    Some((PI / 2.0 - lat, lon.rem_euclid(TAU)))
}

/// Automatic color limits over the finite values
fn auto_limits(values: &[f64]) -> (f64, f64) {
    let (min, max) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if !min.is_finite() {
        (0.0, 1.0)
    } else if min == max {
        (min - 0.5, max + 0.5)
    } else {
        (min, max)
    }
}

/// Render one RING-ordered map row as a `width × width/2` Mollweide image
pub fn mollweide_image(
    values: &[f64],
    nside: Nside,
    width: u32,
    limits: Option<(f64, f64)>,
) -> Result<RgbImage, PreviewError> {
    nside.check_len(values.len())?;
    if width < 2 {
        return Err(PreviewError::InvalidWidth(width));
    }
    let (min, max) = limits.unwrap_or_else(|| auto_limits(values));
    if !(min < max) {
        return Err(PreviewError::InvalidLimits { min, max });
    }

    let height = width / 2;
    let (w, h) = (width as usize, height as usize);
    let mut buffer = vec![0u8; w * h * 3];

    buffer
        .par_chunks_mut(w * 3)
        .enumerate()
        .try_for_each(|(row, line)| -> Result<(), HealpixError> {
            let y = SQRT_2 - (row as f64 + 0.5) / h as f64 * 2.0 * SQRT_2;
            for col in 0..w {
                let x = (col as f64 + 0.5) / w as f64 * 4.0 * SQRT_2 - 2.0 * SQRT_2;
                let color = match mollweide_inverse(x, y) {
                    None => BACKGROUND,
                    Some((theta, phi)) => {
                        let v = values[ang2pix(nside, theta, phi)?];
                        if v.is_finite() {
                            colorize((v - min) / (max - min))
                        } else {
                            UNDEFINED
                        }
                    }
                };
                line[col * 3..col * 3 + 3].copy_from_slice(&color.0);
            }
            Ok(())
        })?;

    // Buffer length always matches the dimensions
    Ok(ImageBuffer::from_raw(width, height, buffer)
        .unwrap_or_else(|| ImageBuffer::from_pixel(width, height, UNDEFINED)))
}

/// Paths of the intensity and polarization previews for an output file
pub fn preview_paths(output: &Path) -> (PathBuf, PathBuf) {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "map".to_string());
    (
        output.with_file_name(format!("{stem}_I.png")),
        output.with_file_name(format!("{stem}_P.png")),
    )
}

/// Write `<stem>_I.png` and `<stem>_P.png` next to `output`
pub fn write_previews(
    map: &SkyMap,
    output: &Path,
    width: u32,
) -> Result<Vec<PathBuf>, PreviewError> {
    let (i_path, p_path) = preview_paths(output);

    let intensity = map.stokes(Stokes::I).to_vec();
    mollweide_image(&intensity, map.nside(), width, Some(INTENSITY_LIMITS))?.save(&i_path)?;

    let polarized = map.polarized_intensity().to_vec();
    mollweide_image(&polarized, map.nside(), width, Some(POLARIZATION_LIMITS))?.save(&p_path)?;

    log::info!(
        "Saved previews {} and {}",
        i_path.display(),
        p_path.display()
    );
    Ok(vec![i_path, p_path])
}
