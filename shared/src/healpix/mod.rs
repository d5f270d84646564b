//! HEALPix sphere pixelization (RING scheme)
//!
//! Equal-area pixelization of the sphere as described in Górski et al. (2005),
//! https://doi.org/10.1086/427976. Pixel geometry comes from `cdshealpix`; this
//! module adds a validated [`Nside`], error reporting instead of panics, and the
//! map-level operations (interpolation, re-gridding, reordering) the simulator needs.
//!
//! All pixel indices use the RING ordering; NESTED indices are only accepted by
//! [`nest2ring`] and [`reorder_nest_to_ring`] so that NESTED input files can be
//! brought into RING order.
//!
//! Angles follow the physics convention: colatitude `theta` in [0, π] measured from
//! the north pole and longitude `phi` in [0, 2π). `cdshealpix` works in
//! (longitude, latitude), converted at the boundary of this module.

use std::f64::consts::{FRAC_PI_2, PI, TAU};
use std::fmt;

use cdshealpix::nested::{self, Layer};
use cdshealpix::ring;
use nalgebra::Vector3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest resolution representable with 64-bit pixel indices
pub const MAX_NSIDE: u32 = 1 << 29;

/// Errors that can occur when working with HEALPix pixelizations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HealpixError {
    #[error("Invalid nside {0}: must be a power of two between 1 and 2^29")]
    InvalidNside(u64),

    #[error("Pixel {pixel} out of range for nside {nside} ({npix} pixels)")]
    PixelOutOfRange {
        pixel: usize,
        nside: u32,
        npix: usize,
    },

    #[error("Ring {ring} out of range for nside {nside} (rings 1..={max})")]
    RingOutOfRange { ring: usize, nside: u32, max: usize },

    #[error("Invalid pixel count {0}: not 12 * nside^2 for a valid nside")]
    InvalidNpix(usize),

    #[error("Invalid colatitude {0}: must be within [0, pi]")]
    InvalidTheta(f64),

    #[error("Map has {actual} values, expected {expected} for nside {nside}")]
    LengthMismatch {
        nside: u32,
        expected: usize,
        actual: usize,
    },
}

/// Validated HEALPix resolution parameter
///
/// Only powers of two are accepted so that every map can be re-gridded
/// hierarchically and converted between RING and NESTED ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Nside(u32);

impl Nside {
    /// Create a new resolution, rejecting values that are not a power of two
    pub fn new(nside: u32) -> Result<Self, HealpixError> {
        if nside == 0 || nside > MAX_NSIDE || !nside.is_power_of_two() {
            return Err(HealpixError::InvalidNside(nside as u64));
        }
        Ok(Self(nside))
    }

    /// Raw nside value
    pub fn get(&self) -> u32 {
        self.0
    }

    /// Resolution order, `nside = 2^order`
    pub fn order(&self) -> u32 {
        self.0.trailing_zeros()
    }

    /// Total number of pixels, `12 * nside^2`
    pub fn npix(&self) -> usize {
        12 * (self.0 as usize) * (self.0 as usize)
    }

    /// Number of pixels in the north polar cap
    pub fn ncap(&self) -> usize {
        2 * (self.0 as usize) * (self.0 as usize - 1)
    }

    /// Number of iso-latitude rings, `4 * nside - 1`
    pub fn nrings(&self) -> usize {
        4 * self.0 as usize - 1
    }

    /// Solid angle of one pixel in steradians
    pub fn pixel_area(&self) -> f64 {
        4.0 * PI / self.npix() as f64
    }

    /// Approximate angular size of one pixel in radians
    pub fn resolution(&self) -> f64 {
        self.pixel_area().sqrt()
    }

    /// NESTED layer of the same resolution
    fn layer(&self) -> &'static Layer {
        nested::get(self.order() as u8)
    }

    fn check_pixel(&self, pix: usize) -> Result<(), HealpixError> {
        if pix >= self.npix() {
            return Err(HealpixError::PixelOutOfRange {
                pixel: pix,
                nside: self.0,
                npix: self.npix(),
            });
        }
        Ok(())
    }

    /// Verify that a map slice holds exactly one value per pixel
    pub fn check_len(&self, len: usize) -> Result<(), HealpixError> {
        if len != self.npix() {
            return Err(HealpixError::LengthMismatch {
                nside: self.0,
                expected: self.npix(),
                actual: len,
            });
        }
        Ok(())
    }
}

impl TryFrom<u32> for Nside {
    type Error = HealpixError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Nside::new(value)
    }
}

impl From<Nside> for u32 {
    fn from(nside: Nside) -> Self {
        nside.0
    }
}

impl fmt::Display for Nside {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Number of pixels for a raw nside value
pub fn nside2npix(nside: u32) -> Result<usize, HealpixError> {
    Nside::new(nside).map(|n| n.npix())
}

/// Recover the resolution from a pixel count
pub fn npix2nside(npix: usize) -> Result<Nside, HealpixError> {
    if npix % 12 != 0 {
        return Err(HealpixError::InvalidNpix(npix));
    }
    let nside_sq = npix / 12;
    if !nside_sq.is_power_of_two() || nside_sq.trailing_zeros() % 2 != 0 {
        return Err(HealpixError::InvalidNpix(npix));
    }
    u32::try_from(1u64 << (nside_sq.trailing_zeros() / 2))
        .ok()
        .and_then(|n| Nside::new(n).ok())
        .ok_or(HealpixError::InvalidNpix(npix))
}

/// Geometry of a single iso-latitude ring
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RingInfo {
    /// RING index of the first pixel in the ring
    pub start: usize,
    /// Number of pixels in the ring
    pub npix: usize,
    /// Colatitude of the ring in radians
    pub theta: f64,
    /// Whether the first pixel center is offset by half a pixel from phi = 0
    pub shifted: bool,
}

/// Geometry of ring `ring` (1-based, north to south)
pub fn ring_info(nside: Nside, ring: usize) -> Result<RingInfo, HealpixError> {
    if ring == 0 || ring > nside.nrings() {
        return Err(HealpixError::RingOutOfRange {
            ring,
            nside: nside.get(),
            max: nside.nrings(),
        });
    }

    let ns = nside.get() as usize;
    let northring = if ring > 2 * ns { 4 * ns - ring } else { ring };
    let (npix, mut start) = if northring < ns {
        (4 * northring, 2 * northring * (northring - 1))
    } else {
        (4 * ns, nside.ncap() + (northring - ns) * 4 * ns)
    };
    if northring != ring {
        start = nside.npix() - start - npix;
    }

    let (theta, phi) = pix2ang_unchecked(nside, start);
    let quarter_step = 0.25 * TAU / npix as f64;
    Ok(RingInfo {
        start,
        npix,
        theta,
        shifted: phi > quarter_step && phi < TAU - quarter_step,
    })
}

fn pix2ang_unchecked(nside: Nside, pix: usize) -> (f64, f64) {
    let (lon, lat) = ring::center(nside.get(), pix as u64);
    (FRAC_PI_2 - lat, lon)
}

/// Colatitude and longitude of a pixel center
pub fn pix2ang(nside: Nside, pix: usize) -> Result<(f64, f64), HealpixError> {
    nside.check_pixel(pix)?;
    Ok(pix2ang_unchecked(nside, pix))
}

/// Pixel containing the direction (theta, phi)
pub fn ang2pix(nside: Nside, theta: f64, phi: f64) -> Result<usize, HealpixError> {
    if !(0.0..=PI).contains(&theta) {
        return Err(HealpixError::InvalidTheta(theta));
    }
    Ok(ring::hash(nside.get(), phi, latitude(theta)) as usize)
}

/// Latitude for a colatitude already known to lie in [0, π]
fn latitude(theta: f64) -> f64 {
    (FRAC_PI_2 - theta).clamp(-FRAC_PI_2, FRAC_PI_2)
}

/// Unit vector pointing at a pixel center
pub fn pix2vec(nside: Nside, pix: usize) -> Result<Vector3<f64>, HealpixError> {
    let (theta, phi) = pix2ang(nside, pix)?;
    Ok(ang2vec(theta, phi))
}

/// Pixel containing the direction of a (not necessarily normalized) vector
pub fn vec2pix(nside: Nside, v: &Vector3<f64>) -> usize {
    let (theta, phi) = vec2ang(v);
    ring::hash(nside.get(), phi, latitude(theta)) as usize
}

/// Unit vector for the direction (theta, phi)
pub fn ang2vec(theta: f64, phi: f64) -> Vector3<f64> {
    let st = theta.sin();
    Vector3::new(st * phi.cos(), st * phi.sin(), theta.cos())
}

/// Colatitude and longitude (in [0, 2π)) of a vector
pub fn vec2ang(v: &Vector3<f64>) -> (f64, f64) {
    let theta = (v.x * v.x + v.y * v.y).sqrt().atan2(v.z);
    let phi = v.y.atan2(v.x).rem_euclid(TAU);
    (theta, if phi >= TAU { 0.0 } else { phi })
}

/// Four pixels and bilinear weights for interpolating a map at (theta, phi)
///
/// Weights are non-negative and sum to one. A pixel may appear more than
/// once (with zero weight) next to the eight base-cell corners that have
/// only seven neighbours.
pub fn interpolation_weights(nside: Nside, theta: f64, phi: f64) -> ([usize; 4], [f64; 4]) {
    let layer = nside.layer();
    let lat = latitude(theta.clamp(0.0, PI));
    let cells = layer.bilinear_interpolation(phi, lat);
    (
        cells.map(|(nest, _)| layer.to_ring(nest) as usize),
        cells.map(|(_, w)| w),
    )
}

/// Bilinear interpolation of a RING map at (theta, phi)
pub fn interpolate(nside: Nside, map: &[f64], theta: f64, phi: f64) -> Result<f64, HealpixError> {
    nside.check_len(map.len())?;
    let (pix, wgt) = interpolation_weights(nside, theta, phi);
    Ok(pix.iter().zip(wgt.iter()).map(|(&p, &w)| map[p] * w).sum())
}

/// Convert a NESTED pixel index to the RING index of the same pixel
pub fn nest2ring(nside: Nside, pix: usize) -> Result<usize, HealpixError> {
    nside.check_pixel(pix)?;
    Ok(nside.layer().to_ring(pix as u64) as usize)
}

/// Convert a RING pixel index to the NESTED index of the same pixel
pub fn ring2nest(nside: Nside, pix: usize) -> Result<usize, HealpixError> {
    nside.check_pixel(pix)?;
    Ok(nside.layer().from_ring(pix as u64) as usize)
}

/// Reorder a NESTED map into RING order
pub fn reorder_nest_to_ring<T: Copy + Send + Sync>(values: &[T]) -> Result<Vec<T>, HealpixError> {
    let nside = npix2nside(values.len())?;
    let layer = nside.layer();
    Ok((0..values.len())
        .into_par_iter()
        .map(|ring_pix| values[layer.from_ring(ring_pix as u64) as usize])
        .collect())
}

/// Change the resolution of a RING map
///
/// Degrading averages the finite values of all child pixels; a parent with no
/// finite children becomes NaN. Upgrading copies each parent value to its children.
pub fn ud_grade(values: &[f64], nside_in: Nside, nside_out: Nside) -> Result<Vec<f64>, HealpixError> {
    nside_in.check_len(values.len())?;

    if nside_in == nside_out {
        return Ok(values.to_vec());
    }

    log::debug!("Re-gridding map from nside {nside_in} to nside {nside_out}");

    // Parent of a fine pixel: drop two NESTED bits per level
    let (fine, coarse) = if nside_out > nside_in {
        (nside_out, nside_in)
    } else {
        (nside_in, nside_out)
    };
    let shift = 2 * (fine.order() - coarse.order());
    let (fine_layer, coarse_layer) = (fine.layer(), coarse.layer());
    let parent_of = |fine_pix: usize| -> usize {
        let nest = fine_layer.from_ring(fine_pix as u64) >> shift;
        coarse_layer.to_ring(nest) as usize
    };

    if nside_out > nside_in {
        let upgraded = (0..nside_out.npix())
            .into_par_iter()
            .map(|pix| values[parent_of(pix)])
            .collect();
        return Ok(upgraded);
    }

    let parents: Vec<usize> = (0..nside_in.npix())
        .into_par_iter()
        .map(parent_of)
        .collect();

    let mut sums = vec![0.0; nside_out.npix()];
    let mut counts = vec![0usize; nside_out.npix()];
    for (&parent, &value) in parents.iter().zip(values.iter()) {
        if value.is_finite() {
            sums[parent] += value;
            counts[parent] += 1;
        }
    }

    Ok(sums
        .into_iter()
        .zip(counts)
        .map(|(sum, count)| {
            if count == 0 {
                f64::NAN
            } else {
                sum / count as f64
            }
        })
        .collect())
}
