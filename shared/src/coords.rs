//! Celestial reference frames and the rotations between them
//!
//! Frames are identified by the single-letter codes used in the HEALPix
//! `COORDSYS` header keyword: `G` (galactic), `E` (ecliptic) and `C`
//! (equatorial / celestial). All frames are J2000.

use std::fmt;
use std::str::FromStr;

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::healpix::vec2ang;

/// Equatorial (ICRS/J2000) to galactic rotation, Hipparcos catalogue vol. 1 sec. 1.5.3
#[rustfmt::skip]
const EQUATORIAL_TO_GALACTIC: [f64; 9] = [
    -0.054_875_560_416_215_4, -0.873_437_090_234_885_0, -0.483_835_015_548_713_2,
     0.494_109_427_875_583_7, -0.444_829_629_960_011_2,  0.746_982_244_497_218_9,
    -0.867_666_149_019_004_7, -0.198_076_373_431_201_5,  0.455_983_776_175_066_9,
];

/// Mean obliquity of the ecliptic at J2000 in degrees
pub const OBLIQUITY_J2000_DEG: f64 = 23.439_291_1;

/// Errors that can occur when parsing coordinate systems
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoordError {
    #[error("Unknown coordinate system '{0}', expected one of G, E, C")]
    UnknownSystem(String),
}

/// Sky reference frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoordSystem {
    #[serde(rename = "G")]
    Galactic,
    #[serde(rename = "E")]
    Ecliptic,
    #[serde(rename = "C")]
    Equatorial,
}

impl CoordSystem {
    /// Single-letter code written to the `COORDSYS` header keyword
    pub fn code(&self) -> &'static str {
        match self {
            CoordSystem::Galactic => "G",
            CoordSystem::Ecliptic => "E",
            CoordSystem::Equatorial => "C",
        }
    }

    /// Rotation taking vectors in this frame to equatorial coordinates
    fn to_equatorial(self) -> Matrix3<f64> {
        match self {
            CoordSystem::Galactic => Matrix3::from_row_slice(&EQUATORIAL_TO_GALACTIC).transpose(),
            CoordSystem::Ecliptic => {
                let eps = OBLIQUITY_J2000_DEG.to_radians();
                let (s, c) = eps.sin_cos();
                // Ecliptic -> equatorial is a rotation about the shared x axis (vernal equinox)
                Matrix3::new(1.0, 0.0, 0.0, 0.0, c, -s, 0.0, s, c)
            }
            CoordSystem::Equatorial => Matrix3::identity(),
        }
    }
}

impl fmt::Display for CoordSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for CoordSystem {
    type Err = CoordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "g" | "galactic" => Ok(CoordSystem::Galactic),
            "e" | "ecliptic" => Ok(CoordSystem::Ecliptic),
            "c" | "q" | "equatorial" | "celestial" => Ok(CoordSystem::Equatorial),
            _ => Err(CoordError::UnknownSystem(s.to_string())),
        }
    }
}

/// Transform between two sky frames
///
/// Holds the rotation matrix `R` with `v_to = R * v_from`. The descriptor is
/// stateless; applying it to a map lives in the simulator crate.
#[derive(Debug, Clone, PartialEq)]
pub struct Rotator {
    from: CoordSystem,
    to: CoordSystem,
    matrix: Matrix3<f64>,
}

impl Rotator {
    pub fn new(from: CoordSystem, to: CoordSystem) -> Self {
        let matrix = if from == to {
            Matrix3::identity()
        } else {
            to.to_equatorial().transpose() * from.to_equatorial()
        };
        Self { from, to, matrix }
    }

    pub fn from(&self) -> CoordSystem {
        self.from
    }

    pub fn to(&self) -> CoordSystem {
        self.to
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    pub fn is_identity(&self) -> bool {
        self.from == self.to
    }

    /// Rotator for the opposite direction
    pub fn inverse(&self) -> Rotator {
        Rotator {
            from: self.to,
            to: self.from,
            matrix: self.matrix.transpose(),
        }
    }

    /// Express a direction given in the source frame in the destination frame
    pub fn rotate_vector(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.matrix * v
    }

    /// Rotate a (colatitude, longitude) pair in radians
    pub fn rotate_angles(&self, theta: f64, phi: f64) -> (f64, f64) {
        let v = crate::healpix::ang2vec(theta, phi);
        vec2ang(&self.rotate_vector(&v))
    }

    /// Rotation angle of the local polarization basis at a source-frame direction
    ///
    /// Returns `psi` such that Stokes parameters transform as
    /// `Q' + iU' = (Q + iU) * exp(2i psi)`. The basis is undefined exactly at
    /// either frame's poles; zero is returned there.
    pub fn polarization_angle(&self, direction: &Vector3<f64>) -> f64 {
        if self.is_identity() {
            return 0.0;
        }

        let d_from = direction.normalize();
        let d_to = self.rotate_vector(&d_from);

        let Some((e_theta_from, _)) = local_basis(&d_from) else {
            return 0.0;
        };
        let Some((e_theta_to, e_phi_to)) = local_basis(&d_to) else {
            return 0.0;
        };

        let rotated = self.matrix * e_theta_from;
        rotated.dot(&e_phi_to).atan2(rotated.dot(&e_theta_to))
    }
}

/// Unit vectors (e_theta, e_phi) at a direction, `None` at the poles
fn local_basis(d: &Vector3<f64>) -> Option<(Vector3<f64>, Vector3<f64>)> {
    let rho = (d.x * d.x + d.y * d.y).sqrt();
    if rho < 1e-12 {
        return None;
    }
    let (cos_phi, sin_phi) = (d.x / rho, d.y / rho);
    let e_theta = Vector3::new(d.z * cos_phi, d.z * sin_phi, -rho);
    let e_phi = Vector3::new(-sin_phi, cos_phi, 0.0);
    Some((e_theta, e_phi))
}
