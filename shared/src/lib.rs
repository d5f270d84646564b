//! Shared geometry for the sky simulation crates
//!
//! - [`healpix`]: RING-ordered HEALPix pixelization, interpolation and re-gridding
//! - [`coords`]: celestial reference frames and frame rotations

pub mod coords;
pub mod healpix;
#[cfg(feature = "test-util")]
pub mod test_util;

pub use coords::{CoordError, CoordSystem, Rotator};
pub use healpix::{HealpixError, Nside};
