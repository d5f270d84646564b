//! File input/output for sky maps

pub mod fits;

pub use fits::{
    read_healpix_map, write_healpix_map, FitsError, HealpixColumn, HealpixFile, Ordering,
    PixelDtype, WriteOptions,
};
