//! Three-component (I, Q, U) HEALPix sky maps
//!
//! A [`SkyMap`] is a fixed-shape `3 × npix` array in RING ordering, tagged
//! with the brightness unit of its values and the coordinate frame its pixels
//! are laid out in. The shape is validated once at construction and never
//! changes afterwards; unit conversion and frame rotation produce maps with
//! the same shape.

use ndarray::{Array1, Array2, ArrayView1, ArrayViewMut1, Axis, Zip};
use shared::healpix::{self, HealpixError, Nside};
use shared::CoordSystem;
use thiserror::Error;
use uom::si::f64::Frequency;

use crate::units::{conversion_factor, BrightnessUnit, UnitError};

/// Number of Stokes rows in every map
pub const N_STOKES: usize = 3;

/// Errors that can occur when building or combining sky maps
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SkyMapError {
    #[error("HEALPix error: {0}")]
    Healpix(#[from] HealpixError),

    #[error("Unit error: {0}")]
    Unit(#[from] UnitError),

    #[error("Map array has shape {rows}x{cols}, expected 3x{expected_cols}")]
    ShapeMismatch {
        rows: usize,
        cols: usize,
        expected_cols: usize,
    },

    #[error("Cannot combine maps: {0}")]
    Incompatible(String),
}

/// Row selector for one Stokes parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stokes {
    I,
    Q,
    U,
}

impl Stokes {
    pub const ALL: [Stokes; N_STOKES] = [Stokes::I, Stokes::Q, Stokes::U];

    pub fn index(&self) -> usize {
        match self {
            Stokes::I => 0,
            Stokes::Q => 1,
            Stokes::U => 2,
        }
    }

    /// Column name used in HEALPix FITS tables
    pub fn column_name(&self) -> &'static str {
        match self {
            Stokes::I => "I_STOKES",
            Stokes::Q => "Q_STOKES",
            Stokes::U => "U_STOKES",
        }
    }
}

/// Min, max and mean over the finite values of one map row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub finite: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkyMap {
    nside: Nside,
    data: Array2<f64>,
    unit: BrightnessUnit,
    coord: CoordSystem,
}

impl SkyMap {
    /// All-zero map
    pub fn zeros(nside: Nside, unit: BrightnessUnit, coord: CoordSystem) -> Self {
        Self {
            nside,
            data: Array2::zeros((N_STOKES, nside.npix())),
            unit,
            coord,
        }
    }

    /// Wrap an existing `3 × npix` array
    pub fn from_array(
        nside: Nside,
        data: Array2<f64>,
        unit: BrightnessUnit,
        coord: CoordSystem,
    ) -> Result<Self, SkyMapError> {
        let (rows, cols) = data.dim();
        if rows != N_STOKES || cols != nside.npix() {
            return Err(SkyMapError::ShapeMismatch {
                rows,
                cols,
                expected_cols: nside.npix(),
            });
        }
        Ok(Self {
            nside,
            data,
            unit,
            coord,
        })
    }

    /// Build a map from separate I, Q and U vectors
    pub fn from_stokes(
        nside: Nside,
        i: &[f64],
        q: &[f64],
        u: &[f64],
        unit: BrightnessUnit,
        coord: CoordSystem,
    ) -> Result<Self, SkyMapError> {
        for row in [i, q, u] {
            nside.check_len(row.len())?;
        }
        let mut data = Array2::zeros((N_STOKES, nside.npix()));
        for (mut dst, src) in data.axis_iter_mut(Axis(0)).zip([i, q, u]) {
            dst.assign(&ArrayView1::from(src));
        }
        Self::from_array(nside, data, unit, coord)
    }

    pub fn nside(&self) -> Nside {
        self.nside
    }

    pub fn npix(&self) -> usize {
        self.nside.npix()
    }

    pub fn unit(&self) -> BrightnessUnit {
        self.unit
    }

    pub fn coord(&self) -> CoordSystem {
        self.coord
    }

    /// Relabel the frame without moving any pixel
    pub fn set_coord(&mut self, coord: CoordSystem) {
        self.coord = coord;
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    /// Total number of stored values, `3 × npix`
    pub fn len_values(&self) -> usize {
        self.data.len()
    }

    pub fn stokes(&self, which: Stokes) -> ArrayView1<'_, f64> {
        self.data.row(which.index())
    }

    pub fn stokes_mut(&mut self, which: Stokes) -> ArrayViewMut1<'_, f64> {
        self.data.row_mut(which.index())
    }

    /// Consume the map and return its raw array
    pub fn into_array(self) -> Array2<f64> {
        self.data
    }

    /// Add another map pixel by pixel
    ///
    /// Both maps must share resolution, unit and frame.
    pub fn add_assign(&mut self, other: &SkyMap) -> Result<(), SkyMapError> {
        if self.nside != other.nside {
            return Err(SkyMapError::Incompatible(format!(
                "nside {} vs {}",
                self.nside, other.nside
            )));
        }
        if self.unit != other.unit {
            return Err(SkyMapError::Incompatible(format!(
                "unit {} vs {}",
                self.unit, other.unit
            )));
        }
        if self.coord != other.coord {
            return Err(SkyMapError::Incompatible(format!(
                "frame {} vs {}",
                self.coord, other.coord
            )));
        }
        self.data += &other.data;
        Ok(())
    }

    /// Convert all values to `target` in place, using the law valid at `freq`
    pub fn convert_units(
        &mut self,
        target: BrightnessUnit,
        freq: Frequency,
    ) -> Result<(), SkyMapError> {
        let factor = conversion_factor(self.unit, target, freq)?;
        if factor != 1.0 {
            self.data.par_mapv_inplace(|v| v * factor);
        }
        self.unit = target;
        Ok(())
    }

    /// Re-grid every Stokes row to a new resolution
    pub fn ud_grade(&self, nside_out: Nside) -> Result<SkyMap, SkyMapError> {
        if nside_out == self.nside {
            return Ok(self.clone());
        }
        let mut data = Array2::zeros((N_STOKES, nside_out.npix()));
        for (mut dst, src) in data.axis_iter_mut(Axis(0)).zip(self.data.axis_iter(Axis(0))) {
            let values = src.to_vec();
            let regridded = healpix::ud_grade(&values, self.nside, nside_out)?;
            dst.assign(&Array1::from(regridded));
        }
        Self::from_array(nside_out, data, self.unit, self.coord)
    }

    /// Polarized intensity sqrt(Q² + U²) per pixel
    pub fn polarized_intensity(&self) -> Array1<f64> {
        let mut out = Array1::zeros(self.npix());
        Zip::from(&mut out)
            .and(self.stokes(Stokes::Q))
            .and(self.stokes(Stokes::U))
            .par_for_each(|p, &q, &u| *p = q.hypot(u));
        out
    }

    /// Summary statistics over the finite values of one row
    pub fn row_stats(&self, which: Stokes) -> Option<RowStats> {
        let (min, max, sum, finite) = self
            .stokes(which)
            .iter()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY, 0.0, 0usize), |acc, &v| {
                (acc.0.min(v), acc.1.max(v), acc.2 + v, acc.3 + 1)
            });
        (finite > 0).then(|| RowStats {
            min,
            max,
            mean: sum / finite as f64,
            finite,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::FrequencyExt;
    use approx::assert_relative_eq;

    fn nside(n: u32) -> Nside {
        Nside::new(n).unwrap()
    }

    fn ramp_map(n: u32) -> SkyMap {
        let ns = nside(n);
        let npix = ns.npix();
        let i: Vec<f64> = (0..npix).map(|p| p as f64).collect();
        let q = vec![3.0; npix];
        let u = vec![4.0; npix];
        SkyMap::from_stokes(
            ns,
            &i,
            &q,
            &u,
            BrightnessUnit::MicroKRj,
            CoordSystem::Galactic,
        )
        .unwrap()
    }

    #[test]
    fn test_zeros_shape() {
        let map = SkyMap::zeros(nside(4), BrightnessUnit::KCmb, CoordSystem::Equatorial);
        assert_eq!(map.data().dim(), (3, 192));
        assert_eq!(map.len_values(), 3 * 192);
        assert!(map.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_nside_512_value_count() {
        assert_eq!(N_STOKES * nside(512).npix(), 3 * 3_145_728);
    }

    #[test]
    fn test_from_stokes_rows() {
        let map = ramp_map(2);
        assert_eq!(map.stokes(Stokes::I)[47], 47.0);
        assert_eq!(map.stokes(Stokes::Q)[0], 3.0);
        assert_eq!(map.stokes(Stokes::U)[10], 4.0);
    }

    #[test]
    fn test_from_stokes_rejects_wrong_length() {
        let ns = nside(2);
        let short = vec![0.0; 47];
        let ok = vec![0.0; 48];
        let err = SkyMap::from_stokes(
            ns,
            &ok,
            &short,
            &ok,
            BrightnessUnit::KRj,
            CoordSystem::Galactic,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SkyMapError::Healpix(HealpixError::LengthMismatch { actual: 47, .. })
        ));
    }

    #[test]
    fn test_from_array_rejects_wrong_rows() {
        let err = SkyMap::from_array(
            nside(1),
            Array2::zeros((2, 12)),
            BrightnessUnit::KRj,
            CoordSystem::Galactic,
        )
        .unwrap_err();
        assert!(matches!(err, SkyMapError::ShapeMismatch { rows: 2, .. }));
    }

    #[test]
    fn test_add_assign() {
        let mut a = ramp_map(2);
        let b = ramp_map(2);
        a.add_assign(&b).unwrap();
        assert_eq!(a.stokes(Stokes::I)[5], 10.0);
        assert_eq!(a.stokes(Stokes::U)[5], 8.0);
    }

    #[test]
    fn test_add_assign_rejects_mismatch() {
        let mut a = ramp_map(2);
        let mut b = ramp_map(2);
        b.convert_units(BrightnessUnit::MicroKCmb, Frequency::from_ghz(40.0))
            .unwrap();
        assert!(matches!(
            a.add_assign(&b),
            Err(SkyMapError::Incompatible(_))
        ));
        assert!(matches!(
            a.add_assign(&ramp_map(4)),
            Err(SkyMapError::Incompatible(_))
        ));
    }

    #[test]
    fn test_convert_units_in_place() {
        let mut map = ramp_map(2);
        map.convert_units(BrightnessUnit::MicroKCmb, Frequency::from_ghz(40.0))
            .unwrap();
        assert_eq!(map.unit(), BrightnessUnit::MicroKCmb);
        assert_eq!(map.len_values(), 3 * 48);
        assert_relative_eq!(map.stokes(Stokes::Q)[0], 3.0 * 1.0418, epsilon = 3e-3);
        assert_relative_eq!(
            map.stokes(Stokes::I)[10] / map.stokes(Stokes::Q)[0],
            10.0 / 3.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_convert_to_same_unit_is_noop() {
        let mut map = ramp_map(2);
        let before = map.clone();
        map.convert_units(BrightnessUnit::MicroKRj, Frequency::from_ghz(40.0))
            .unwrap();
        assert_eq!(map, before);
    }

    #[test]
    fn test_ud_grade_preserves_mean() {
        let map = ramp_map(4);
        let low = map.ud_grade(nside(2)).unwrap();
        assert_eq!(low.npix(), 48);
        let mean_hi = map.row_stats(Stokes::I).unwrap().mean;
        let mean_lo = low.row_stats(Stokes::I).unwrap().mean;
        assert_relative_eq!(mean_hi, mean_lo, epsilon = 1e-9);
        assert_eq!(low.unit(), map.unit());
        assert_eq!(low.coord(), map.coord());
    }

    #[test]
    fn test_polarized_intensity() {
        let map = ramp_map(1);
        assert!(map.polarized_intensity().iter().all(|&p| p == 5.0));
    }

    #[test]
    fn test_row_stats_skips_nan() {
        let mut map = ramp_map(1);
        map.stokes_mut(Stokes::I)[0] = f64::NAN;
        let stats = map.row_stats(Stokes::I).unwrap();
        assert_eq!(stats.finite, 11);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 11.0);
        assert_relative_eq!(stats.mean, 6.0);
    }
}
