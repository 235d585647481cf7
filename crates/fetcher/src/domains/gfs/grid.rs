/// Mean Earth radius used for finite differences (m).
const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum GridError {
    #[error("grid has {values} values but axes describe {nx}x{ny}")]
    ShapeMismatch { nx: usize, ny: usize, values: usize },
    #[error("grid needs at least 2 points along each axis, got {nx}x{ny}")]
    Degenerate { nx: usize, ny: usize },
    #[error("grids are not on the same mesh")]
    MeshMismatch,
}

/// Regular latitude/longitude grid, row-major (one row per latitude).
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    lats: Vec<f64>,
    lons: Vec<f64>,
    values: Vec<f64>,
}

impl Grid {
    pub fn new(lats: Vec<f64>, lons: Vec<f64>, values: Vec<f64>) -> Result<Self, GridError> {
        let (nx, ny) = (lons.len(), lats.len());
        if nx < 2 || ny < 2 {
            return Err(GridError::Degenerate { nx, ny });
        }
        if nx * ny != values.len() {
            return Err(GridError::ShapeMismatch {
                nx,
                ny,
                values: values.len(),
            });
        }
        Ok(Self { lats, lons, values })
    }

    pub fn nx(&self) -> usize {
        self.lons.len()
    }

    pub fn ny(&self) -> usize {
        self.lats.len()
    }

    pub fn lats(&self) -> &[f64] {
        &self.lats
    }

    pub fn lons(&self) -> &[f64] {
        &self.lons
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn value(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.nx() + col]
    }

    /// Longitude step, positive.
    pub fn dx(&self) -> f64 {
        (self.lons[1] - self.lons[0]).abs()
    }

    /// Latitude step, positive whichever way the rows run.
    pub fn dy(&self) -> f64 {
        (self.lats[0] - self.lats[1]).abs()
    }

    pub fn lat_bounds(&self) -> (f64, f64) {
        min_max(&self.lats)
    }

    pub fn lon_bounds(&self) -> (f64, f64) {
        min_max(&self.lons)
    }

    /// Whether the columns cover the full circle, so the last one neighbours the first.
    pub fn wraps_longitude(&self) -> bool {
        (self.dx() * self.nx() as f64 - 360.0).abs() < 1e-6
    }

    /// Map longitudes into [-180, 180) and rotate the columns so they ascend.
    pub fn recenter_longitudes(mut self) -> Self {
        for lon in self.lons.iter_mut() {
            *lon = (*lon + 180.0).rem_euclid(360.0) - 180.0;
        }

        let start = self
            .lons
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(idx, _)| idx)
            .unwrap_or(0);
        if start == 0 {
            return self;
        }

        let nx = self.nx();
        self.lons.rotate_left(start);
        for row in self.values.chunks_mut(nx) {
            row.rotate_left(start);
        }
        self
    }

    /// Horizontal divergence `du/dx + dv/dy` on the sphere (s-1).
    ///
    /// Centred differences; the first and last rows, the poles and the
    /// outer columns of non-global grids are NaN.
    pub fn divergence(u: &Grid, v: &Grid) -> Result<Grid, GridError> {
        if u.lats != v.lats || u.lons != v.lons {
            return Err(GridError::MeshMismatch);
        }

        let (nx, ny) = (u.nx(), u.ny());
        let wraps = u.wraps_longitude();
        let dlon = u.dx().to_radians();
        let mut out = vec![f64::NAN; nx * ny];

        for row in 1..ny.saturating_sub(1) {
            let phi = u.lats[row].to_radians();
            let phi_prev = u.lats[row - 1].to_radians();
            let phi_next = u.lats[row + 1].to_radians();
            let cos_phi = phi.cos();
            if cos_phi.abs() < 1e-9 {
                continue;
            }

            for col in 0..nx {
                let (west, east) = match (col, wraps) {
                    (0, true) => (nx - 1, 1),
                    (c, true) if c == nx - 1 => (c - 1, 0),
                    (0, false) => continue,
                    (c, false) if c == nx - 1 => continue,
                    (c, _) => (c - 1, c + 1),
                };

                let du_dlambda = (u.value(row, east) - u.value(row, west)) / (2.0 * dlon);
                let dvcos_dphi = (v.value(row + 1, col) * phi_next.cos()
                    - v.value(row - 1, col) * phi_prev.cos())
                    / (phi_next - phi_prev);

                out[row * nx + col] = (du_dlambda + dvcos_dphi) / (EARTH_RADIUS_M * cos_phi);
            }
        }

        Grid::new(u.lats.clone(), u.lons.clone(), out)
    }
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis(start: f64, step: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| start + step * i as f64).collect()
    }

    #[test]
    fn rejects_wrong_value_count() {
        let err = Grid::new(vec![1.0, 0.0], vec![0.0, 1.0, 2.0], vec![0.0; 5]).unwrap_err();
        assert_eq!(
            err,
            GridError::ShapeMismatch {
                nx: 3,
                ny: 2,
                values: 5
            }
        );
    }

    #[test]
    fn recenter_rolls_global_grid() {
        // 4 columns at 0, 90, 180, 270
        let lons = axis(0.0, 90.0, 4);
        let lats = vec![10.0, 0.0];
        let values = vec![0.0, 1.0, 2.0, 3.0, 10.0, 11.0, 12.0, 13.0];
        let grid = Grid::new(lats, lons, values).unwrap().recenter_longitudes();

        assert_eq!(grid.lons(), &[-180.0, -90.0, 0.0, 90.0]);
        assert_eq!(grid.values(), &[2.0, 3.0, 0.0, 1.0, 12.0, 13.0, 10.0, 11.0]);
        assert_eq!(grid.lon_bounds(), (-180.0, 90.0));
        assert!(grid.wraps_longitude());
    }

    #[test]
    fn recenter_leaves_centred_grid_alone() {
        let grid = Grid::new(vec![1.0, 0.0], vec![-10.0, 0.0, 10.0], vec![1.0; 6]).unwrap();
        assert_eq!(grid.clone().recenter_longitudes(), grid);
    }

    #[test]
    fn steps_are_positive_for_north_to_south_rows() {
        let grid = Grid::new(vec![90.0, 89.75, 89.5], axis(0.0, 0.25, 4), vec![0.0; 12]).unwrap();
        assert_eq!(grid.dx(), 0.25);
        assert_eq!(grid.dy(), 0.25);
        assert_eq!(grid.lat_bounds(), (89.5, 90.0));
    }

    #[test]
    fn uniform_wind_has_no_divergence() {
        let lats = axis(40.0, -1.0, 5);
        let lons = axis(0.0, 1.0, 6);
        let u = Grid::new(lats.clone(), lons.clone(), vec![5.0; 30]).unwrap();
        let v = Grid::new(lats, lons, vec![0.0; 30]).unwrap();

        let div = Grid::divergence(&u, &v).unwrap();
        // edges are undefined, interior is zero
        assert!(div.value(0, 2).is_nan());
        assert!(div.value(2, 0).is_nan());
        assert!(div.value(2, 2).abs() < 1e-12);
    }

    #[test]
    fn diverging_zonal_wind_is_positive() {
        let lats = axis(1.0, -1.0, 3);
        let lons = axis(0.0, 1.0, 3);
        // u grows eastward
        let u = Grid::new(lats.clone(), lons.clone(), vec![0.0, 1.0, 2.0, 0.0, 1.0, 2.0, 0.0, 1.0, 2.0])
            .unwrap();
        let v = Grid::new(lats, lons, vec![0.0; 9]).unwrap();

        let div = Grid::divergence(&u, &v).unwrap();
        let expected = 1.0 / (1f64.to_radians() * EARTH_RADIUS_M);
        assert!((div.value(1, 1) - expected).abs() < 1e-12);
    }

    #[test]
    fn divergence_requires_same_mesh() {
        let u = Grid::new(vec![1.0, 0.0], vec![0.0, 1.0], vec![0.0; 4]).unwrap();
        let v = Grid::new(vec![2.0, 0.0], vec![0.0, 1.0], vec![0.0; 4]).unwrap();
        assert_eq!(Grid::divergence(&u, &v), Err(GridError::MeshMismatch));
    }
}
