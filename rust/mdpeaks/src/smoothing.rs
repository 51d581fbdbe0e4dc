use nalgebra::DMatrix;
use tracing::trace;

use crate::errors::{
    FeatureFindingError,
    Result,
};
use crate::models::{
    Array2D,
    Direction,
    PointIndex,
    WatershedMap,
};

/// Savitzky-Golay smoother for 1-D signals, 2-D blocks and point graphs.
///
/// The least-squares filter matrix is computed once on construction:
/// with `S` the (window x order+1) design matrix of offsets -m..=m raised to
/// the powers 0..=order, `filters = S (S^T S)^-1 S^T`. Column `i` of its
/// transpose holds the weights that evaluate the local polynomial fit at
/// position `i` of the window; column `m` is the regular centered filter,
/// the others are used at the edges of 1-D signals.
#[derive(Debug, Clone)]
pub struct SavitzkyGolaySmoother {
    window_size: usize,
    polynomial_order: usize,
    filters_transpose: DMatrix<f64>,
    // Columns of `filters_transpose`, cached since every smoothing call reads them.
    columns: Vec<Vec<f64>>,
}

impl SavitzkyGolaySmoother {
    pub fn new(window_size: usize, polynomial_order: usize) -> Result<Self> {
        if window_size < 3 || window_size % 2 == 0 {
            return Err(FeatureFindingError::invalid_parameter(
                "window_size",
                window_size,
                "Savitzky-Golay window size must be an odd number 3 or higher",
            ));
        }
        if polynomial_order >= window_size {
            return Err(FeatureFindingError::invalid_parameter(
                "polynomial_order",
                polynomial_order,
                "Savitzky-Golay polynomial order must be smaller than the window size",
            ));
        }

        let filters = smoothing_filters(window_size, polynomial_order)?;
        let filters_transpose = filters.transpose();
        let columns = filters_transpose
            .column_iter()
            .map(|col| col.iter().copied().collect())
            .collect();

        Ok(Self {
            window_size,
            polynomial_order,
            filters_transpose,
            columns,
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn polynomial_order(&self) -> usize {
        self.polynomial_order
    }

    /// The retained (window x window) transpose of the filter matrix.
    pub fn filters_transpose(&self) -> &DMatrix<f64> {
        &self.filters_transpose
    }

    /// Weights of the centered filter, ordered from offset -m to +m.
    pub fn center_coefficients(&self) -> &[f64] {
        &self.columns[self.half_window()]
    }

    fn half_window(&self) -> usize {
        (self.window_size - 1) / 2
    }

    /// Smooths every listed point of the map, in place.
    ///
    /// Each point gets twice the center weight times its own intensity, plus
    /// the weighted intensities of up to `m` neighbors walking West, East,
    /// South and North. Walks stop at the first missing link (no padding).
    /// All reads use the intensities from before this call.
    pub fn smooth_points(&self, map: &mut WatershedMap) {
        let m = self.half_window();
        let center = self.center_coefficients();
        let snapshot = map.intensities();
        let listed = map.listed_points().to_vec();

        for idx in listed {
            let mut summed = (center[m] * snapshot[idx.as_usize()]) * 2.0;
            summed += self.walk(map, &snapshot, idx, Direction::West, (0..m).rev());
            summed += self.walk(map, &snapshot, idx, Direction::East, m + 1..self.window_size);
            summed += self.walk(map, &snapshot, idx, Direction::South, (0..m).rev());
            summed += self.walk(map, &snapshot, idx, Direction::North, m + 1..self.window_size);
            map.point_mut(idx).intensity = summed;
        }
    }

    fn walk(
        &self,
        map: &WatershedMap,
        snapshot: &[f64],
        start: PointIndex,
        direction: Direction,
        coefficient_indices: impl Iterator<Item = usize>,
    ) -> f64 {
        let center = self.center_coefficients();
        let mut summed = 0.0;
        let mut current = start;
        for i in coefficient_indices {
            let Some(next) = map.neighbor(current, direction) else {
                break;
            };
            summed += center[i] * snapshot[next.as_usize()];
            current = next;
        }
        summed
    }

    /// Separable smoothing of a dense block: every row, then every column
    /// of the row-smoothed result.
    pub fn smooth_array(&self, array: &mut Array2D<f64>) {
        for row in array.iter_mut_rows() {
            let smoothed = self.smooth_1d(row);
            row.copy_from_slice(&smoothed);
        }

        for col_idx in 0..array.ncols() {
            if let Some(col) = array.get_col(col_idx) {
                let smoothed = self.smooth_1d(&col);
                array.set_col(col_idx, &smoothed);
            }
        }
    }

    /// Smooths a 1-D signal.
    ///
    /// The first and last `m + 1` positions use the edge filters against the
    /// first/last full window; the rest use the centered filter.
    /// Signals with no positive value, or shorter than the window, are
    /// returned unchanged.
    pub fn smooth_1d(&self, values: &[f64]) -> Vec<f64> {
        if !values.iter().any(|&x| x > 0.0) {
            return values.to_vec();
        }
        let len = values.len();
        let window = self.window_size;
        if len < window {
            trace!(
                "Signal of length {} is shorter than the smoothing window ({}), skipping",
                len,
                window
            );
            return values.to_vec();
        }

        let m = self.half_window();
        let mut out = vec![0.0; len];

        for (i, out_val) in out.iter_mut().enumerate().take(m + 1) {
            *out_val = dot(&self.columns[i], &values[..window]);
        }

        let center = self.center_coefficients();
        for i in (m + 1)..(len - m - 1) {
            out[i] = dot(center, &values[i - m..i - m + window]);
        }

        let tail = &values[len - window..];
        for i in 0..=m {
            out[len - m - 1 + i] = dot(&self.columns[m + i], tail);
        }

        out
    }
}

fn dot(weights: &[f64], values: &[f64]) -> f64 {
    weights.iter().zip(values.iter()).map(|(w, v)| w * v).sum()
}

/// `S (S^T S)^-1 S^T` for the given window and polynomial order.
fn smoothing_filters(window_size: usize, polynomial_order: usize) -> Result<DMatrix<f64>> {
    let m = ((window_size - 1) / 2) as f64;
    let design = DMatrix::from_fn(window_size, polynomial_order + 1, |row, power| {
        (row as f64 - m).powi(power as i32)
    });
    let design_t = design.transpose();

    let normal_inv = (&design_t * &design).try_inverse().ok_or_else(|| {
        FeatureFindingError::invalid_parameter(
            "polynomial_order",
            polynomial_order,
            "Savitzky-Golay normal matrix is singular",
        )
    })?;

    Ok(&design * normal_inv * design_t)
}
