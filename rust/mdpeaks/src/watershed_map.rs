//! Construction of the 8-connected point graph ("watershed map") from
//! either a dense intensity block or a sorted sparse sample list.
//!
//! Both builders use the same convention: North/South step along the LC
//! axis (+1/-1) and East/West along the IMS axis (+1/-1), so the same set
//! of points gets the same adjacency from either builder.

use tracing::debug;

use crate::errors::{
    PreconditionError,
    Result,
};
use crate::models::{
    Array2D,
    Direction,
    GridPoint,
    PointIndex,
    SparseSample,
    WatershedMap,
};

/// Builds the map for a dense block (rows = LC scans, columns = IMS scans).
///
/// Every cell becomes a point and gets linked, but only points with a
/// positive intensity are listed for smoothing/segmentation. `scan_lc_min`
/// and `scan_ims_min` are added to the row/column index of every point.
#[tracing::instrument(level = "debug", skip(data))]
pub fn build_watershed_map_dense(
    data: &Array2D<f64>,
    scan_lc_min: i32,
    scan_ims_min: i32,
) -> WatershedMap {
    let mut builder = DenseMapBuilder::new(data, scan_lc_min, scan_ims_min);
    builder.build();
    let map = builder.map;
    debug!(
        "Built dense watershed map: {}x{} cells, {} positive points",
        data.nrows(),
        data.ncols(),
        map.listed_points().len()
    );
    map
}

/// Single pass over a dense block.
///
/// Points are created lazily right before they are first needed. When
/// visiting (i, j) in row-major order, everything south and west of it is
/// already linked, so the missing links are either created here (first
/// row/column, and the always-new NorthEast point) or read off the links
/// of the South and West neighbors. Each cell pair is linked exactly once.
struct DenseMapBuilder<'a> {
    data: &'a Array2D<f64>,
    scan_lc_min: i32,
    scan_ims_min: i32,
    map: WatershedMap,
    slots: Vec<Option<PointIndex>>,
}

impl<'a> DenseMapBuilder<'a> {
    fn new(data: &'a Array2D<f64>, scan_lc_min: i32, scan_ims_min: i32) -> Self {
        let size = data.nrows() * data.ncols();
        Self {
            data,
            scan_lc_min,
            scan_ims_min,
            map: WatershedMap::with_capacity(size),
            slots: vec![None; size],
        }
    }

    fn create(&mut self, row: usize, col: usize) -> PointIndex {
        let intensity = self.data.get(row, col).unwrap_or(0.0);
        let idx = self.map.push(GridPoint::new(
            row as i32,
            self.scan_lc_min,
            col as i32,
            self.scan_ims_min,
            intensity,
            false,
        ));
        self.slots[row * self.data.ncols() + col] = Some(idx);
        idx
    }

    /// Neighbor that must already exist given the visiting order.
    fn linked(&self, idx: PointIndex, direction: Direction) -> PointIndex {
        match self.map.neighbor(idx, direction) {
            Some(x) => x,
            None => unreachable!(
                "Link {:?} of point {:?} should have been built earlier",
                direction, idx
            ),
        }
    }

    fn build(&mut self) {
        let nrows = self.data.nrows();
        let ncols = self.data.ncols();

        self.create(0, 0);
        for row in 0..nrows {
            for col in 0..ncols {
                let current = match self.slots[row * ncols + col] {
                    Some(x) => x,
                    None => unreachable!("Point ({}, {}) should have been created", row, col),
                };
                if self.map.point(current).intensity > 0.0 {
                    self.map.push_listed(current);
                }
                self.link_neighbors(current, row, col);
            }
        }
    }

    fn link_neighbors(&mut self, current: PointIndex, row: usize, col: usize) {
        let can_move_north = row + 1 < self.data.nrows();
        let can_move_south = row > 0;
        let can_move_east = col + 1 < self.data.ncols();
        let can_move_west = col > 0;

        if can_move_east {
            if can_move_south {
                // SE is the South point's East, E is the South point's NE.
                let south = self.linked(current, Direction::South);
                let south_east = self.linked(south, Direction::East);
                self.map.link(current, Direction::SouthEast, south_east);
                let east = self.linked(south, Direction::NorthEast);
                self.map.link(current, Direction::East, east);
            } else {
                let east = self.create(row, col + 1);
                self.map.link(current, Direction::East, east);
            }

            if can_move_north {
                // Nobody else can reach the NE point before us.
                let north_east = self.create(row + 1, col + 1);
                self.map.link(current, Direction::NorthEast, north_east);
            }
        }

        if can_move_north {
            if can_move_west {
                let west = self.linked(current, Direction::West);
                let north = self.linked(west, Direction::NorthEast);
                self.map.link(current, Direction::North, north);
            } else {
                let north = self.create(row + 1, col);
                self.map.link(current, Direction::North, north);
            }
        }
    }
}

/// Builds the map for a sparse sample list.
///
/// Only the given samples become points; neighbors missing from the list
/// stay unlinked. The list must be strictly ascending by
/// (scan_lc, scan_ims), otherwise [PreconditionError::UnsortedSamples] is
/// returned.
#[tracing::instrument(level = "debug", skip_all, fields(num_samples = samples.len()))]
pub fn build_watershed_map_sparse(samples: &[SparseSample]) -> Result<WatershedMap> {
    if let Some(pos) = samples
        .windows(2)
        .position(|w| w[1].coords() <= w[0].coords())
    {
        return Err(PreconditionError::UnsortedSamples { index: pos + 1 }.into());
    }

    let num_points = samples.len();
    let mut map = WatershedMap::with_capacity(num_points);
    for sample in samples {
        let idx = map.push(GridPoint::new(
            sample.scan_lc,
            0,
            sample.scan_ims,
            0,
            sample.intensity,
            sample.is_saturated,
        ));
        map.push_listed(idx);
    }

    let mut num_links = 0;
    for (i, sample) in samples.iter().enumerate() {
        let (scan_lc, scan_ims) = sample.coords();
        let current = PointIndex(i);

        if let (Some(next), Some(east_ims)) = (samples.get(i + 1), scan_ims.checked_add(1)) {
            if next.coords() == (scan_lc, east_ims) {
                map.link(current, Direction::East, PointIndex(i + 1));
                num_links += 1;
            }
        }

        // Nothing lies north of the last representable LC scan.
        let Some(next_lc) = scan_lc.checked_add(1) else {
            continue;
        };

        // The up-to-three points of the next LC scan that touch this one
        // are contiguous in the sorted list, starting at (lc + 1, ims - 1).
        let lower = (next_lc, scan_ims.saturating_sub(1));
        let start = samples.partition_point(|s| s.coords() < lower);
        for (j, candidate) in samples.iter().enumerate().skip(start).take(3) {
            let (test_lc, test_ims) = candidate.coords();
            if test_lc != next_lc {
                break;
            }
            let direction = match i64::from(test_ims) - i64::from(scan_ims) {
                -1 => Direction::NorthWest,
                0 => Direction::North,
                1 => Direction::NorthEast,
                _ => break,
            };
            map.link(current, direction, PointIndex(j));
            num_links += 1;
        }
    }

    debug!(
        "Built sparse watershed map: {} points, {} neighbor pairs",
        num_points, num_links
    );
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_symmetric(map: &WatershedMap) {
        for (idx, point) in map.iter() {
            for dir in Direction::ALL {
                if let Some(other) = point.neighbor(dir) {
                    assert_eq!(
                        map.neighbor(other, dir.opposite()),
                        Some(idx),
                        "Asymmetric {:?} link between {:?} and {:?}",
                        dir,
                        idx,
                        other
                    );
                    let (dlc, dims) = dir.offset();
                    let other = map.point(other);
                    assert_eq!(other.scan_lc(), point.scan_lc() + dlc);
                    assert_eq!(other.scan_ims(), point.scan_ims() + dims);
                }
            }
        }
    }

    fn neighbor_count(map: &WatershedMap, idx: PointIndex) -> usize {
        Direction::ALL
            .iter()
            .filter(|d| map.neighbor(idx, **d).is_some())
            .count()
    }

    #[test]
    fn test_dense_map_is_fully_linked() -> Result<()> {
        let data = Array2D::filled(4, 5, 1.0)?;
        let map = build_watershed_map_dense(&data, 0, 0);
        assert_eq!(map.len(), 20);
        assert_eq!(map.listed_points().len(), 20);
        assert_symmetric(&map);

        // corner, edge, interior
        assert_eq!(neighbor_count(&map, map.find(0, 0).unwrap()), 3);
        assert_eq!(neighbor_count(&map, map.find(0, 2).unwrap()), 5);
        assert_eq!(neighbor_count(&map, map.find(2, 2).unwrap()), 8);
        assert_eq!(neighbor_count(&map, map.find(3, 4).unwrap()), 3);
        Ok(())
    }

    #[test]
    fn test_dense_map_lists_only_positive_points() -> Result<()> {
        let data = Array2D::new(vec![vec![0.0, 2.0, 0.0], vec![0.0, 0.0, 3.0]])?;
        let map = build_watershed_map_dense(&data, 100, 20);
        assert_eq!(map.len(), 6);

        let listed: Vec<_> = map
            .listed_points()
            .iter()
            .map(|&i| {
                let p = map.point(i);
                (p.scan_lc(), p.scan_ims(), p.intensity)
            })
            .collect();
        assert_eq!(listed, vec![(100, 21, 2.0), (101, 22, 3.0)]);

        // Links go through zero-intensity points too
        let first = map.listed_points()[0];
        let north = map.neighbor(first, Direction::North).unwrap();
        assert_eq!(map.point(north).intensity, 0.0);
        assert_symmetric(&map);
        Ok(())
    }

    #[test]
    fn test_dense_single_row_and_column() -> Result<()> {
        let row = Array2D::new(vec![vec![1.0, 2.0, 3.0]])?;
        let map = build_watershed_map_dense(&row, 0, 0);
        assert_eq!(map.len(), 3);
        assert_symmetric(&map);

        let col = Array2D::new(vec![vec![1.0], vec![2.0], vec![3.0]])?;
        let map = build_watershed_map_dense(&col, 0, 0);
        assert_eq!(map.len(), 3);
        assert_symmetric(&map);
        let middle = map.find(1, 0).unwrap();
        assert_eq!(neighbor_count(&map, middle), 2);
        Ok(())
    }

    #[test]
    fn test_sparse_map_links_only_present_samples() -> Result<()> {
        let samples = vec![
            SparseSample::new(0, 0, 1.0),
            SparseSample::new(0, 1, 1.0),
            SparseSample::new(0, 5, 1.0),
            SparseSample::new(1, 0, 1.0),
            SparseSample::new(1, 2, 1.0),
            SparseSample::new(1, 6, 1.0),
            SparseSample::new(3, 5, 1.0),
        ];
        let map = build_watershed_map_sparse(&samples)?;
        assert_eq!(map.len(), samples.len());
        assert_eq!(map.listed_points().len(), samples.len());
        assert_symmetric(&map);

        let origin = PointIndex(0);
        assert_eq!(map.neighbor(origin, Direction::East), Some(PointIndex(1)));
        assert_eq!(map.neighbor(origin, Direction::North), Some(PointIndex(3)));
        assert_eq!(map.neighbor(origin, Direction::NorthEast), None);

        // (0, 1) touches (1, 0) and (1, 2) diagonally
        assert_eq!(
            map.neighbor(PointIndex(1), Direction::NorthWest),
            Some(PointIndex(3))
        );
        assert_eq!(
            map.neighbor(PointIndex(1), Direction::NorthEast),
            Some(PointIndex(4))
        );
        // (0, 5) -> (1, 6)
        assert_eq!(
            map.neighbor(PointIndex(2), Direction::NorthEast),
            Some(PointIndex(5))
        );
        // (3, 5) is two LC scans away from everything
        assert_eq!(neighbor_count(&map, PointIndex(6)), 0);
        Ok(())
    }

    #[test]
    fn test_sparse_matches_dense_on_full_grid() -> Result<()> {
        let nrows = 4;
        let ncols = 6;
        let values: Vec<f64> = (0..nrows * ncols).map(|x| 1.0 + x as f64).collect();
        let data = Array2D::from_flat_vector(values.clone(), nrows, ncols)?;
        let dense = build_watershed_map_dense(&data, 0, 0);

        let samples: Vec<_> = (0..nrows)
            .flat_map(|r| (0..ncols).map(move |c| (r, c)))
            .map(|(r, c)| SparseSample::new(r as i32, c as i32, values[r * ncols + c]))
            .collect();
        let sparse = build_watershed_map_sparse(&samples)?;

        for (idx, point) in sparse.iter() {
            let dense_idx = dense.find(point.scan_lc(), point.scan_ims()).unwrap();
            for dir in Direction::ALL {
                let from_sparse = sparse
                    .neighbor(idx, dir)
                    .map(|n| (sparse.point(n).scan_lc(), sparse.point(n).scan_ims()));
                let from_dense = dense
                    .neighbor(dense_idx, dir)
                    .map(|n| (dense.point(n).scan_lc(), dense.point(n).scan_ims()));
                assert_eq!(from_sparse, from_dense, "{:?} of {:?}", dir, idx);
            }
        }
        Ok(())
    }

    #[test]
    fn test_sparse_scans_at_integer_limits() -> Result<()> {
        let max = i32::MAX;
        let samples = vec![
            SparseSample::new(3, max, 1.0),
            SparseSample::new(4, i32::MIN, 1.0),
            SparseSample::new(max - 1, max - 1, 1.0),
            SparseSample::new(max - 1, max, 1.0),
            SparseSample::new(max, 5, 1.0),
            SparseSample::new(max, 6, 1.0),
            SparseSample::new(max, max - 1, 1.0),
            SparseSample::new(max, max, 1.0),
        ];
        let map = build_watershed_map_sparse(&samples)?;
        assert_symmetric(&map);

        // IMS does not wrap around between LC scans
        assert_eq!(neighbor_count(&map, PointIndex(0)), 0);
        assert_eq!(neighbor_count(&map, PointIndex(1)), 0);

        // The top-right 2x2 corner is fully linked
        for idx in [2, 3, 6, 7] {
            assert_eq!(neighbor_count(&map, PointIndex(idx)), 3, "Point {}", idx);
        }
        assert_eq!(
            map.neighbor(PointIndex(3), Direction::NorthWest),
            Some(PointIndex(6))
        );

        // On the last LC scan only same-scan neighbors exist
        assert_eq!(
            map.neighbor(PointIndex(4), Direction::East),
            Some(PointIndex(5))
        );
        assert_eq!(neighbor_count(&map, PointIndex(4)), 1);
        assert_eq!(neighbor_count(&map, PointIndex(5)), 1);
        Ok(())
    }

    #[test]
    fn test_sparse_rejects_unsorted_input() {
        let samples = vec![
            SparseSample::new(0, 1, 1.0),
            SparseSample::new(0, 0, 1.0),
        ];
        match build_watershed_map_sparse(&samples) {
            Err(crate::FeatureFindingError::PreconditionViolated(
                PreconditionError::UnsortedSamples { index },
            )) => assert_eq!(index, 1),
            other => panic!("Expected unsorted error, got {:?}", other),
        }

        let duplicated = vec![
            SparseSample::new(2, 1, 1.0),
            SparseSample::new(2, 1, 1.0),
        ];
        assert!(build_watershed_map_sparse(&duplicated).is_err());
    }

    #[test]
    fn test_sparse_empty_input() -> Result<()> {
        let map = build_watershed_map_sparse(&[])?;
        assert!(map.is_empty());
        assert!(map.listed_points().is_empty());
        Ok(())
    }
}
