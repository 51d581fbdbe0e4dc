use super::point::{
    Direction,
    GridPoint,
    PointIndex,
};

/// Arena holding every point of one 8-connected intensity grid.
///
/// Besides the points themselves it keeps the "listed" points: the ones
/// handed to smoothing and segmentation (all positive points of a dense
/// block, or every sample of a sparse list), in construction order.
/// Unlisted points (zero-intensity padding of dense blocks) still take part
/// in the neighbor links.
#[derive(Debug, Clone, Default)]
pub struct WatershedMap {
    points: Vec<GridPoint>,
    listed: Vec<PointIndex>,
}

impl WatershedMap {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
            listed: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, point: GridPoint) -> PointIndex {
        self.points.push(point);
        PointIndex(self.points.len() - 1)
    }

    pub(crate) fn push_listed(&mut self, idx: PointIndex) {
        self.listed.push(idx);
    }

    /// Sets `from -> to` in `direction` and the back-link `to -> from`.
    pub(crate) fn link(&mut self, from: PointIndex, direction: Direction, to: PointIndex) {
        self.points[from.0].set_neighbor(direction, to);
        self.points[to.0].set_neighbor(direction.opposite(), from);
    }

    pub fn point(&self, idx: PointIndex) -> &GridPoint {
        &self.points[idx.0]
    }

    pub fn point_mut(&mut self, idx: PointIndex) -> &mut GridPoint {
        &mut self.points[idx.0]
    }

    pub fn neighbor(&self, idx: PointIndex, direction: Direction) -> Option<PointIndex> {
        self.points[idx.0].neighbor(direction)
    }

    pub fn listed_points(&self) -> &[PointIndex] {
        &self.listed
    }

    /// Finds a point by its scan coordinates (linear scan).
    pub fn find(&self, scan_lc: i32, scan_ims: i32) -> Option<PointIndex> {
        self.points
            .iter()
            .position(|p| p.scan_lc() == scan_lc && p.scan_ims() == scan_ims)
            .map(PointIndex)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PointIndex, &GridPoint)> {
        self.points
            .iter()
            .enumerate()
            .map(|(i, p)| (PointIndex(i), p))
    }

    pub(crate) fn intensities(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.intensity).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
