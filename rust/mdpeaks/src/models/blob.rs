use std::hash::{
    Hash,
    Hasher,
};
use std::sync::OnceLock;

use super::arrays::Array2D;
use super::map::WatershedMap;
use super::point::{
    BlobId,
    PointIndex,
};
use super::statistics::FeatureBlobStatistics;

/// A contiguous region grown from a single local maximum.
///
/// Members are kept in discovery order, so the first member is always
/// the seed (the local maximum the blob was grown from).
///
/// Blobs only hold indices into the [WatershedMap] they were detected on;
/// every method that needs coordinates or intensities takes that map.
#[derive(Debug)]
pub struct FeatureBlob {
    id: BlobId,
    members: Vec<PointIndex>,
    statistics: OnceLock<FeatureBlobStatistics>,
}

impl FeatureBlob {
    pub(crate) fn new(id: BlobId, seed: PointIndex) -> Self {
        Self {
            id,
            members: vec![seed],
            statistics: OnceLock::new(),
        }
    }

    pub(crate) fn push(&mut self, idx: PointIndex) {
        self.members.push(idx);
    }

    pub fn id(&self) -> BlobId {
        self.id
    }

    pub fn members(&self) -> &[PointIndex] {
        &self.members
    }

    pub fn seed(&self) -> PointIndex {
        self.members[0]
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Statistics of this blob, computed on first access and cached.
    ///
    /// `map` must be the map the blob was detected on.
    pub fn statistics(&self, map: &WatershedMap) -> &FeatureBlobStatistics {
        self.statistics
            .get_or_init(|| compute_statistics(self, map))
    }

    /// Renders the blob into its bounding box.
    ///
    /// Rows are LC scans starting at `scan_lc_min`, columns are IMS scans
    /// starting at `scan_ims_min`. Positions not covered by the blob are 0.
    pub fn to_array(&self, map: &WatershedMap) -> Array2D<f64> {
        let stats = self.statistics(map);
        let mut out = Array2D::filled(stats.lc_length(), stats.ims_length(), 0.0)
            .expect("A blob always spans at least one scan in each dimension");

        for &idx in &self.members {
            let point = map.point(idx);
            let row = (point.scan_lc() - stats.scan_lc_min) as usize;
            let col = (point.scan_ims() - stats.scan_ims_min) as usize;
            out.insert(row, col, point.intensity);
        }
        out
    }
}

/// Uncached statistics of a blob.
pub fn compute_statistics(blob: &FeatureBlob, map: &WatershedMap) -> FeatureBlobStatistics {
    FeatureBlobStatistics::from_members(&blob.members, map)
        .expect("Blobs are created with their seed and never emptied")
}

impl PartialEq for FeatureBlob {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for FeatureBlob {}

impl Hash for FeatureBlob {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
