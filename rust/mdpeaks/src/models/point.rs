use serde::{
    Deserialize,
    Serialize,
};

/// Position of a [GridPoint] inside the arena of a [crate::WatershedMap].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointIndex(pub(crate) usize);

impl PointIndex {
    pub fn as_usize(&self) -> usize {
        self.0
    }
}

/// Identifier of a feature blob, unique within one segmentation run.
///
/// Ids are handed out sequentially as blobs are seeded, so a smaller id
/// always means a more intense (or equally intense, earlier) seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlobId(pub u32);

/// The 8 neighbor directions of a grid point.
///
/// North/South move along the LC axis (+1/-1 LC scan) and
/// East/West along the IMS axis (+1/-1 IMS scan).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    North,
    South,
    East,
    West,
    NorthEast,
    NorthWest,
    SouthEast,
    SouthWest,
}

impl Direction {
    /// All directions, in the order neighbors are inspected during segmentation.
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
        Direction::NorthEast,
        Direction::NorthWest,
        Direction::SouthEast,
        Direction::SouthWest,
    ];

    pub fn opposite(&self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::East => Direction::West,
            Direction::West => Direction::East,
            Direction::NorthEast => Direction::SouthWest,
            Direction::NorthWest => Direction::SouthEast,
            Direction::SouthEast => Direction::NorthWest,
            Direction::SouthWest => Direction::NorthEast,
        }
    }

    /// (lc delta, ims delta) of a step in this direction.
    pub fn offset(&self) -> (i32, i32) {
        match self {
            Direction::North => (1, 0),
            Direction::South => (-1, 0),
            Direction::East => (0, 1),
            Direction::West => (0, -1),
            Direction::NorthEast => (1, 1),
            Direction::NorthWest => (1, -1),
            Direction::SouthEast => (-1, 1),
            Direction::SouthWest => (-1, -1),
        }
    }

    fn slot(&self) -> usize {
        match self {
            Direction::North => 0,
            Direction::South => 1,
            Direction::East => 2,
            Direction::West => 3,
            Direction::NorthEast => 4,
            Direction::NorthWest => 5,
            Direction::SouthEast => 6,
            Direction::SouthWest => 7,
        }
    }
}

/// One sample in the (LC scan, IMS scan) plane.
///
/// Neighbor links are plain arena indices; the owning
/// [crate::WatershedMap] holds every point.
#[derive(Debug, Clone, PartialEq)]
pub struct GridPoint {
    pub lc_index: i32,
    pub lc_offset: i32,
    pub ims_index: i32,
    pub ims_offset: i32,
    pub intensity: f64,
    pub is_background: bool,
    pub is_saturated: bool,
    pub(crate) blob: Option<BlobId>,
    pub(crate) neighbors: [Option<PointIndex>; 8],
}

impl GridPoint {
    pub fn new(
        lc_index: i32,
        lc_offset: i32,
        ims_index: i32,
        ims_offset: i32,
        intensity: f64,
        is_saturated: bool,
    ) -> Self {
        Self {
            lc_index,
            lc_offset,
            ims_index,
            ims_offset,
            intensity,
            is_background: false,
            is_saturated,
            blob: None,
            neighbors: [None; 8],
        }
    }

    pub fn scan_lc(&self) -> i32 {
        self.lc_index + self.lc_offset
    }

    pub fn scan_ims(&self) -> i32 {
        self.ims_index + self.ims_offset
    }

    /// Blob this point was assigned to during segmentation, if any.
    pub fn blob(&self) -> Option<BlobId> {
        self.blob
    }

    pub fn neighbor(&self, direction: Direction) -> Option<PointIndex> {
        self.neighbors[direction.slot()]
    }

    pub(crate) fn set_neighbor(&mut self, direction: Direction, idx: PointIndex) {
        self.neighbors[direction.slot()] = Some(idx);
    }
}

/// A non-zero sample as handed out by an instrument reader.
///
/// Lists of these must be sorted ascending by (scan_lc, scan_ims).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SparseSample {
    pub scan_lc: i32,
    pub scan_ims: i32,
    pub intensity: f64,
    #[serde(default)]
    pub is_saturated: bool,
}

impl SparseSample {
    pub fn new(scan_lc: i32, scan_ims: i32, intensity: f64) -> Self {
        Self {
            scan_lc,
            scan_ims,
            intensity,
            is_saturated: false,
        }
    }

    pub(crate) fn coords(&self) -> (i32, i32) {
        (self.scan_lc, self.scan_ims)
    }
}
