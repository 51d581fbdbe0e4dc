pub mod arrays;
pub mod blob;
pub mod map;
pub mod point;
pub mod statistics;

pub use arrays::Array2D;
pub use blob::{
    FeatureBlob,
    compute_statistics,
};
pub use map::WatershedMap;
pub use point::{
    BlobId,
    Direction,
    GridPoint,
    PointIndex,
    SparseSample,
};
pub use statistics::FeatureBlobStatistics;
