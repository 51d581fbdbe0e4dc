#![doc = include_str!("../README.md")]

// Re-export main structures
pub use crate::models::{
    Array2D,
    BlobId,
    Direction,
    FeatureBlob,
    FeatureBlobStatistics,
    GridPoint,
    PointIndex,
    SparseSample,
    WatershedMap,
    compute_statistics,
};
pub use crate::pipeline::{
    DetectedFeatures,
    FeatureFinder,
    FeatureFinderConfig,
    IntensitySource,
};
pub use crate::smoothing::SavitzkyGolaySmoother;

// Declare modules
pub mod detection;
pub mod errors;
pub mod models;
pub mod pipeline;
pub mod smoothing;
pub mod watershed_map;

pub use crate::detection::{
    HigherNeighborResult,
    detect_features,
    do_watershed_algorithm,
    filter_feature_list,
};
pub use crate::watershed_map::{
    build_watershed_map_dense,
    build_watershed_map_sparse,
};

// Re-export errors
pub use crate::errors::{
    FeatureFindingError,
    PreconditionError,
    Result,
};
