//! Multi-target feature finding.
//!
//! Every target (an extracted ion chromatogram query) goes through the same
//! steps: fetch intensities from an [IntensitySource], smooth, build the
//! watershed map, segment and filter. [FeatureFinder::find_features] runs
//! many targets in parallel, opening at most one reader handle per worker
//! thread.

use std::time::Instant;

use rayon::prelude::*;
use serde::{
    Deserialize,
    Serialize,
};
use tracing::{
    debug,
    info,
};

use crate::detection::{
    DEFAULT_FILTER_LEVEL,
    DEFAULT_MIN_POINTS,
    detect_features,
};
use crate::errors::{
    FeatureFindingError,
    Result,
};
use crate::models::{
    Array2D,
    FeatureBlob,
    FeatureBlobStatistics,
    SparseSample,
    WatershedMap,
};
use crate::smoothing::SavitzkyGolaySmoother;
use crate::watershed_map::{
    build_watershed_map_dense,
    build_watershed_map_sparse,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Number of points in the Savitzky-Golay window, odd and >= 3.
    pub window_size: usize,
    /// Degree of the fitted polynomial, smaller than `window_size`.
    pub polynomial_order: usize,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            window_size: 11,
            polynomial_order: 2,
        }
    }
}

/// How intensities are requested from an [IntensitySource].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum SourceLayout {
    #[serde(rename = "dense")]
    #[default]
    Dense,
    #[serde(rename = "sparse")]
    Sparse,
}

/// Configuration of a [FeatureFinder].
///
/// Example:
/// ```
/// use mdpeaks::pipeline::FeatureFinderConfig;
///
/// let config: FeatureFinderConfig =
///     serde_json::from_str(r#"{"min_points": 5, "smoothing": null}"#).unwrap();
/// assert_eq!(config.min_points, 5);
/// assert!(config.smoothing.is_none());
/// assert_eq!(config.filter_level, 0.995);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeatureFinderConfig {
    /// Smoothing applied before segmentation, `None` disables it.
    pub smoothing: Option<SmoothingConfig>,
    /// Minimum exponential CDF value of a blob seed, in [0, 1].
    pub filter_level: f64,
    /// Minimum number of points of a reported blob.
    pub min_points: usize,
    pub layout: SourceLayout,
    /// Worker threads for multi-target runs, 0 uses rayon's default.
    pub num_threads: usize,
}

impl Default for FeatureFinderConfig {
    fn default() -> Self {
        Self {
            smoothing: Some(SmoothingConfig::default()),
            filter_level: DEFAULT_FILTER_LEVEL,
            min_points: DEFAULT_MIN_POINTS,
            layout: SourceLayout::Dense,
            num_threads: 0,
        }
    }
}

impl FeatureFinderConfig {
    pub fn validate(&self) -> Result<()> {
        self.build_smoother().map(|_| ())
    }

    fn build_smoother(&self) -> Result<Option<SavitzkyGolaySmoother>> {
        if !(0.0..=1.0).contains(&self.filter_level) {
            return Err(FeatureFindingError::invalid_parameter(
                "filter_level",
                self.filter_level,
                "Filter level must be between 0 and 1",
            ));
        }
        self.smoothing
            .as_ref()
            .map(|s| SavitzkyGolaySmoother::new(s.window_size, s.polynomial_order))
            .transpose()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum MzTolerance {
    #[serde(rename = "da")]
    Absolute(f64),
    #[serde(rename = "ppm")]
    Ppm(f64),
}

impl MzTolerance {
    /// Inclusive (low, high) m/z window around `mz`.
    pub fn range(&self, mz: f64) -> (f64, f64) {
        let delta = match self {
            MzTolerance::Absolute(da) => *da,
            MzTolerance::Ppm(ppm) => mz * ppm / 1e6,
        };
        (mz - delta, mz + delta)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FrameType {
    Ms1,
    Ms2,
    Calibration,
    Prescan,
}

/// What a query extracts from the instrument data.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum XicTarget {
    #[serde(rename = "mz")]
    Mz { mz: f64, tolerance: MzTolerance },
    /// A bin index already resolved by the reader, no m/z conversion involved.
    #[serde(rename = "bin")]
    Bin(i32),
}

/// One target: an extracted ion chromatogram in the (LC, IMS) plane.
///
/// Example:
/// ```
/// use mdpeaks::pipeline::{FrameType, XicQuery, XicTarget};
///
/// let query: XicQuery =
///     serde_json::from_str(r#"{"target": {"bin": 4021}, "frame_type": "Ms1"}"#).unwrap();
/// assert_eq!(query, XicQuery::bin(4021, FrameType::Ms1));
/// assert!(query.mz_range().is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct XicQuery {
    pub target: XicTarget,
    pub frame_type: FrameType,
}

impl XicQuery {
    pub fn mz(mz: f64, tolerance: MzTolerance, frame_type: FrameType) -> Self {
        Self {
            target: XicTarget::Mz { mz, tolerance },
            frame_type,
        }
    }

    pub fn bin(bin: i32, frame_type: FrameType) -> Self {
        Self {
            target: XicTarget::Bin(bin),
            frame_type,
        }
    }

    /// m/z window of the query, `None` for bin targets.
    pub fn mz_range(&self) -> Option<(f64, f64)> {
        match self.target {
            XicTarget::Mz { mz, tolerance } => Some(tolerance.range(mz)),
            XicTarget::Bin(_) => None,
        }
    }
}

/// Dense intensities of one target.
///
/// Rows are LC scans starting at `lc_min`, columns IMS scans starting
/// at `ims_min`.
#[derive(Debug, Clone, PartialEq)]
pub struct IntensityBlock {
    pub values: Array2D<f64>,
    pub lc_min: i32,
    pub ims_min: i32,
}

/// A reader handle on instrument data.
///
/// Handles are not shared between threads; [FeatureFinder::find_features]
/// opens at most one per worker thread and reuses it for a contiguous run
/// of targets.
pub trait IntensitySource {
    fn intensity_block(&mut self, query: &XicQuery) -> Result<IntensityBlock>;

    /// Non-zero samples sorted ascending by (scan_lc, scan_ims).
    fn intensity_points(&mut self, query: &XicQuery) -> Result<Vec<SparseSample>>;
}

/// Segmentation result of one target.
///
/// Blobs refer to points of `map` by index.
#[derive(Debug)]
pub struct DetectedFeatures {
    pub map: WatershedMap,
    pub blobs: Vec<FeatureBlob>,
}

impl DetectedFeatures {
    pub fn statistics(&self) -> Vec<&FeatureBlobStatistics> {
        self.blobs
            .iter()
            .map(|blob| blob.statistics(&self.map))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct FeatureFinder {
    config: FeatureFinderConfig,
    smoother: Option<SavitzkyGolaySmoother>,
}

impl FeatureFinder {
    pub fn new(config: FeatureFinderConfig) -> Result<Self> {
        let smoother = config.build_smoother()?;
        Ok(Self { config, smoother })
    }

    pub fn config(&self) -> &FeatureFinderConfig {
        &self.config
    }

    /// Smooths the block, then segments it.
    pub fn find_in_block(&self, block: IntensityBlock) -> DetectedFeatures {
        let IntensityBlock {
            mut values,
            lc_min,
            ims_min,
        } = block;
        if let Some(smoother) = &self.smoother {
            smoother.smooth_array(&mut values);
        }
        let map = build_watershed_map_dense(&values, lc_min, ims_min);
        self.detect(map)
    }

    /// Builds the graph from sorted samples, smooths it and segments it.
    pub fn find_in_points(&self, samples: &[SparseSample]) -> Result<DetectedFeatures> {
        let mut map = build_watershed_map_sparse(samples)?;
        if let Some(smoother) = &self.smoother {
            smoother.smooth_points(&mut map);
        }
        Ok(self.detect(map))
    }

    fn detect(&self, mut map: WatershedMap) -> DetectedFeatures {
        let blobs = detect_features(&mut map, self.config.filter_level, self.config.min_points);
        DetectedFeatures { map, blobs }
    }

    /// Fetches one target from `source` and segments it.
    #[tracing::instrument(level = "debug", skip_all, fields(target = ?query.target))]
    pub fn find_for_query<S: IntensitySource>(
        &self,
        source: &mut S,
        query: &XicQuery,
    ) -> Result<DetectedFeatures> {
        let detected = match self.config.layout {
            SourceLayout::Dense => {
                let block = source.intensity_block(query)?;
                self.find_in_block(block)
            }
            SourceLayout::Sparse => {
                let samples = source.intensity_points(query)?;
                self.find_in_points(&samples)?
            }
        };
        debug!("Found {} features", detected.len());
        Ok(detected)
    }

    /// Runs every query on a pool of `num_threads` workers.
    ///
    /// Queries are split into one contiguous chunk per worker and
    /// `make_source` is called once per chunk, so no more reader handles are
    /// open than there are threads. Results are in query order; any error
    /// aborts the batch and is returned.
    pub fn find_features<S, F>(
        &self,
        queries: &[XicQuery],
        make_source: F,
    ) -> Result<Vec<DetectedFeatures>>
    where
        S: IntensitySource,
        F: Fn() -> S + Sync + Send,
    {
        let start = Instant::now();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.num_threads)
            .build()?;

        let num_threads = pool.current_num_threads();
        let chunk_size = queries.len().div_ceil(num_threads).max(1);

        let chunked: Result<Vec<Vec<DetectedFeatures>>> = pool.install(|| {
            queries
                .par_chunks(chunk_size)
                .map(|chunk| -> Result<Vec<DetectedFeatures>> {
                    let mut source = make_source();
                    chunk
                        .iter()
                        .map(|query| self.find_for_query(&mut source, query))
                        .collect()
                })
                .collect()
        });
        let results: Vec<DetectedFeatures> = chunked?.into_iter().flatten().collect();

        let num_features: usize = results.iter().map(|x| x.len()).sum();
        info!(
            "Found {} features across {} queries in {:?} using {} threads",
            num_features,
            queries.len(),
            start.elapsed(),
            num_threads
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PreconditionError;

    fn peak_block(height: f64, lc_min: i32, ims_min: i32) -> Result<IntensityBlock> {
        // 7x7 pyramid, every point flows to the center
        let values: Vec<f64> = (0..7)
            .flat_map(|r: i32| {
                (0..7).map(move |c: i32| height / (1 + (r - 3).abs().max((c - 3).abs())) as f64)
            })
            .collect();
        Ok(IntensityBlock {
            values: Array2D::from_flat_vector(values, 7, 7)?,
            lc_min,
            ims_min,
        })
    }

    fn lenient_config() -> FeatureFinderConfig {
        FeatureFinderConfig {
            smoothing: None,
            filter_level: 0.0,
            min_points: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = FeatureFinderConfig::default();
        assert_eq!(config.filter_level, 0.995);
        assert_eq!(config.min_points, 25);
        assert_eq!(config.smoothing, Some(SmoothingConfig::default()));
        assert_eq!(config.layout, SourceLayout::Dense);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_json() {
        let config: FeatureFinderConfig = serde_json::from_str(
            r#"{
                "smoothing": {"window_size": 5},
                "filter_level": 0.9,
                "layout": "sparse",
                "num_threads": 2
            }"#,
        )
        .unwrap();
        assert_eq!(
            config.smoothing,
            Some(SmoothingConfig {
                window_size: 5,
                polynomial_order: 2
            })
        );
        assert_eq!(config.filter_level, 0.9);
        assert_eq!(config.min_points, 25);
        assert_eq!(config.layout, SourceLayout::Sparse);
        assert_eq!(config.num_threads, 2);
    }

    #[test]
    fn test_invalid_config() {
        let mut config = FeatureFinderConfig {
            filter_level: 1.5,
            ..Default::default()
        };
        match FeatureFinder::new(config.clone()) {
            Err(FeatureFindingError::InvalidParameter { name, .. }) => {
                assert_eq!(name, "filter_level")
            }
            other => panic!("Expected an invalid filter level, got {:?}", other),
        }

        config.filter_level = 0.5;
        config.smoothing = Some(SmoothingConfig {
            window_size: 4,
            polynomial_order: 2,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tolerance_ranges() {
        let (low, high) = MzTolerance::Absolute(0.01).range(500.0);
        assert!((low - 499.99).abs() < 1e-9);
        assert!((high - 500.01).abs() < 1e-9);

        let query = XicQuery::mz(1000.0, MzTolerance::Ppm(20.0), FrameType::Ms1);
        let (low, high) = query.mz_range().unwrap();
        assert!((low - 999.98).abs() < 1e-9);
        assert!((high - 1000.02).abs() < 1e-9);

        let parsed: MzTolerance = serde_json::from_str(r#"{"ppm": 15.0}"#).unwrap();
        assert_eq!(parsed, MzTolerance::Ppm(15.0));

        assert!(XicQuery::bin(12, FrameType::Ms2).mz_range().is_none());
    }

    #[test]
    fn test_query_targets_from_json() {
        let queries: Vec<XicQuery> = serde_json::from_str(
            r#"[
                {"target": {"mz": {"mz": 650.5, "tolerance": {"da": 0.02}}}, "frame_type": "Ms1"},
                {"target": {"bin": 88012}, "frame_type": "Ms2"}
            ]"#,
        )
        .unwrap();
        assert_eq!(
            queries,
            vec![
                XicQuery::mz(650.5, MzTolerance::Absolute(0.02), FrameType::Ms1),
                XicQuery::bin(88012, FrameType::Ms2),
            ]
        );
    }

    #[test]
    fn test_find_in_block_applies_offsets() -> Result<()> {
        let finder = FeatureFinder::new(lenient_config())?;
        let detected = finder.find_in_block(peak_block(100.0, 40, 300)?);
        assert_eq!(detected.len(), 1);
        let stats = detected.statistics()[0];
        assert_eq!(stats.num_points, 49);
        assert_eq!((stats.scan_lc_rep, stats.scan_ims_rep), (43, 303));
        assert_eq!((stats.scan_lc_min, stats.scan_lc_max), (40, 46));
        Ok(())
    }

    #[test]
    fn test_find_in_points_rejects_unsorted() -> Result<()> {
        let finder = FeatureFinder::new(lenient_config())?;
        let samples = vec![
            SparseSample::new(1, 1, 5.0),
            SparseSample::new(0, 1, 3.0),
        ];
        match finder.find_in_points(&samples) {
            Err(FeatureFindingError::PreconditionViolated(PreconditionError::UnsortedSamples {
                index,
            })) => assert_eq!(index, 1),
            other => panic!("Expected unsorted samples, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_smoothing_keeps_single_peak() -> Result<()> {
        let config = FeatureFinderConfig {
            smoothing: Some(SmoothingConfig {
                window_size: 3,
                polynomial_order: 1,
            }),
            ..lenient_config()
        };
        let finder = FeatureFinder::new(config)?;
        let detected = finder.find_in_block(peak_block(100.0, 0, 0)?);
        assert!(!detected.is_empty());
        // The most intense seed comes first
        let stats = detected.statistics()[0];
        assert_eq!((stats.scan_lc_rep, stats.scan_ims_rep), (3, 3));
        Ok(())
    }
}
