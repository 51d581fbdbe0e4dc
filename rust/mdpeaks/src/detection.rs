//! Watershed segmentation of a linked point graph into feature blobs.
//!
//! Points are visited from the most to the least intense. A point with no
//! neighbor at least as intense seeds a new blob; otherwise it flows into the
//! blob of its more intense neighbors. Conflicts between blobs are resolved
//! in favor of the larger blob, and unresolvable ones (plus anything next to
//! background) become background.

use statrs::distribution::{
    ContinuousCDF,
    Gamma,
};
use tracing::{
    debug,
    info,
    warn,
};

use crate::models::{
    BlobId,
    Direction,
    FeatureBlob,
    PointIndex,
    WatershedMap,
};

/// Minimum CDF value of a blob seed under the fitted exponential.
pub const DEFAULT_FILTER_LEVEL: f64 = 0.995;
/// Minimum number of points a blob needs to be reported.
pub const DEFAULT_MIN_POINTS: usize = 25;

/// Classification of the neighbors of a point that are at least as
/// intense as the point itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HigherNeighborResult {
    /// No such neighbor has been assigned yet: the point is a local maximum.
    None,
    /// At least one of them is background.
    Background,
    /// They belong to a single blob, or one blob is strictly the largest.
    OneFeature(BlobId),
    /// They belong to several blobs tied for the largest size.
    MultipleFeatures,
}

/// Inspects the neighbors of `idx` with an intensity >= its own.
///
/// `blobs` are the blobs grown so far, indexed by id.
pub fn find_more_intense_neighbors(
    map: &WatershedMap,
    idx: PointIndex,
    blobs: &[FeatureBlob],
) -> HigherNeighborResult {
    let intensity = map.point(idx).intensity;
    let mut touched: Vec<BlobId> = Vec::with_capacity(Direction::ALL.len());

    for direction in Direction::ALL {
        let Some(neighbor_idx) = map.neighbor(idx, direction) else {
            continue;
        };
        let neighbor = map.point(neighbor_idx);
        if neighbor.intensity < intensity {
            continue;
        }
        if neighbor.is_background {
            return HigherNeighborResult::Background;
        }
        if let Some(id) = neighbor.blob() {
            if !touched.contains(&id) {
                touched.push(id);
            }
        }
    }

    match touched.as_slice() {
        [] => HigherNeighborResult::None,
        [only] => HigherNeighborResult::OneFeature(*only),
        many => {
            let size = |id: &BlobId| blobs[id.0 as usize].len();
            let largest = many.iter().map(size).max().unwrap_or(0);
            let mut at_largest = many.iter().filter(|id| size(*id) == largest);
            match (at_largest.next(), at_largest.next()) {
                (Some(id), None) => HigherNeighborResult::OneFeature(*id),
                _ => HigherNeighborResult::MultipleFeatures,
            }
        }
    }
}

/// Grows feature blobs over the listed points of the map.
///
/// Only listed points with a positive intensity take part. On return every
/// one of them is either a member of exactly one blob or background.
/// Blobs are returned in seeding order, which is also descending order of
/// seed intensity, and their ids are their positions in the returned list.
#[tracing::instrument(level = "debug", skip_all)]
pub fn do_watershed_algorithm(map: &mut WatershedMap) -> Vec<FeatureBlob> {
    reset_assignments(map);

    let mut order: Vec<PointIndex> = map
        .listed_points()
        .iter()
        .copied()
        .filter(|&idx| map.point(idx).intensity > 0.0)
        .collect();
    // Stable, so equal intensities keep their listing order.
    order.sort_by(|&a, &b| {
        map.point(b)
            .intensity
            .total_cmp(&map.point(a).intensity)
    });

    let mut blobs: Vec<FeatureBlob> = Vec::new();
    let mut num_background = 0;

    for idx in order {
        match find_more_intense_neighbors(map, idx, &blobs) {
            HigherNeighborResult::None => {
                let id = BlobId(blobs.len() as u32);
                blobs.push(FeatureBlob::new(id, idx));
                map.point_mut(idx).blob = Some(id);
            }
            HigherNeighborResult::OneFeature(id) => {
                blobs[id.0 as usize].push(idx);
                map.point_mut(idx).blob = Some(id);
            }
            HigherNeighborResult::Background | HigherNeighborResult::MultipleFeatures => {
                map.point_mut(idx).is_background = true;
                num_background += 1;
            }
        }
    }

    debug!(
        "Watershed produced {} blobs and {} background points",
        blobs.len(),
        num_background
    );
    blobs
}

fn reset_assignments(map: &mut WatershedMap) {
    let listed = map.listed_points().to_vec();
    for idx in listed {
        let point = map.point_mut(idx);
        point.blob = None;
        point.is_background = false;
    }
}

/// Drops blobs whose seed is not intense enough or that are too small.
///
/// Seed intensities are modeled as exponentially distributed (a Gamma with
/// shape 1) around their mean. Blobs are walked in order and kept while
/// the CDF at their seed intensity is at least `filter_level`; the walk
/// stops at the first failure, so this expects blobs sorted by descending
/// seed intensity (as [do_watershed_algorithm] returns them).
/// The surviving blobs then need at least `min_points` members.
///
/// A mean seed intensity that is not positive skips the intensity filter.
pub fn filter_feature_list(
    blobs: Vec<FeatureBlob>,
    map: &WatershedMap,
    filter_level: f64,
    min_points: usize,
) -> Vec<FeatureBlob> {
    if blobs.is_empty() {
        return blobs;
    }

    let num_raw = blobs.len();
    let seed_intensity = |blob: &FeatureBlob| map.point(blob.seed()).intensity;
    let mean = blobs.iter().map(seed_intensity).sum::<f64>() / num_raw as f64;

    let distribution = if mean > 0.0 && mean.is_finite() {
        match Gamma::new(1.0, 1.0 / mean) {
            Ok(dist) => Some(dist),
            Err(e) => {
                warn!("Unable to fit seed intensity distribution (mean {}): {}", mean, e);
                None
            }
        }
    } else {
        warn!(
            "Mean seed intensity is {}, skipping the intensity filter",
            mean
        );
        None
    };

    let passing: Vec<FeatureBlob> = match distribution {
        Some(dist) => blobs
            .into_iter()
            .take_while(|blob| dist.cdf(seed_intensity(blob)) >= filter_level)
            .collect(),
        None => blobs,
    };
    let num_passing = passing.len();

    let out: Vec<FeatureBlob> = passing
        .into_iter()
        .filter(|blob| blob.len() >= min_points)
        .collect();

    debug!(
        "Filtered blobs: {} raw, {} above intensity level {}, {} with >= {} points",
        num_raw,
        num_passing,
        filter_level,
        out.len(),
        min_points
    );
    out
}

/// Segments the map and filters the resulting blobs.
pub fn detect_features(
    map: &mut WatershedMap,
    filter_level: f64,
    min_points: usize,
) -> Vec<FeatureBlob> {
    let blobs = do_watershed_algorithm(map);
    let features = filter_feature_list(blobs, map, filter_level, min_points);
    info!("Detected {} features", features.len());
    features
}
