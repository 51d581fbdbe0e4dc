use serde::{
    Deserialize,
    Serialize,
};

use super::map::WatershedMap;
use super::point::{
    Direction,
    PointIndex,
};

/// Summary of a feature blob.
///
/// All scan bounds are inclusive. The apex profiles are indexed relative
/// to `scan_lc_min` / `scan_ims_min`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBlobStatistics {
    pub scan_lc_min: i32,
    pub scan_lc_max: i32,
    /// LC scan of the most intense point.
    pub scan_lc_rep: i32,
    pub scan_ims_min: i32,
    pub scan_ims_max: i32,
    /// IMS scan of the most intense point.
    pub scan_ims_rep: i32,
    pub intensity_max: f64,
    pub sum_intensities: f64,
    pub num_points: usize,
    pub is_saturated: bool,
    /// Size: scan_lc_max - scan_lc_min + 1
    pub lc_apex_profile: Vec<f32>,
    /// Size: scan_ims_max - scan_ims_min + 1
    pub ims_apex_profile: Vec<f32>,
}

impl FeatureBlobStatistics {
    pub fn lc_length(&self) -> usize {
        (self.scan_lc_max - self.scan_lc_min + 1) as usize
    }

    pub fn ims_length(&self) -> usize {
        (self.scan_ims_max - self.scan_ims_min + 1) as usize
    }

    /// Summarizes the given member points.
    ///
    /// Returns `None` for an empty member list.
    pub(crate) fn from_members(members: &[PointIndex], map: &WatershedMap) -> Option<Self> {
        if members.is_empty() {
            return None;
        }

        let mut intensity_max = 0.0;
        let mut sum_intensities = 0.0;
        let mut scan_lc_min = i32::MAX;
        let mut scan_lc_max = i32::MIN;
        let mut scan_ims_min = i32::MAX;
        let mut scan_ims_max = i32::MIN;
        let mut apex = members[0];
        let mut is_saturated = false;

        for &idx in members {
            let point = map.point(idx);
            let scan_lc = point.scan_lc();
            let scan_ims = point.scan_ims();

            scan_lc_min = scan_lc_min.min(scan_lc);
            scan_lc_max = scan_lc_max.max(scan_lc);
            scan_ims_min = scan_ims_min.min(scan_ims);
            scan_ims_max = scan_ims_max.max(scan_ims);

            sum_intensities += point.intensity;
            // Strict comparison: the first of several equal maxima is the apex.
            if point.intensity > intensity_max {
                intensity_max = point.intensity;
                apex = idx;
            }
            is_saturated |= point.is_saturated;
        }

        let apex_point = map.point(apex);
        let mut out = Self {
            scan_lc_min,
            scan_lc_max,
            scan_lc_rep: apex_point.scan_lc(),
            scan_ims_min,
            scan_ims_max,
            scan_ims_rep: apex_point.scan_ims(),
            intensity_max,
            sum_intensities,
            num_points: members.len(),
            is_saturated,
            lc_apex_profile: Vec::new(),
            ims_apex_profile: Vec::new(),
        };
        out.compute_peak_profiles(apex, map);
        Some(out)
    }

    /// Fills the apex profiles by walking the links out of the apex.
    ///
    /// The walk only follows South/North (LC) and West/East (IMS) links, so
    /// positions that cannot be reached through consecutive links stay at 0.
    fn compute_peak_profiles(&mut self, apex: PointIndex, map: &WatershedMap) {
        let lc_min = self.scan_lc_min;
        let ims_min = self.scan_ims_min;

        self.lc_apex_profile = vec![0.0; self.lc_length()];
        walk_profile(
            map,
            apex,
            Direction::South,
            Direction::North,
            |p| p.scan_lc() - lc_min,
            &mut self.lc_apex_profile,
        );

        self.ims_apex_profile = vec![0.0; self.ims_length()];
        walk_profile(
            map,
            apex,
            Direction::West,
            Direction::East,
            |p| p.scan_ims() - ims_min,
            &mut self.ims_apex_profile,
        );
    }
}

fn walk_profile(
    map: &WatershedMap,
    apex: PointIndex,
    backward: Direction,
    forward: Direction,
    position: impl Fn(&super::point::GridPoint) -> i32,
    profile: &mut [f32],
) {
    let len = profile.len() as i32;

    let mut current = Some(apex);
    while let Some(idx) = current {
        let point = map.point(idx);
        let pos = position(point);
        if pos < 0 || pos >= len {
            break;
        }
        profile[pos as usize] = point.intensity as f32;
        current = point.neighbor(backward);
    }

    current = map.neighbor(apex, forward);
    while let Some(idx) = current {
        let point = map.point(idx);
        let pos = position(point);
        if pos < 0 || pos >= len {
            break;
        }
        profile[pos as usize] = point.intensity as f32;
        current = point.neighbor(forward);
    }
}
