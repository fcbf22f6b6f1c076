//! Scene boundary detection.
//!
//! Automatic change detection is tried first. Its output is only accepted when
//! it yields a sane number of scenes; anything else (tool missing, crash,
//! garbage output, too few or too many cuts) falls back to a deterministic
//! uniform split whose scene count depends on the video duration.

use crate::engine::MediaEngine;
use crate::error::{ServiceError, ServiceResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

/// Minimum scene count for a detection result to be trusted.
pub const MIN_DETECTED_SCENES: usize = 2;
/// Change timestamps closer than this are treated as the same cut.
pub const BOUNDARY_EPSILON: f64 = 1e-6;

static PTS_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"pts_time:\s*(-?[0-9]+(?:\.[0-9]*)?(?:[eE][-+]?[0-9]+)?)").expect("static regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// 1-based, contiguous.
    pub number: u32,
    pub start: f64,
    pub end: f64,
}

impl Scene {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectParams {
    pub threshold: f64,
    pub max_scenes: u32,
    pub min_scenes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundarySource {
    Detected,
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Boundaries {
    /// `0 = t[0] < t[1] < ... < t[n] = duration`.
    pub timestamps: Vec<f64>,
    pub source: BoundarySource,
    /// Why the detection result was discarded, when it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected: Option<String>,
}

impl Boundaries {
    pub fn scene_count(&self) -> usize {
        self.timestamps.len().saturating_sub(1)
    }

    pub fn scenes(&self) -> Vec<Scene> {
        self.timestamps
            .windows(2)
            .enumerate()
            .map(|(i, w)| Scene {
                number: i as u32 + 1,
                start: w[0],
                end: w[1],
            })
            .collect()
    }
}

/// Pulls every `pts_time:<seconds>` value out of the tool's diagnostic stream.
pub fn parse_change_timestamps(raw: &str) -> Vec<f64> {
    PTS_TIME
        .captures_iter(raw)
        .filter_map(|c| c.get(1))
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .filter(|t| t.is_finite())
        .collect()
}

/// `[0, changes inside (0, duration)..., duration]`, sorted and deduplicated.
///
/// Changes within [`BOUNDARY_EPSILON`] of either end are dropped, so the list
/// always starts at exactly `0` and ends at exactly `duration`.
pub fn boundaries_from_changes(changes: &[f64], duration: f64) -> Vec<f64> {
    let mut interior: Vec<f64> = changes
        .iter()
        .copied()
        .filter(|&t| t > BOUNDARY_EPSILON && t < duration - BOUNDARY_EPSILON)
        .collect();
    interior.sort_by(f64::total_cmp);
    interior.dedup_by(|a, b| (*a - *b).abs() < BOUNDARY_EPSILON);

    let mut out = Vec::with_capacity(interior.len() + 2);
    out.push(0.0);
    out.extend(interior);
    out.push(duration);
    out
}

/// Duration-tiered scene count for the uniform split.
pub fn fallback_scene_count(duration: f64, min_scenes: u32, max_scenes: u32) -> u32 {
    let max_scenes = max_scenes.max(1);
    let n = if duration > 15.0 {
        min_scenes.max(3).min(max_scenes)
    } else if duration > 10.0 {
        min_scenes.min(max_scenes)
    } else {
        ((duration / 5.0).floor() as u32).min(max_scenes)
    };
    n.max(1)
}

/// `i * duration / n` for `i` in `0..n`, closed with `duration`.
pub fn fallback_boundaries(duration: f64, min_scenes: u32, max_scenes: u32) -> Vec<f64> {
    let n = fallback_scene_count(duration, min_scenes, max_scenes);
    let mut out: Vec<f64> = (0..n).map(|i| i as f64 * duration / n as f64).collect();
    out.push(duration);
    out
}

fn check_detected(timestamps: &[f64], max_scenes: u32) -> Result<(), String> {
    let scenes = timestamps.len().saturating_sub(1);
    if scenes < MIN_DETECTED_SCENES {
        return Err(format!("detection produced {scenes} scene(s)"));
    }
    if scenes > max_scenes as usize {
        return Err(format!("detection produced {scenes} scenes (max {max_scenes})"));
    }
    Ok(())
}

/// Returns at least two boundaries for any positive duration.
///
/// A non-positive or non-finite duration is reported as
/// [`ServiceError::DurationUnknown`]; there is nothing meaningful to split.
pub fn detect(
    engine: &dyn MediaEngine,
    video: &Path,
    duration: f64,
    params: &DetectParams,
) -> ServiceResult<Boundaries> {
    if !duration.is_finite() || duration <= 0.0 {
        return Err(ServiceError::DurationUnknown);
    }
    let max_scenes = params.max_scenes.max(1);

    let rejected = match engine.scene_changes(video, params.threshold) {
        Ok(raw) => {
            let changes = parse_change_timestamps(&raw);
            debug!("scene changes at {:?}", changes);
            let timestamps = boundaries_from_changes(&changes, duration);
            match check_detected(&timestamps, max_scenes) {
                Ok(()) => {
                    info!(
                        "detected {} scenes at threshold {}",
                        timestamps.len() - 1,
                        params.threshold
                    );
                    return Ok(Boundaries {
                        timestamps,
                        source: BoundarySource::Detected,
                        rejected: None,
                    });
                }
                Err(reason) => reason,
            }
        }
        Err(err) => format!("{err:#}"),
    };

    warn!("scene detection unusable ({rejected}); using uniform split");
    Ok(Boundaries {
        timestamps: fallback_boundaries(duration, params.min_scenes, max_scenes),
        source: BoundarySource::Fallback,
        rejected: Some(rejected),
    })
}
