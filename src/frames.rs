//! Representative frame grabs: beginning, middle and end of each scene.

use crate::engine::MediaEngine;
use crate::scenes::Scene;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Offset from the scene edges, capped so short scenes don't sample past the cut.
pub const MAX_EDGE_OFFSET: f64 = 0.5;
pub const EDGE_OFFSET_RATIO: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Beginning,
    Middle,
    End,
}

impl Position {
    pub const ALL: [Position; 3] = [Position::Beginning, Position::Middle, Position::End];

    pub fn as_str(self) -> &'static str {
        match self {
            Position::Beginning => "beginning",
            Position::Middle => "middle",
            Position::End => "end",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Screenshot {
    pub scene_number: u32,
    pub position: Position,
    pub timestamp: f64,
    pub path: PathBuf,
}

impl Screenshot {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// `scene_<NNN>_<position>.png`
pub fn frame_file_name(scene_number: u32, position: Position) -> String {
    format!("scene_{:03}_{}.png", scene_number, position)
}

pub fn sample_points(scene: &Scene) -> [(Position, f64); 3] {
    let len = scene.duration();
    let offset = MAX_EDGE_OFFSET.min(len * EDGE_OFFSET_RATIO);
    [
        (Position::Beginning, scene.start + offset),
        (Position::Middle, scene.start + len / 2.0),
        (Position::End, scene.end - offset),
    ]
}

/// Grabs up to three frames for `scene` into `scenes_dir`.
///
/// A failed grab (tool error or no file written) drops that position only.
pub fn extract(
    engine: &dyn MediaEngine,
    video: &Path,
    scene: &Scene,
    scenes_dir: &Path,
) -> Vec<Screenshot> {
    let mut shots = Vec::with_capacity(3);
    for (position, timestamp) in sample_points(scene) {
        let path = scenes_dir.join(frame_file_name(scene.number, position));
        if let Err(err) = engine.grab_frame(video, timestamp, &path) {
            warn!(
                "scene {} {} frame at {:.2}s failed: {err:#}",
                scene.number, position, timestamp
            );
            continue;
        }
        if !path.is_file() {
            warn!(
                "scene {} {} frame at {:.2}s produced no file",
                scene.number, position, timestamp
            );
            continue;
        }
        shots.push(Screenshot {
            scene_number: scene.number,
            position,
            timestamp,
            path,
        });
    }
    shots
}
