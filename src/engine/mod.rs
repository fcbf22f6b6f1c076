pub mod ffmpeg;
pub mod types;

use anyhow::Result;
use std::path::Path;

pub use types::{ProbeOut, ToolDiag};

/// Seam over the external video tooling (decode, scene metric, frame grab).
pub trait MediaEngine: Send + Sync {
    fn doctor(&self) -> Result<ToolDiag>;
    fn probe_duration(&self, video: &Path) -> Result<f64>;
    /// Runs change detection at `threshold` and returns the raw diagnostic stream.
    fn scene_changes(&self, video: &Path, threshold: f64) -> Result<String>;
    /// Writes one frame at `timestamp` seconds to `out`.
    fn grab_frame(&self, video: &Path, timestamp: f64, out: &Path) -> Result<()>;
}
