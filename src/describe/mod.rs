pub mod noop;
pub mod vision;

pub use noop::NoopDescriber;
pub use vision::VisionClient;

use crate::frames::Screenshot;
use crate::report::SceneEntry;
use crate::scenes::Scene;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;
use unicode_normalization::UnicodeNormalization;

#[derive(Debug, thiserror::Error)]
pub enum DescribeError {
    #[error("vision service not configured: {0}")]
    NotConfigured(String),
    #[error("request failed: {0}")]
    Http(String),
    #[error("request timed out")]
    Timeout,
    #[error("service returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("service returned an empty description")]
    EmptyResponse,
    #[error("reading frame {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Vision-capable description service. One call per scene, all frames attached.
pub trait Describer: Send + Sync {
    fn describe(&self, prompt: &str, images: &[&Path]) -> Result<String, DescribeError>;

    fn name(&self) -> &str;
}

impl<T: Describer + ?Sized> Describer for Box<T> {
    fn describe(&self, prompt: &str, images: &[&Path]) -> Result<String, DescribeError> {
        (**self).describe(prompt, images)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Vision client when enabled, the placeholder describer otherwise.
pub fn from_config(cfg: &crate::config::Vision) -> Result<Box<dyn Describer>, DescribeError> {
    if cfg.enabled {
        Ok(Box::new(VisionClient::from_config(cfg)?))
    } else {
        Ok(Box::new(NoopDescriber))
    }
}

/// Reported after each scene is described.
pub struct SceneProgress<'a> {
    pub done: usize,
    pub total: usize,
    pub entry: &'a SceneEntry,
    pub error: Option<&'a DescribeError>,
}

/// Buckets screenshots by scene, each bucket ordered beginning, middle, end.
pub fn group_screenshots(shots: Vec<Screenshot>) -> BTreeMap<u32, Vec<Screenshot>> {
    let mut groups: BTreeMap<u32, Vec<Screenshot>> = BTreeMap::new();
    for shot in shots {
        groups.entry(shot.scene_number).or_default().push(shot);
    }
    for group in groups.values_mut() {
        group.sort_by_key(|s| s.position);
    }
    groups
}

pub fn build_prompt(scene: &Scene, shots: &[Screenshot]) -> String {
    let positions: Vec<&str> = shots.iter().map(|s| s.position.as_str()).collect();
    let frames = if shots.len() == 1 {
        format!("The image is a frame from the {} of the scene.", positions[0])
    } else {
        format!(
            "The {} images are frames from the {} of the scene, in that order.",
            shots.len(),
            positions.join(", ")
        )
    };
    format!(
        "Describe this video scene, which runs from {:.1}s to {:.1}s. {} \
         Describe the scene briefly and vividly, as if for a video storyboard.",
        scene.start, scene.end, frames
    )
}

/// NFKC plus whitespace trim; service output sometimes carries compatibility forms.
pub fn clean_description(raw: &str, normalize_unicode: bool) -> String {
    let text = if normalize_unicode {
        raw.nfkc().collect::<String>()
    } else {
        raw.to_string()
    };
    text.trim().to_string()
}

/// Describes every scene that has at least one screenshot, in ascending scene order.
///
/// A failed service call becomes an error-text description; it never aborts
/// the remaining scenes.
pub fn describe_scenes(
    describer: &dyn Describer,
    scenes: &[Scene],
    shots: Vec<Screenshot>,
    normalize_unicode: bool,
    mut on_scene: impl FnMut(SceneProgress<'_>),
) -> Vec<SceneEntry> {
    let mut groups = group_screenshots(shots);
    let total = scenes
        .iter()
        .filter(|s| groups.get(&s.number).is_some_and(|g| !g.is_empty()))
        .count();

    let mut entries = Vec::with_capacity(total);
    for scene in scenes {
        let Some(group) = groups.remove(&scene.number).filter(|g| !g.is_empty()) else {
            continue;
        };

        let prompt = build_prompt(scene, &group);
        let images: Vec<&Path> = group.iter().map(|s| s.path.as_path()).collect();
        let (description, error) = match describer.describe(&prompt, &images) {
            Ok(text) => (clean_description(&text, normalize_unicode), None),
            Err(err) => {
                warn!("scene {} description failed: {err}", scene.number);
                (format!("Error generating description: {err}"), Some(err))
            }
        };

        entries.push(SceneEntry {
            scene_number: scene.number,
            start: scene.start,
            end: scene.end,
            screenshots: group,
            description,
        });
        if let Some(entry) = entries.last() {
            on_scene(SceneProgress {
                done: entries.len(),
                total,
                entry,
                error: error.as_ref(),
            });
        }
    }
    entries
}
