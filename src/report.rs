use crate::frames::Screenshot;
use crate::scenes::BoundarySource;
use crate::util::round1;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Markdown,
    Json,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(ReportFormat::Markdown),
            "json" => Ok(ReportFormat::Json),
            other => Err(format!("unknown format: {other} (expected markdown or json)")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoMeta {
    pub filename: String,
    pub size_bytes: u64,
    pub duration: f64,
    pub fingerprint: String,
    pub processing_time_secs: f64,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneEntry {
    pub scene_number: u32,
    pub start: f64,
    pub end: f64,
    pub screenshots: Vec<Screenshot>,
    pub description: String,
}

impl SceneEntry {
    pub fn timeframe(&self) -> String {
        format!("{:.1}s - {:.1}s", self.start, self.end)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub job_id: String,
    pub video: VideoMeta,
    pub boundary_source: BoundarySource,
    pub scenes: Vec<SceneEntry>,
}

/// What a completed job carries: the report and where it was persisted.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub report: Report,
    pub format: ReportFormat,
    pub path: PathBuf,
}

pub fn screenshot_url(base_url: &str, job_id: &str, shot: &Screenshot) -> String {
    format!(
        "{}/output/{}/scenes/{}",
        base_url.trim_end_matches('/'),
        job_id,
        shot.file_name()
    )
}

pub fn render_markdown(report: &Report, base_url: &str) -> String {
    let mut md = String::from("# Storyboard\n\n");
    let v = &report.video;
    let _ = writeln!(md, "- Video: {}", v.filename);
    let _ = writeln!(md, "- Size: {:.2} MB", v.size_bytes as f64 / (1024.0 * 1024.0));
    let _ = writeln!(md, "- Duration: {:.1}s", v.duration);
    let _ = writeln!(md, "- Processing time: {:.1}s", v.processing_time_secs);
    let _ = writeln!(md, "- Generated: {}", v.generated_at);
    md.push('\n');

    for scene in &report.scenes {
        let _ = writeln!(md, "## Scene {}", scene.scene_number);
        let _ = writeln!(md, "- Timeframe: {}", scene.timeframe());
        md.push('\n');
        for shot in &scene.screenshots {
            let _ = writeln!(
                md,
                "![Scene {} {}]({})",
                scene.scene_number,
                shot.position,
                screenshot_url(base_url, &report.job_id, shot)
            );
        }
        md.push('\n');
        let _ = writeln!(md, "- Description: {}", scene.description);
        md.push('\n');
    }
    md
}

pub fn render_json(report: &Report, base_url: &str) -> serde_json::Value {
    let scenes: Vec<serde_json::Value> = report
        .scenes
        .iter()
        .map(|scene| {
            let screenshots: Vec<serde_json::Value> = scene
                .screenshots
                .iter()
                .map(|shot| {
                    serde_json::json!({
                        "position": shot.position,
                        "timestamp": round1(shot.timestamp),
                        "url": screenshot_url(base_url, &report.job_id, shot),
                    })
                })
                .collect();
            serde_json::json!({
                "scene_number": scene.scene_number,
                "timeframe": {
                    "start": round1(scene.start),
                    "end": round1(scene.end),
                },
                "screenshots": screenshots,
                "description": scene.description,
            })
        })
        .collect();

    let v = &report.video;
    serde_json::json!({
        "request_id": report.job_id,
        "video": {
            "filename": v.filename,
            "size_bytes": v.size_bytes,
            "duration": round1(v.duration),
            "fingerprint": v.fingerprint,
            "processing_time_secs": round1(v.processing_time_secs),
            "generated_at": v.generated_at,
        },
        "boundary_source": report.boundary_source,
        "scene_count": report.scenes.len(),
        "scenes": scenes,
    })
}
