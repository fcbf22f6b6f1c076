#![allow(dead_code)]

use anyhow::{anyhow, Result};
use std::path::Path;
use std::sync::Mutex;
use storyboard::config::Config;
use storyboard::describe::{DescribeError, Describer};
use storyboard::engine::{MediaEngine, ToolDiag};

/// Stand-in for ffmpeg: a fixed duration, a canned change-detection stream and
/// frame grabs that write a small file unless the timestamp is listed as failing.
pub struct FakeEngine {
    pub duration: Option<f64>,
    pub changes: Option<String>,
    pub fail_frames_at: Vec<f64>,
    pub grabbed: Mutex<Vec<f64>>,
}

impl FakeEngine {
    /// Detection tool missing: every `scene_changes` call errors.
    pub fn without_detection(duration: f64) -> Self {
        Self {
            duration: Some(duration),
            changes: None,
            fail_frames_at: Vec::new(),
            grabbed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_changes(duration: f64, raw: &str) -> Self {
        Self {
            changes: Some(raw.to_string()),
            ..Self::without_detection(duration)
        }
    }
}

impl MediaEngine for FakeEngine {
    fn doctor(&self) -> Result<ToolDiag> {
        Ok(ToolDiag {
            ffmpeg_exe: "fake".into(),
            ffmpeg_version: Some("fake 1.0".into()),
            ffprobe_exe: "fake".into(),
            ffprobe_version: Some("fake 1.0".into()),
            ok: true,
            error: None,
        })
    }

    fn probe_duration(&self, _video: &Path) -> Result<f64> {
        self.duration.ok_or_else(|| anyhow!("ffprobe: no duration"))
    }

    fn scene_changes(&self, _video: &Path, _threshold: f64) -> Result<String> {
        self.changes
            .clone()
            .ok_or_else(|| anyhow!("spawning ffmpeg: No such file or directory"))
    }

    fn grab_frame(&self, _video: &Path, timestamp: f64, out: &Path) -> Result<()> {
        self.grabbed.lock().unwrap().push(timestamp);
        if self.fail_frames_at.iter().any(|t| (t - timestamp).abs() < 1e-9) {
            return Err(anyhow!("frame grab at {timestamp} failed"));
        }
        std::fs::write(out, b"\x89PNG fake frame")?;
        Ok(())
    }
}

/// Records every call; fails for scenes whose prompt mentions `fail_on`.
pub struct FakeDescriber {
    pub fail_on: Option<String>,
    pub calls: Mutex<Vec<(String, usize)>>,
}

impl FakeDescriber {
    pub fn new() -> Self {
        Self {
            fail_on: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(fragment: &str) -> Self {
        Self {
            fail_on: Some(fragment.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl Describer for FakeDescriber {
    fn describe(&self, prompt: &str, images: &[&Path]) -> Result<String, DescribeError> {
        self.calls
            .lock()
            .unwrap()
            .push((prompt.to_string(), images.len()));
        if let Some(fragment) = &self.fail_on {
            if prompt.contains(fragment.as_str()) {
                return Err(DescribeError::Api {
                    status: 429,
                    body: "rate limited".into(),
                });
            }
        }
        Ok(format!("  A scene shown in {} frame(s).  ", images.len()))
    }

    fn name(&self) -> &str {
        "fake"
    }
}

pub fn test_config(output_dir: &Path) -> Config {
    let mut cfg = Config::default();
    cfg.paths.output_dir = output_dir.display().to_string();
    cfg.global.base_url = "http://media.test".into();
    cfg.jobs.workers = 2;
    cfg.jobs.queue_capacity = 8;
    cfg.jobs.log_window = 5;
    cfg
}

/// Canned `showinfo` output with selected frames at the given times.
pub fn showinfo(times: &[f64]) -> String {
    let mut out = String::from(
        "Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'input.mp4':\n  Duration: 00:00:30.00, start: 0.000000, bitrate: 1205 kb/s\n",
    );
    for (n, t) in times.iter().enumerate() {
        out.push_str(&format!(
            "[Parsed_showinfo_1 @ 0x55d0c8a3b2c0] n:{n:3} pts:{:7} pts_time:{t} duration:512 fmt:yuv420p\n",
            (t * 12800.0) as i64
        ));
    }
    out.push_str("[out#0/null @ 0x55d0c8a1f980] video:0KiB audio:0KiB\n");
    out
}
