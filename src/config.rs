use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub hashing: Hashing,
    #[serde(default)]
    pub detection: Detection,
    #[serde(default)]
    pub tools: Tools,
    #[serde(default)]
    pub vision: Vision,
    #[serde(default)]
    pub jobs: Jobs,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub debug: Debug,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Global {
    /// Prefix for screenshot URLs embedded in reports.
    pub base_url: String,
    /// Client address used when requests originate from the CLI.
    pub client_label: String,
    pub print_summary: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:13000".into(),
            client_label: "127.0.0.1".into(),
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paths {
    pub output_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            output_dir: "output".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hashing {
    pub mode: String,
    pub fast_window_bytes: u64,
}
impl Default for Hashing {
    fn default() -> Self {
        Self {
            mode: "fast_2x16mb".into(),
            fast_window_bytes: 16 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub scene_threshold: f64,
    pub max_scenes: u32,
    pub min_scenes: u32,
}
impl Default for Detection {
    fn default() -> Self {
        Self {
            scene_threshold: 0.3,
            max_scenes: 10,
            min_scenes: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tools {
    pub ffmpeg_exe: String,
    pub ffprobe_exe: String,
    pub probe_timeout_seconds: u64,
    pub detect_timeout_seconds: u64,
    pub frame_timeout_seconds: u64,
    pub keep_tool_stderr: bool,
}
impl Default for Tools {
    fn default() -> Self {
        Self {
            ffmpeg_exe: "ffmpeg".into(),
            ffprobe_exe: "ffprobe".into(),
            probe_timeout_seconds: 30,
            detect_timeout_seconds: 600,
            frame_timeout_seconds: 60,
            keep_tool_stderr: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vision {
    pub enabled: bool,
    pub endpoint: String,
    pub deployment: String,
    pub api_version: String,
    pub api_key_env: String,
    pub system_prompt: String,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
    pub normalize_unicode: bool,
}
impl Default for Vision {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "".into(),
            deployment: "".into(),
            api_version: "2024-02-15-preview".into(),
            api_key_env: "AZURE_OPENAI_KEY".into(),
            system_prompt: "You are a helpful assistant that describes video scenes.".into(),
            max_tokens: 300,
            timeout_seconds: 60,
            normalize_unicode: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jobs {
    pub workers: usize,
    pub queue_capacity: usize,
    /// How many trailing log entries a poll returns.
    pub log_window: usize,
}
impl Default for Jobs {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 16,
            log_window: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limits {
    pub max_upload_bytes: u64,
    pub allowed_extensions: Vec<String>,
}
impl Default for Limits {
    fn default() -> Self {
        Self {
            max_upload_bytes: 2 * 1024 * 1024 * 1024,
            allowed_extensions: vec![
                "mp4".into(),
                "mov".into(),
                "mkv".into(),
                "webm".into(),
                "avi".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    pub markdown_filename: String,
    pub json_filename: String,
    /// Also persist the JSON rendering when Markdown was requested (and vice versa).
    pub write_both_formats: bool,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            markdown_filename: "storyboard.md".into(),
            json_filename: "storyboard.json".into(),
            write_both_formats: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: true,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Debug {
    pub dump_effective_config: bool,
}
impl Default for Debug {
    fn default() -> Self {
        Self {
            dump_effective_config: false,
        }
    }
}
