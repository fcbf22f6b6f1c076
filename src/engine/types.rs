use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDiag {
    pub ffmpeg_exe: String,
    pub ffmpeg_version: Option<String>,
    pub ffprobe_exe: String,
    pub ffprobe_version: Option<String>,
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Subset of `ffprobe -print_format json -show_format` output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeOut {
    pub format: ProbeFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeFormat {
    #[serde(default)]
    pub duration: Option<String>,
}
