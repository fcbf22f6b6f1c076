use super::{types::*, MediaEngine};
use crate::config::Tools;
use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub struct FfmpegEngine {
    tools: Tools,
    ffmpeg_exe: PathBuf,
    ffprobe_exe: PathBuf,
}

impl FfmpegEngine {
    pub fn new(tools: &Tools) -> Self {
        Self {
            tools: tools.clone(),
            ffmpeg_exe: expand_tilde(&tools.ffmpeg_exe),
            ffprobe_exe: expand_tilde(&tools.ffprobe_exe),
        }
    }

    fn run(&self, mut cmd: Command, timeout_seconds: u64) -> Result<Output> {
        debug!("tool run {:?} timeout={}s", cmd, timeout_seconds);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning {:?}", cmd.get_program()))?;

        let output = if timeout_seconds > 0 {
            wait_with_timeout(&mut child, Duration::from_secs(timeout_seconds))?
        } else {
            child.wait_with_output().with_context(|| "waiting for tool")?
        };

        if self.tools.keep_tool_stderr && !output.stderr.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("tool stderr {:?}: {}", cmd.get_program(), stderr.trim());
        }
        Ok(output)
    }

    fn version(&self, exe: &Path) -> Result<String> {
        let mut cmd = Command::new(exe);
        cmd.arg("-version");
        let out = self.run(cmd, self.tools.probe_timeout_seconds)?;
        if !out.status.success() {
            return Err(anyhow!("{} -version exited with {}", exe.display(), out.status));
        }
        let stdout = String::from_utf8_lossy(&out.stdout);
        Ok(stdout.lines().next().unwrap_or_default().trim().to_string())
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

/// `showinfo` prints one `pts_time:` line per frame that passes the select.
fn scene_filter(threshold: f64) -> String {
    format!("select='gt(scene,{threshold})',showinfo")
}

impl MediaEngine for FfmpegEngine {
    fn doctor(&self) -> Result<ToolDiag> {
        let ffmpeg = self.version(&self.ffmpeg_exe);
        let ffprobe = self.version(&self.ffprobe_exe);
        let error = match (&ffmpeg, &ffprobe) {
            (Err(a), Err(b)) => Some(format!("ffmpeg: {a:#}; ffprobe: {b:#}")),
            (Err(a), Ok(_)) => Some(format!("ffmpeg: {a:#}")),
            (Ok(_), Err(b)) => Some(format!("ffprobe: {b:#}")),
            (Ok(_), Ok(_)) => None,
        };
        Ok(ToolDiag {
            ffmpeg_exe: self.ffmpeg_exe.display().to_string(),
            ffmpeg_version: ffmpeg.ok(),
            ffprobe_exe: self.ffprobe_exe.display().to_string(),
            ffprobe_version: ffprobe.ok(),
            ok: error.is_none(),
            error,
        })
    }

    fn probe_duration(&self, video: &Path) -> Result<f64> {
        let mut cmd = Command::new(&self.ffprobe_exe);
        cmd.args(["-v", "error", "-show_entries", "format=duration", "-print_format", "json"])
            .arg(video);
        let out = self.run(cmd, self.tools.probe_timeout_seconds)?;
        if !out.status.success() {
            return Err(anyhow!(
                "ffprobe failed: {}\n{}",
                video.display(),
                String::from_utf8_lossy(&out.stderr)
            ));
        }
        let probe: ProbeOut = serde_json::from_slice(&out.stdout)
            .with_context(|| format!("parsing ffprobe JSON output: {}", video.display()))?;
        let duration = probe
            .format
            .duration
            .as_deref()
            .and_then(|d| d.trim().parse::<f64>().ok())
            .ok_or_else(|| anyhow!("ffprobe reported no duration: {}", video.display()))?;
        Ok(duration)
    }

    fn scene_changes(&self, video: &Path, threshold: f64) -> Result<String> {
        let mut cmd = Command::new(&self.ffmpeg_exe);
        cmd.arg("-hide_banner")
            .arg("-nostats")
            .arg("-i")
            .arg(video)
            .args(["-filter:v", &scene_filter(threshold), "-f", "null", "-"]);
        let out = self.run(cmd, self.tools.detect_timeout_seconds)?;
        let stderr = String::from_utf8_lossy(&out.stderr).into_owned();
        if !out.status.success() {
            let tail: String = stderr.lines().rev().take(5).collect::<Vec<_>>().join(" | ");
            return Err(anyhow!("scene detection failed ({}): {}", out.status, tail));
        }
        Ok(stderr)
    }

    fn grab_frame(&self, video: &Path, timestamp: f64, out_path: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.ffmpeg_exe);
        cmd.args(["-hide_banner", "-loglevel", "error", "-y", "-ss"])
            .arg(format!("{timestamp:.3}"))
            .arg("-i")
            .arg(video)
            .args(["-frames:v", "1", "-q:v", "2"])
            .arg(out_path);
        let out = self.run(cmd, self.tools.frame_timeout_seconds)?;
        if !out.status.success() {
            return Err(anyhow!(
                "frame grab at {timestamp:.3}s failed: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            ));
        }
        Ok(())
    }
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<Output> {
    // ffmpeg writes one line per selected frame to stderr; drain both pipes while
    // waiting so a long video can't block the child on a full buffer.
    let stdout_reader = child.stdout.take();
    let stderr_reader = child.stderr.take();

    let stdout_thread = std::thread::spawn(move || -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        if let Some(mut out) = stdout_reader {
            out.read_to_end(&mut buf).with_context(|| "read stdout")?;
        }
        Ok(buf)
    });

    let stderr_thread = std::thread::spawn(move || -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        if let Some(mut err) = stderr_reader {
            err.read_to_end(&mut buf).with_context(|| "read stderr")?;
        }
        Ok(buf)
    });

    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().with_context(|| "try_wait")? {
            let stdout = stdout_thread
                .join()
                .map_err(|_| anyhow!("stdout reader thread panicked"))??;
            let stderr = stderr_thread
                .join()
                .map_err(|_| anyhow!("stderr reader thread panicked"))??;
            return Ok(Output {
                status,
                stdout,
                stderr,
            });
        }

        if start.elapsed() > timeout {
            warn!("tool process timed out after {:?}", timeout);
            let _ = child.kill();
            child.wait().with_context(|| "wait after kill")?;
            let stderr = stderr_thread
                .join()
                .map_err(|_| anyhow!("stderr reader thread panicked"))??;
            let _ = stdout_thread.join();
            return Err(anyhow!(
                "tool process exceeded timeout ({:?}); stderr: {}",
                timeout,
                String::from_utf8_lossy(&stderr).lines().last().unwrap_or_default()
            ));
        }

        std::thread::sleep(Duration::from_millis(50));
    }
}
