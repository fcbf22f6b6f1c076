//! Submit / poll / fetch / asset operations over the pipeline.
//!
//! Synchronous submissions run the job on the caller's thread. Asynchronous
//! ones are queued on the worker pool and return an `accepted` acknowledgement
//! immediately; callers then poll and fetch by request id.

use crate::{
    config::Config,
    describe::Describer,
    engine::MediaEngine,
    error::{ServiceError, ServiceResult},
    namespace::{self, Namespace},
    pipeline::{JobRequest, Pipeline},
    report::{render_json, ReportFormat},
    scenes::DetectParams,
    tracker::{JobSnapshot, JobStatus, JobTracker},
    worker::{SubmitError, WorkerPool},
};
use anyhow::Context;
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{error, info, warn};

/// Where the uploaded video bytes come from.
#[derive(Debug, Clone)]
pub enum UploadSource {
    Bytes(Vec<u8>),
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub source: UploadSource,
}

impl Upload {
    pub fn from_path(path: &Path) -> Self {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            filename,
            source: UploadSource::File(path.to_path_buf()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    pub scene_threshold: Option<f64>,
    pub max_scenes: Option<u32>,
    pub async_mode: bool,
    pub format: ReportFormat,
}

#[derive(Debug, Clone, Serialize)]
pub struct Accepted {
    pub status: &'static str,
    pub request_id: String,
}

#[derive(Debug, Clone)]
pub enum Fetched {
    Markdown { path: PathBuf, content: String },
    Json(serde_json::Value),
}

#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// Synchronous mode: the finished report.
    Completed { request_id: String, report: Fetched },
    /// Asynchronous mode: queued, poll for progress.
    Accepted(Accepted),
}

impl SubmitOutcome {
    pub fn request_id(&self) -> &str {
        match self {
            SubmitOutcome::Completed { request_id, .. } => request_id,
            SubmitOutcome::Accepted(a) => &a.request_id,
        }
    }

    /// HTTP-equivalent status code.
    pub fn status_code(&self) -> u16 {
        match self {
            SubmitOutcome::Completed { .. } => 200,
            SubmitOutcome::Accepted(_) => 202,
        }
    }
}

pub struct Service<E: MediaEngine + 'static, D: Describer + 'static> {
    cfg: Config,
    output_dir: PathBuf,
    tracker: Arc<JobTracker>,
    pipeline: Arc<Pipeline<E, D>>,
    pool: WorkerPool,
}

impl<E: MediaEngine + 'static, D: Describer + 'static> Service<E, D> {
    pub fn new(cfg: &Config, pipeline: Pipeline<E, D>) -> anyhow::Result<Self> {
        let pool = WorkerPool::new(cfg.jobs.workers, cfg.jobs.queue_capacity)?;
        Ok(Self {
            cfg: cfg.clone(),
            output_dir: PathBuf::from(&cfg.paths.output_dir),
            tracker: Arc::new(JobTracker::new()),
            pipeline: Arc::new(pipeline),
            pool,
        })
    }

    pub fn tracker(&self) -> &JobTracker {
        &self.tracker
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn submit(
        &self,
        upload: Upload,
        opts: &SubmitOptions,
        client_addr: &str,
    ) -> ServiceResult<SubmitOutcome> {
        let size_bytes = self.validate_upload(&upload)?;
        let params = self.detect_params(opts)?;

        let ns = namespace::allocate(&self.output_dir, client_addr, OffsetDateTime::now_utc())?;
        let video_path = store_upload(&ns, &upload)?;
        let req = JobRequest {
            namespace: ns,
            video_path,
            filename: upload.filename.clone(),
            size_bytes,
            params,
            format: opts.format,
        };
        let id = req.id().to_string();
        self.tracker.create(&id)?;
        info!(job_id = %id, async_mode = opts.async_mode, "accepted upload {}", upload.filename);

        if !opts.async_mode {
            self.pipeline.run_guarded(&self.tracker, &req)?;
            let report = self.fetch(&id)?;
            return Ok(SubmitOutcome::Completed {
                request_id: id,
                report,
            });
        }

        let root = req.namespace.root.clone();
        let tracker = Arc::clone(&self.tracker);
        let pipeline = Arc::clone(&self.pipeline);
        let task = Box::new(move || {
            if let Err(err) = pipeline.run_guarded(&tracker, &req) {
                error!(job_id = req.id(), "job ended in error: {err:#}");
            }
        });

        match self.pool.try_submit(task) {
            Ok(()) => Ok(SubmitOutcome::Accepted(Accepted {
                status: "accepted",
                request_id: id,
            })),
            Err(err) => {
                // The caller never learns this id, so nothing of the job may remain.
                self.tracker.remove(&id);
                if let Err(io) = std::fs::remove_dir_all(&root) {
                    warn!(job_id = %id, "removing {}: {io}", root.display());
                }
                warn!(job_id = %id, "rejected: {err}");
                Err(match err {
                    SubmitError::Full => ServiceError::Busy,
                    SubmitError::Closed => ServiceError::Internal(anyhow::anyhow!(err)),
                })
            }
        }
    }

    /// Status, progress and the trailing log window.
    pub fn poll(&self, id: &str) -> ServiceResult<JobSnapshot> {
        self.tracker.get(id, self.cfg.jobs.log_window)
    }

    pub fn fetch(&self, id: &str) -> ServiceResult<Fetched> {
        let snap = self.tracker.get(id, 0)?;
        match (snap.status, snap.result) {
            (JobStatus::Completed, Some(result)) => match result.format {
                ReportFormat::Markdown => {
                    let content = std::fs::read_to_string(&result.path)
                        .with_context(|| format!("reading {}", result.path.display()))?;
                    Ok(Fetched::Markdown {
                        path: result.path.clone(),
                        content,
                    })
                }
                ReportFormat::Json => Ok(Fetched::Json(render_json(
                    &result.report,
                    &self.cfg.global.base_url,
                ))),
            },
            (JobStatus::Error, _) => Err(ServiceError::JobFailed {
                id: id.to_string(),
                message: snap.error.unwrap_or_else(|| "unknown error".into()),
            }),
            (status, _) => Err(ServiceError::NotReady {
                id: id.to_string(),
                status,
            }),
        }
    }

    /// Resolves a generated file (scene image or report) under the request's directory.
    pub fn asset(&self, id: &str, relative: &str) -> ServiceResult<PathBuf> {
        if !is_plain_relative(Path::new(id)) || !is_plain_relative(Path::new(relative)) {
            return Err(ServiceError::NotFound(format!("{id}/{relative}")));
        }
        let path = self.output_dir.join(id).join(relative);
        if !path.is_file() {
            return Err(ServiceError::NotFound(format!("{id}/{relative}")));
        }
        Ok(path)
    }

    fn validate_upload(&self, upload: &Upload) -> ServiceResult<u64> {
        if upload.filename.trim().is_empty() {
            return Err(ServiceError::Validation("Empty filename".into()));
        }

        let ext = Path::new(&upload.filename)
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_default();
        let allowed = &self.cfg.limits.allowed_extensions;
        if !allowed.is_empty() && !allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext)) {
            return Err(ServiceError::Validation(format!(
                "unsupported video type: {}",
                upload.filename
            )));
        }

        let size = match &upload.source {
            UploadSource::Bytes(bytes) => bytes.len() as u64,
            UploadSource::File(path) => std::fs::metadata(path)
                .map_err(|_| ServiceError::Validation(format!("No video file provided: {}", path.display())))?
                .len(),
        };
        if size == 0 {
            return Err(ServiceError::Validation("No video file provided".into()));
        }
        if size > self.cfg.limits.max_upload_bytes {
            return Err(ServiceError::Validation(format!(
                "upload exceeds max_upload_bytes: {size}"
            )));
        }
        Ok(size)
    }

    fn detect_params(&self, opts: &SubmitOptions) -> ServiceResult<DetectParams> {
        let d = &self.cfg.detection;
        let threshold = opts.scene_threshold.unwrap_or(d.scene_threshold);
        if !threshold.is_finite() || threshold <= 0.0 || threshold > 1.0 {
            return Err(ServiceError::Validation(format!(
                "scene_threshold must be in (0, 1]: {threshold}"
            )));
        }
        let max_scenes = opts.max_scenes.unwrap_or(d.max_scenes);
        if max_scenes == 0 {
            return Err(ServiceError::Validation("max_scenes must be at least 1".into()));
        }
        Ok(DetectParams {
            threshold,
            max_scenes,
            min_scenes: d.min_scenes,
        })
    }
}

fn is_plain_relative(p: &Path) -> bool {
    let mut components = p.components().peekable();
    components.peek().is_some() && components.all(|c| matches!(c, Component::Normal(_)))
}

/// Copies the upload into the namespace as `input.<ext>`.
fn store_upload(ns: &Namespace, upload: &Upload) -> anyhow::Result<PathBuf> {
    let ext = Path::new(&upload.filename)
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("mp4")
        .to_ascii_lowercase();
    let dest = ns.root.join(format!("input.{ext}"));
    match &upload.source {
        UploadSource::Bytes(bytes) => std::fs::write(&dest, bytes)
            .with_context(|| format!("writing upload to {}", dest.display()))?,
        UploadSource::File(src) => {
            std::fs::copy(src, &dest)
                .with_context(|| format!("copying {} to {}", src.display(), dest.display()))?;
        }
    }
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_relative_rejects_traversal() {
        assert!(is_plain_relative(Path::new("scenes/scene_001_middle.png")));
        assert!(is_plain_relative(Path::new("storyboard.md")));
        assert!(!is_plain_relative(Path::new("../secret")));
        assert!(!is_plain_relative(Path::new("/etc/passwd")));
        assert!(!is_plain_relative(Path::new("")));
        assert!(!is_plain_relative(Path::new("scenes/../../x")));
    }
}
