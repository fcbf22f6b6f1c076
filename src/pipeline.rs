use crate::{
    config::Config,
    describe::{self, Describer, SceneProgress},
    engine::MediaEngine,
    error::{ServiceError, ServiceResult},
    frames,
    namespace::Namespace,
    report::{self, JobResult, Report, ReportFormat, VideoMeta},
    scenes::{self, BoundarySource, DetectParams},
    tracker::{JobStatus, JobTracker, LogLevel},
    util::{hash_file, now_rfc3339},
};
use anyhow::{anyhow, Context};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};

const PROGRESS_DETECTED: u8 = 15;
const PROGRESS_EXTRACTED: u8 = 30;
const PROGRESS_DESCRIBE_START: u8 = 40;
const PROGRESS_DESCRIBE_END: u8 = 90;
const PROGRESS_PERSISTED: u8 = 95;

/// Everything one job needs; built by the service at submission time.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub namespace: Namespace,
    pub video_path: PathBuf,
    pub filename: String,
    pub size_bytes: u64,
    pub params: DetectParams,
    pub format: ReportFormat,
}

impl JobRequest {
    pub fn id(&self) -> &str {
        &self.namespace.id
    }
}

pub struct Pipeline<E: MediaEngine, D: Describer> {
    cfg: Config,
    engine: E,
    describer: D,
}

/// Job-scoped view of the tracker. Tracker errors here can only mean the job
/// vanished from the store, which never happens, so they are logged and dropped.
struct JobLog<'a> {
    tracker: &'a JobTracker,
    id: &'a str,
}

impl JobLog<'_> {
    fn info(&self, message: impl Into<String>) {
        if let Err(err) = self.tracker.append_log(self.id, LogLevel::Info, message) {
            warn!(job_id = self.id, "append_log: {err}");
        }
    }

    fn error(&self, message: impl Into<String>) {
        if let Err(err) = self.tracker.append_log(self.id, LogLevel::Error, message) {
            warn!(job_id = self.id, "append_log: {err}");
        }
    }

    fn progress(&self, percent: u8) {
        if let Err(err) = self.tracker.set_progress(self.id, percent) {
            warn!(job_id = self.id, "set_progress: {err}");
        }
    }
}

impl<E: MediaEngine, D: Describer> Pipeline<E, D> {
    pub fn new(cfg: &Config, engine: E, describer: D) -> Self {
        Self {
            cfg: cfg.clone(),
            engine,
            describer,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn describer(&self) -> &D {
        &self.describer
    }

    /// [`Pipeline::run_job`] with panics caught: a panicking engine or
    /// describer ends the job in `error` instead of unwinding into the caller.
    /// Both the synchronous path and the worker tasks go through here.
    pub fn run_guarded(&self, tracker: &JobTracker, req: &JobRequest) -> ServiceResult<()> {
        let run = std::panic::catch_unwind(AssertUnwindSafe(|| self.run_job(tracker, req)));
        match run {
            Ok(result) => result,
            Err(payload) => {
                let message = format!("job panicked: {}", panic_message(payload.as_ref()));
                if let Err(err) = tracker.fail(req.id(), message.as_str()) {
                    warn!(job_id = req.id(), "fail: {err}");
                }
                Err(ServiceError::Internal(anyhow!(message)))
            }
        }
    }

    /// Runs the job to a terminal state. Any error ends the job in `error`
    /// and is also returned to the caller.
    pub fn run_job(&self, tracker: &JobTracker, req: &JobRequest) -> ServiceResult<()> {
        match self.process(tracker, req) {
            Ok(result) => {
                JobLog { tracker, id: req.id() }.info(format!(
                    "Storyboard complete: {} scene(s) written to {}",
                    result.report.scenes.len(),
                    result.path.display()
                ));
                tracker.complete(req.id(), result)
            }
            Err(err) => {
                tracker.fail(req.id(), format!("{err:#}"))?;
                Err(err)
            }
        }
    }

    fn process(&self, tracker: &JobTracker, req: &JobRequest) -> ServiceResult<JobResult> {
        let started = Instant::now();
        let log = JobLog { tracker, id: req.id() };
        let video = req.video_path.as_path();

        tracker.set_status(req.id(), JobStatus::Processing)?;
        log.progress(0);
        log.info(format!(
            "Processing {} ({} bytes), threshold={}, max_scenes={}",
            req.filename, req.size_bytes, req.params.threshold, req.params.max_scenes
        ));

        let duration = match self.engine.probe_duration(video) {
            Ok(d) => d,
            Err(err) => {
                log.error(format!("Duration probe failed: {err:#}"));
                return Err(ServiceError::DurationUnknown);
            }
        };
        log.info(format!("Video duration: {duration:.2}s"));

        let boundaries = scenes::detect(&self.engine, video, duration, &req.params)?;
        match (&boundaries.source, &boundaries.rejected) {
            (BoundarySource::Fallback, Some(reason)) => log.info(format!(
                "Scene detection unusable ({reason}); split into {} uniform scene(s)",
                boundaries.scene_count()
            )),
            _ => log.info(format!("Detected {} scene(s)", boundaries.scene_count())),
        }
        log.progress(PROGRESS_DETECTED);

        let scene_list = boundaries.scenes();
        let mut shots = Vec::new();
        for (i, scene) in scene_list.iter().enumerate() {
            let grabbed = frames::extract(&self.engine, video, scene, &req.namespace.scenes_dir);
            log.info(format!(
                "Scene {}: extracted {}/3 frame(s) from {:.1}s - {:.1}s",
                scene.number,
                grabbed.len(),
                scene.start,
                scene.end
            ));
            shots.extend(grabbed);
            log.progress(
                PROGRESS_DETECTED
                    + ((PROGRESS_EXTRACTED - PROGRESS_DETECTED) as usize * (i + 1) / scene_list.len())
                        as u8,
            );
        }
        if shots.is_empty() {
            return Err(ServiceError::Internal(anyhow!(
                "no frames could be extracted from {}",
                req.filename
            )));
        }

        log.progress(PROGRESS_DESCRIBE_START);
        log.info(format!("Describing scenes with {}", self.describer.name()));
        let span = (PROGRESS_DESCRIBE_END - PROGRESS_DESCRIBE_START) as usize;
        let entries = describe::describe_scenes(
            &self.describer,
            &scene_list,
            shots,
            self.cfg.vision.normalize_unicode,
            |p: SceneProgress<'_>| {
                match p.error {
                    Some(err) => log.error(format!(
                        "Scene {}: description failed: {err}",
                        p.entry.scene_number
                    )),
                    None => log.info(format!(
                        "Scene {}: described ({}/{})",
                        p.entry.scene_number, p.done, p.total
                    )),
                }
                log.progress(PROGRESS_DESCRIBE_START + (span * p.done / p.total.max(1)) as u8);
            },
        );
        let skipped = scene_list.len() - entries.len();
        if skipped > 0 {
            log.info(format!("{skipped} scene(s) had no frames and were left out"));
        }

        let fingerprint = hash_file(&self.cfg.hashing, video)
            .with_context(|| format!("hashing input: {}", video.display()))?;

        let report = Report {
            job_id: req.id().to_string(),
            video: VideoMeta {
                filename: req.filename.clone(),
                size_bytes: req.size_bytes,
                duration,
                fingerprint,
                processing_time_secs: started.elapsed().as_secs_f64(),
                generated_at: now_rfc3339(),
            },
            boundary_source: boundaries.source,
            scenes: entries,
        };

        let path = self.persist(&req.namespace, &report, req.format)?;
        log.progress(PROGRESS_PERSISTED);

        if self.cfg.debug.dump_effective_config {
            let raw = toml::to_string(&self.cfg).context("serializing effective config")?;
            write_file(&req.namespace.root.join("effective-config.toml"), raw)?;
        }

        Ok(JobResult {
            report,
            format: req.format,
            path,
        })
    }

    fn persist(&self, ns: &Namespace, report: &Report, format: ReportFormat) -> ServiceResult<PathBuf> {
        let md_path = ns.root.join(&self.cfg.output.markdown_filename);
        let json_path = ns.root.join(&self.cfg.output.json_filename);
        let both = self.cfg.output.write_both_formats;

        if format == ReportFormat::Markdown || both {
            write_file(&md_path, report::render_markdown(report, &self.cfg.global.base_url))?;
        }
        if format == ReportFormat::Json || both {
            let body = serde_json::to_string_pretty(&report::render_json(
                report,
                &self.cfg.global.base_url,
            ))
            .context("serializing report")?;
            write_file(&json_path, body)?;
        }

        Ok(match format {
            ReportFormat::Markdown => md_path,
            ReportFormat::Json => json_path,
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

fn write_file(path: &Path, body: String) -> anyhow::Result<()> {
    debug!("writing {}", path.display());
    std::fs::write(path, body).with_context(|| format!("writing {}", path.display()))
}
